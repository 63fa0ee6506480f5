use crate::error::{Error, Result};
use std::cell::RefCell;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Local,
    Cluster,
}

/// Every filesystem mutation performed by a deleter funnels through this
/// trait, so a dry run can swap in a recording no-op without touching any
/// orchestration logic.
pub trait CommandRunner {
    /// Run a shell command to completion and return its exit status.
    fn execute(&self, cmd: &str, mode: ExecutionMode) -> Result<i32>;

    /// True when `execute` only records commands instead of running them.
    fn is_dry_run(&self) -> bool {
        false
    }

    /// Stop any outstanding cluster work. Called once from the top-level
    /// failure handler; the default blocking runner has nothing to stop.
    fn shutdown(&self) {}

    /// Run a command and turn a non-zero status into a `CommandFailure`.
    fn execute_checked(&self, cmd: &str, mode: ExecutionMode) -> Result<()> {
        let status = self.execute(cmd, mode)?;
        if status != 0 {
            return Err(Error::CommandFailure {
                command: cmd.to_string(),
                status,
            });
        }
        Ok(())
    }
}

/// Blocking shell runner. Local commands run through `sh -c`; cluster
/// commands are wrapped with the configured blocking submit prefix
/// (e.g. `srun --quiet`) and fall back to local execution when no prefix
/// is configured.
pub struct ShellRunner {
    cluster_submit_prefix: Option<String>,
}

impl ShellRunner {
    pub fn new(cluster_submit_prefix: Option<String>) -> Self {
        Self {
            cluster_submit_prefix,
        }
    }
}

impl CommandRunner for ShellRunner {
    fn execute(&self, cmd: &str, mode: ExecutionMode) -> Result<i32> {
        let full_cmd = match (mode, &self.cluster_submit_prefix) {
            (ExecutionMode::Cluster, Some(prefix)) => format!("{} {}", prefix, cmd),
            _ => cmd.to_string(),
        };
        debug!("Executing: {}", full_cmd);
        let status = Command::new("sh").arg("-c").arg(&full_cmd).status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Records every command it is asked to run and mutates nothing, so the
/// dry-run log is a faithful preview of a real run.
#[derive(Default)]
pub struct DryRunRunner {
    commands: RefCell<Vec<String>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl CommandRunner for DryRunRunner {
    fn execute(&self, cmd: &str, _mode: ExecutionMode) -> Result<i32> {
        info!("Dry run: {}", cmd);
        self.commands.borrow_mut().push(cmd.to_string());
        Ok(0)
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

pub fn mkdir_cmd(dir: &Path) -> String {
    format!("mkdir -p '{}'", dir.display())
}

pub fn move_cmd(src: &Path, dest: &Path) -> String {
    format!("mv '{}' '{}'", src.display(), dest.display())
}

pub fn remove_cmd(path: &Path) -> String {
    format!("rm -rf '{}'", path.display())
}
