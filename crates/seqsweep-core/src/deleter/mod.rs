pub mod delivered;
pub mod fastq;
pub mod final_data;
pub mod raw;

use crate::command::{self, CommandRunner, ExecutionMode};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use chrono::Utc;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Exit status returned when a deletion pass aborts on an error.
pub const EXIT_DELETION_FAILED: i32 = 9;

#[derive(Debug, Clone, Default)]
pub struct DeletionOptions {
    /// Preview mode: log every command and patch that would run, mutate
    /// nothing. The caller pairs this with a `DryRunRunner`.
    pub dry_run: bool,
    /// Cap on candidate units (runs or samples) processed per pass.
    pub deletion_limit: Option<usize>,
    /// Operator-specified samples, bypassing automatic eligibility checks
    /// but never the archival-safety invariants.
    pub manual_samples: Vec<String>,
    /// Operator-specified runs, same override semantics.
    pub manual_runs: Vec<String>,
}

/// Shared per-pass state for every deleter: the quarantine directory,
/// the command runner all mutation funnels through, and the notifier used
/// on unrecoverable failure.
pub struct DeletionContext<'a> {
    pub cfg: &'a AppConfig,
    pub runner: &'a dyn CommandRunner,
    pub notifier: &'a dyn Notifier,
    pub opts: DeletionOptions,
    deletion_dir: PathBuf,
}

impl<'a> DeletionContext<'a> {
    pub fn new(
        cfg: &'a AppConfig,
        runner: &'a dyn CommandRunner,
        notifier: &'a dyn Notifier,
        opts: DeletionOptions,
    ) -> Self {
        // Embeds "now", so it is computed exactly once per pass and reused
        // for the instance's lifetime. Two racing passes get two distinct
        // quarantine directories.
        let deletion_dir = cfg
            .work_dir
            .join(format!(".data_deletion_{}", Utc::now().format("%Y%m%d_%H%M%S")));
        Self {
            cfg,
            runner,
            notifier,
            opts,
            deletion_dir,
        }
    }

    pub fn deletion_dir(&self) -> &Path {
        &self.deletion_dir
    }

    pub fn dry_run(&self) -> bool {
        self.opts.dry_run
    }

    pub fn apply_limit<T>(&self, mut units: Vec<T>) -> Vec<T> {
        if let Some(limit) = self.opts.deletion_limit {
            units.truncate(limit);
        }
        units
    }

    /// Move a path into quarantine, creating the destination's parent
    /// first. Never deletes in place.
    pub fn stage(&self, src: &Path, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            self.runner
                .execute_checked(&command::mkdir_cmd(parent), ExecutionMode::Local)?;
        }
        self.runner
            .execute_checked(&command::move_cmd(src, dest), ExecutionMode::Local)
    }

    /// Physically remove the quarantine directory after a verified commit.
    pub fn purge_deletion_dir(&self) -> Result<()> {
        self.runner
            .execute_checked(&command::remove_cmd(&self.deletion_dir), ExecutionMode::Local)
    }
}

/// Sort-and-compare of an observed listing against the expected one. Any
/// file silently dropped or duplicated during staging surfaces here.
pub fn compare_lists<T: Ord + Clone + Debug>(observed: &[T], expected: &[T]) -> Result<()> {
    let mut observed = observed.to_vec();
    let mut expected = expected.to_vec();
    observed.sort();
    expected.sort();
    if observed != expected {
        let missing: Vec<&T> = expected.iter().filter(|e| !observed.contains(e)).collect();
        let extra: Vec<&T> = observed.iter().filter(|o| !expected.contains(o)).collect();
        return Err(Error::IntegrityMismatch(format!(
            "missing: {:?}, unexpected: {:?}",
            missing, extra
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct DeletionSummary {
    pub units_processed: usize,
    pub size_gb: f64,
}

/// A deletion stage. `delete_data` does the work and propagates every
/// error; `run` is the single place errors are caught, logged, notified
/// and turned into a process exit status.
pub trait Deleter {
    fn name(&self) -> &'static str;

    fn context(&self) -> &DeletionContext<'_>;

    fn delete_data(&mut self) -> Result<DeletionSummary>;

    fn run(&mut self) -> i32 {
        info!("Starting {}", self.name());
        match self.delete_data() {
            Ok(summary) => {
                info!(
                    "{} finished: {} units, {:.2} GB",
                    self.name(),
                    summary.units_processed,
                    summary.size_gb
                );
                0
            }
            Err(err) => {
                error!("{} failed: {}", self.name(), error_chain(&err));
                let ctx = self.context();
                ctx.runner.shutdown();
                ctx.notifier.notify(
                    &format!("{} failed", self.name()),
                    &format!(
                        "Deletion pass aborted; quarantined data (if any) is under {}.\n{}",
                        ctx.deletion_dir().display(),
                        error_chain(&err)
                    ),
                );
                EXIT_DELETION_FAILED
            }
        }
    }
}

fn error_chain(err: &Error) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str(&format!("\ncaused by: {}", cause));
        source = cause.source();
    }
    out
}
