use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Per-file flags reported by the HSM query tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateFlag {
    Exists,
    /// A copy exists on the tape tier. Does not imply the fast-tier copy
    /// was removed.
    Archived,
    /// The fast-tier copy was removed after archival; implies `Archived`.
    Released,
    /// Fast-tier and tape copies differ; blocks purge and release.
    Dirty,
}

/// Queries and mutates the archival state of files on the fast tier.
///
/// `release` enforces its precondition here so every implementation,
/// including test fakes, fails closed the same way.
pub trait ArchiveStateProbe {
    fn states(&self, path: &Path) -> Result<HashSet<StateFlag>>;

    /// Remove the fast-tier copy of an already-archived file.
    fn do_release(&self, path: &Path) -> Result<()>;

    fn is_archived(&self, path: &Path) -> Result<bool> {
        Ok(self.states(path)?.contains(&StateFlag::Archived))
    }

    fn is_released(&self, path: &Path) -> Result<bool> {
        Ok(self.states(path)?.contains(&StateFlag::Released))
    }

    fn is_dirty(&self, path: &Path) -> Result<bool> {
        Ok(self.states(path)?.contains(&StateFlag::Dirty))
    }

    fn release(&self, path: &Path) -> Result<()> {
        if !self.is_archived(path)? {
            return Err(Error::Archiving(format!(
                "cannot release unarchived file {}",
                path.display()
            )));
        }
        if self.is_dirty(path)? {
            return Err(Error::Archiving(format!(
                "cannot release dirty file {}",
                path.display()
            )));
        }
        self.do_release(path)
    }
}

/// One state line looks like:
/// `/path/to/file: (0x0000000d) exists archived, archive_id: 1`
fn state_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*.+?:\s*\((0x[0-9a-fA-F]+)\)((?:\s+[a-z_]+)*)(?:,.*)?$").unwrap()
    })
}

/// Parse one line of HSM state output into a flag set. Words outside the
/// known vocabulary are ignored; a line that does not match the grammar at
/// all is a `ProbeParse` error.
pub fn parse_state_line(line: &str) -> Result<HashSet<StateFlag>> {
    let captures = state_line_regex()
        .captures(line)
        .ok_or_else(|| Error::ProbeParse(line.to_string()))?;

    let mut flags = HashSet::new();
    for word in captures[2].split_whitespace() {
        match word {
            "exists" => {
                flags.insert(StateFlag::Exists);
            }
            "archived" => {
                flags.insert(StateFlag::Archived);
            }
            "released" => {
                flags.insert(StateFlag::Released);
            }
            "dirty" => {
                flags.insert(StateFlag::Dirty);
            }
            other => debug!("Ignoring unrecognised state flag '{}'", other),
        }
    }
    Ok(flags)
}

/// Production probe shelling out to the HSM command-line tool
/// (`lfs hsm_state` / `lfs hsm_release` on a Lustre filesystem).
pub struct HsmCliProbe {
    state_cmd: String,
    release_cmd: String,
}

impl HsmCliProbe {
    pub fn new(state_cmd: &str, release_cmd: &str) -> Self {
        Self {
            state_cmd: state_cmd.to_string(),
            release_cmd: release_cmd.to_string(),
        }
    }
}

impl ArchiveStateProbe for HsmCliProbe {
    fn states(&self, path: &Path) -> Result<HashSet<StateFlag>> {
        let cmd = format!("{} '{}'", self.state_cmd, path.display());
        let output = Command::new("sh").arg("-c").arg(&cmd).output()?;

        // A failed probe means no state information, not a crash: the file
        // is treated as unarchived and therefore not deletable.
        if !output.status.success() {
            warn!(
                "'{}' exited with {}; treating {} as unarchived",
                cmd,
                output.status,
                path.display()
            );
            return Ok(HashSet::new());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::ProbeParse(format!("empty output from '{}'", cmd)))?;
        parse_state_line(line)
    }

    fn do_release(&self, path: &Path) -> Result<()> {
        let cmd = format!("{} '{}'", self.release_cmd, path.display());
        let status = Command::new("sh").arg("-c").arg(&cmd).status()?;
        if !status.success() {
            return Err(Error::CommandFailure {
                command: cmd,
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}
