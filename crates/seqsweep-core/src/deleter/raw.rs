use crate::accounting;
use crate::command::{self, ExecutionMode};
use crate::deleter::{compare_lists, Deleter, DeletionContext, DeletionSummary};
use crate::error::Result;
use crate::store::MetadataStore;
use chrono::Utc;
use tracing::{debug, info, warn};

/// The bulk-data subdirectories of a run that get deleted. Everything else
/// in the run directory is metadata and is archived with the run instead.
const DELETABLE_SUBDIRS: [&str; 3] = ["Data", "Logs", "Thumbnail_Images"];

/// Deletes per-run raw instrument output once every lane is reviewed and
/// the run is old enough, then moves the remaining metadata-only run
/// directory to the archive location.
pub struct RawDataDeleter<'a> {
    ctx: DeletionContext<'a>,
    store: &'a MetadataStore<'a>,
}

impl<'a> RawDataDeleter<'a> {
    pub fn new(ctx: DeletionContext<'a>, store: &'a MetadataStore<'a>) -> Self {
        Self { ctx, store }
    }

    /// A run is deletable when every run element's review is resolved, its
    /// most recent pipeline proc reached an end state, and its last run
    /// element became usable strictly more than `raw_age_days` ago.
    /// All-or-nothing per run: one unreviewed lane excludes the whole run.
    pub fn deletable_runs(&self) -> Result<Vec<String>> {
        let mut runs = self.ctx.opts.manual_runs.clone();
        if runs.is_empty() {
            for run_id in self.store.run_ids()? {
                if self.run_is_deletable(&run_id)? {
                    runs.push(run_id);
                }
            }
        }
        runs.retain(|run_id| self.ctx.cfg.raw_data_dir.join(run_id).is_dir());
        runs.sort();
        Ok(self.ctx.apply_limit(runs))
    }

    fn run_is_deletable(&self, run_id: &str) -> Result<bool> {
        let elements = self.store.run_elements_for_run(run_id)?;
        if elements.is_empty() {
            return Ok(false);
        }
        if !elements.iter().all(|e| e.review_status.is_resolved()) {
            debug!("Run {} has unreviewed run elements", run_id);
            return Ok(false);
        }
        match self.store.most_recent_proc(run_id)? {
            Some(proc) if proc.status.is_terminal() => {}
            _ => {
                debug!("Run {} has no finished or aborted proc", run_id);
                return Ok(false);
            }
        }
        let last_useable = elements.iter().filter_map(|e| e.useable_date).max();
        match last_useable {
            Some(date) if (Utc::now() - date).num_days() > self.ctx.cfg.raw_age_days => Ok(true),
            _ => {
                debug!("Run {} is too recent to delete", run_id);
                Ok(false)
            }
        }
    }

    /// Move the deletable subdirectories into quarantine. A missing
    /// subdirectory is a warning, not a failure: partial runs are common.
    fn stage_run(&self, run_id: &str) -> Result<Vec<String>> {
        let run_dir = self.ctx.cfg.raw_data_dir.join(run_id);
        let mut staged = Vec::new();
        for subdir in DELETABLE_SUBDIRS {
            let src = run_dir.join(subdir);
            if !src.exists() {
                warn!("Run {} has no {} directory", run_id, subdir);
                continue;
            }
            let dest = self.ctx.deletion_dir().join(run_id).join(subdir);
            self.ctx.stage(&src, &dest)?;
            staged.push(subdir.to_string());
        }
        Ok(staged)
    }

    /// Move what remains of the run directory (sample sheets, interop
    /// metrics and other metadata) to the archive location.
    fn archive_run(&self, run_id: &str) -> Result<()> {
        let archive_dir = &self.ctx.cfg.raw_archive_dir;
        self.ctx
            .runner
            .execute_checked(&command::mkdir_cmd(archive_dir), ExecutionMode::Local)?;
        let src = self.ctx.cfg.raw_data_dir.join(run_id);
        let dest = archive_dir.join(run_id);
        self.ctx
            .runner
            .execute_checked(&command::move_cmd(&src, &dest), ExecutionMode::Local)
    }
}

impl Deleter for RawDataDeleter<'_> {
    fn name(&self) -> &'static str {
        "raw data deleter"
    }

    fn context(&self) -> &DeletionContext<'_> {
        &self.ctx
    }

    fn delete_data(&mut self) -> Result<DeletionSummary> {
        let runs = self.deletable_runs()?;
        if runs.is_empty() {
            debug!("No deletable runs found");
            return Ok(DeletionSummary::default());
        }

        let run_dirs: Vec<_> = runs
            .iter()
            .map(|r| self.ctx.cfg.raw_data_dir.join(r))
            .collect();
        let size_gb = accounting::total_size_gb(&run_dirs)?;
        info!("Deleting raw data for {} runs ({:.2} GB): {:?}", runs.len(), size_gb, runs);

        let mut staged_by_run = Vec::new();
        for run_id in &runs {
            staged_by_run.push((run_id.clone(), self.stage_run(run_id)?));
        }

        if self.ctx.dry_run() {
            for run_id in &runs {
                if let Some(proc) = self.store.most_recent_proc(run_id)? {
                    info!("Dry run: would patch proc {} status to 'deleted'", proc.proc_id);
                }
            }
            self.ctx.purge_deletion_dir()?;
            for run_id in &runs {
                self.archive_run(run_id)?;
            }
            return Ok(DeletionSummary {
                units_processed: runs.len(),
                size_gb,
            });
        }

        for (run_id, staged) in &staged_by_run {
            if staged.is_empty() {
                continue;
            }
            let observed = accounting::sorted_entry_names(&self.ctx.deletion_dir().join(run_id))?;
            compare_lists(&observed, staged)?;
        }

        for run_id in &runs {
            if let Some(proc) = self.store.most_recent_proc(run_id)? {
                self.store.set_proc_status(&proc.proc_id, "deleted")?;
            }
        }

        self.ctx.purge_deletion_dir()?;

        for run_id in &runs {
            self.archive_run(run_id)?;
        }

        Ok(DeletionSummary {
            units_processed: runs.len(),
            size_gb,
        })
    }
}
