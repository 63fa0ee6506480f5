use crate::accounting;
use crate::archive::ArchiveStateProbe;
use crate::command::{self, ExecutionMode};
use crate::deleter::{compare_lists, Deleter, DeletionContext, DeletionSummary};
use crate::error::{Error, Result};
use crate::lims::Lims;
use crate::records::DataDeletedState;
use crate::samples::{FinalSample, ProcessedSample};
use crate::store::MetadataStore;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

/// The terminal stage. Samples that have sat at 'on lustre' beyond the
/// retention window lose their released copies for good, and run and
/// project directories left empty by that purge are moved to the archive
/// location.
pub struct FinalDataDeleter<'a> {
    ctx: DeletionContext<'a>,
    store: &'a MetadataStore<'a>,
    lims: &'a dyn Lims,
    probe: &'a dyn ArchiveStateProbe,
}

struct FinalPlan<'a> {
    sample: FinalSample<'a>,
    /// (source, uuid-prefixed quarantine name): fastqs from different runs
    /// can share a basename within one sample.
    files: Vec<(PathBuf, String)>,
}

impl<'a> FinalDataDeleter<'a> {
    pub fn new(
        ctx: DeletionContext<'a>,
        store: &'a MetadataStore<'a>,
        lims: &'a dyn Lims,
        probe: &'a dyn ArchiveStateProbe,
    ) -> Self {
        Self {
            ctx,
            store,
            lims,
            probe,
        }
    }

    /// Samples at 'on lustre' whose release date is strictly more than
    /// `final_age_days` ago. Manual selection bypasses the age gate but a
    /// manually-named sample must still be at 'on lustre'.
    pub fn deletable_samples(&self) -> Result<Vec<FinalSample<'a>>> {
        let manual = !self.ctx.opts.manual_samples.is_empty();
        let records = if manual {
            let mut records = Vec::new();
            for sample_id in &self.ctx.opts.manual_samples {
                match self.store.sample(sample_id)? {
                    Some(rec) => records.push(rec),
                    None => {
                        return Err(Error::NotFound(format!(
                            "sample {} not in the metadata store",
                            sample_id
                        )))
                    }
                }
            }
            records
        } else {
            self.store
                .samples_with_data_deleted(DataDeletedState::OnLustre)?
        };

        let mut samples = Vec::new();
        for record in records {
            if record.data_deleted != DataDeletedState::OnLustre {
                debug!(
                    "Sample {} is at data_deleted={}, not eligible for final deletion",
                    record.sample_id, record.data_deleted
                );
                continue;
            }
            let sample = FinalSample::new(ProcessedSample::new(
                record,
                self.ctx.cfg,
                self.store,
                self.lims,
                self.probe,
            ));
            if manual || sample.old_enough(self.ctx.cfg.final_age_days)? {
                samples.push(sample);
            }
        }
        samples.sort_by(|a, b| a.sample.sample_id().cmp(b.sample.sample_id()));
        Ok(self.ctx.apply_limit(samples))
    }

    /// Move run directories with no files left beneath them, and project
    /// directories whose samples are all fully deleted, to the archive
    /// location.
    fn archive_empty_directories(&self) -> Result<usize> {
        let mut archived = 0;

        let runs_archive = self.ctx.cfg.final_archive_dir.join("runs");
        for entry in read_dir_sorted(&self.ctx.cfg.fastq_dir)? {
            if !entry.is_dir() {
                continue;
            }
            if accounting::regular_files_under(&[&entry])?.is_empty() {
                info!("Archiving empty run directory {}", entry.display());
                self.ctx
                    .runner
                    .execute_checked(&command::mkdir_cmd(&runs_archive), ExecutionMode::Local)?;
                let dest = runs_archive.join(entry.file_name().unwrap_or_default());
                self.ctx
                    .runner
                    .execute_checked(&command::move_cmd(&entry, &dest), ExecutionMode::Local)?;
                archived += 1;
            }
        }

        let projects_archive = self.ctx.cfg.final_archive_dir.join("projects");
        for entry in read_dir_sorted(&self.ctx.cfg.processed_data_dir)? {
            if !entry.is_dir() {
                continue;
            }
            let project_id = entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let samples = self.store.samples_in_project(&project_id)?;
            if samples.is_empty()
                || !samples
                    .iter()
                    .all(|s| s.data_deleted == DataDeletedState::All)
            {
                continue;
            }
            info!("Archiving completed project directory {}", entry.display());
            self.ctx
                .runner
                .execute_checked(&command::mkdir_cmd(&projects_archive), ExecutionMode::Local)?;
            let dest = projects_archive.join(&project_id);
            self.ctx
                .runner
                .execute_checked(&command::move_cmd(&entry, &dest), ExecutionMode::Local)?;
            archived += 1;
        }

        Ok(archived)
    }
}

impl Deleter for FinalDataDeleter<'_> {
    fn name(&self) -> &'static str {
        "final data deleter"
    }

    fn context(&self) -> &DeletionContext<'_> {
        &self.ctx
    }

    fn delete_data(&mut self) -> Result<DeletionSummary> {
        let samples = self.deletable_samples()?;
        if samples.is_empty() {
            debug!("No deletable samples found");
            return Ok(DeletionSummary::default());
        }

        let mut plans = Vec::new();
        for sample in samples {
            // Deletability is re-verified at delete time: the store is
            // re-queried and the state re-checked before anything moves.
            let current = self
                .store
                .sample(sample.sample.sample_id())?
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "sample {} vanished from the metadata store",
                        sample.sample.sample_id()
                    ))
                })?;
            if current.data_deleted != DataDeletedState::OnLustre {
                debug!(
                    "Sample {} no longer at 'on lustre', skipping",
                    current.sample_id
                );
                continue;
            }
            let files = sample
                .purgeable_files()?
                .into_iter()
                .map(|src| {
                    let name = src
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    (src, format!("{}_{}", Uuid::new_v4(), name))
                })
                .collect();
            plans.push(FinalPlan { sample, files });
        }

        let source_paths: Vec<PathBuf> = plans
            .iter()
            .flat_map(|p| p.files.iter().map(|(src, _)| src.clone()))
            .collect();
        let size_gb = accounting::total_size_gb(&source_paths)?;
        info!(
            "Final deletion of {} samples, {} files ({:.2} GB)",
            plans.len(),
            source_paths.len(),
            size_gb
        );

        for plan in &plans {
            let sample_dir = self.ctx.deletion_dir().join(plan.sample.sample.sample_id());
            for (src, quarantined) in &plan.files {
                self.ctx.stage(src, &sample_dir.join(quarantined))?;
            }
        }

        if self.ctx.dry_run() {
            for plan in &plans {
                info!(
                    "Dry run: would patch sample {} data_deleted to 'all'",
                    plan.sample.sample.sample_id()
                );
            }
            self.ctx.purge_deletion_dir()?;
            return Ok(DeletionSummary {
                units_processed: plans.len(),
                size_gb,
            });
        }

        for plan in &plans {
            if plan.files.is_empty() {
                continue;
            }
            let sample_dir = self.ctx.deletion_dir().join(plan.sample.sample.sample_id());
            let observed = accounting::sorted_entry_names(&sample_dir)?;
            let expected: Vec<String> =
                plan.files.iter().map(|(_, name)| name.clone()).collect();
            compare_lists(&observed, &expected)?;
        }

        for plan in &plans {
            plan.sample.sample.mark_as_deleted(DataDeletedState::All)?;
        }

        self.ctx.purge_deletion_dir()?;

        self.archive_empty_directories()?;

        Ok(DeletionSummary {
            units_processed: plans.len(),
            size_gb,
        })
    }
}

fn read_dir_sorted(dir: &std::path::Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}
