use crate::accounting;
use crate::archive::ArchiveStateProbe;
use crate::deleter::{compare_lists, Deleter, DeletionContext, DeletionSummary};
use crate::error::{Error, Result};
use crate::lims::Lims;
use crate::records::DataDeletedState;
use crate::samples::ProcessedSample;
use crate::store::MetadataStore;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The canonical two-tier deleter. Delivered copies are physically purged
/// through quarantine; raw and processed originals are released from the
/// fast tier, leaving the tape copy canonical. A sample with any
/// unarchived or dirty original fails closed before anything moves.
pub struct DeliveredDataDeleter<'a> {
    ctx: DeletionContext<'a>,
    store: &'a MetadataStore<'a>,
    lims: &'a dyn Lims,
    probe: &'a dyn ArchiveStateProbe,
}

struct SamplePlan<'a> {
    sample: ProcessedSample<'a>,
    to_release: Vec<PathBuf>,
    /// (source, quarantined name). Names get a UUID prefix so samples
    /// sharing a basename cannot overwrite each other in quarantine.
    to_purge: Vec<(PathBuf, String)>,
}

impl<'a> DeliveredDataDeleter<'a> {
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

    pub fn deletable_samples(&self) -> Result<Vec<ProcessedSample<'a>>> {
        let mut records = Vec::new();
        if !self.ctx.opts.manual_samples.is_empty() {
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
        } else {
            records = self
                .store
                .samples_with_data_deleted(DataDeletedState::None)?
                .into_iter()
                .filter(|r| r.delivered)
                .collect();
        }
        records.sort_by(|a, b| a.sample_id.cmp(&b.sample_id));
        let records = self.ctx.apply_limit(records);
        Ok(records
            .into_iter()
            .map(|r| ProcessedSample::new(r, self.ctx.cfg, self.store, self.lims, self.probe))
            .collect())
    }

    /// Resolve one sample's plan. The release list is computed first so an
    /// archival-consistency violation aborts before any staging. `None`
    /// when the delivery folder resolved to zero or several matches: the
    /// sample sits out this pass with its state untouched.
    fn build_plan(&self, sample: ProcessedSample<'a>) -> Result<Option<SamplePlan<'a>>> {
        let to_release = sample.files_to_release()?;
        let purgeable = match sample.files_to_purge()? {
            Some(files) => files,
            None => return Ok(None),
        };
        let to_purge = purgeable
            .into_iter()
            .map(|src| {
                let name = src
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let quarantined = format!("{}_{}", Uuid::new_v4(), name);
                (src, quarantined)
            })
            .collect();
        Ok(Some(SamplePlan {
            sample,
            to_release,
            to_purge,
        }))
    }
}

impl Deleter for DeliveredDataDeleter<'_> {
    fn name(&self) -> &'static str {
        "delivered data deleter"
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

        // Archival and delivery-folder preconditions are checked per
        // sample: a violation skips that sample this pass, not a batch
        // abort.
        let mut plans = Vec::new();
        for sample in samples {
            let sample_id = sample.sample_id().to_string();
            match self.build_plan(sample) {
                Ok(Some(plan)) => {
                    if plan.to_release.is_empty() && plan.to_purge.is_empty() {
                        debug!("Nothing to do for sample {}", sample_id);
                    } else {
                        plans.push(plan);
                    }
                }
                Ok(None) => {
                    warn!(
                        "Skipping sample {}: no single delivery folder",
                        sample_id
                    );
                }
                Err(Error::Archiving(msg)) => {
                    warn!("Skipping sample {}: {}", sample_id, msg);
                }
                Err(other) => return Err(other),
            }
        }

        let mut size_gb = 0.0;
        for plan in &plans {
            let mut paths: Vec<PathBuf> = plan.to_release.clone();
            paths.extend(plan.to_purge.iter().map(|(src, _)| src.clone()));
            let sample_gb = accounting::total_size_gb(&paths)?;
            info!(
                "Sample {}: {} files to purge, {} to release ({:.2} GB)",
                plan.sample.sample_id(),
                plan.to_purge.len(),
                plan.to_release.len(),
                sample_gb
            );
            size_gb += sample_gb;
        }
        info!("{} samples, {:.2} GB total", plans.len(), size_gb);

        let mut expected_names = Vec::new();
        for plan in &plans {
            for (src, quarantined) in &plan.to_purge {
                let dest = self.ctx.deletion_dir().join(quarantined);
                self.ctx.stage(src, &dest)?;
                expected_names.push(quarantined.clone());
            }
        }

        if self.ctx.dry_run() {
            for plan in &plans {
                for file in &plan.to_release {
                    info!("Dry run: would release {}", file.display());
                }
                info!(
                    "Dry run: would patch sample {} data_deleted to 'on lustre'",
                    plan.sample.sample_id()
                );
            }
            self.ctx.purge_deletion_dir()?;
            return Ok(DeletionSummary {
                units_processed: plans.len(),
                size_gb,
            });
        }

        if !expected_names.is_empty() {
            let observed = accounting::sorted_entry_names(self.ctx.deletion_dir())?;
            compare_lists(&observed, &expected_names)?;
        }

        for plan in &plans {
            for file in &plan.to_release {
                self.probe.release(file)?;
            }
            plan.sample.mark_as_deleted(DataDeletedState::OnLustre)?;
        }

        self.ctx.purge_deletion_dir()?;

        Ok(DeletionSummary {
            units_processed: plans.len(),
            size_gb,
        })
    }
}
