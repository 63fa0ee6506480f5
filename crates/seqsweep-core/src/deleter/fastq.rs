use crate::accounting;
use crate::config::AppConfig;
use crate::deleter::{compare_lists, Deleter, DeletionContext, DeletionSummary};
use crate::error::{Error, Result};
use crate::lims::Lims;
use crate::records::{DataDeletedState, SampleRecord};
use crate::store::MetadataStore;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Deletes a sample's fastqs once the LIMS and the metadata store both
/// agree the sample has been released to the customer. Two independent
/// systems must agree; the candidate set is their intersection.
pub struct FastqDeleter<'a> {
    ctx: DeletionContext<'a>,
    store: &'a MetadataStore<'a>,
    lims: &'a dyn Lims,
}

/// One sample's staged fastqs, grouped by (run, project, sample) subtree.
struct FastqPlan {
    record: SampleRecord,
    /// (run_id, project_id, sample_id) -> source fastq paths.
    groups: BTreeMap<(String, String, String), Vec<PathBuf>>,
}

impl FastqPlan {
    fn all_files(&self) -> Vec<PathBuf> {
        self.groups.values().flatten().cloned().collect()
    }
}

impl<'a> FastqDeleter<'a> {
    pub fn new(
        ctx: DeletionContext<'a>,
        store: &'a MetadataStore<'a>,
        lims: &'a dyn Lims,
    ) -> Self {
        Self { ctx, store, lims }
    }

    pub fn deletable_samples(&self) -> Result<Vec<SampleRecord>> {
        let candidate_ids: Vec<String> = if !self.ctx.opts.manual_samples.is_empty() {
            self.ctx.opts.manual_samples.clone()
        } else {
            let in_lims = self.lims.released_sample_ids()?;
            let in_store = self.store.released_sample_ids()?;
            let mut ids: Vec<String> = in_lims.intersection(&in_store).cloned().collect();
            ids.sort();
            ids
        };

        let mut records = Vec::new();
        for sample_id in candidate_ids {
            match self.store.sample(&sample_id)? {
                Some(rec) if rec.data_deleted == DataDeletedState::None => records.push(rec),
                Some(rec) => debug!(
                    "Sample {} already at data_deleted={}, skipping",
                    rec.sample_id, rec.data_deleted
                ),
                None => {
                    return Err(Error::NotFound(format!(
                        "sample {} not in the metadata store",
                        sample_id
                    )))
                }
            }
        }
        Ok(self.ctx.apply_limit(records))
    }

    fn build_plan(&self, cfg: &AppConfig, record: SampleRecord) -> Result<FastqPlan> {
        let mut groups: BTreeMap<(String, String, String), Vec<PathBuf>> = BTreeMap::new();
        for element in self.store.run_elements_for_sample(&record.sample_id)? {
            let pattern = cfg
                .fastq_dir
                .join(&element.run_id)
                .join(&element.project_id)
                .join(&element.sample_id)
                .join(format!("*_L00{}_*.fastq.gz", element.lane));
            let pattern = pattern
                .to_str()
                .ok_or_else(|| Error::Other(format!("non-UTF8 path: {:?}", pattern)))?
                .to_string();
            let fastqs: Vec<PathBuf> = glob::glob(&pattern)
                .map_err(|e| Error::Other(format!("bad glob '{}': {}", pattern, e)))?
                .filter_map(|p| p.ok())
                .collect();
            if fastqs.is_empty() {
                continue;
            }
            groups
                .entry((element.run_id, element.project_id, element.sample_id))
                .or_default()
                .extend(fastqs);
        }
        Ok(FastqPlan { record, groups })
    }

    /// Three independent listing comparisons over the staged subtree: the
    /// run directories, the project directories within each run, and the
    /// exact fastq basenames within each sample directory.
    fn verify_plan(&self, plan: &FastqPlan) -> Result<()> {
        let quarantine = self.ctx.deletion_dir();

        let observed_runs = accounting::sorted_entry_names(quarantine)?;
        for (run_id, _, _) in plan.groups.keys() {
            if !observed_runs.contains(run_id) {
                return Err(Error::IntegrityMismatch(format!(
                    "run {} missing from quarantine",
                    run_id
                )));
            }
        }

        for (run_id, project_id, _) in plan.groups.keys() {
            let observed = accounting::sorted_entry_names(&quarantine.join(run_id))?;
            if !observed.contains(project_id) {
                return Err(Error::IntegrityMismatch(format!(
                    "project {} missing from quarantined run {}",
                    project_id, run_id
                )));
            }
        }

        for ((run_id, project_id, sample_id), files) in &plan.groups {
            let sample_dir = quarantine.join(run_id).join(project_id).join(sample_id);
            let observed = accounting::sorted_entry_names(&sample_dir)?;
            let expected: Vec<String> = files
                .iter()
                .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            compare_lists(&observed, &expected)?;
        }

        Ok(())
    }
}

impl Deleter for FastqDeleter<'_> {
    fn name(&self) -> &'static str {
        "fastq deleter"
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
        for record in samples {
            let plan = self.build_plan(self.ctx.cfg, record)?;
            if plan.groups.is_empty() {
                debug!("No fastqs on disk for sample {}", plan.record.sample_id);
                continue;
            }
            plans.push(plan);
        }

        let all_files: Vec<PathBuf> = plans.iter().flat_map(|p| p.all_files()).collect();
        let size_gb = accounting::total_size_gb(&all_files)?;
        info!(
            "Deleting fastqs for {} samples, {} files ({:.2} GB)",
            plans.len(),
            all_files.len(),
            size_gb
        );

        for plan in &plans {
            for ((run_id, project_id, sample_id), files) in &plan.groups {
                for src in files {
                    let name = src
                        .file_name()
                        .ok_or_else(|| Error::Other(format!("no basename: {}", src.display())))?;
                    let dest = self
                        .ctx
                        .deletion_dir()
                        .join(run_id)
                        .join(project_id)
                        .join(sample_id)
                        .join(name);
                    self.ctx.stage(src, &dest)?;
                }
            }
        }

        if self.ctx.dry_run() {
            for plan in &plans {
                info!(
                    "Dry run: would patch sample {} data_deleted to 'on lustre' and reset delivery flags",
                    plan.record.sample_id
                );
            }
            self.ctx.purge_deletion_dir()?;
            return Ok(DeletionSummary {
                units_processed: plans.len(),
                size_gb,
            });
        }

        for plan in &plans {
            self.verify_plan(plan)?;
        }

        for plan in &plans {
            self.store
                .set_data_deleted(&plan.record, DataDeletedState::OnLustre)?;
            self.store.reset_delivery_flags(&plan.record.sample_id)?;
        }

        self.ctx.purge_deletion_dir()?;

        Ok(DeletionSummary {
            units_processed: plans.len(),
            size_gb,
        })
    }
}
