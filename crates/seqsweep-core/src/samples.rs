use crate::archive::ArchiveStateProbe;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::lims::Lims;
use crate::records::SampleRecord;
use crate::store::MetadataStore;
use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Basename suffixes of the analysed data kept per sample under
/// `<processed_data_dir>/<project>/<sample>/`.
const PROCESSED_SUFFIXES: [&str; 6] = [
    "bam",
    "bam.bai",
    "vcf.gz",
    "vcf.gz.tbi",
    "g.vcf.gz",
    "g.vcf.gz.tbi",
];

/// One sample's file sets across the storage hierarchy, resolved from the
/// metadata store and the on-disk layout. Constructed per deletion pass;
/// the only durable side effect lives in `MetadataStore::set_data_deleted`.
pub struct ProcessedSample<'a> {
    pub record: SampleRecord,
    cfg: &'a AppConfig,
    store: &'a MetadataStore<'a>,
    lims: &'a dyn Lims,
    probe: &'a dyn ArchiveStateProbe,
}

impl<'a> ProcessedSample<'a> {
    pub fn new(
        record: SampleRecord,
        cfg: &'a AppConfig,
        store: &'a MetadataStore<'a>,
        lims: &'a dyn Lims,
        probe: &'a dyn ArchiveStateProbe,
    ) -> Self {
        Self {
            record,
            cfg,
            store,
            lims,
            probe,
        }
    }

    pub fn sample_id(&self) -> &str {
        &self.record.sample_id
    }

    pub fn project_id(&self) -> &str {
        &self.record.project_id
    }

    pub fn release_date(&self) -> Result<Option<NaiveDate>> {
        self.lims.sample_release_date(&self.record.sample_id)
    }

    pub fn days_since_release(&self) -> Result<Option<i64>> {
        Ok(self
            .release_date()?
            .map(|d| (Utc::now().date_naive() - d).num_days()))
    }

    /// Fastqs for every run element of this sample, joined with the on-disk
    /// layout by run, project, sample and lane.
    pub fn raw_data_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for element in self.store.run_elements_for_sample(&self.record.sample_id)? {
            let pattern = self
                .cfg
                .fastq_dir
                .join(&element.run_id)
                .join(&element.project_id)
                .join(&element.sample_id)
                .join(format!("*_L00{}_*.fastq.gz", element.lane));
            files.extend(glob_paths(&pattern)?);
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// The fixed set of analysed-data files that exist on disk for this
    /// sample.
    pub fn processed_data_files(&self) -> Vec<PathBuf> {
        let sample_dir = self
            .cfg
            .processed_data_dir
            .join(&self.record.project_id)
            .join(&self.record.sample_id);
        PROCESSED_SUFFIXES
            .iter()
            .map(|suffix| sample_dir.join(format!("{}.{}", self.record.user_sample_id, suffix)))
            .filter(|p| p.exists())
            .collect()
    }

    /// The customer delivery folder. Exactly one match is expected; zero or
    /// several is a warning and the sample is skipped this pass.
    pub fn released_data_folder(&self) -> Result<Option<PathBuf>> {
        let pattern = self
            .cfg
            .delivered_data_dir
            .join(&self.record.project_id)
            .join("*")
            .join(&self.record.user_sample_id);
        let mut matches: Vec<PathBuf> = glob_paths(&pattern)?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect();
        match matches.len() {
            1 => Ok(Some(matches.remove(0))),
            0 => {
                warn!(
                    "No delivery folder found for sample {}",
                    self.record.sample_id
                );
                Ok(None)
            }
            n => {
                warn!(
                    "Found {} delivery folders for sample {}: {:?}",
                    n, self.record.sample_id, matches
                );
                Ok(None)
            }
        }
    }

    /// Contents of the delivery folder, i.e. the copies that may be
    /// physically purged because the originals remain on the fast tier.
    /// `None` when the folder could not be resolved to exactly one match;
    /// the sample must then be skipped without releasing or patching
    /// anything, or delivered copies would be orphaned on disk.
    pub fn files_to_purge(&self) -> Result<Option<Vec<PathBuf>>> {
        let folder = match self.released_data_folder()? {
            Some(f) => f,
            None => return Ok(None),
        };
        let mut entries: Vec<PathBuf> = fs::read_dir(&folder)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        Ok(Some(entries))
    }

    /// Raw and processed originals eligible for release from the fast tier.
    /// Every member must already be archived and clean; an unarchived or
    /// dirty member fails the whole computation before any mutation, and
    /// the sample is not deletable this pass. Already-released files are
    /// omitted.
    pub fn files_to_release(&self) -> Result<Vec<PathBuf>> {
        let mut candidates = self.raw_data_files()?;
        candidates.extend(self.processed_data_files());

        let mut to_release = Vec::new();
        for file in candidates {
            if !self.probe.is_archived(&file)? {
                return Err(Error::Archiving(format!(
                    "{} is not archived; sample {} is not deletable",
                    file.display(),
                    self.record.sample_id
                )));
            }
            if self.probe.is_dirty(&file)? {
                return Err(Error::Archiving(format!(
                    "{} is dirty; sample {} is not deletable",
                    file.display(),
                    self.record.sample_id
                )));
            }
            if !self.probe.is_released(&file)? {
                to_release.push(file);
            }
        }
        Ok(to_release)
    }

    /// Flip `data_deleted` forward. The store rejects transitions that skip
    /// a state.
    pub fn mark_as_deleted(&self, to: crate::records::DataDeletedState) -> Result<()> {
        self.store.set_data_deleted(&self.record, to)
    }
}

/// A sample already at 'on lustre', considered for the terminal purge.
pub struct FinalSample<'a> {
    pub sample: ProcessedSample<'a>,
}

impl<'a> FinalSample<'a> {
    pub fn new(sample: ProcessedSample<'a>) -> Self {
        Self { sample }
    }

    /// The released stubs and anything else still visible for this sample:
    /// its raw fastqs and processed files. After the terminal purge nothing
    /// recoverable remains anywhere.
    pub fn purgeable_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = self.sample.raw_data_files()?;
        files.extend(self.sample.processed_data_files());
        files.retain(|f| f.exists());
        Ok(files)
    }

    /// Strictly-greater age gate against the configured retention window.
    pub fn old_enough(&self, final_age_days: i64) -> Result<bool> {
        Ok(self
            .sample
            .days_since_release()?
            .map(|days| days > final_age_days)
            .unwrap_or(false))
    }
}

fn glob_paths(pattern: &std::path::Path) -> Result<Vec<PathBuf>> {
    let pattern = pattern
        .to_str()
        .ok_or_else(|| Error::Other(format!("non-UTF8 glob pattern: {:?}", pattern)))?;
    let paths = glob::glob(pattern)
        .map_err(|e| Error::Other(format!("bad glob pattern '{}': {}", pattern, e)))?;
    Ok(paths.filter_map(|p| p.ok()).collect())
}
