use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory holding the per-run quarantine directories.
    pub work_dir: PathBuf,
    /// Raw instrument output, one directory per run.
    pub raw_data_dir: PathBuf,
    /// Where raw run directories are moved once their bulk data is deleted.
    pub raw_archive_dir: PathBuf,
    /// Demultiplexed fastqs: <fastq_dir>/<run>/<project>/<sample>/.
    pub fastq_dir: PathBuf,
    /// Analysed data: <processed_data_dir>/<project>/<sample>/.
    pub processed_data_dir: PathBuf,
    /// Customer delivery area: <delivered_data_dir>/<project>/<batch>/<sample>/.
    pub delivered_data_dir: PathBuf,
    /// Where fully-deleted run and project directories are archived.
    pub final_archive_dir: PathBuf,

    /// Base URL of the REST metadata store, e.g. "http://reporting/api/0.1".
    pub rest_api_url: String,
    /// Base URL of the LIMS status service.
    pub lims_api_url: String,

    /// A run's bulk data is deletable once its last run element has been
    /// usable for strictly more than this many days.
    #[serde(default = "default_raw_age_days")]
    pub raw_age_days: i64,
    /// Samples stay at 'on lustre' for strictly more than this many days
    /// before the final purge may touch them.
    #[serde(default = "default_final_age_days")]
    pub final_age_days: i64,

    /// Prefix wrapping a command for blocking cluster submission,
    /// e.g. "srun --quiet". Unset means all commands run locally.
    #[serde(default)]
    pub cluster_submit_prefix: Option<String>,

    #[serde(default = "default_hsm_state_cmd")]
    pub hsm_state_cmd: String,
    #[serde(default = "default_hsm_release_cmd")]
    pub hsm_release_cmd: String,
}

fn default_raw_age_days() -> i64 {
    14
}

fn default_final_age_days() -> i64 {
    365
}

fn default_hsm_state_cmd() -> String {
    "lfs hsm_state".to_string()
}

fn default_hsm_release_cmd() -> String {
    "lfs hsm_release".to_string()
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
