use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "seqsweep")]
#[command(about = "Tiered deletion and archival of sequencing data", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Delete raw instrument output for reviewed, aged runs
    Raw(DeletionArgs),
    /// Delete fastqs for samples released in both the LIMS and the store
    Fastq(DeletionArgs),
    /// Purge delivered copies and release archived originals to tape
    Delivered(DeletionArgs),
    /// Permanently purge samples past the retention window
    Final(DeletionArgs),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args, Clone)]
pub struct DeletionArgs {
    /// Log every command and patch without mutating anything
    #[arg(long)]
    pub dry_run: bool,

    /// Cap on candidate runs/samples processed this pass
    #[arg(long)]
    pub deletion_limit: Option<usize>,

    /// Process these samples, bypassing automatic eligibility checks
    #[arg(long = "sample")]
    pub manual_samples: Vec<String>,

    /// Process these runs, bypassing automatic eligibility checks
    #[arg(long = "run")]
    pub manual_runs: Vec<String>,
}
