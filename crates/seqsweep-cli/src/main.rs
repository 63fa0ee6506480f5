mod commands;
mod logging;
mod rest;

use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, DeletionArgs};
use dotenv::dotenv;
use rest::{RestClient, RestLims};
use seqsweep_core::archive::HsmCliProbe;
use seqsweep_core::command::{CommandRunner, DryRunRunner, ShellRunner};
use seqsweep_core::deleter::delivered::DeliveredDataDeleter;
use seqsweep_core::deleter::fastq::FastqDeleter;
use seqsweep_core::deleter::final_data::FinalDataDeleter;
use seqsweep_core::deleter::raw::RawDataDeleter;
use seqsweep_core::notify::LogNotifier;
use seqsweep_core::store::MetadataStore;
use seqsweep_core::{AppConfig, Deleter, DeletionContext, DeletionOptions};
use tracing::error;

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match seqsweep_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let status = match args.command {
        Some(Commands::Raw(del_args)) => run_deleter(&config, Stage::Raw, del_args)?,
        Some(Commands::Fastq(del_args)) => run_deleter(&config, Stage::Fastq, del_args)?,
        Some(Commands::Delivered(del_args)) => run_deleter(&config, Stage::Delivered, del_args)?,
        Some(Commands::Final(del_args)) => run_deleter(&config, Stage::Final, del_args)?,
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            0
        }
        None => {
            let _ = Cli::command().print_long_help();
            0
        }
    };

    if status != 0 {
        process::exit(status);
    }
    Ok(())
}

enum Stage {
    Raw,
    Fastq,
    Delivered,
    Final,
}

fn run_deleter(
    config: &AppConfig,
    stage: Stage,
    args: DeletionArgs,
) -> anyhow::Result<i32> {
    let opts = DeletionOptions {
        dry_run: args.dry_run,
        deletion_limit: args.deletion_limit,
        manual_samples: args.manual_samples,
        manual_runs: args.manual_runs,
    };

    let dry_runner = DryRunRunner::new();
    let shell_runner = ShellRunner::new(config.cluster_submit_prefix.clone());
    let runner: &dyn CommandRunner = if opts.dry_run {
        &dry_runner
    } else {
        &shell_runner
    };

    let notifier = LogNotifier;
    let probe = HsmCliProbe::new(&config.hsm_state_cmd, &config.hsm_release_cmd);
    let client = RestClient::new(&config.rest_api_url)?;
    let store = MetadataStore::new(&client);
    let lims = RestLims::new(&config.lims_api_url)?;

    let ctx = DeletionContext::new(config, runner, &notifier, opts);

    let status = match stage {
        Stage::Raw => RawDataDeleter::new(ctx, &store).run(),
        Stage::Fastq => FastqDeleter::new(ctx, &store, &lims).run(),
        Stage::Delivered => DeliveredDataDeleter::new(ctx, &store, &lims, &probe).run(),
        Stage::Final => FinalDataDeleter::new(ctx, &store, &lims, &probe).run(),
    };

    if status == 0 {
        println!("{}", "Deletion pass completed".green());
    } else {
        println!("{}", format!("Deletion pass failed ({})", status).red());
    }

    Ok(status)
}
