//! QUESO Foundry command line.
//!
//! `queso analyze` runs one analysis job; `queso batch` drives the
//! analyze entry across a sources list, one isolated process per input.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use queso_core::batch::BatchRunner;
use queso_core::config;
use queso_core::job;

#[derive(Parser)]
#[command(name = "queso", version, about = "QUESO Foundry analysis pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one input, writing artifacts and a job record.
    Analyze {
        /// Input reference (local media path).
        #[arg(long)]
        input: String,
        /// Output directory (created if absent).
        #[arg(long)]
        out: PathBuf,
        /// Options payload: inline JSON object, or a path to one.
        #[arg(long)]
        opts: Option<String>,
    },
    /// Run the analyze entry across a list of inputs.
    Batch {
        /// JSON or newline-delimited sources list.
        #[arg(long)]
        sources: PathBuf,
        /// Root directory for batch outputs.
        #[arg(long, default_value = "batch_runs")]
        out_root: PathBuf,
        /// Number of passes over the sources list.
        #[arg(long, default_value_t = 1)]
        repeats: u32,
        /// Extra options forwarded to every run.
        #[arg(long)]
        opts: Option<String>,
    },
}

fn main() -> ExitCode {
    queso_core::logging::init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Analyze { input, out, opts } => run_analyze(&input, &out, opts.as_deref()),
        Commands::Batch {
            sources,
            out_root,
            repeats,
            opts,
        } => run_batch(&sources, &out_root, repeats, opts.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[error] {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_analyze(input: &str, out: &PathBuf, opts: Option<&str>) -> anyhow::Result<ExitCode> {
    let merged = config::load_layered(opts).context("loading options")?;
    job::run_job(input, out, merged)?;
    Ok(ExitCode::SUCCESS)
}

fn run_batch(
    sources: &PathBuf,
    out_root: &PathBuf,
    repeats: u32,
    opts: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let mut runner = BatchRunner::new(sources, out_root, repeats);
    if let Some(raw) = opts {
        // Forwarded verbatim; each run layers its own config files.
        let extra = config::parse_payload(raw).context("parsing batch options")?;
        runner = runner.with_extra_opts(extra);
    }

    let outcome = runner.run()?;
    let failures = outcome.records.iter().filter(|r| r.returncode != 0).count();
    println!(
        "Summary written to {} ({} runs, {} failed)",
        outcome.summary_path.display(),
        outcome.records.len(),
        failures
    );
    Ok(ExitCode::SUCCESS)
}
