//! glimix: fit linear mixed models from the command line.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "glimix",
    version,
    about = "glimix-rs: single- and multi-trait linear mixed models",
    long_about = "Fits linear mixed models by maximum or restricted maximum likelihood.\n\
                   Supports single-trait models, fast association scans, pooled multi-trait\n\
                   models and Kronecker-structured multi-trait covariances."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a single-trait linear mixed model
    FitLmm(commands::fit_lmm::FitLmmArgs),

    /// Fit the null model and scan candidate markers
    Scan(commands::scan::ScanArgs),

    /// Fit several traits sharing their variance components
    FitMtlmm(commands::fit_mtlmm::FitMtLmmArgs),

    /// Fit a multi-trait model with covariance C0 ⊗ GG' + C1 ⊗ I
    FitKron2sum(commands::fit_kron2sum::FitKron2SumArgs),

    /// Print the summary of a saved model
    Summary(commands::summary::SummaryArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("glimix v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::FitLmm(args) => commands::fit_lmm::run(args),
        Commands::Scan(args) => commands::scan::run(args),
        Commands::FitMtlmm(args) => commands::fit_mtlmm::run(args),
        Commands::FitKron2sum(args) => commands::fit_kron2sum::run(args),
        Commands::Summary(args) => commands::summary::run(args),
    }
}
