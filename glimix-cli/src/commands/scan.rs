//! Fit the null LMM and scan candidate markers.
//!
//! glimix scan --pheno-file ... --pheno-col ... --markers-file ... --output-prefix ...

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use glimix_core::lmm::LmmFitConfig;
use glimix_core::model::report::write_scan_results;
use glimix_core::Lmm;

use super::inputs::{load_inputs, output_path, InputArgs};

#[derive(Args)]
pub struct ScanArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Phenotype column name
    #[arg(long)]
    pheno_col: String,

    /// Candidate marker file: one row per sample, one column per marker
    #[arg(long)]
    markers_file: String,

    /// Fit the null model by restricted maximum likelihood
    #[arg(long, default_value = "false")]
    restricted: bool,
}

pub fn run(args: ScanArgs) -> Result<()> {
    info!("=== glimix: Association scan ===");
    info!("Marker file: {}", args.markers_file);

    let data = load_inputs(
        &args.inputs,
        &[args.pheno_col.clone()],
        Some(args.markers_file.as_str()),
    )?;
    let markers = data.extra.context("Marker input went missing during alignment")?;
    let y = data.traits.data.col(0);
    let qs = data.relatedness.economic_qs()?;

    let mut lmm = Lmm::new(&y, &data.x, qs.as_ref(), args.restricted)?;
    let fit = lmm.fit(&LmmFitConfig::default())?;
    info!("Null model: delta={:.6}, lml={:.6}", fit.delta, fit.lml);

    let scanner = lmm.get_fast_scanner()?;
    info!("Scanning {} markers...", markers.ncols());
    let results = scanner.fast_scan(&markers.data)?;

    let out_path = output_path(&args.inputs.output_prefix, "scan.tsv");
    write_scan_results(&out_path, &markers.col_names, &results)?;
    info!("Results written to {}", out_path.display());

    let n_sig = results.iter().filter(|r| r.pvalue < 5e-8).count();
    println!(
        "Scanned {} markers on {} samples; {} with p < 5e-8",
        results.len(),
        data.sample_ids.len(),
        n_sig
    );
    Ok(())
}
