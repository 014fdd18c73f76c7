//! Fit a single-trait linear mixed model.
//!
//! glimix fit-lmm --pheno-file ... --pheno-col ... [--kinship-file | --g-file] --output-prefix ...

use anyhow::Result;
use clap::Args;
use tracing::info;

use glimix_core::lmm::LmmFitConfig;
use glimix_core::model::FittedModel;
use glimix_core::Lmm;

use super::inputs::{load_inputs, save_and_report, InputArgs};

#[derive(Args)]
pub struct FitLmmArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Phenotype column name
    #[arg(long)]
    pheno_col: String,

    /// Use restricted maximum likelihood
    #[arg(long, default_value = "false")]
    restricted: bool,
}

pub fn run(args: FitLmmArgs) -> Result<()> {
    info!("=== glimix: Fit LMM ===");
    info!("Phenotype file: {}", args.inputs.pheno_file);
    info!("Phenotype column: {}", args.pheno_col);

    let data = load_inputs(&args.inputs, &[args.pheno_col.clone()], None)?;
    let y = data.traits.data.col(0);
    let qs = data.relatedness.economic_qs()?;

    let mut lmm = Lmm::new(&y, &data.x, qs.as_ref(), args.restricted)?;
    let fit = lmm.fit(&LmmFitConfig::default())?;
    info!(
        "LMM result: delta={:.6}, scale={:.6}, lml={:.6}, converged={}",
        fit.delta,
        lmm.scale(),
        fit.lml,
        fit.converged
    );

    let model = FittedModel::from_lmm(
        &lmm,
        &fit,
        data.sample_ids,
        args.pheno_col,
        data.covariate_names,
    )?;
    save_and_report(&model, &args.inputs)
}
