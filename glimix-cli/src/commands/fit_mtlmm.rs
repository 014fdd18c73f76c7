//! Fit several traits that share their variance components.
//!
//! glimix fit-mtlmm --pheno-file ... --pheno-cols y1,y2 --output-prefix ...

use anyhow::Result;
use clap::Args;
use tracing::info;

use glimix_core::lmm::LmmFitConfig;
use glimix_core::model::FittedModel;
use glimix_core::MtLmm;

use super::inputs::{load_inputs, save_and_report, split_columns, InputArgs};

#[derive(Args)]
pub struct FitMtLmmArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Phenotype column names (comma-separated)
    #[arg(long)]
    pheno_cols: String,

    /// Use restricted maximum likelihood
    #[arg(long, default_value = "false")]
    restricted: bool,
}

pub fn run(args: FitMtLmmArgs) -> Result<()> {
    info!("=== glimix: Fit multi-trait LMM ===");

    let trait_names = split_columns(&args.pheno_cols);
    let data = load_inputs(&args.inputs, &trait_names, None)?;
    let ys: Vec<Vec<f64>> = (0..data.traits.ncols())
        .map(|t| data.traits.data.col(t))
        .collect();
    let qs = data.relatedness.economic_qs()?;

    let mut model = MtLmm::new(&ys, &[data.x.clone()], qs.as_ref(), args.restricted)?;
    let fit = model.fit(&LmmFitConfig::default())?;
    info!(
        "MtLmm result: delta={:.6}, scale={:.6}, lml={:.6}",
        fit.delta,
        model.scale(),
        fit.lml
    );

    // effect sizes are stacked trait by trait
    let covariate_names: Vec<String> = trait_names
        .iter()
        .flat_map(|t| data.covariate_names.iter().map(move |c| format!("{}:{}", t, c)))
        .collect();
    let fitted = FittedModel::from_mtlmm(&model, &fit, data.sample_ids, trait_names, covariate_names)?;
    save_and_report(&fitted, &args.inputs)
}
