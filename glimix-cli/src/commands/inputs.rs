//! Input loading shared by the fitting commands.
//!
//! Reads the phenotype, covariate and relatedness files, keeps the
//! samples usable in all of them, and builds the design matrix. Missing
//! candidate marker calls are mean-imputed per marker.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use glimix_core::model::{serialization, FittedModel};
use glimix_io::{align_inputs, read_matrix_file, LabeledMatrix};
use glimix_linalg::{DenseMatrix, EconomicQs};

#[derive(Args)]
pub struct InputArgs {
    /// Phenotype file path
    #[arg(long)]
    pub pheno_file: String,

    /// Covariate file path (defaults to the phenotype file)
    #[arg(long)]
    pub covar_file: Option<String>,

    /// Covariate column names (comma-separated); an intercept is always added
    #[arg(long, default_value = "")]
    pub covar_cols: String,

    /// Sample ID column name
    #[arg(long, default_value = "IID")]
    pub sample_id_col: String,

    /// Kinship matrix file: one row per sample, one column per sample ID
    #[arg(long, conflicts_with = "g_file")]
    pub kinship_file: Option<String>,

    /// Genetic factor file G with K = GG': one row per sample
    #[arg(long)]
    pub g_file: Option<String>,

    /// Output file prefix
    #[arg(long)]
    pub output_prefix: String,

    /// Also save JSON sidecar for debugging
    #[arg(long, default_value = "false")]
    pub save_json: bool,
}

/// Relatedness input, restricted to the aligned samples.
pub enum Relatedness {
    None,
    Kinship(DenseMatrix),
    Factor(DenseMatrix),
}

impl Relatedness {
    pub fn economic_qs(&self) -> Result<Option<EconomicQs>> {
        let qs = match self {
            Relatedness::None => return Ok(None),
            Relatedness::Kinship(k) => EconomicQs::from_kinship(k)?,
            Relatedness::Factor(g) => EconomicQs::from_linear(g)?,
        };
        info!("Kinship rank: {} of {} samples", qs.rank(), qs.nsamples());
        Ok(Some(qs))
    }

    /// A factor G with GG' equal to the kinship.
    pub fn factor(&self) -> Result<DenseMatrix> {
        match self {
            Relatedness::None => bail!("A kinship or G file is required"),
            Relatedness::Factor(g) => Ok(g.clone()),
            Relatedness::Kinship(k) => {
                let qs = EconomicQs::from_kinship(k)?;
                Ok(DenseMatrix::from_fn(qs.nsamples(), qs.rank(), |i, j| {
                    qs.q0.get(i, j) * qs.s0[j].sqrt()
                }))
            }
        }
    }
}

/// Samples, traits and design shared by every model.
pub struct ModelInputs {
    pub sample_ids: Vec<String>,
    pub traits: LabeledMatrix,
    /// Intercept followed by the covariates.
    pub x: DenseMatrix,
    pub covariate_names: Vec<String>,
    pub relatedness: Relatedness,
    /// Candidate markers aligned with the same samples, missing calls imputed.
    pub extra: Option<LabeledMatrix>,
}

pub fn split_columns(cols: &str) -> Vec<String> {
    cols.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn load_inputs(
    args: &InputArgs,
    trait_cols: &[String],
    extra_file: Option<&str>,
) -> Result<ModelInputs> {
    if trait_cols.is_empty() {
        bail!("At least one phenotype column is required");
    }
    let id_col = args.sample_id_col.as_str();

    let pheno = read_matrix_file(Path::new(&args.pheno_file), Some(trait_cols), id_col)?;
    info!("Loaded {} traits for {} samples", pheno.ncols(), pheno.nrows());

    let covar_cols = split_columns(&args.covar_cols);
    let covar_path = args.covar_file.as_deref().unwrap_or(&args.pheno_file);
    let covars = read_matrix_file(Path::new(covar_path), Some(covar_cols.as_slice()), id_col)?;

    let kinship = args
        .kinship_file
        .as_deref()
        .map(|p| read_matrix_file(Path::new(p), None, id_col))
        .transpose()?;
    let g = args
        .g_file
        .as_deref()
        .map(|p| read_matrix_file(Path::new(p), None, id_col))
        .transpose()?;
    let extra = extra_file
        .map(|p| read_matrix_file(Path::new(p), None, id_col))
        .transpose()?;

    let mut complete = vec![&pheno, &covars];
    complete.extend(g.iter());
    let aligned = align_inputs(&complete, kinship.as_ref(), extra.as_ref())?;
    let sample_ids = aligned.ids;
    let mut selected = aligned.complete.into_iter();
    let (Some(traits), Some(covars)) = (selected.next(), selected.next()) else {
        bail!("Phenotype and covariate inputs went missing during alignment");
    };

    let relatedness = if let Some(k) = aligned.kinship {
        Relatedness::Kinship(k.data)
    } else if g.is_some() {
        let g = selected.next().context("G input went missing during alignment")?;
        Relatedness::Factor(g.data)
    } else {
        Relatedness::None
    };

    let extra = aligned.markers.map(|mut m| {
        let imputed = m.impute_column_means();
        if imputed > 0 {
            info!("Mean-imputed {} missing marker calls", imputed);
        }
        m
    });

    let n = sample_ids.len();
    let mut columns = vec![vec![1.0; n]];
    columns.extend((0..covars.ncols()).map(|j| covars.data.col(j)));
    let x = DenseMatrix::from_columns(n, &columns);
    let mut covariate_names = vec!["intercept".to_string()];
    covariate_names.extend(covar_cols);

    Ok(ModelInputs {
        sample_ids,
        traits,
        x,
        covariate_names,
        relatedness,
        extra,
    })
}

pub fn output_path(prefix: &str, extension: &str) -> PathBuf {
    Path::new(prefix).with_extension(extension)
}

/// Save a fitted model (and optional JSON sidecar), then print its summary.
pub fn save_and_report(model: &FittedModel, args: &InputArgs) -> Result<()> {
    let model_path = output_path(&args.output_prefix, "glimix.model");
    serialization::save_model(model, &model_path)?;
    info!("Model saved to {}", model_path.display());

    if args.save_json {
        let json_path = output_path(&args.output_prefix, "glimix.model.json");
        serialization::save_model_json(model, &json_path)?;
        info!("JSON sidecar saved to {}", json_path.display());
    }

    println!("{}", serialization::model_summary(model));
    Ok(())
}
