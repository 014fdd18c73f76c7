//! Model serialization and deserialization.
//!
//! Uses bincode for fast, compact binary serialization.
//! Format: magic bytes (GLMX) + version (u32) + bincode payload.
//! Optional JSON sidecar for human inspection.

use anyhow::{bail, Context, Result};
use glimix_linalg::DenseMatrix;
use std::path::Path;

use super::fitted::{FittedModel, ModelKind};

/// Save a fitted model to a binary file (.glimix.model).
pub fn save_model(model: &FittedModel, path: &Path) -> Result<()> {
    let encoded = bincode::serialize(model)?;
    std::fs::write(path, &encoded)
        .with_context(|| format!("Failed to write model file: {}", path.display()))?;
    Ok(())
}

/// Load a fitted model from a binary file (.glimix.model).
pub fn load_model(path: &Path) -> Result<FittedModel> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read model file: {}", path.display()))?;
    if data.len() < 4 || data[..4] != FittedModel::MAGIC {
        bail!(
            "Invalid model file: expected magic bytes {:?}, got {:?}",
            FittedModel::MAGIC,
            &data[..data.len().min(4)]
        );
    }
    let model: FittedModel = bincode::deserialize(&data)?;
    if model.version > FittedModel::VERSION {
        bail!(
            "Model file version {} is newer than supported version {}",
            model.version,
            FittedModel::VERSION
        );
    }
    Ok(model)
}

/// Save a JSON sidecar for debugging (.glimix.model.json).
pub fn save_model_json(model: &FittedModel, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn format_matrix(m: &DenseMatrix) -> String {
    (0..m.nrows())
        .map(|i| {
            let row: Vec<String> = m.row(i).iter().map(|v| format!("{:.6}", v)).collect();
            format!("  [{}]", row.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summary of a fitted model (for display).
pub fn model_summary(model: &FittedModel) -> String {
    let mut out = format!(
        "glimix {:?} model v{}\n\
         Likelihood: {}\n\
         Samples: {}\n\
         Traits: {}\n\
         Covariates: {}\n\
         LML: {:.6}\n\
         Converged: {} ({} iterations)",
        model.kind,
        model.version,
        if model.restricted { "restricted" } else { "maximum" },
        model.nsamples(),
        model.trait_names.join(", "),
        model.covariate_names.join(", "),
        model.lml,
        if model.converged { "yes" } else { "no" },
        model.iterations,
    );

    match model.kind {
        ModelKind::Lmm | ModelKind::MtLmm => {
            if let (Some(delta), Some(scale)) = (model.delta, model.scale) {
                out.push_str(&format!(
                    "\nDelta: {:.6}\nScale: {:.6}\nv0 (genetic): {:.6}\nv1 (residual): {:.6}",
                    delta,
                    scale,
                    scale * (1.0 - delta),
                    scale * delta
                ));
            }
        }
        ModelKind::Kron2Sum | ModelKind::RKron2Sum => {
            if let Some(c0) = model.c0_matrix() {
                out.push_str(&format!("\nC0 (genetic):\n{}", format_matrix(&c0)));
            }
            if let Some(c1) = model.c1_matrix() {
                out.push_str(&format!("\nC1 (residual):\n{}", format_matrix(&c1)));
            }
        }
    }

    out.push_str("\nEffect sizes:");
    for (k, (b, se)) in model.beta.iter().zip(model.beta_se.iter()).enumerate() {
        out.push_str(&format!("\n  beta[{}] = {:.6} (se {:.6})", k, b, se));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_model() -> FittedModel {
        FittedModel {
            magic: FittedModel::MAGIC,
            version: FittedModel::VERSION,
            kind: ModelKind::Kron2Sum,
            restricted: false,
            sample_ids: vec!["S1".into(), "S2".into(), "S3".into()],
            trait_names: vec!["height".into(), "weight".into()],
            covariate_names: vec!["intercept".into()],
            lml: -12.5,
            beta: vec![0.3, -0.1],
            beta_se: vec![0.05, 0.07],
            delta: None,
            scale: None,
            c0: Some(vec![1.0, 0.2, 0.2, 0.8]),
            c1: Some(vec![0.5, 0.0, 0.0, 0.4]),
            converged: true,
            iterations: 17,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let model = example_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.glimix.model");

        save_model(&model, &path).unwrap();
        let loaded = load_model(&path).unwrap();

        assert_eq!(loaded.kind, ModelKind::Kron2Sum);
        assert_eq!(loaded.sample_ids, vec!["S1", "S2", "S3"]);
        assert_eq!(loaded.c0, model.c0);
        assert_eq!(loaded.iterations, 17);
        assert!((loaded.lml + 12.5).abs() < 1e-12);
        let c0 = loaded.c0_matrix().unwrap();
        assert_eq!(c0.get(1, 0), 0.2);
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.model");
        std::fs::write(&path, b"NOPE and more bytes").unwrap();
        assert!(load_model(&path).is_err());
    }

    #[test]
    fn test_json_sidecar() {
        let model = example_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.glimix.model.json");
        save_model_json(&model, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["kind"], "Kron2Sum");
        assert_eq!(value["iterations"], 17);
    }

    #[test]
    fn test_summary() {
        let summary = model_summary(&example_model());
        assert!(summary.contains("Kron2Sum"));
        assert!(summary.contains("height, weight"));
        assert!(summary.contains("C0 (genetic)"));
        assert!(summary.contains("beta[1] = -0.100000"));
    }
}
