//! Print the summary of a saved model.
//!
//! glimix summary --model-file ...

use anyhow::Result;
use clap::Args;

use glimix_core::model::serialization::{load_model, model_summary};

#[derive(Args)]
pub struct SummaryArgs {
    /// Model file (.glimix.model)
    #[arg(long)]
    model_file: String,
}

pub fn run(args: SummaryArgs) -> Result<()> {
    let model = load_model(std::path::Path::new(&args.model_file))?;

    println!("Model: {}", args.model_file);
    println!("{}", model_summary(&model));
    if let Some(h2) = model.heritability() {
        println!("Heritability: {:.4}", h2);
    }
    Ok(())
}
