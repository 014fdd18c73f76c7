//! Tab-separated output of association scans.

use anyhow::{bail, Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::lmm::CandidateResult;

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{}", v)
    }
}

/// Write the scan results header.
pub fn write_scan_header(writer: &mut impl Write) -> Result<()> {
    writeln!(writer, "MARKER\tLML\tBETA\tSE\tSCALE\tPVALUE")?;
    Ok(())
}

/// Write a single scan result line.
pub fn write_scan_line(writer: &mut impl Write, marker: &str, result: &CandidateResult) -> Result<()> {
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}",
        marker,
        format_value(result.lml),
        format_value(result.effsize1),
        format_value(result.effsize1_se),
        format_value(result.scale),
        format_value(result.pvalue),
    )?;
    Ok(())
}

/// Write every candidate result to `path`.
pub fn write_scan_results(path: &Path, markers: &[String], results: &[CandidateResult]) -> Result<()> {
    if markers.len() != results.len() {
        bail!(
            "{} marker names for {} scan results",
            markers.len(),
            results.len()
        );
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_scan_header(&mut writer)?;
    for (marker, result) in markers.iter().zip(results.iter()) {
        write_scan_line(&mut writer, marker, result)?;
    }
    writer.flush()?;
    Ok(())
}
