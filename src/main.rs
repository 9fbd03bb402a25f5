use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;

use jib_audit::{
    periods_for, DuplicateComparison, LinkConfig, Pipeline, PipelineConfig, ReportFilter,
};

fn main() -> Result<()> {
    println!("📊 JIB Audit - Sales Tax Report Generator v{}", jib_audit::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Gather run parameters
    let month_spec = prompt("Month(s) (e.g. '1-3' or '1,2,6')")?;
    let year: i32 = prompt("Year (e.g. 2023)")?
        .parse()
        .context("year must be a number")?;

    let periods = periods_for(&month_spec, year);
    if periods.is_empty() {
        bail!("no valid months in '{}'", month_spec);
    }

    let jib_path = PathBuf::from(clean_path(&prompt("JIB export path")?));
    let xref_path = PathBuf::from(clean_path(&prompt("Invoice cross-reference path")?));
    let output_dir = PathBuf::from(clean_path(&prompt("Output folder")?));

    let dropbox_base = prompt_with_default(
        "Dropbox image library root",
        "C:/Users/brend/Dropbox/Images MP-BC-AP R4Q2",
    )?;
    let local_base = prompt_with_default("Local drive image library root", r"F:\Images MP-BC-AP R4Q2")?;

    let config = PipelineConfig {
        jib_path,
        cross_reference_path: xref_path,
        output_dir: output_dir.clone(),
        periods,
        links: LinkConfig::new(&dropbox_base, &local_base),
        comparison: DuplicateComparison::SortKeyOnly,
        filter: Some(ReportFilter::standard()),
    };

    // 2. Run the pipeline
    println!("\n📂 Loading source data...");
    let summaries = Pipeline::new(config).run()?;

    // 3. Per-period results
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let mut failed = 0;
    for summary in &summaries {
        match &summary.error {
            Some(error) => {
                failed += 1;
                println!("✗ {}: FAILED - {}", summary.period, error);
            }
            None => {
                println!(
                    "✓ {}: {} rows ({} duplicates, {} unresolved, {} filtered out, {} exceptions)",
                    summary.period,
                    summary.row_count,
                    summary.duplicate_count,
                    summary.unresolved_count,
                    summary.filtered_out,
                    summary.diagnostic_count
                );
                if let Some(files) = &summary.files {
                    println!("   → {}", files.report.display());
                }
            }
        }
    }

    println!("\nDone. Reports are in: {}", output_dir.display());
    if failed > 0 {
        println!("⚠  {} period(s) failed; see messages above.", failed);
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_with_default(label: &str, default: &str) -> Result<String> {
    let value = prompt(&format!("{} [{}]", label, default))?;
    Ok(if value.is_empty() {
        default.to_string()
    } else {
        value
    })
}

/// Strip quotes and stray whitespace from a pasted path
fn clean_path(path: &str) -> String {
    path.trim().replace(['"', '\''], "")
}
