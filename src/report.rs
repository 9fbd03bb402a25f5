// 📄 Report Emitter - per-period audit report + exceptions file
// Consumes ranked, linked records; one CSV report and one JSON exceptions
// file per period so the auditor reviews issues instead of losing rows

use crate::links::{LinkResolver, Platform};
use crate::period::Period;
use crate::resolution::{tax_commission_filename, RankedRecord};
use crate::schema::Diagnostic;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Blank entry columns the tax team fills in by hand
const TAX_ENTRY_COLUMNS: [&str; 8] = [
    "UT + SJ combined sales tax",
    "Utah state sales tax",
    "San Juan county sales tax",
    "Other local Utah tax",
    "Other entity collecting tax",
    "Sum of UT tax excl charged by N.N.",
    "NNOGC entity tax paid amt",
    "Poley team notes",
];

// ============================================================================
// OUTPUT ARTIFACTS
// ============================================================================

/// Paths written for one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodReportFiles {
    pub report: PathBuf,
    pub exceptions: PathBuf,
}

/// Exceptions file payload: every row-scoped issue from the period
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExceptionsFile {
    period: Period,
    generated_at: chrono::DateTime<chrono::Utc>,
    diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// REPORT EMITTER
// ============================================================================

pub struct ReportEmitter {
    /// Platforms to generate link columns for
    pub platforms: Vec<Platform>,

    /// Link columns per platform/quarter (the originals carry up to four
    /// image pages per invoice)
    pub image_slots: usize,
}

impl ReportEmitter {
    pub fn new() -> Self {
        ReportEmitter {
            platforms: Platform::ALL.to_vec(),
            image_slots: 4,
        }
    }

    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    /// Write the period's report CSV and exceptions JSON into `output_dir`
    pub fn emit(
        &self,
        period: Period,
        records: &[RankedRecord],
        diagnostics: &[Diagnostic],
        resolver: &LinkResolver,
        output_dir: &Path,
    ) -> Result<PeriodReportFiles> {
        std::fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;

        let report_path = output_dir.join(format!("{} Sales Tax Report.csv", period.label()));
        let exceptions_path = output_dir.join(format!("{} exceptions.json", period.label()));

        self.write_report(period, records, resolver, &report_path)?;
        self.write_exceptions(period, diagnostics, &exceptions_path)?;

        Ok(PeriodReportFiles {
            report: report_path,
            exceptions: exceptions_path,
        })
    }

    fn write_report(
        &self,
        period: Period,
        records: &[RankedRecord],
        resolver: &LinkResolver,
        path: &Path,
    ) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("Failed to create report: {}", path.display()))?;

        let quarters = [period.quarter(), period.quarter().next()];

        // Header row
        let mut headers: Vec<String> = vec![
            "for sequence #".to_string(),
            "sequence #".to_string(),
            "vendor".to_string(),
            "invoice no".to_string(),
            "invoice date".to_string(),
            "gross amount".to_string(),
            "property".to_string(),
            "billing category".to_string(),
            "description".to_string(),
            "source row".to_string(),
            "rank".to_string(),
            "duplicate".to_string(),
            "resolved".to_string(),
        ];
        for platform in &self.platforms {
            for slot in 1..=self.image_slots {
                for quarter in &quarters {
                    headers.push(format!(
                        "{} link image {} {}",
                        platform.name(),
                        slot,
                        quarter
                    ));
                }
            }
        }
        headers.push("filename of image for the UT tax comm.".to_string());
        headers.extend(TAX_ENTRY_COLUMNS.iter().map(|c| c.to_string()));

        let headers: Vec<String> = headers.iter().map(|h| format_header(h)).collect();
        writer.write_record(&headers)?;

        // Data rows (already in report order)
        for r in records {
            let mut row: Vec<String> = vec![
                r.for_sequence_no.to_string(),
                r.sequence_label.clone(),
                r.record.vendor.clone(),
                r.record.invoice_no.clone(),
                r.record
                    .invoice_date
                    .map(|d| d.format("%m/%d/%Y").to_string())
                    .unwrap_or_default(),
                r.record
                    .gross_amount
                    .map(|a| format!("{:.2}", a))
                    .unwrap_or_default(),
                r.record.property.clone(),
                r.record.billing_category.clone(),
                r.record.description.clone(),
                r.record.source_row.to_string(),
                r.rank.to_string(),
                if r.duplicate { "DUPLICATE" } else { "" }.to_string(),
                if r.resolved { "" } else { "UNRESOLVED" }.to_string(),
            ];

            for platform in &self.platforms {
                for slot in 1..=self.image_slots {
                    for quarter in &quarters {
                        // Links go on the first row of each sequence group only
                        let cell = if r.first_of_group {
                            match r.locators.get(slot - 1) {
                                Some(fragment) => hyperlink_formula(
                                    &resolver.address(*platform, *quarter, fragment),
                                    fragment,
                                ),
                                None => "0".to_string(),
                            }
                        } else {
                            "0".to_string()
                        };
                        row.push(cell);
                    }
                }
            }

            row.push(if r.first_of_group {
                tax_commission_filename(period.year, period.month, &r.sequence_label)
            } else {
                "0".to_string()
            });
            row.extend(std::iter::repeat(String::new()).take(TAX_ENTRY_COLUMNS.len()));

            writer.write_record(&row)?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    fn write_exceptions(
        &self,
        period: Period,
        diagnostics: &[Diagnostic],
        path: &Path,
    ) -> Result<()> {
        let payload = ExceptionsFile {
            period,
            generated_at: chrono::Utc::now(),
            diagnostics: diagnostics.to_vec(),
        };

        let file = File::create(path)
            .with_context(|| format!("Failed to create exceptions file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, &payload)
            .with_context(|| format!("Failed to write exceptions file: {}", path.display()))?;
        Ok(())
    }
}

impl Default for ReportEmitter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// FORMATTING HELPERS
// ============================================================================

/// Spreadsheet hyperlink formula; the label is the bare image filename
pub fn hyperlink_formula(address: &str, label: &str) -> String {
    format!("=HYPERLINK(\"{}\", \"{}\")", address, label)
}

/// Title-case a column header, keeping "the", "for" and "by" lowercase
/// (except as the first word)
pub fn format_header(name: &str) -> String {
    let stopwords = ["the", "for", "by"];

    name.replace('_', " ")
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && stopwords.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkConfig;
    use crate::schema::TransactionRecord;
    use chrono::NaiveDate;

    fn ranked(vendor: &str, invoice: &str, seq: u32, first: bool, locators: &[&str]) -> RankedRecord {
        RankedRecord {
            record: TransactionRecord {
                vendor: vendor.to_string(),
                invoice_no: invoice.to_string(),
                invoice_date: NaiveDate::from_ymd_opt(2023, 4, 5),
                gross_amount: Some(2500.0),
                property: "Well 7".to_string(),
                billing_category: "LOE".to_string(),
                description: "casing repair".to_string(),
                source_file: "jib.csv".to_string(),
                source_row: 2,
            },
            rank: 1,
            duplicate: false,
            resolved: !locators.is_empty(),
            locators: locators.iter().map(|l| l.to_string()).collect(),
            for_sequence_no: seq,
            sequence_label: format!("{:03}", seq),
            first_of_group: first,
            group_size: 1,
        }
    }

    fn resolver() -> LinkResolver {
        LinkResolver::new(LinkConfig::new("C:/Dropbox/Images", r"F:\Images"))
    }

    #[test]
    fn test_format_header() {
        assert_eq!(format_header("for sequence #"), "For Sequence #");
        assert_eq!(
            format_header("filename of image for the UT tax comm."),
            "Filename Of Image for the UT Tax Comm."
        );
        assert_eq!(format_header("invoice_no"), "Invoice No");
    }

    #[test]
    fn test_hyperlink_formula() {
        assert_eq!(
            hyperlink_formula(r"F:\Images\img.pdf", "img.pdf"),
            "=HYPERLINK(\"F:\\Images\\img.pdf\", \"img.pdf\")"
        );
    }

    #[test]
    fn test_emit_writes_report_and_exceptions() {
        let dir = std::env::temp_dir().join("jib_audit_report_test");
        let _ = std::fs::remove_dir_all(&dir);

        let emitter = ReportEmitter::new();
        let records = vec![
            ranked("ACME", "123", 1, true, &["a.pdf", "b.pdf"]),
            ranked("ACME", "123", 1, false, &["a.pdf", "b.pdf"]),
        ];
        let diagnostics = vec![];

        let files = emitter
            .emit(Period::new(4, 2023), &records, &diagnostics, &resolver(), &dir)
            .unwrap();

        let report = std::fs::read_to_string(&files.report).unwrap();
        let mut lines = report.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("For Sequence #,Sequence #,Vendor"));

        let first_row = lines.next().unwrap();
        // Links and the tax commission filename only on the first group row
        assert!(first_row.contains("HYPERLINK"));
        assert!(first_row.contains("S202304-001.pdf"));
        let second_row = lines.next().unwrap();
        assert!(!second_row.contains("HYPERLINK"));
        assert!(!second_row.contains("S202304-001.pdf"));

        let exceptions = std::fs::read_to_string(&files.exceptions).unwrap();
        assert!(exceptions.contains("\"diagnostics\""));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_emit_surfaces_diagnostics() {
        let dir = std::env::temp_dir().join("jib_audit_exceptions_test");
        let _ = std::fs::remove_dir_all(&dir);

        let emitter = ReportEmitter::new();
        let records = vec![ranked("ACME", "123", 1, true, &[])];
        let diagnostics = vec![Diagnostic {
            source_file: "jib.csv".to_string(),
            row: 2,
            field: "vendor/invoice_no".to_string(),
            kind: crate::schema::DiagnosticKind::UnresolvedJoin,
            message: "no cross-reference entry".to_string(),
        }];

        let files = emitter
            .emit(Period::new(1, 2023), &records, &diagnostics, &resolver(), &dir)
            .unwrap();

        let exceptions = std::fs::read_to_string(&files.exceptions).unwrap();
        assert!(exceptions.contains("UnresolvedJoin"));
        assert!(exceptions.contains("jib.csv"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unresolved_record_row_still_written() {
        let dir = std::env::temp_dir().join("jib_audit_unresolved_test");
        let _ = std::fs::remove_dir_all(&dir);

        let emitter = ReportEmitter::new();
        let records = vec![ranked("ACME", "123", 1, true, &[])];

        let files = emitter
            .emit(Period::new(1, 2023), &records, &[], &resolver(), &dir)
            .unwrap();

        let report = std::fs::read_to_string(&files.report).unwrap();
        let data_row = report.lines().nth(1).unwrap();
        assert!(data_row.contains("ACME"));
        assert!(data_row.contains("UNRESOLVED"));
        assert!(!data_row.contains("HYPERLINK"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
