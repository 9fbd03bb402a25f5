// ⚙️ Batch Orchestrator - one pipeline run per requested period
// Inputs are loaded once; the cross-reference index is read-only after
// build, so periods are independent of each other

use crate::links::{LinkConfig, LinkResolver};
use crate::loader::SmartLoader;
use crate::period::Period;
use crate::report::{PeriodReportFiles, ReportEmitter};
use crate::resolution::{
    CrossReferenceIndex, DuplicateComparison, RankedRecord, ResolutionEngine,
};
use crate::schema::{Diagnostic, SchemaNormalizer, TransactionRecord};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

// ============================================================================
// REPORT FILTER (reporting policy, not core resolution)
// ============================================================================

/// Drops low-value and known-exempt invoices from the emitted report.
///
/// This reproduces the operator procedure's thresholds. It runs between
/// resolution and emission; with no filter configured every input row
/// reaches the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFilter {
    /// Keep only invoices whose total magnitude reaches this (default $2,000)
    pub min_invoice_total: f64,

    /// Invoice-number prefixes to drop (journal/period-end entries)
    pub excluded_prefixes: Vec<String>,

    /// Vendors dropped when their invoice total magnitude stays under
    /// `excluded_vendor_max_total`
    pub excluded_vendors: Vec<String>,
    pub excluded_vendor_max_total: f64,
}

impl ReportFilter {
    /// The thresholds from the audit procedure
    pub fn standard() -> Self {
        ReportFilter {
            min_invoice_total: 2000.0,
            excluded_prefixes: vec!["GJ".to_string(), "PE".to_string()],
            excluded_vendors: vec![
                "J R CONSTRUCTION".to_string(),
                "MONTEZUMA WELL SERVICE".to_string(),
                "MARYBOY".to_string(),
                "NELSON'S WELDING & ROUSTABOUT".to_string(),
                "3G CONSULTING".to_string(),
            ],
            excluded_vendor_max_total: 3500.0,
        }
    }

    /// Retain the records passing the filter; returns how many were dropped.
    ///
    /// Invoice totals sum one copy of each distinct charge line, so repeated
    /// rows do not inflate the total while same-date charges with different
    /// amounts still all count.
    pub fn apply(&self, records: &mut Vec<RankedRecord>) -> usize {
        use std::collections::HashMap;

        let mut totals: HashMap<(String, String), f64> = HashMap::new();
        let mut seen: HashSet<(String, String, String, String, Option<u64>)> = HashSet::new();
        for r in records.iter() {
            let key = (
                r.record.vendor.trim().to_uppercase(),
                r.record.invoice_no.trim().to_uppercase(),
            );
            let line = (
                key.0.clone(),
                key.1.clone(),
                r.record.property.trim().to_uppercase(),
                r.record.billing_category.trim().to_uppercase(),
                r.record.gross_amount.map(f64::to_bits),
            );
            if seen.insert(line) {
                *totals.entry(key).or_insert(0.0) += r.record.gross_amount.unwrap_or(0.0);
            }
        }

        let before = records.len();
        records.retain(|r| {
            let key = (
                r.record.vendor.trim().to_uppercase(),
                r.record.invoice_no.trim().to_uppercase(),
            );
            let total = totals.get(&key).copied().unwrap_or(0.0);

            if total.abs() < self.min_invoice_total {
                return false;
            }

            let invoice_upper = r.record.invoice_no.trim().to_uppercase();
            if self
                .excluded_prefixes
                .iter()
                .any(|p| invoice_upper.starts_with(p.as_str()))
            {
                return false;
            }

            let vendor_upper = r.record.vendor.trim().to_uppercase();
            let vendor_excluded = self
                .excluded_vendors
                .iter()
                .any(|v| vendor_upper.contains(v.as_str()));
            if vendor_excluded && total.abs() < self.excluded_vendor_max_total {
                return false;
            }

            true
        });
        before - records.len()
    }
}

// ============================================================================
// PIPELINE CONFIG & SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// JIB transaction export
    pub jib_path: PathBuf,

    /// Invoice cross-reference export
    pub cross_reference_path: PathBuf,

    /// Where the per-period reports land
    pub output_dir: PathBuf,

    /// Periods to report on
    pub periods: Vec<Period>,

    /// Image library roots
    pub links: LinkConfig,

    /// Duplicate-flag comparison policy
    pub comparison: DuplicateComparison,

    /// Optional reporting thresholds; None emits every row
    pub filter: Option<ReportFilter>,
}

/// What happened for one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period: Period,
    pub row_count: usize,
    pub duplicate_count: usize,
    pub unresolved_count: usize,
    pub filtered_out: usize,
    pub diagnostic_count: usize,
    pub files: Option<PeriodReportFiles>,

    /// Set when the period failed; other periods still proceed
    pub error: Option<String>,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
    loader: SmartLoader,
    normalizer: SchemaNormalizer,
    engine: ResolutionEngine,
    emitter: ReportEmitter,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let engine = ResolutionEngine::with_comparison(config.comparison);
        Pipeline {
            config,
            loader: SmartLoader::new(),
            normalizer: SchemaNormalizer::new(),
            engine,
            emitter: ReportEmitter::new(),
        }
    }

    /// Run every requested period. Input loading is shared and fatal when
    /// structurally broken (the operator must fix the file); per-period
    /// failures are captured in the summary and do not stop the batch.
    pub fn run(&self) -> Result<Vec<PeriodSummary>> {
        let jib_table = self
            .loader
            .load_file(&self.config.jib_path)
            .with_context(|| format!("loading {}", self.config.jib_path.display()))?;
        let (records, record_diagnostics) = self.normalizer.normalize_transactions(&jib_table)?;

        let xref_table = self
            .loader
            .load_file(&self.config.cross_reference_path)
            .with_context(|| format!("loading {}", self.config.cross_reference_path.display()))?;
        let (entries, xref_diagnostics) = self.normalizer.normalize_cross_reference(&xref_table)?;
        let index = CrossReferenceIndex::build(entries);

        let resolver = LinkResolver::new(self.config.links.clone());

        let mut summaries = Vec::with_capacity(self.config.periods.len());
        for &period in &self.config.periods {
            let summary = match self.run_period(
                period,
                &records,
                &record_diagnostics,
                &xref_diagnostics,
                &index,
                &resolver,
            ) {
                Ok(summary) => summary,
                Err(e) => PeriodSummary {
                    period,
                    row_count: 0,
                    duplicate_count: 0,
                    unresolved_count: 0,
                    filtered_out: 0,
                    diagnostic_count: 0,
                    files: None,
                    error: Some(format!("{:#}", e)),
                },
            };
            summaries.push(summary);
        }

        Ok(summaries)
    }

    fn run_period(
        &self,
        period: Period,
        records: &[TransactionRecord],
        record_diagnostics: &[Diagnostic],
        xref_diagnostics: &[Diagnostic],
        index: &CrossReferenceIndex,
        resolver: &LinkResolver,
    ) -> Result<PeriodSummary> {
        // Period selection by invoice date. Dateless rows belong to no
        // period; their coercion diagnostics are surfaced in every period
        // so they are never invisible.
        let selected: Vec<TransactionRecord> = records
            .iter()
            .filter(|r| r.invoice_date.map(|d| period.contains(d)).unwrap_or(false))
            .cloned()
            .collect();

        let selected_rows: HashSet<usize> = selected.iter().map(|r| r.source_row).collect();
        let dateless_rows: HashSet<usize> = records
            .iter()
            .filter(|r| r.invoice_date.is_none())
            .map(|r| r.source_row)
            .collect();

        let (mut ranked, mut diagnostics) = self.engine.resolve(&selected, index);

        let filtered_out = match &self.config.filter {
            Some(filter) => {
                let dropped = filter.apply(&mut ranked);
                if dropped > 0 {
                    // Sequence numbers must stay contiguous after filtering
                    self.engine.sequence(&mut ranked);
                }
                dropped
            }
            None => 0,
        };

        diagnostics.extend(
            record_diagnostics
                .iter()
                .filter(|d| selected_rows.contains(&d.row) || dateless_rows.contains(&d.row))
                .cloned(),
        );
        diagnostics.extend(xref_diagnostics.iter().cloned());

        let files = self.emitter.emit(
            period,
            &ranked,
            &diagnostics,
            resolver,
            &self.config.output_dir,
        )?;

        Ok(PeriodSummary {
            period,
            row_count: ranked.len(),
            duplicate_count: ranked.iter().filter(|r| r.duplicate).count(),
            unresolved_count: ranked.iter().filter(|r| !r.resolved).count(),
            filtered_out,
            diagnostic_count: diagnostics.len(),
            files: Some(files),
            error: None,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
