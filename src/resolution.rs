// 🔍 Resolution Engine - join, partition, rank, flag duplicates
// PARTITION BY + DENSE_RANK + LAG semantics as explicit algorithms:
// grouping map, stable sort, sequential scan. No query engine.

use crate::schema::{CrossReferenceEntry, Diagnostic, DiagnosticKind, TransactionRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// JOIN KEY
// ============================================================================

/// The partition key: identifies "the same conceptual invoice", not the
/// same row. Normalized for case-insensitive matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinKey {
    pub vendor: String,
    pub invoice_no: String,
}

impl JoinKey {
    pub fn new(vendor: &str, invoice_no: &str) -> Self {
        JoinKey {
            vendor: vendor.trim().to_uppercase(),
            invoice_no: invoice_no.trim().to_uppercase(),
        }
    }

    /// Key for a transaction record; None when either field is blank
    pub fn of(record: &TransactionRecord) -> Option<JoinKey> {
        if record.has_join_key() {
            Some(JoinKey::new(&record.vendor, &record.invoice_no))
        } else {
            None
        }
    }
}

// ============================================================================
// CROSS-REFERENCE INDEX
// ============================================================================

/// Read-only lookup over the cross-reference, built once per run.
///
/// Entries carrying a vendor are keyed by (vendor, invoice no). Entries
/// without one (exports that key on invoice number alone) match any vendor
/// with the same invoice number. Load order is preserved per key, and
/// vendor-exact matches come before invoice-only matches.
pub struct CrossReferenceIndex {
    entries: Vec<CrossReferenceEntry>,
    exact: HashMap<JoinKey, Vec<usize>>,
    by_invoice_only: HashMap<String, Vec<usize>>,
}

impl CrossReferenceIndex {
    pub fn build(entries: Vec<CrossReferenceEntry>) -> Self {
        let mut exact: HashMap<JoinKey, Vec<usize>> = HashMap::new();
        let mut by_invoice_only: HashMap<String, Vec<usize>> = HashMap::new();

        for (i, entry) in entries.iter().enumerate() {
            if entry.vendor.trim().is_empty() {
                by_invoice_only
                    .entry(entry.invoice_no.trim().to_uppercase())
                    .or_default()
                    .push(i);
            } else {
                exact
                    .entry(JoinKey::new(&entry.vendor, &entry.invoice_no))
                    .or_default()
                    .push(i);
            }
        }

        CrossReferenceIndex {
            entries,
            exact,
            by_invoice_only,
        }
    }

    /// All entries matching a key, stored order. Lookups return a set,
    /// never a single value: multi-page invoices have several entries.
    pub fn lookup(&self, key: &JoinKey) -> Vec<&CrossReferenceEntry> {
        let mut found = Vec::new();
        if let Some(indices) = self.exact.get(key) {
            found.extend(indices.iter().map(|&i| &self.entries[i]));
        }
        if let Some(indices) = self.by_invoice_only.get(&key.invoice_no) {
            found.extend(indices.iter().map(|&i| &self.entries[i]));
        }
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// RANKED RECORD
// ============================================================================

/// Terminal artifact of resolution: the record plus its window annotations.
/// Nothing downstream mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedRecord {
    pub record: TransactionRecord,

    /// Dense 1-based rank within the (vendor, invoice) partition:
    /// equal sort-key values share a rank, no gaps
    pub rank: u32,

    /// True when the immediately preceding row in the partition has an
    /// identical comparison value; a partition's first row is never flagged
    pub duplicate: bool,

    /// False when the join found no cross-reference entry (record retained)
    pub resolved: bool,

    /// Locator fragments from all matched entries, stored order
    pub locators: Vec<String>,

    /// Period-wide sequence number: dense rank over (vendor, invoice)
    /// in report order
    pub for_sequence_no: u32,

    /// Zero-padded sequence label, e.g. "007"
    pub sequence_label: String,

    /// First row of its sequence group in report order (links and the tax
    /// commission filename are emitted on this row only)
    pub first_of_group: bool,

    /// Number of rows sharing this record's partition
    pub group_size: usize,
}

// ============================================================================
// DUPLICATE COMPARISON POLICY
// ============================================================================

/// Which fields the lag comparison inspects when flagging duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateComparison {
    /// Sort key (invoice date) only
    SortKeyOnly,

    /// Sort key and gross amount must both match
    SortKeyAndAmount,
}

// ============================================================================
// RESOLUTION ENGINE
// ============================================================================

pub struct ResolutionEngine {
    pub comparison: DuplicateComparison,
}

impl ResolutionEngine {
    pub fn new() -> Self {
        ResolutionEngine {
            comparison: DuplicateComparison::SortKeyOnly,
        }
    }

    pub fn with_comparison(comparison: DuplicateComparison) -> Self {
        ResolutionEngine { comparison }
    }

    /// Resolve one period's records against the cross-reference.
    ///
    /// Every input record appears exactly once in the output, resolved or
    /// not. Output is in report order: vendor, invoice, date, then original
    /// input order - deterministic across reruns.
    pub fn resolve(
        &self,
        records: &[TransactionRecord],
        index: &CrossReferenceIndex,
    ) -> (Vec<RankedRecord>, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();

        // Step 1: join. Malformed keys never join but are still carried.
        let mut ranked: Vec<RankedRecord> = records
            .iter()
            .map(|record| {
                let (resolved, locators) = match JoinKey::of(record) {
                    Some(key) => {
                        let matches = index.lookup(&key);
                        let locators: Vec<String> = matches
                            .iter()
                            .flat_map(|e| e.locators.iter().cloned())
                            .collect();
                        if matches.is_empty() {
                            diagnostics.push(Diagnostic {
                                source_file: record.source_file.clone(),
                                row: record.source_row,
                                field: "vendor/invoice_no".to_string(),
                                kind: DiagnosticKind::UnresolvedJoin,
                                message: format!(
                                    "no cross-reference entry for vendor '{}' invoice '{}'",
                                    record.vendor, record.invoice_no
                                ),
                            });
                            (false, locators)
                        } else {
                            (true, locators)
                        }
                    }
                    None => (false, Vec::new()),
                };

                RankedRecord {
                    record: record.clone(),
                    rank: 1,
                    duplicate: false,
                    resolved,
                    locators,
                    for_sequence_no: 0,
                    sequence_label: String::new(),
                    first_of_group: false,
                    group_size: 1,
                }
            })
            .collect();

        // Step 2: partition by join key. Records without a key each form
        // their own singleton partition (keyed by input position).
        let mut partitions: HashMap<(Option<JoinKey>, usize), Vec<usize>> = HashMap::new();
        for (i, r) in ranked.iter().enumerate() {
            let key = match JoinKey::of(&r.record) {
                Some(key) => (Some(key), 0),
                None => (None, i),
            };
            partitions.entry(key).or_default().push(i);
        }

        // Steps 3-5: order, dense rank, lag comparison per partition
        for indices in partitions.values_mut() {
            // Ties broken by original input order; dateless rows first
            indices.sort_by_key(|&i| (ranked[i].record.invoice_date, i));

            let group_size = indices.len();
            let mut rank: u32 = 1;

            for pos in 0..indices.len() {
                let i = indices[pos];
                if pos > 0 {
                    let prev = indices[pos - 1];
                    let same_sort_key =
                        ranked[i].record.invoice_date == ranked[prev].record.invoice_date;
                    let same_amount =
                        ranked[i].record.gross_amount == ranked[prev].record.gross_amount;
                    if !same_sort_key {
                        rank += 1;
                    }
                    let duplicate = same_sort_key
                        && match self.comparison {
                            DuplicateComparison::SortKeyOnly => true,
                            DuplicateComparison::SortKeyAndAmount => same_amount,
                        };
                    ranked[i].duplicate = duplicate;
                }
                ranked[i].rank = rank;
                ranked[i].group_size = group_size;
            }
        }

        // Report order + period-wide sequencing
        self.sequence(&mut ranked);

        (ranked, diagnostics)
    }

    /// Arrange records in report order and assign the period-wide sequence:
    /// a dense rank over (vendor, invoice) pairs, with the first row of
    /// each pair flagged. Also used to re-number after report filtering.
    pub fn sequence(&self, ranked: &mut Vec<RankedRecord>) {
        let mut order: Vec<usize> = (0..ranked.len()).collect();
        order.sort_by(|&a, &b| {
            let ka = sequence_key(&ranked[a]);
            let kb = sequence_key(&ranked[b]);
            ka.cmp(&kb).then_with(|| {
                ranked[a]
                    .record
                    .invoice_date
                    .cmp(&ranked[b].record.invoice_date)
                    .then(a.cmp(&b))
            })
        });

        let mut sequence: u32 = 0;
        let mut previous: Option<(String, String)> = None;
        let mut arranged = Vec::with_capacity(ranked.len());

        for i in order {
            let key = sequence_key(&ranked[i]);
            let first = previous.as_ref() != Some(&key);
            if first {
                sequence += 1;
                previous = Some(key);
            }

            let mut r = ranked[i].clone();
            r.for_sequence_no = sequence;
            r.sequence_label = format!("{:03}", sequence);
            r.first_of_group = first;
            arranged.push(r);
        }

        *ranked = arranged;
    }
}

fn sequence_key(r: &RankedRecord) -> (String, String) {
    (
        r.record.vendor.trim().to_uppercase(),
        r.record.invoice_no.trim().to_uppercase(),
    )
}

impl Default for ResolutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Tax-commission image filename for a period's sequence group,
/// e.g. "S202304-007.pdf"
pub fn tax_commission_filename(year: i32, month: u32, sequence_label: &str) -> String {
    format!("S{}{:02}-{}.pdf", year, month, sequence_label)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(vendor: &str, invoice: &str, date: Option<&str>, amount: f64, row: usize) -> TransactionRecord {
        TransactionRecord {
            vendor: vendor.to_string(),
            invoice_no: invoice.to_string(),
            invoice_date: date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            gross_amount: Some(amount),
            property: "Well 7".to_string(),
            billing_category: "LOE".to_string(),
            description: String::new(),
            source_file: "jib.csv".to_string(),
            source_row: row,
        }
    }

    fn entry(vendor: &str, invoice: &str, locators: &[&str], row: usize) -> CrossReferenceEntry {
        CrossReferenceEntry {
            vendor: vendor.to_string(),
            invoice_no: invoice.to_string(),
            locators: locators.iter().map(|l| l.to_string()).collect(),
            source_row: row,
        }
    }

    fn empty_index() -> CrossReferenceIndex {
        CrossReferenceIndex::build(Vec::new())
    }

    #[test]
    fn test_dense_rank_with_tied_dates() {
        // Partition with dates [Jan 1, Jan 1, Jan 5] → ranks [1, 1, 2]
        let engine = ResolutionEngine::new();
        let records = vec![
            record("ACME", "123", Some("2023-01-01"), 100.0, 2),
            record("ACME", "123", Some("2023-01-01"), 100.0, 3),
            record("ACME", "123", Some("2023-01-05"), 50.0, 4),
        ];

        let (ranked, _) = engine.resolve(&records, &empty_index());
        let ranks: Vec<u32> = ranked.iter().map(|r| r.rank).collect();
        let duplicates: Vec<bool> = ranked.iter().map(|r| r.duplicate).collect();

        assert_eq!(ranks, vec![1, 1, 2]);
        assert_eq!(duplicates, vec![false, true, false]);
    }

    #[test]
    fn test_rank_is_dense_no_gaps() {
        let engine = ResolutionEngine::new();
        let records = vec![
            record("ACME", "123", Some("2023-01-01"), 10.0, 2),
            record("ACME", "123", Some("2023-01-01"), 10.0, 3),
            record("ACME", "123", Some("2023-01-03"), 10.0, 4),
            record("ACME", "123", Some("2023-01-03"), 10.0, 5),
            record("ACME", "123", Some("2023-01-09"), 10.0, 6),
        ];

        let (ranked, _) = engine.resolve(&records, &empty_index());
        let ranks: Vec<u32> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 1, 2, 2, 3]);
    }

    #[test]
    fn test_partitions_are_independent() {
        let engine = ResolutionEngine::new();
        let records = vec![
            record("ACME", "123", Some("2023-01-01"), 10.0, 2),
            record("GLOBEX", "900", Some("2023-01-01"), 20.0, 3),
            record("ACME", "124", Some("2023-01-01"), 30.0, 4),
        ];

        let (ranked, _) = engine.resolve(&records, &empty_index());
        // Each record starts its own partition: all rank 1, none duplicate
        assert!(ranked.iter().all(|r| r.rank == 1 && !r.duplicate));
        assert!(ranked.iter().all(|r| r.group_size == 1));
    }

    #[test]
    fn test_duplicate_comparison_sort_key_and_amount() {
        let records = vec![
            record("ACME", "123", Some("2023-01-01"), 100.0, 2),
            record("ACME", "123", Some("2023-01-01"), 75.0, 3),
            record("ACME", "123", Some("2023-01-01"), 75.0, 4),
        ];

        // Sort key only: both later rows are duplicates of their predecessor
        let engine = ResolutionEngine::with_comparison(DuplicateComparison::SortKeyOnly);
        let (ranked, _) = engine.resolve(&records, &empty_index());
        let flags: Vec<bool> = ranked.iter().map(|r| r.duplicate).collect();
        assert_eq!(flags, vec![false, true, true]);

        // Sort key + amount: the 100.0 → 75.0 transition is not a duplicate
        let engine = ResolutionEngine::with_comparison(DuplicateComparison::SortKeyAndAmount);
        let (ranked, _) = engine.resolve(&records, &empty_index());
        let flags: Vec<bool> = ranked.iter().map(|r| r.duplicate).collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn test_unresolved_record_retained() {
        let engine = ResolutionEngine::new();
        let records = vec![record("ACME", "123", Some("2023-01-01"), 100.0, 2)];
        let index = CrossReferenceIndex::build(vec![entry("ACME", "999", &["other.pdf"], 2)]);

        let (ranked, diagnostics) = engine.resolve(&records, &index);
        assert_eq!(ranked.len(), 1);
        assert!(!ranked[0].resolved);
        assert!(ranked[0].locators.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnresolvedJoin);
    }

    #[test]
    fn test_malformed_key_retained_without_join_diagnostic() {
        let engine = ResolutionEngine::new();
        let records = vec![
            record("", "123", Some("2023-01-01"), 100.0, 2),
            record("ACME", "", Some("2023-01-02"), 50.0, 3),
        ];

        let (ranked, diagnostics) = engine.resolve(&records, &empty_index());
        // Kept in output, never joined, no UnresolvedJoin noise on top of
        // the normalizer's MalformedKey diagnostic
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| !r.resolved));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_row_count_preserved() {
        let engine = ResolutionEngine::new();
        let records = vec![
            record("ACME", "123", Some("2023-01-01"), 10.0, 2),
            record("", "", None, 0.0, 3),
            record("GLOBEX", "900", None, 20.0, 4),
            record("ACME", "123", Some("2023-01-01"), 10.0, 5),
        ];

        let (ranked, _) = engine.resolve(&records, &empty_index());
        assert_eq!(ranked.len(), records.len());

        let mut rows: Vec<usize> = ranked.iter().map(|r| r.record.source_row).collect();
        rows.sort_unstable();
        assert_eq!(rows, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_multiple_locators_in_stored_order() {
        let engine = ResolutionEngine::new();
        let records = vec![record("ACME", "123", Some("2023-01-01"), 10.0, 2)];
        let index = CrossReferenceIndex::build(vec![
            entry("ACME", "123", &["page1.pdf", "page2.pdf"], 2),
            entry("ACME", "123", &["page3.pdf"], 3),
        ]);

        let (ranked, _) = engine.resolve(&records, &index);
        assert!(ranked[0].resolved);
        assert_eq!(ranked[0].locators, vec!["page1.pdf", "page2.pdf", "page3.pdf"]);
    }

    #[test]
    fn test_invoice_only_entries_match_any_vendor() {
        let engine = ResolutionEngine::new();
        let records = vec![record("ACME", "123", Some("2023-01-01"), 10.0, 2)];
        // Cross-reference export without a vendor column
        let index = CrossReferenceIndex::build(vec![entry("", "123", &["img.pdf"], 2)]);

        let (ranked, _) = engine.resolve(&records, &index);
        assert!(ranked[0].resolved);
        assert_eq!(ranked[0].locators, vec!["img.pdf"]);
    }

    #[test]
    fn test_key_matching_is_case_insensitive_and_suffix_cleaned() {
        let engine = ResolutionEngine::new();
        let records = vec![record("acme", "inv-22", Some("2023-01-01"), 10.0, 2)];
        let index = CrossReferenceIndex::build(vec![entry("ACME", "INV-22", &["img.pdf"], 2)]);

        let (ranked, _) = engine.resolve(&records, &index);
        assert!(ranked[0].resolved);
    }

    #[test]
    fn test_dateless_rows_sort_first_deterministically() {
        let engine = ResolutionEngine::new();
        let records = vec![
            record("ACME", "123", Some("2023-01-01"), 10.0, 2),
            record("ACME", "123", None, 20.0, 3),
            record("ACME", "123", None, 30.0, 4),
        ];

        let (ranked, _) = engine.resolve(&records, &empty_index());
        // None dates precede dated rows; among themselves, input order
        let rows: Vec<usize> = ranked.iter().map(|r| r.record.source_row).collect();
        assert_eq!(rows, vec![3, 4, 2]);
        let ranks: Vec<u32> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 1, 2]);
    }

    #[test]
    fn test_sequencing_in_report_order() {
        let engine = ResolutionEngine::new();
        let records = vec![
            record("GLOBEX", "900", Some("2023-01-02"), 20.0, 2),
            record("ACME", "123", Some("2023-01-01"), 10.0, 3),
            record("ACME", "123", Some("2023-01-01"), 10.0, 4),
            record("ACME", "124", Some("2023-01-03"), 30.0, 5),
        ];

        let (ranked, _) = engine.resolve(&records, &empty_index());
        let sequence: Vec<u32> = ranked.iter().map(|r| r.for_sequence_no).collect();
        let firsts: Vec<bool> = ranked.iter().map(|r| r.first_of_group).collect();
        let vendors: Vec<&str> = ranked.iter().map(|r| r.record.vendor.as_str()).collect();

        assert_eq!(vendors, vec!["ACME", "ACME", "ACME", "GLOBEX"]);
        assert_eq!(sequence, vec![1, 1, 2, 3]);
        assert_eq!(firsts, vec![true, false, true, true]);
        assert_eq!(ranked[0].sequence_label, "001");
        assert_eq!(ranked[3].sequence_label, "003");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let engine = ResolutionEngine::new();
        let records = vec![
            record("ACME", "123", Some("2023-01-01"), 10.0, 2),
            record("ACME", "123", Some("2023-01-01"), 10.0, 3),
            record("GLOBEX", "900", None, 20.0, 4),
            record("", "55", Some("2023-01-04"), 5.0, 5),
        ];
        let index = CrossReferenceIndex::build(vec![entry("ACME", "123", &["a.pdf"], 2)]);

        let (first, _) = engine.resolve(&records, &index);
        let (second, _) = engine.resolve(&records, &index);

        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.record.source_row, b.record.source_row);
            assert_eq!(a.rank, b.rank);
            assert_eq!(a.duplicate, b.duplicate);
            assert_eq!(a.for_sequence_no, b.for_sequence_no);
        }
    }

    #[test]
    fn test_tax_commission_filename() {
        assert_eq!(tax_commission_filename(2023, 4, "007"), "S202304-007.pdf");
    }
}
