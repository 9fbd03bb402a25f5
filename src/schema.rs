// 📐 Schema Normalizer - canonical record shapes from messy headers
// Alias-table column mapping + type coercion with per-row failure isolation

use crate::loader::RawTable;
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// CANONICAL RECORDS
// ============================================================================

/// Canonical JIB transaction after normalization. Never mutated afterwards;
/// downstream stages wrap it instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Vendor identifier as it appeared (trimmed)
    pub vendor: String,

    /// Invoice number, trimmed and stripped of the spreadsheet ".0" artifact
    pub invoice_no: String,

    /// Invoice date; None when the source value failed coercion
    pub invoice_date: Option<NaiveDate>,

    /// Signed gross amount; None when the source value failed coercion
    pub gross_amount: Option<f64>,

    /// Property / lease the charge was billed against
    pub property: String,

    /// Billing category code
    pub billing_category: String,

    /// Free-text description
    pub description: String,

    /// Which source file this row came from (audit trail)
    pub source_file: String,

    /// 1-based row in the source file (audit trail)
    pub source_row: usize,
}

impl TransactionRecord {
    /// Both matching fields present? Blank vendor or invoice number means
    /// the record can never join and is surfaced as a malformed key.
    pub fn has_join_key(&self) -> bool {
        !self.vendor.trim().is_empty() && !self.invoice_no.trim().is_empty()
    }
}

/// One cross-reference row: (vendor, invoice no) key → locator fragments.
///
/// Key uniqueness is NOT assumed; multi-page invoices produce several
/// entries (or several locators on one entry). Locator order is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossReferenceEntry {
    pub vendor: String,
    pub invoice_no: String,

    /// Platform-agnostic relative fragments (image filenames), stored order
    pub locators: Vec<String>,

    /// 1-based row in the cross-reference file
    pub source_row: usize,
}

// ============================================================================
// DIAGNOSTICS (row-scoped, never abort)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A value failed coercion; the field was left unset, the row kept
    TypeCoercion,

    /// Record had a valid key but nothing matched in the cross-reference
    UnresolvedJoin,

    /// Blank vendor or invoice number; record kept but can never join
    MalformedKey,
}

impl DiagnosticKind {
    pub fn name(&self) -> &str {
        match self {
            DiagnosticKind::TypeCoercion => "type_coercion",
            DiagnosticKind::UnresolvedJoin => "unresolved_join",
            DiagnosticKind::MalformedKey => "malformed_key",
        }
    }
}

/// Row-scoped issue surfaced to the auditor instead of dropping the row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub source_file: String,
    pub row: usize,
    pub field: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}] {} ({}): {}",
            self.source_file,
            self.row,
            self.field,
            self.kind.name(),
            self.message
        )
    }
}

// ============================================================================
// SCHEMA ERROR (file-structural, fatal for the input)
// ============================================================================

#[derive(Debug, Clone)]
pub enum SchemaError {
    /// A required canonical field has no matching source column at all
    MissingRequiredField { field: String, source_file: String },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::MissingRequiredField { field, source_file } => write!(
                f,
                "required field '{}' has no matching column in {}",
                field, source_file
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

// ============================================================================
// HEADER CANONICALIZATION & ALIASES
// ============================================================================

/// Canonicalize a source header the way the exports are cleaned:
/// trim, lowercase, spaces → '_', '#' → 'no', '.' → '_'
pub fn canonicalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace('#', "no")
        .replace('.', "_")
}

/// Accepted source spellings per canonical field (post-canonicalization).
///
/// `*_contains` entries match on substring, covering export variants like
/// "txn_inv_date" vs "inv_date" without enumerating every prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasTable {
    pub vendor: Vec<String>,
    pub invoice_no: Vec<String>,
    pub invoice_date_contains: Vec<String>,
    pub gross_amount_contains: Vec<String>,
    pub property: Vec<String>,
    pub billing_category: Vec<String>,
    pub description: Vec<String>,
    pub locator_contains: Vec<String>,
}

impl AliasTable {
    pub fn new() -> Self {
        AliasTable {
            vendor: vec![
                "name_1".to_string(),
                "vendor_name".to_string(),
                "vendor".to_string(),
            ],
            invoice_no: vec!["txn_invoice_no".to_string(), "invoice_no".to_string()],
            invoice_date_contains: vec!["inv_date".to_string()],
            gross_amount_contains: vec!["gross_amt".to_string()],
            property: vec!["property".to_string(), "prop".to_string()],
            billing_category: vec!["billing_cat".to_string(), "bill_cat".to_string()],
            description: vec!["description".to_string(), "txn_description".to_string()],
            locator_contains: vec!["related_file".to_string()],
        }
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved column positions for one input file
#[derive(Debug, Clone, Default)]
struct ColumnMap {
    vendor: Option<usize>,
    invoice_no: Option<usize>,
    invoice_date: Option<usize>,
    gross_amount: Option<usize>,
    property: Option<usize>,
    billing_category: Option<usize>,
    description: Option<usize>,
    locators: Vec<usize>,
}

// ============================================================================
// SCHEMA NORMALIZER
// ============================================================================

pub struct SchemaNormalizer {
    aliases: AliasTable,
}

impl SchemaNormalizer {
    pub fn new() -> Self {
        SchemaNormalizer {
            aliases: AliasTable::new(),
        }
    }

    pub fn with_aliases(aliases: AliasTable) -> Self {
        SchemaNormalizer { aliases }
    }

    /// Map a raw table onto TransactionRecords.
    ///
    /// Missing vendor or invoice-number column is structural and fatal for
    /// the file; everything row-level (coercion failures, blank keys) is
    /// isolated into diagnostics and the row is kept.
    pub fn normalize_transactions(
        &self,
        table: &RawTable,
    ) -> Result<(Vec<TransactionRecord>, Vec<Diagnostic>)> {
        let columns = self.map_columns(&table.headers);

        let vendor_col = columns
            .vendor
            .ok_or_else(|| SchemaError::MissingRequiredField {
                field: "vendor".to_string(),
                source_file: table.source_file.clone(),
            })?;
        let invoice_col = columns
            .invoice_no
            .ok_or_else(|| SchemaError::MissingRequiredField {
                field: "invoice_no".to_string(),
                source_file: table.source_file.clone(),
            })?;

        let mut records = Vec::with_capacity(table.rows.len());
        let mut diagnostics = Vec::new();

        for (i, row) in table.rows.iter().enumerate() {
            let source_row = table.row_numbers[i];
            let cell = |col: Option<usize>| -> String {
                col.and_then(|c| row.get(c))
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default()
            };

            let invoice_date = match cell(columns.invoice_date) {
                raw if raw.is_empty() => None,
                raw => match parse_date(&raw) {
                    Some(date) => Some(date),
                    None => {
                        diagnostics.push(Diagnostic {
                            source_file: table.source_file.clone(),
                            row: source_row,
                            field: "invoice_date".to_string(),
                            kind: DiagnosticKind::TypeCoercion,
                            message: format!("unparseable date: '{}'", raw),
                        });
                        None
                    }
                },
            };

            let gross_amount = match cell(columns.gross_amount) {
                raw if raw.is_empty() => None,
                raw => match parse_amount(&raw) {
                    Some(amount) => Some(amount),
                    None => {
                        diagnostics.push(Diagnostic {
                            source_file: table.source_file.clone(),
                            row: source_row,
                            field: "gross_amount".to_string(),
                            kind: DiagnosticKind::TypeCoercion,
                            message: format!("unparseable amount: '{}'", raw),
                        });
                        None
                    }
                },
            };

            let record = TransactionRecord {
                vendor: cell(Some(vendor_col)),
                invoice_no: clean_invoice_no(&cell(Some(invoice_col))),
                invoice_date,
                gross_amount,
                property: cell(columns.property),
                billing_category: cell(columns.billing_category),
                description: cell(columns.description),
                source_file: table.source_file.clone(),
                source_row,
            };

            if !record.has_join_key() {
                diagnostics.push(Diagnostic {
                    source_file: table.source_file.clone(),
                    row: source_row,
                    field: "vendor/invoice_no".to_string(),
                    kind: DiagnosticKind::MalformedKey,
                    message: "blank vendor or invoice number; record cannot join".to_string(),
                });
            }

            records.push(record);
        }

        Ok((records, diagnostics))
    }

    /// Map a raw table onto CrossReferenceEntries.
    ///
    /// Requires an invoice-number column; the vendor column is taken when
    /// present (some cross-reference exports key on invoice number alone).
    pub fn normalize_cross_reference(
        &self,
        table: &RawTable,
    ) -> Result<(Vec<CrossReferenceEntry>, Vec<Diagnostic>)> {
        let columns = self.map_columns(&table.headers);

        let invoice_col = columns
            .invoice_no
            .ok_or_else(|| SchemaError::MissingRequiredField {
                field: "invoice_no".to_string(),
                source_file: table.source_file.clone(),
            })?;

        let mut entries = Vec::with_capacity(table.rows.len());
        let mut diagnostics = Vec::new();

        for (i, row) in table.rows.iter().enumerate() {
            let source_row = table.row_numbers[i];
            let invoice_no =
                clean_invoice_no(row.get(invoice_col).map(|v| v.trim()).unwrap_or_default());

            if invoice_no.is_empty() {
                diagnostics.push(Diagnostic {
                    source_file: table.source_file.clone(),
                    row: source_row,
                    field: "invoice_no".to_string(),
                    kind: DiagnosticKind::MalformedKey,
                    message: "blank invoice number in cross-reference".to_string(),
                });
                continue;
            }

            let vendor = columns
                .vendor
                .and_then(|c| row.get(c))
                .map(|v| v.trim().to_string())
                .unwrap_or_default();

            let locators: Vec<String> = columns
                .locators
                .iter()
                .filter_map(|&c| row.get(c))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();

            entries.push(CrossReferenceEntry {
                vendor,
                invoice_no,
                locators,
                source_row,
            });
        }

        Ok((entries, diagnostics))
    }

    fn map_columns(&self, headers: &[String]) -> ColumnMap {
        let canonical: Vec<String> = headers.iter().map(|h| canonicalize_header(h)).collect();
        let mut map = ColumnMap::default();

        let exact = |aliases: &[String]| -> Option<usize> {
            canonical.iter().position(|h| aliases.contains(h))
        };
        let contains = |needles: &[String]| -> Option<usize> {
            canonical
                .iter()
                .position(|h| needles.iter().any(|n| h.contains(n.as_str())))
        };

        map.vendor = exact(&self.aliases.vendor);
        map.invoice_no = exact(&self.aliases.invoice_no);
        map.invoice_date = contains(&self.aliases.invoice_date_contains);
        map.gross_amount = contains(&self.aliases.gross_amount_contains);
        map.property = exact(&self.aliases.property);
        map.billing_category = exact(&self.aliases.billing_category);
        map.description = exact(&self.aliases.description);
        map.locators = canonical
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                self.aliases
                    .locator_contains
                    .iter()
                    .any(|n| h.contains(n.as_str()))
            })
            .map(|(i, _)| i)
            .collect();

        map
    }
}

impl Default for SchemaNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// COERCION HELPERS
// ============================================================================

/// Parse a date from the formats seen across exports.
/// Datetime values ("4/5/2023 00:00:00") are truncated at the first space.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date_part = value.split_whitespace().next().unwrap_or(value);

    // %y must come before %Y: chrono's %Y accepts variable-length years,
    // so "4/5/23" would otherwise parse as year 0023.
    for format in ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d", "%d-%b-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
    }

    None
}

/// Parse a currency string into a signed amount.
/// Strips '$' and thousands separators; accounting parentheses negate.
pub fn parse_amount(value: &str) -> Option<f64> {
    let mut cleaned = value.trim().replace(['$', ','], "");
    let mut negative = false;

    if cleaned.starts_with('(') && cleaned.ends_with(')') {
        negative = true;
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }

    let amount: f64 = cleaned.trim().parse().ok()?;
    Some(if negative { -amount } else { amount })
}

/// Clean an invoice number: trim plus strip the ".0" float artifact that
/// spreadsheets append to numeric invoice columns.
pub fn clean_invoice_no(value: &str) -> String {
    let value = value.trim();
    value.strip_suffix(".0").unwrap_or(value).to_string()
}

// ============================================================================
// TESTS
// ============================================================================
