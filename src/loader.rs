// 📂 Tabular Loader - "smart load" for messy spreadsheet exports
// Finds the real header row under banner/title blocks of arbitrary height

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

// ============================================================================
// RAW TABLE
// ============================================================================

/// A row as read from the source, positionally indexed, no semantics yet
pub type RawRow = Vec<String>;

/// Loader output: confirmed header row plus everything below it
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Header cells exactly as they appeared in the source
    pub headers: RawRow,

    /// Data rows, in source order
    pub rows: Vec<RawRow>,

    /// 1-based source row number of each data row (for diagnostics)
    pub row_numbers: Vec<usize>,

    /// Which source file this came from
    pub source_file: String,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// A candidate header row seen during the scan
#[derive(Debug, Clone)]
struct HeaderCandidate {
    row_index: usize,
    matches: usize,
}

// ============================================================================
// LOAD ERROR
// ============================================================================

#[derive(Debug, Clone)]
pub enum LoadError {
    /// No row within the lookahead bound matched the header vocabulary
    NoHeaderFound { scanned: usize, lookahead: usize },

    /// File had no rows at all
    EmptyInput,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::NoHeaderFound { scanned, lookahead } => write!(
                f,
                "no header row found in first {} rows (lookahead bound {})",
                scanned, lookahead
            ),
            LoadError::EmptyInput => write!(f, "input contains no rows"),
        }
    }
}

impl std::error::Error for LoadError {}

// ============================================================================
// SMART LOADER
// ============================================================================

/// Header-row discovery settings.
///
/// The vocabulary is the set of column names we expect to see in a real
/// header row; a row qualifies once enough of its cells match. Matching is
/// case-insensitive on trimmed whole cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartLoader {
    /// Expected header spellings (lowercase)
    pub vocabulary: Vec<String>,

    /// Maximum rows scanned before giving up (never scan unboundedly)
    pub lookahead: usize,

    /// Minimum vocabulary hits for a row to qualify as the header
    pub min_matches: usize,
}

impl SmartLoader {
    /// Loader tuned for the JIB and cross-reference exports we receive
    pub fn new() -> Self {
        SmartLoader {
            vocabulary: vec![
                "owner".to_string(),
                "txn gross amt".to_string(),
                "vendor".to_string(),
                "vendor name".to_string(),
                "name 1".to_string(),
                "invoice #".to_string(),
                "invoice no".to_string(),
                "txn invoice no".to_string(),
                "txn inv date".to_string(),
                "property".to_string(),
                "billing cat".to_string(),
            ],
            lookahead: 50,
            min_matches: 1,
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: Vec<String>) -> Self {
        self.vocabulary = vocabulary.into_iter().map(|v| v.to_lowercase()).collect();
        self
    }

    pub fn with_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_min_matches(mut self, min_matches: usize) -> Self {
        self.min_matches = min_matches;
        self
    }

    /// Load a CSV file, locating the true header row first
    pub fn load_file(&self, path: &Path) -> Result<RawTable> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut rows: Vec<RawRow> = Vec::new();
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to read row from {}", path.display()))?;
            rows.push(record.iter().map(|cell| cell.to_string()).collect());
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();

        self.load_rows(rows, &filename)
    }

    /// Core loading logic over already-read rows (also the test entry point)
    pub fn load_rows(&self, rows: Vec<RawRow>, source_file: &str) -> Result<RawTable> {
        if rows.is_empty() {
            return Err(LoadError::EmptyInput.into());
        }

        let candidate = self.find_header(&rows).ok_or(LoadError::NoHeaderFound {
            scanned: rows.len().min(self.lookahead),
            lookahead: self.lookahead,
        })?;
        debug_assert!(candidate.matches >= self.min_matches);

        let headers = rows[candidate.row_index].clone();
        let data: Vec<RawRow> = rows[candidate.row_index + 1..].to_vec();
        // Source rows are 1-based; data starts two past the 0-based header index
        let row_numbers: Vec<usize> = (0..data.len())
            .map(|i| candidate.row_index + 2 + i)
            .collect();

        Ok(RawTable {
            headers,
            rows: data,
            row_numbers,
            source_file: source_file.to_string(),
        })
    }

    /// Scan for the first row meeting the match threshold.
    ///
    /// Earlier rows win ties outright: headers appear before any repeated
    /// sub-header blocks, so the scan stops at the first qualifying row.
    fn find_header(&self, rows: &[RawRow]) -> Option<HeaderCandidate> {
        for (row_index, row) in rows.iter().take(self.lookahead).enumerate() {
            let matches = row
                .iter()
                .filter(|cell| {
                    let cell = cell.trim().to_lowercase();
                    !cell.is_empty() && self.vocabulary.iter().any(|v| *v == cell)
                })
                .count();

            if matches >= self.min_matches {
                return Some(HeaderCandidate { row_index, matches });
            }
        }
        None
    }
}

impl Default for SmartLoader {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
