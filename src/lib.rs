// JIB Audit - Record Resolution Pipeline
// Extracts Joint Interest Billing entries from messy spreadsheet exports,
// resolves them against an invoice cross-reference, and emits per-period
// audit reports with links to source invoice images.

pub mod loader;     // Tabular Loader - smart header detection
pub mod schema;     // Schema Normalizer - canonical records + coercion
pub mod resolution; // Resolution Engine - join, partition, rank, lag
pub mod links;      // Link Resolver - platform-specific image addresses
pub mod period;     // Reporting periods and quarter math
pub mod report;     // Report Emitter - per-period CSV + exceptions JSON
pub mod pipeline;   // Batch Orchestrator - one run per period

// Re-export commonly used types
pub use loader::{LoadError, RawRow, RawTable, SmartLoader};
pub use schema::{
    AliasTable, CrossReferenceEntry, Diagnostic, DiagnosticKind, SchemaError,
    SchemaNormalizer, TransactionRecord,
};
pub use resolution::{
    CrossReferenceIndex, DuplicateComparison, JoinKey, RankedRecord, ResolutionEngine,
};
pub use links::{LinkConfig, LinkResolver, Platform};
pub use period::{parse_month_spec, periods_for, Period, Quarter};
pub use report::{PeriodReportFiles, ReportEmitter};
pub use pipeline::{PeriodSummary, Pipeline, PipelineConfig, ReportFilter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
