//! xlm-core: Core library for merging many spreadsheet files into one workbook
//!
//! This library provides functionality to:
//! - Enumerate candidate workbook files under a directory
//! - Read every sheet into typed tables, on a bounded pool of threads or
//!   child processes, in a deterministic order
//! - Group tables (stacked, or per sheet name) and reconcile their columns
//! - Drop empty rows, add provenance columns and deduplicate by key
//! - Write the result as an xlsx workbook, sharding groups that exceed the
//!   per-sheet row limit

pub mod cleaning;
pub mod config;
pub mod error;
pub mod grouping;
pub mod ingest;
pub mod merger;
pub mod names;
pub mod progress;
pub mod reader;
pub mod report;
pub mod scanner;
pub mod schema;
pub mod table;
pub mod writer;

pub use cleaning::{Cleaner, CleaningOptions, DedupIndex, SOURCE_FILE_COLUMN, SOURCE_SHEET_COLUMN};
pub use config::{
    parse_field_list, resolve_output_path, ColumnPolicy, MergeConfig, MergeMode,
    ProvenancePosition, WorkerKind, WriterBackend,
};
pub use error::{Error, Result};
pub use grouping::{group_tables, Group, GroupKey};
pub use ingest::{ingest, write_worker_output, IngestOptions, Ingested, SkippedFile, WORKER_SUBCOMMAND};
pub use merger::{merge_group, run_merge, run_merge_with_capacity, MergedGroup};
pub use names::{make_unique_columns, safe_sheet_title, UniqueNames};
pub use progress::{CancelToken, NullSink, ProgressEvent, ProgressSink};
pub use reader::{parse_csv, read_tables};
pub use report::{GroupReport, MergeReport, ShardReport};
pub use scanner::{scan_directory, FileEnumerator};
pub use schema::{reconcile, Projection};
pub use table::{CellValue, Row, Table};
pub use writer::{write_group, SheetSink, XlsxWorkbookWriter, ROW_CAPACITY};
