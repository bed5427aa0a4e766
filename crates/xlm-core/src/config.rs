//! Merge configuration: every option the engine recognizes, persisted as JSON

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name used when the output path points at a directory
pub const DEFAULT_OUTPUT_NAME: &str = "merged.xlsx";

/// How ingested tables are partitioned into output groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Everything is stacked into one group
    #[default]
    Stack,
    /// One group per distinct source sheet name
    PerSheetName,
}

/// How differing column sets are reconciled inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPolicy {
    #[default]
    Union,
    Intersection,
}

/// Where provenance columns are placed relative to the data columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenancePosition {
    #[default]
    Prepend,
    Append,
}

/// Execution vehicle for sheet reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    #[default]
    Thread,
    /// Each read runs in a child process and ships its tables back as JSON
    Process,
}

/// Which xlsx writing strategy performs the physical write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterBackend {
    /// Whole worksheet kept in memory until save
    #[default]
    Buffered,
    /// Rows are flushed to disk as they are written
    ConstantMemory,
}

/// Full configuration of one merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub input_directory: PathBuf,
    pub recurse: bool,
    pub extension_filter: Vec<String>,
    /// Only read these sheet names; `None` reads every sheet
    pub sheet_filter: Option<Vec<String>>,
    pub merge_mode: MergeMode,
    pub column_policy: ColumnPolicy,
    pub drop_empty_rows: bool,
    pub add_provenance_columns: bool,
    pub provenance_position: ProvenancePosition,
    /// Empty disables deduplication
    pub dedup_key_columns: Vec<String>,
    pub worker_kind: WorkerKind,
    pub worker_count: usize,
    /// Executable used for process workers; defaults to the current binary
    pub worker_program: Option<PathBuf>,
    pub writer_backend: WriterBackend,
    pub auto_column_width: bool,
    pub output_path: PathBuf,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            input_directory: PathBuf::from("."),
            recurse: false,
            extension_filter: vec!["xlsx".to_string()],
            sheet_filter: None,
            merge_mode: MergeMode::Stack,
            column_policy: ColumnPolicy::Union,
            drop_empty_rows: true,
            add_provenance_columns: true,
            provenance_position: ProvenancePosition::Prepend,
            dedup_key_columns: Vec::new(),
            worker_kind: WorkerKind::Thread,
            worker_count: default_worker_count(),
            worker_program: None,
            writer_backend: WriterBackend::Buffered,
            auto_column_width: false,
            output_path: PathBuf::from(DEFAULT_OUTPUT_NAME),
        }
    }
}

impl MergeConfig {
    /// Create a config for an input directory and output path, other options default
    pub fn new(input_directory: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_directory: input_directory.into(),
            output_path: output_path.into(),
            ..Self::default()
        }
    }

    /// Load a config file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the config to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that can never run
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::InvalidConfig(
                "worker_count must be a positive integer".to_string(),
            ));
        }
        if self
            .extension_filter
            .iter()
            .all(|e| e.trim_start_matches('.').trim().is_empty())
        {
            return Err(Error::InvalidConfig(
                "extension_filter must name at least one extension".to_string(),
            ));
        }
        if self.dedup_key_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "dedup_key_columns contains a blank column name".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of available execution units, at least 1
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Split free-text field input on commas, semicolons (ASCII and full-width)
/// and newlines
pub fn parse_field_list(text: &str) -> Vec<String> {
    text.split(|c| matches!(c, ',' | ';' | '\r' | '\n' | '\u{FF0C}' | '\u{FF1B}'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turn user input into a concrete `.xlsx` output file path.
///
/// - existing directory, or trailing separator: `<dir>/merged.xlsx`
/// - no extension: `.xlsx` appended
/// - other extension: replaced with `.xlsx`
pub fn resolve_output_path(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if trimmed.is_empty() {
        return Err(Error::InvalidConfig("output path is empty".to_string()));
    }

    let path = PathBuf::from(trimmed);
    if path.is_dir() || trimmed.ends_with('/') || trimmed.ends_with('\\') {
        return Ok(path.join(DEFAULT_OUTPUT_NAME));
    }

    let is_xlsx = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
    if is_xlsx {
        Ok(path)
    } else {
        Ok(path.with_extension("xlsx"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = MergeConfig::default();
        assert_eq!(cfg.merge_mode, MergeMode::Stack);
        assert_eq!(cfg.column_policy, ColumnPolicy::Union);
        assert!(cfg.drop_empty_rows);
        assert!(cfg.add_provenance_columns);
        assert!(cfg.worker_count >= 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let cfg = MergeConfig {
            worker_count: 0,
            ..MergeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_empty_extensions() {
        let cfg = MergeConfig {
            extension_filter: vec![".".to_string()],
            ..MergeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(
            &path,
            r#"{ "merge_mode": "per_sheet_name", "column_policy": "intersection", "worker_kind": "process" }"#,
        )
        .unwrap();

        let cfg = MergeConfig::load(&path).unwrap();
        assert_eq!(cfg.merge_mode, MergeMode::PerSheetName);
        assert_eq!(cfg.column_policy, ColumnPolicy::Intersection);
        assert_eq!(cfg.worker_kind, WorkerKind::Process);
        assert!(cfg.drop_empty_rows);

        cfg.save(&path).unwrap();
        assert_eq!(MergeConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn test_parse_field_list() {
        assert_eq!(parse_field_list("id, name；code\n\nx，y"), vec!["id", "name", "code", "x", "y"]);
        assert!(parse_field_list("  ").is_empty());
    }

    #[test]
    fn test_resolve_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_string_lossy().into_owned();

        assert_eq!(
            resolve_output_path(&dir_str).unwrap(),
            dir.path().join(DEFAULT_OUTPUT_NAME)
        );
        assert_eq!(
            resolve_output_path("out/report").unwrap(),
            PathBuf::from("out/report.xlsx")
        );
        assert_eq!(
            resolve_output_path("\"out/report.csv\"").unwrap(),
            PathBuf::from("out/report.xlsx")
        );
        assert_eq!(
            resolve_output_path("nested/").unwrap(),
            PathBuf::from("nested/").join(DEFAULT_OUTPUT_NAME)
        );
        assert!(resolve_output_path("  ").is_err());
    }
}
