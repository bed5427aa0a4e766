//! Row cleaning for one group: empty-row elimination, provenance columns,
//! and key-based deduplication, applied in that order.

use crate::config::{MergeConfig, ProvenancePosition};
use crate::error::{Error, Result};
use crate::names::UniqueNames;
use crate::table::{CellKey, CellValue, Row};
use std::collections::HashSet;

/// Provenance column carrying the source file name
pub const SOURCE_FILE_COLUMN: &str = "source_file";
/// Provenance column carrying the source sheet name
pub const SOURCE_SHEET_COLUMN: &str = "source_sheet";

/// Cleaning switches
#[derive(Debug, Clone, Default)]
pub struct CleaningOptions {
    pub drop_empty_rows: bool,
    pub add_provenance: bool,
    pub provenance_position: ProvenancePosition,
    /// Empty disables deduplication
    pub dedup_keys: Vec<String>,
}

impl From<&MergeConfig> for CleaningOptions {
    fn from(config: &MergeConfig) -> Self {
        Self {
            drop_empty_rows: config.drop_empty_rows,
            add_provenance: config.add_provenance_columns,
            provenance_position: config.provenance_position,
            dedup_keys: config.dedup_key_columns.clone(),
        }
    }
}

/// First-occurrence index over the dedup key projection of each row
#[derive(Debug, Clone)]
pub struct DedupIndex {
    key_positions: Vec<usize>,
    seen: HashSet<Vec<CellKey>>,
}

impl DedupIndex {
    /// Resolve key columns against `columns`, failing on the first missing one
    pub fn new(group: &str, columns: &[String], keys: &[String]) -> Result<Self> {
        let key_positions = keys
            .iter()
            .map(|key| {
                columns
                    .iter()
                    .position(|c| c == key)
                    .ok_or_else(|| Error::InvalidDedupKey {
                        group: group.to_string(),
                        column: key.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            key_positions,
            seen: HashSet::new(),
        })
    }

    /// True the first time a key is seen, false for every later duplicate
    pub fn first_occurrence(&mut self, row: &Row) -> bool {
        let key: Vec<CellKey> = self
            .key_positions
            .iter()
            .map(|&i| row.get(i).key())
            .collect();
        self.seen.insert(key)
    }
}

/// Streaming cleaner for one group's projected rows.
///
/// Construction validates dedup keys, so a misconfigured key fails before
/// any row is processed.
#[derive(Debug)]
pub struct Cleaner {
    columns: Vec<String>,
    drop_empty_rows: bool,
    provenance: Option<ProvenancePosition>,
    dedup: Option<DedupIndex>,
}

impl Cleaner {
    /// Build a cleaner for rows projected onto `unified`
    pub fn new(group: &str, unified: Vec<String>, options: &CleaningOptions) -> Result<Self> {
        let provenance = options.add_provenance.then_some(options.provenance_position);
        let columns = match provenance {
            Some(position) => with_provenance_columns(unified, position),
            None => unified,
        };

        let dedup = if options.dedup_keys.is_empty() {
            None
        } else {
            Some(DedupIndex::new(group, &columns, &options.dedup_keys)?)
        };

        Ok(Self {
            columns,
            drop_empty_rows: options.drop_empty_rows,
            provenance,
            dedup,
        })
    }

    /// Final column list, provenance included
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<String> {
        self.columns
    }

    /// Clean one projected row; `None` means the row is dropped
    pub fn process(&mut self, row: Row, source_file: &str, source_sheet: &str) -> Option<Row> {
        if self.drop_empty_rows && row.is_blank() {
            return None;
        }

        let row = match self.provenance {
            Some(position) => {
                let width = self.columns.len() - 2;
                let mut cells = row.cells;
                cells.resize(width, CellValue::Empty);
                let origin = [
                    CellValue::Text(source_file.to_string()),
                    CellValue::Text(source_sheet.to_string()),
                ];
                match position {
                    ProvenancePosition::Prepend => Row::new(origin.into_iter().chain(cells).collect()),
                    ProvenancePosition::Append => {
                        cells.extend(origin);
                        Row::new(cells)
                    }
                }
            }
            None => row,
        };

        if let Some(index) = self.dedup.as_mut() {
            if !index.first_occurrence(&row) {
                return None;
            }
        }
        Some(row)
    }
}

/// Add the two provenance columns, renaming them if the data already uses
/// those names
fn with_provenance_columns(unified: Vec<String>, position: ProvenancePosition) -> Vec<String> {
    let mut names = UniqueNames::new();
    for col in &unified {
        names.reserve(col);
    }
    let origin = [
        names.claim(SOURCE_FILE_COLUMN, 1),
        names.claim(SOURCE_SHEET_COLUMN, 1),
    ];

    match position {
        ProvenancePosition::Prepend => origin.into_iter().chain(unified).collect(),
        ProvenancePosition::Append => unified.into_iter().chain(origin).collect(),
    }
}
