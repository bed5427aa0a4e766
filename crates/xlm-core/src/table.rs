//! Core table types for representing ingested sheets

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One ingested sheet, immutable after the reader hands it over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// File the sheet was read from
    pub source_file: PathBuf,
    /// Sheet name inside that file
    pub source_sheet: String,
    /// Column names in header order, unique within the table
    pub columns: Vec<String>,
    /// Row data in on-disk order
    pub rows: Vec<Row>,
}

impl Table {
    /// Create a new empty table
    pub fn new(source_file: PathBuf, source_sheet: impl Into<String>) -> Self {
        Self {
            source_file,
            source_sheet: source_sheet.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// File name component of the source path, as written into provenance columns
    pub fn source_file_name(&self) -> String {
        self.source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_file.to_string_lossy().into_owned())
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// A row of data. Trailing cells may be omitted and read back as `Empty`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    /// Cell values by column position
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Create a new row
    pub fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }

    /// Get a cell value by column index; missing cells are `Empty`
    pub fn get(&self, index: usize) -> &CellValue {
        self.cells.get(index).unwrap_or(&EMPTY_CELL)
    }

    /// True when every cell is blank (or the row has no cells)
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(CellValue::is_blank)
    }
}

/// A cell value: closed over the kinds a spreadsheet cell can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Text value
    Text(String),
    /// Numeric value (integers included)
    Number(f64),
    /// Date or date-time value
    Date(NaiveDateTime),
    /// Empty/null cell
    Empty,
}

impl CellValue {
    /// Parse a text field into a CellValue, detecting numbers
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return CellValue::Empty;
        }

        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellValue::Number(n);
            }
        }

        CellValue::Text(trimmed.to_string())
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Empty, or text made only of whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Hashable comparison key used by deduplication
    pub fn key(&self) -> CellKey {
        match self {
            CellValue::Text(s) => CellKey::Text(s.clone()),
            CellValue::Number(n) => CellKey::Number(canonical_bits(*n)),
            CellValue::Date(d) => CellKey::Date(*d),
            CellValue::Empty => CellKey::Empty,
        }
    }

    /// Convert to a display string
    pub fn to_string_value(&self) -> String {
        self.to_string()
    }

    /// Approximate rendered width in character cells.
    ///
    /// CJK and other wide glyphs count double.
    pub fn display_width(&self) -> usize {
        match self {
            CellValue::Empty => 0,
            other => text_width(&other.to_string()),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Date(d) => {
                if d.hour() == 0 && d.minute() == 0 && d.second() == 0 && d.nanosecond() == 0 {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
            CellValue::Empty => write!(f, ""),
        }
    }
}

/// Exact-equality key for a cell.
///
/// Numbers compare by value with `-0.0 == 0.0` and all NaNs equal;
/// values of different kinds never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Text(String),
    Number(u64),
    Date(NaiveDateTime),
    Empty,
}

fn canonical_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

/// Width estimate for column sizing
pub fn text_width(s: &str) -> usize {
    s.chars()
        .map(|c| if (c as u32) >= 0x2E80 { 2 } else { 1 })
        .sum()
}
