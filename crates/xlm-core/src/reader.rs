//! Sheet reader: opens one input file and returns its sheets as tables
//!
//! Workbooks go through calamine (xlsx, xlsm, xls, xlsb, ods). Files with a
//! `.csv` extension are read as a single sheet named after the file stem.
//! Source files are only ever opened for reading.

use crate::error::{Error, Result};
use crate::names::make_unique_columns;
use crate::table::{CellValue, Row, Table};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

/// Read every requested sheet of a file.
///
/// `sheet_filter` of `None` means all sheets; otherwise only sheets whose
/// name is listed are returned, in workbook order.
pub fn read_tables(path: &Path, sheet_filter: Option<&[String]>) -> Result<Vec<Table>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    let tables = if is_csv {
        let table = parse_csv(path)?;
        if wanted(sheet_filter, &table.source_sheet) {
            vec![table]
        } else {
            Vec::new()
        }
    } else {
        read_workbook(path, sheet_filter)?
    };

    debug!(
        path = %path.display(),
        sheets = tables.len(),
        rows = tables.iter().map(Table::row_count).sum::<usize>(),
        "read file"
    );
    Ok(tables)
}

fn wanted(filter: Option<&[String]>, sheet: &str) -> bool {
    filter.map_or(true, |names| names.iter().any(|n| n == sheet))
}

fn corrupt(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::CorruptFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Read a workbook through calamine
pub fn read_workbook(path: &Path, sheet_filter: Option<&[String]>) -> Result<Vec<Table>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| corrupt(path, e))?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    let mut tables = Vec::new();
    for sheet_name in sheet_names {
        if !wanted(sheet_filter, &sheet_name) {
            continue;
        }
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| corrupt(path, format!("sheet '{}': {}", sheet_name, e)))?;

        let mut grid = range.rows();
        let table = match grid.next() {
            Some(header) => {
                let header: Vec<String> = header.iter().map(header_text).collect();
                let rows = grid.map(|cells| cells.iter().map(convert_cell).collect());
                build_table(path, &sheet_name, header, rows)
            }
            None => Table::new(path.to_path_buf(), sheet_name.as_str()),
        };
        tables.push(table);
    }

    Ok(tables)
}

/// Assemble a table from a raw header and raw cell rows.
///
/// Blank header cells become `Unnamed: <index>`; duplicates are numbered.
/// Trailing empty cells are dropped so sparse rows stay sparse.
fn build_table<I>(path: &Path, sheet: &str, header: Vec<String>, rows: I) -> Table
where
    I: Iterator<Item = Vec<CellValue>>,
{
    let raw_names: Vec<String> = header
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = name.trim();
            if name.is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                name.to_string()
            }
        })
        .collect();
    let columns = make_unique_columns(&raw_names);
    let width = columns.len();

    let rows = rows
        .enumerate()
        .map(|(row_idx, mut cells)| {
            if cells.len() > width {
                warn!(
                    path = %path.display(),
                    sheet,
                    row = row_idx + 2,
                    "row has more cells than header, truncating"
                );
                cells.truncate(width);
            }
            while cells.last().is_some_and(CellValue::is_empty) {
                cells.pop();
            }
            Row::new(cells)
        })
        .collect();

    Table {
        source_file: path.to_path_buf(),
        source_sheet: sheet.to_string(),
        columns,
        rows,
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => convert_cell(other).to_string(),
    }
}

/// Coerce a calamine cell into the closed cell model
pub fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => {
            if s.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) if dt.is_duration() => CellValue::Text(format_duration(dt.as_f64())),
        Data::DateTime(dt) => match cell.as_datetime() {
            Some(d) => CellValue::Date(d),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => match cell.as_datetime() {
            Some(d) => CellValue::Date(d),
            None => CellValue::Text(s.clone()),
        },
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

/// Render a duration serial (days) as `[h]:mm:ss`
fn format_duration(days: f64) -> String {
    let total = (days * 86_400.0).round() as i64;
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{}{}:{:02}:{:02}",
        sign,
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}

/// Parse a CSV file into a single-sheet table
pub fn parse_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let sheet = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Sheet1".to_string());

    parse_csv_reader(BufReader::new(file), path, &sheet)
}

/// Parse CSV from a string (useful for testing)
pub fn parse_csv_str(content: &str, source_name: &str) -> Result<Table> {
    let path = Path::new(source_name);
    let sheet = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Sheet1".to_string());
    parse_csv_reader(content.as_bytes(), path, &sheet)
}

fn parse_csv_reader<R: std::io::Read>(reader: R, path: &Path, sheet: &str) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header: Vec<String> = csv_reader
        .headers()
        .map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        records.push(record.iter().map(CellValue::parse).collect::<Vec<_>>());
    }

    if header.iter().all(|h| h.trim().is_empty()) && records.is_empty() {
        return Ok(Table::new(path.to_path_buf(), sheet));
    }

    Ok(build_table(path, sheet, header, records.into_iter()))
}
