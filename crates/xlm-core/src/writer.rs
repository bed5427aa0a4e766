//! Output sharding writer
//!
//! Splits a group's rows into sheets of at most `capacity` data rows, each
//! with its own header row, and hands them to a [`SheetSink`]. The xlsx
//! sink writes through rust_xlsxwriter into a temporary file that replaces
//! the destination only after a successful save.

use crate::config::WriterBackend;
use crate::error::{Error, Result};
use crate::names::{safe_sheet_title, UniqueNames};
use crate::report::ShardReport;
use crate::table::{text_width, CellValue, Row};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fs::{self, OpenOptions};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rows addressable in one xlsx worksheet
pub const EXCEL_MAX_ROWS: usize = 1_048_576;
/// Data rows per sheet; one row is reserved for the header
pub const ROW_CAPACITY: usize = EXCEL_MAX_ROWS - 1;
/// Columns addressable in one xlsx worksheet
pub const EXCEL_MAX_COLS: usize = 16_384;
/// Longest string a cell may hold
pub const EXCEL_MAX_STRING_LEN: usize = 32_767;
/// Upper bound for auto-sized columns
pub const MAX_COLUMN_WIDTH: usize = 60;
/// Rows per sheet inspected when sizing columns
pub const AUTO_WIDTH_SAMPLE_ROWS: usize = 200;

/// Destination for physical sheets
pub trait SheetSink {
    /// Write one sheet: a header row from `columns`, then `rows` in order
    fn write_sheet(
        &mut self,
        name: &str,
        columns: &[String],
        rows: &[Row],
        widths: Option<&[f64]>,
    ) -> Result<()>;
}

/// Consecutive, non-overlapping row ranges of at most `capacity` rows.
///
/// An empty group still gets one (header-only) range.
pub fn shard_ranges(total: usize, capacity: usize) -> Vec<Range<usize>> {
    let capacity = capacity.max(1);
    if total == 0 {
        return vec![0..0];
    }
    (0..total)
        .step_by(capacity)
        .map(|start| start..(start + capacity).min(total))
        .collect()
}

/// Column widths from the header and the first sampled rows, capped at
/// [`MAX_COLUMN_WIDTH`]
pub fn auto_column_widths(columns: &[String], rows: &[Row]) -> Vec<f64> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let widest = rows
                .iter()
                .take(AUTO_WIDTH_SAMPLE_ROWS)
                .map(|row| row.get(idx).display_width())
                .fold(text_width(name), usize::max);
            (widest + 2).min(MAX_COLUMN_WIDTH) as f64
        })
        .collect()
}

/// Write one group as one or more sheets named `<base>`, `<base>_2`, ...
///
/// Names are claimed in `sheet_names`, so collisions with other groups'
/// sheets get the next free suffix.
pub fn write_group<S: SheetSink>(
    sink: &mut S,
    sheet_names: &mut UniqueNames,
    base_name: &str,
    columns: &[String],
    rows: &[Row],
    capacity: usize,
    auto_width: bool,
) -> Result<Vec<ShardReport>> {
    let mut shards = Vec::new();
    for (idx, range) in shard_ranges(rows.len(), capacity).into_iter().enumerate() {
        let desired = if idx == 0 {
            safe_sheet_title(base_name, "")
        } else {
            safe_sheet_title(base_name, &format!("_{}", idx + 1))
        };
        let sheet_name = sheet_names.claim_with(&desired, 2, |b, n| {
            safe_sheet_title(b, &format!("_{}", n))
        });

        let chunk = &rows[range];
        let widths = auto_width.then(|| auto_column_widths(columns, chunk));
        sink.write_sheet(&sheet_name, columns, chunk, widths.as_deref())?;
        debug!(sheet = %sheet_name, rows = chunk.len(), "wrote sheet");

        shards.push(ShardReport {
            sheet_name,
            row_count: chunk.len(),
        });
    }
    Ok(shards)
}

/// Fail early when the destination cannot be replaced, e.g. because it is
/// held open by another program
pub fn check_destination(path: &Path) -> Result<()> {
    if path.exists() {
        OpenOptions::new().append(true).open(path).map_err(|e| Error::Write {
            path: path.to_path_buf(),
            message: format!("output file is in use or read-only: {}", e),
        })?;
    }
    Ok(())
}

/// Sibling path the workbook is written to before the final rename
pub fn staging_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "merged".to_string());
    path.with_file_name(format!("{}.__writing__.xlsx", stem))
}

/// xlsx sink backed by rust_xlsxwriter
pub struct XlsxWorkbookWriter {
    path: PathBuf,
    workbook: Workbook,
    backend: WriterBackend,
    header_format: Format,
    date_format: Format,
}

impl XlsxWorkbookWriter {
    pub fn new(path: impl Into<PathBuf>, backend: WriterBackend) -> Self {
        Self {
            path: path.into(),
            workbook: Workbook::new(),
            backend,
            header_format: Format::new().set_bold(),
            date_format: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, err: impl std::fmt::Display) -> Error {
        Error::Write {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }

    /// Save to the staging file, then move it over the destination.
    ///
    /// On failure the staging file is removed and the destination is left
    /// untouched.
    pub fn save(mut self) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }
        let staging = staging_path(&self.path);
        if staging.exists() {
            let _ = fs::remove_file(&staging);
        }

        let saved = self
            .workbook
            .save(&staging)
            .map_err(|e| self.write_error(e))
            .and_then(|_| fs::rename(&staging, &self.path).map_err(|e| self.write_error(e)));

        if let Err(e) = saved {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        Ok(self.path)
    }
}

impl SheetSink for XlsxWorkbookWriter {
    fn write_sheet(
        &mut self,
        name: &str,
        columns: &[String],
        rows: &[Row],
        widths: Option<&[f64]>,
    ) -> Result<()> {
        if columns.len() > EXCEL_MAX_COLS {
            return Err(self.write_error(format!(
                "sheet '{}' has {} columns, more than the format allows ({})",
                name,
                columns.len(),
                EXCEL_MAX_COLS
            )));
        }
        if rows.len() > ROW_CAPACITY {
            return Err(self.write_error(format!(
                "sheet '{}' has {} rows, more than the format allows ({})",
                name,
                rows.len(),
                ROW_CAPACITY
            )));
        }

        let path = self.path.clone();
        let xlsx_err = |e: XlsxError| Error::Write {
            path: path.clone(),
            message: format!("sheet '{}': {}", name, e),
        };

        let worksheet = match self.backend {
            WriterBackend::Buffered => self.workbook.add_worksheet(),
            WriterBackend::ConstantMemory => self.workbook.add_worksheet_with_constant_memory(),
        };
        worksheet.set_name(name).map_err(xlsx_err)?;

        if let Some(widths) = widths {
            for (col, width) in widths.iter().enumerate() {
                worksheet
                    .set_column_width(col as u16, *width)
                    .map_err(xlsx_err)?;
            }
        }

        for (col, header) in columns.iter().enumerate() {
            worksheet
                .write_string_with_format(0, col as u16, clip(header), &self.header_format)
                .map_err(xlsx_err)?;
        }
        if !columns.is_empty() {
            worksheet.set_freeze_panes(1, 0).map_err(xlsx_err)?;
        }

        for (idx, row) in rows.iter().enumerate() {
            let row_num = (idx + 1) as u32;
            for (col, cell) in row.cells.iter().take(columns.len()).enumerate() {
                let col = col as u16;
                match cell {
                    CellValue::Text(s) => {
                        worksheet
                            .write_string(row_num, col, clip(s))
                            .map_err(xlsx_err)?;
                    }
                    CellValue::Number(n) if n.is_finite() => {
                        worksheet.write_number(row_num, col, *n).map_err(xlsx_err)?;
                    }
                    CellValue::Number(n) => {
                        worksheet
                            .write_string(row_num, col, n.to_string())
                            .map_err(xlsx_err)?;
                    }
                    CellValue::Date(d) => {
                        worksheet
                            .write_datetime_with_format(row_num, col, d, &self.date_format)
                            .map_err(xlsx_err)?;
                    }
                    CellValue::Empty => {}
                }
            }
        }
        Ok(())
    }
}

fn clip(s: &str) -> &str {
    match s.char_indices().nth(EXCEL_MAX_STRING_LEN) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sheets captured in memory
    #[derive(Default)]
    struct MemorySink {
        sheets: Vec<(String, Vec<String>, Vec<Row>, Option<Vec<f64>>)>,
    }

    impl SheetSink for MemorySink {
        fn write_sheet(
            &mut self,
            name: &str,
            columns: &[String],
            rows: &[Row],
            widths: Option<&[f64]>,
        ) -> Result<()> {
            self.sheets.push((
                name.to_string(),
                columns.to_vec(),
                rows.to_vec(),
                widths.map(<[f64]>::to_vec),
            ));
            Ok(())
        }
    }

    fn numbered_rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(vec![CellValue::Number(i as f64)]))
            .collect()
    }

    #[test]
    fn test_shard_ranges() {
        assert_eq!(shard_ranges(0, 3), vec![0..0]);
        assert_eq!(shard_ranges(3, 3), vec![0..3]);
        assert_eq!(shard_ranges(7, 3), vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn test_sharding_law() {
        let columns = vec!["n".to_string()];
        for (total, capacity) in [(1, 1), (10, 3), (9, 3), (5, 10)] {
            let rows = numbered_rows(total);
            let mut sink = MemorySink::default();
            let mut names = UniqueNames::case_insensitive();
            let shards =
                write_group(&mut sink, &mut names, "merged", &columns, &rows, capacity, false)
                    .unwrap();

            assert_eq!(shards.len(), total.div_ceil(capacity));
            let rejoined: Vec<Row> = sink.sheets.iter().flat_map(|s| s.2.clone()).collect();
            assert_eq!(rejoined, rows);
            assert!(sink.sheets.iter().all(|s| s.1 == columns));
        }
    }

    #[test]
    fn test_shard_names() {
        let columns = vec!["n".to_string()];
        let mut sink = MemorySink::default();
        let mut names = UniqueNames::case_insensitive();
        let shards =
            write_group(&mut sink, &mut names, "merged", &columns, &numbered_rows(5), 2, false)
                .unwrap();
        let names_written: Vec<_> = shards.iter().map(|s| s.sheet_name.as_str()).collect();
        assert_eq!(names_written, vec!["merged", "merged_2", "merged_3"]);
        assert_eq!(shards[2].row_count, 1);
    }

    #[test]
    fn test_group_names_do_not_collide() {
        let columns = vec!["n".to_string()];
        let mut sink = MemorySink::default();
        let mut names = UniqueNames::case_insensitive();
        write_group(&mut sink, &mut names, "Jan", &columns, &numbered_rows(3), 2, false).unwrap();
        let shards =
            write_group(&mut sink, &mut names, "jan_2", &columns, &numbered_rows(1), 2, false)
                .unwrap();
        assert_eq!(shards[0].sheet_name, "jan_2_2");
    }

    #[test]
    fn test_auto_widths_capped() {
        let columns = vec!["id".to_string(), "note".to_string()];
        let rows = vec![Row::new(vec![
            CellValue::Number(12345.0),
            CellValue::Text("x".repeat(500)),
        ])];
        let widths = auto_column_widths(&columns, &rows);
        assert_eq!(widths, vec![7.0, MAX_COLUMN_WIDTH as f64]);
    }

    #[test]
    fn test_clip_long_strings() {
        let long = "é".repeat(EXCEL_MAX_STRING_LEN + 5);
        assert_eq!(clip(&long).chars().count(), EXCEL_MAX_STRING_LEN);
        assert_eq!(clip("short"), "short");
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/tmp/out/report.xlsx")),
            PathBuf::from("/tmp/out/report.__writing__.xlsx")
        );
    }

    #[test]
    fn test_xlsx_writer_saves_and_cleans_staging() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out.xlsx");
        let mut writer = XlsxWorkbookWriter::new(&out, WriterBackend::Buffered);
        let columns = vec!["a".to_string()];
        writer
            .write_sheet("merged", &columns, &numbered_rows(2), Some(&[4.0]))
            .unwrap();
        let saved = writer.save().unwrap();

        assert_eq!(saved, out);
        assert!(out.exists());
        assert!(!staging_path(&out).exists());
    }

    #[test]
    fn test_failed_rename_leaves_destination_alone() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.xlsx");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("keep.txt"), "still here").unwrap();

        let mut writer = XlsxWorkbookWriter::new(&out, WriterBackend::Buffered);
        writer
            .write_sheet("merged", &["a".to_string()], &numbered_rows(2), None)
            .unwrap();
        let err = writer.save().unwrap_err();

        assert!(matches!(err, Error::Write { ref path, .. } if *path == out));
        assert!(out.is_dir());
        assert_eq!(fs::read_to_string(out.join("keep.txt")).unwrap(), "still here");
        assert!(!staging_path(&out).exists());
    }

    #[test]
    fn test_invalid_sheet_name_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = XlsxWorkbookWriter::new(dir.path().join("o.xlsx"), WriterBackend::Buffered);
        let err = writer
            .write_sheet("bad[name]", &[], &[], None)
            .unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
    }
}
