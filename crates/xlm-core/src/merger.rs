//! Merge engine: drives enumeration, ingestion, grouping, cleaning and
//! writing for one run

use crate::cleaning::{Cleaner, CleaningOptions};
use crate::config::{resolve_output_path, ColumnPolicy, MergeConfig};
use crate::error::{Error, Result};
use crate::grouping::{group_tables, Group, GroupKey};
use crate::ingest::{ingest, IngestOptions};
use crate::names::UniqueNames;
use crate::progress::{CancelToken, ProgressEvent, ProgressSink};
use crate::report::{GroupReport, MergeReport};
use crate::scanner::FileEnumerator;
use crate::schema::{reconcile, Projection};
use crate::table::Row;
use crate::writer::{check_destination, write_group, XlsxWorkbookWriter, ROW_CAPACITY};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One group after reconciliation and cleaning, ready to be written
#[derive(Debug, Clone)]
pub struct MergedGroup {
    pub key: GroupKey,
    /// Final column list, provenance included
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Number of tables folded in
    pub members: usize,
}

impl MergedGroup {
    pub fn name(&self) -> &str {
        self.key.base_sheet_name()
    }
}

/// Fold a group's members into one table.
///
/// Members are consumed in order; each row is projected onto the unified
/// columns and then cleaned. With no unified data columns there is nothing
/// to project, so no rows are produced.
pub fn merge_group(
    group: Group,
    policy: ColumnPolicy,
    options: &CleaningOptions,
) -> Result<MergedGroup> {
    let unified = reconcile(&group.members, policy);
    let name = group.key.base_sheet_name().to_string();
    if unified.is_empty() && !group.members.is_empty() {
        warn!(group = %name, "no columns shared by every member; group will be empty");
    }

    let has_data_columns = !unified.is_empty();
    let mut cleaner = Cleaner::new(&name, unified.clone(), options)?;
    let members = group.members.len();
    let mut rows = Vec::with_capacity(group.row_count());

    for table in group.members {
        if !has_data_columns {
            continue;
        }
        let projection = Projection::new(&table.columns, &unified);
        let source_file = table.source_file_name();
        for row in table.rows {
            if let Some(row) = cleaner.process(projection.apply(row), &source_file, &table.source_sheet) {
                rows.push(row);
            }
        }
    }

    debug!(group = %name, members, rows = rows.len(), "merged group");
    Ok(MergedGroup {
        key: group.key,
        columns: cleaner.into_columns(),
        rows,
        members,
    })
}

/// Run a full merge described by `config`.
///
/// Per-file read failures are recorded in the report. Anything else aborts
/// the run before the output file is touched, and is reported to `sink` as
/// [`ProgressEvent::Failed`] as well as returned.
pub fn run_merge(
    config: &MergeConfig,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<MergeReport> {
    run_merge_with_capacity(config, sink, cancel, ROW_CAPACITY)
}

/// [`run_merge`] with a custom per-sheet row capacity
pub fn run_merge_with_capacity(
    config: &MergeConfig,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
    capacity: usize,
) -> Result<MergeReport> {
    let result = execute(config, sink, cancel, capacity);
    if let Err(e) = &result {
        sink.emit(ProgressEvent::Failed {
            reason: e.to_string(),
        });
    }
    result
}

fn execute(
    config: &MergeConfig,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
    capacity: usize,
) -> Result<MergeReport> {
    let started = Instant::now();
    config.validate()?;
    let output_path = resolve_output_path(&config.output_path.to_string_lossy())?;

    let files: Vec<PathBuf> = FileEnumerator::new(
        &config.input_directory,
        config.recurse,
        &config.extension_filter,
    )?
    .excluding(Some(output_path.clone()))
    .collect();
    info!(
        root = %config.input_directory.display(),
        files = files.len(),
        "enumerated input files"
    );

    let mut report = MergeReport {
        files_found: files.len(),
        ..MergeReport::default()
    };

    let ingested = ingest(&files, &IngestOptions::from(config), sink, cancel)?;
    report.files_read = ingested.files_read;
    report.skipped = ingested.skipped;

    if ingested.tables.is_empty() {
        info!("nothing to merge; no output written");
        report.elapsed = started.elapsed();
        return Ok(report);
    }

    let cleaning = CleaningOptions::from(config);
    let merged = group_tables(ingested.tables, config.merge_mode)
        .into_iter()
        .map(|group| merge_group(group, config.column_policy, &cleaning))
        .collect::<Result<Vec<_>>>()?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    check_destination(&output_path)?;
    let mut writer = XlsxWorkbookWriter::new(&output_path, config.writer_backend);
    let mut sheet_names = UniqueNames::case_insensitive();
    for group in merged {
        let shards = write_group(
            &mut writer,
            &mut sheet_names,
            group.name(),
            &group.columns,
            &group.rows,
            capacity,
            config.auto_column_width,
        )?;
        info!(
            group = %group.name(),
            rows = group.rows.len(),
            sheets = shards.len(),
            "wrote group"
        );
        sink.emit(ProgressEvent::GroupWritten {
            name: group.name().to_string(),
            row_count: group.rows.len(),
            shard_count: shards.len(),
        });
        report.groups.push(GroupReport {
            name: group.name().to_string(),
            members: group.members,
            columns: group.columns.len(),
            row_count: group.rows.len(),
            shards,
        });
    }

    let saved = writer.save()?;
    sink.emit(ProgressEvent::Done {
        output_path: saved.clone(),
    });
    report.output_path = Some(saved);
    report.elapsed = started.elapsed();
    info!("{}", report.format("merge finished:"));
    Ok(report)
}
