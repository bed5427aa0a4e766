//! Parallel ingestion: runs the sheet reader over every input file on a
//! bounded worker pool and restores enumeration order afterwards.

use crate::config::{MergeConfig, WorkerKind};
use crate::error::{Error, Result};
use crate::progress::{CancelToken, ProgressEvent, ProgressSink};
use crate::reader::read_tables;
use crate::table::Table;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, warn};

/// Subcommand a process worker binary must implement
pub const WORKER_SUBCOMMAND: &str = "read-worker";

/// Knobs for the ingestion stage
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub worker_kind: WorkerKind,
    pub worker_count: usize,
    pub worker_program: Option<PathBuf>,
    pub sheet_filter: Option<Vec<String>>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            worker_kind: WorkerKind::Thread,
            worker_count: 1,
            worker_program: None,
            sheet_filter: None,
        }
    }
}

impl From<&MergeConfig> for IngestOptions {
    fn from(config: &MergeConfig) -> Self {
        Self {
            worker_kind: config.worker_kind,
            worker_count: config.worker_count.max(1),
            worker_program: config.worker_program.clone(),
            sheet_filter: config.sheet_filter.clone(),
        }
    }
}

/// An input file that was left out of the merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Output of the ingestion stage
#[derive(Debug, Default)]
pub struct Ingested {
    /// Tables in file order, then sheet order within a file
    pub tables: Vec<Table>,
    /// Files that failed to read, in file order
    pub skipped: Vec<SkippedFile>,
    /// Number of files read successfully
    pub files_read: usize,
}

/// Read every file, `worker_count` at a time.
///
/// Progress events are emitted in completion order; the returned tables are
/// in submission order regardless. A failed file is recorded and never
/// cancels its siblings. When `cancel` fires, files not yet started are
/// abandoned and the whole stage returns [`Error::Cancelled`].
pub fn ingest(
    files: &[PathBuf],
    options: &IngestOptions,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<Ingested> {
    let run_one = |(idx, path): (usize, &PathBuf)| -> (usize, Option<Result<Vec<Table>>>) {
        if cancel.is_cancelled() {
            return (idx, None);
        }
        (idx, Some(read_with_events(path, options, sink)))
    };

    let mut outcomes = match ThreadPoolBuilder::new()
        .num_threads(options.worker_count.max(1))
        .build()
    {
        Ok(pool) => pool.install(|| files.par_iter().enumerate().map(run_one).collect::<Vec<_>>()),
        Err(e) => {
            warn!(
                workers = options.worker_count,
                error = %e,
                "failed to initialize thread pool; reading serially"
            );
            files.iter().enumerate().map(run_one).collect::<Vec<_>>()
        }
    };

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    outcomes.sort_by_key(|(idx, _)| *idx);

    let mut ingested = Ingested::default();
    for (idx, outcome) in outcomes {
        match outcome {
            Some(Ok(tables)) => {
                ingested.files_read += 1;
                ingested.tables.extend(tables);
            }
            Some(Err(e)) => ingested.skipped.push(SkippedFile {
                path: files[idx].clone(),
                reason: e.to_string(),
            }),
            None => return Err(Error::Cancelled),
        }
    }

    Ok(ingested)
}

fn read_with_events(
    path: &Path,
    options: &IngestOptions,
    sink: &dyn ProgressSink,
) -> Result<Vec<Table>> {
    sink.emit(ProgressEvent::FileStarted {
        path: path.to_path_buf(),
    });
    let started = Instant::now();

    let result = match options.worker_kind {
        WorkerKind::Thread => read_tables(path, options.sheet_filter.as_deref()),
        WorkerKind::Process => read_in_child(path, options),
    };

    if let Err(e) = &result {
        warn!(path = %path.display(), error = %e, "skipping file");
        sink.emit(ProgressEvent::FileFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        });
    }
    sink.emit(ProgressEvent::FileCompleted {
        path: path.to_path_buf(),
        success: result.is_ok(),
        elapsed: started.elapsed(),
    });
    result
}

fn read_in_child(path: &Path, options: &IngestOptions) -> Result<Vec<Table>> {
    let worker_error = |message: String| Error::Worker {
        path: path.to_path_buf(),
        message,
    };

    let program = match &options.worker_program {
        Some(program) => program.clone(),
        None => std::env::current_exe()
            .map_err(|e| worker_error(format!("cannot locate worker executable: {}", e)))?,
    };

    let mut command = Command::new(&program);
    command.arg(WORKER_SUBCOMMAND).arg("--file").arg(path);
    for sheet in options.sheet_filter.iter().flatten() {
        command.arg("--sheet").arg(sheet);
    }
    debug!(program = %program.display(), path = %path.display(), "spawning read worker");

    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| worker_error(format!("failed to spawn '{}': {}", program.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("worker exited with {}", output.status)
        } else {
            stderr
        };
        return Err(Error::CorruptFile {
            path: path.to_path_buf(),
            message,
        });
    }

    decode_worker_output(path, &output.stdout)
}

/// Read a file and print its tables as JSON; the body of a process worker
pub fn write_worker_output<W: Write>(
    path: &Path,
    sheet_filter: Option<&[String]>,
    out: W,
) -> Result<()> {
    let tables = read_tables(path, sheet_filter)?;
    serde_json::to_writer(out, &tables)?;
    Ok(())
}

/// Rebuild tables from a worker's stdout
pub fn decode_worker_output(path: &Path, stdout: &[u8]) -> Result<Vec<Table>> {
    serde_json::from_slice(stdout).map_err(|e| Error::Worker {
        path: path.to_path_buf(),
        message: format!("invalid worker output: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    fn write_inputs(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for i in 0..6 {
            let path = dir.join(format!("f{}.csv", i));
            fs::write(&path, format!("id,val\n{},a\n{},b\n", i * 10, i * 10 + 1)).unwrap();
            files.push(path);
        }
        files
    }

    fn options(workers: usize) -> IngestOptions {
        IngestOptions {
            worker_count: workers,
            ..IngestOptions::default()
        }
    }

    #[test]
    fn test_order_independent_of_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_inputs(dir.path());
        let sink = Mutex::new(Vec::new());

        let serial = ingest(&files, &options(1), &sink, &CancelToken::new()).unwrap();
        let parallel = ingest(&files, &options(8), &sink, &CancelToken::new()).unwrap();

        assert_eq!(serial.tables, parallel.tables);
        let sources: Vec<_> = parallel.tables.iter().map(|t| t.source_file.clone()).collect();
        assert_eq!(sources, files);
    }

    #[test]
    fn test_failed_file_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = write_inputs(dir.path());
        let bad = dir.path().join("bad.xlsx");
        fs::write(&bad, b"garbage").unwrap();
        files.insert(2, bad.clone());
        let sink = Mutex::new(Vec::new());

        let result = ingest(&files, &options(4), &sink, &CancelToken::new()).unwrap();

        assert_eq!(result.files_read, 6);
        assert_eq!(result.tables.len(), 6);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].path, bad);

        let events = sink.into_inner().unwrap();
        let completed = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::FileCompleted { .. }))
            .count();
        assert_eq!(completed, files.len());
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::FileFailed { path, .. } if *path == bad
        )));
    }

    #[test]
    fn test_cancel_before_start_abandons_everything() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_inputs(dir.path());
        let sink = Mutex::new(Vec::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = ingest(&files, &options(2), &sink, &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(sink.into_inner().unwrap().is_empty());
    }

    #[test]
    fn test_empty_file_list() {
        let sink = Mutex::new(Vec::new());
        let result = ingest(&[], &options(2), &sink, &CancelToken::new()).unwrap();
        assert!(result.tables.is_empty());
        assert_eq!(result.files_read, 0);
    }

    #[test]
    fn test_missing_worker_program_skips_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_inputs(dir.path());
        let opts = IngestOptions {
            worker_kind: WorkerKind::Process,
            worker_count: 2,
            worker_program: Some(dir.path().join("no-such-worker")),
            sheet_filter: None,
        };
        let sink = Mutex::new(Vec::new());

        let result = ingest(&files[..2], &opts, &sink, &CancelToken::new()).unwrap();
        assert!(result.tables.is_empty());
        assert_eq!(result.skipped.len(), 2);
    }

    #[test]
    fn test_worker_output_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_inputs(dir.path());

        let mut buf = Vec::new();
        write_worker_output(&files[0], None, &mut buf).unwrap();
        let tables = decode_worker_output(&files[0], &buf).unwrap();
        assert_eq!(tables, read_tables(&files[0], None).unwrap());

        let err = decode_worker_output(&files[0], b"not json").unwrap_err();
        assert!(matches!(err, Error::Worker { .. }));
    }
}
