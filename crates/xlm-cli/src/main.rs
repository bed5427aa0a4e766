//! xlm CLI
//!
//! Command-line tool for merging a directory of spreadsheet workbooks into
//! a single xlsx file.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use xlm_core::{
    parse_field_list, read_tables, run_merge, scan_directory, write_worker_output, CancelToken,
    ColumnPolicy, MergeConfig, MergeMode, ProgressEvent, ProvenancePosition, WorkerKind,
    WriterBackend,
};

#[derive(Parser)]
#[command(name = "xlm")]
#[command(about = "Merge many spreadsheet files into one workbook", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge every matching workbook under a directory
    Merge(MergeArgs),

    /// List the files a merge would read
    Scan {
        /// Directory to scan
        #[arg(short, long, default_value = ".")]
        input: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recurse: bool,

        /// File extensions to match (comma-separated)
        #[arg(short, long, default_value = "xlsx")]
        ext: String,
    },

    /// Show the tables read from a single file
    Inspect {
        /// Workbook or CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Only read these sheets (repeatable)
        #[arg(short, long)]
        sheet: Vec<String>,

        /// Maximum number of rows to display per table
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Write a configuration file template with every option at its default
    InitConfig {
        /// Output path for the config file
        #[arg(short, long, default_value = "xlm.json")]
        output: PathBuf,
    },

    /// Read one file and print its tables as JSON (process worker entry point)
    #[command(name = "read-worker", hide = true)]
    ReadWorker {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        sheet: Vec<String>,
    },
}

#[derive(clap::Args)]
struct MergeArgs {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the input files
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file or directory
    #[arg(short, long)]
    output: Option<String>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recurse: bool,

    /// File extensions to match (comma-separated)
    #[arg(long)]
    ext: Option<String>,

    /// Only read these sheets (comma-separated)
    #[arg(long)]
    sheets: Option<String>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    #[arg(long, value_enum)]
    columns: Option<ColumnsArg>,

    /// Keep rows whose cells are all empty
    #[arg(long)]
    keep_empty_rows: bool,

    /// Do not add source_file/source_sheet columns
    #[arg(long)]
    no_provenance: bool,

    /// Place provenance columns after the data columns
    #[arg(long)]
    provenance_last: bool,

    /// Deduplicate on these columns (comma-separated)
    #[arg(long)]
    dedup: Option<String>,

    /// Number of files read concurrently
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Read each file in a child process instead of a thread
    #[arg(long)]
    process_workers: bool,

    /// Stream rows to disk instead of holding sheets in memory
    #[arg(long)]
    constant_memory: bool,

    /// Size columns to fit their content
    #[arg(long)]
    auto_width: bool,

    /// Print progress events and the final report as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// One output table holding every input table
    Stack,
    /// One output table per distinct sheet name
    PerSheet,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColumnsArg {
    Union,
    Intersection,
}

impl MergeArgs {
    fn into_config(self) -> xlm_core::Result<MergeConfig> {
        let mut config = match &self.config {
            Some(path) => MergeConfig::load(path)?,
            None => MergeConfig::default(),
        };

        if let Some(input) = self.input {
            config.input_directory = input;
        }
        if let Some(output) = self.output {
            config.output_path = PathBuf::from(output);
        }
        if self.recurse {
            config.recurse = true;
        }
        if let Some(ext) = self.ext {
            config.extension_filter = parse_field_list(&ext);
        }
        if let Some(sheets) = self.sheets {
            config.sheet_filter = Some(parse_field_list(&sheets));
        }
        if let Some(mode) = self.mode {
            config.merge_mode = match mode {
                ModeArg::Stack => MergeMode::Stack,
                ModeArg::PerSheet => MergeMode::PerSheetName,
            };
        }
        if let Some(columns) = self.columns {
            config.column_policy = match columns {
                ColumnsArg::Union => ColumnPolicy::Union,
                ColumnsArg::Intersection => ColumnPolicy::Intersection,
            };
        }
        if self.keep_empty_rows {
            config.drop_empty_rows = false;
        }
        if self.no_provenance {
            config.add_provenance_columns = false;
        }
        if self.provenance_last {
            config.provenance_position = ProvenancePosition::Append;
        }
        if let Some(dedup) = self.dedup {
            config.dedup_key_columns = parse_field_list(&dedup);
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if self.process_workers {
            config.worker_kind = WorkerKind::Process;
        }
        if self.constant_memory {
            config.writer_backend = WriterBackend::ConstantMemory;
        }
        if self.auto_width {
            config.auto_column_width = true;
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(io::stderr)
        .init();
}

fn run(command: Commands) -> xlm_core::Result<()> {
    match command {
        Commands::Merge(args) => cmd_merge(args),
        Commands::Scan { input, recurse, ext } => cmd_scan(&input, recurse, &ext),
        Commands::Inspect { file, sheet, limit } => cmd_inspect(&file, &sheet, limit),
        Commands::InitConfig { output } => cmd_init_config(&output),
        Commands::ReadWorker { file, sheet } => cmd_read_worker(&file, &sheet),
    }
}

fn cmd_merge(args: MergeArgs) -> xlm_core::Result<()> {
    let json = args.json;
    let config = args.into_config()?;
    debug!(?config, "resolved merge configuration");

    let (tx, rx) = mpsc::channel::<ProgressEvent>();
    let ui = thread::spawn(move || render_progress(rx, json));

    let result = run_merge(&config, &tx, &CancelToken::new());
    drop(tx);
    let _ = ui.join();
    let report = result?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

/// Drain engine events until the sender side is dropped
fn render_progress(rx: mpsc::Receiver<ProgressEvent>, json: bool) {
    let mut completed = 0usize;
    let stderr = io::stderr();
    for event in rx {
        let mut out = stderr.lock();
        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = writeln!(out, "{}", line);
            }
            continue;
        }
        let _ = match &event {
            ProgressEvent::FileStarted { .. } => continue,
            ProgressEvent::FileCompleted {
                path,
                success,
                elapsed,
            } => {
                completed += 1;
                let status = if *success { "ok" } else { "FAILED" };
                writeln!(
                    out,
                    "[{:>4}] {:<6} {} ({:.1?})",
                    completed,
                    status,
                    path.display(),
                    elapsed
                )
            }
            ProgressEvent::FileFailed { path, reason } => {
                writeln!(out, "       skipped {}: {}", path.display(), reason)
            }
            ProgressEvent::GroupWritten {
                name,
                row_count,
                shard_count,
            } => writeln!(
                out,
                "wrote group '{}': {} rows in {} sheet(s)",
                name, row_count, shard_count
            ),
            ProgressEvent::Done { output_path } => {
                writeln!(out, "saved {}", output_path.display())
            }
            ProgressEvent::Failed { reason } => writeln!(out, "merge failed: {}", reason),
        };
    }
}

fn cmd_scan(input: &Path, recurse: bool, ext: &str) -> xlm_core::Result<()> {
    let files = scan_directory(input, recurse, &parse_field_list(ext))?;

    println!("Scanned {}:", input.display());
    for file in &files {
        println!("  {}", file.display());
    }
    println!();
    println!("Found {} files", files.len());

    Ok(())
}

fn cmd_inspect(file: &Path, sheets: &[String], limit: usize) -> xlm_core::Result<()> {
    let filter = (!sheets.is_empty()).then_some(sheets);
    let tables = read_tables(file, filter)?;

    println!("File: {}", file.display());
    println!("Tables: {}", tables.len());

    for table in &tables {
        println!();
        println!(
            "[{}] {} columns, {} rows",
            table.source_sheet,
            table.column_count(),
            table.row_count()
        );
        println!("{}", table.columns.join("\t"));
        println!("{}", "-".repeat(table.column_count() * 12));

        for row in table.rows.iter().take(limit) {
            let values: Vec<String> = row.cells.iter().map(|c| c.to_string_value()).collect();
            println!("{}", values.join("\t"));
        }

        if table.row_count() > limit {
            println!("... ({} more rows)", table.row_count() - limit);
        }
    }

    Ok(())
}

fn cmd_init_config(output: &Path) -> xlm_core::Result<()> {
    MergeConfig::default().save(output)?;
    println!("Created config file: {}", output.display());
    println!();
    println!("Edit the file to configure your merge, then run:");
    println!("  xlm merge --config {}", output.display());

    Ok(())
}

fn cmd_read_worker(file: &Path, sheets: &[String]) -> xlm_core::Result<()> {
    let filter = (!sheets.is_empty()).then_some(sheets);
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    if let Err(e) = write_worker_output(file, filter, &mut out) {
        // the parent records stderr verbatim as the skip reason
        eprintln!("{}", e);
        std::process::exit(1);
    }
    out.flush()?;
    Ok(())
}
