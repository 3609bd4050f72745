//! mediasort - Command-line interface for the media sorting engine.
//!
//! Copies or moves photos and videos from a source folder into
//! `<target>/<YYYY>/<MM. Month>/` with descriptive, timestamped file names.
//! Progress and errors go to stderr.

mod logging;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use engine::{
    create_job, plan_job, run_job, CancellationToken, ChecksumAlgorithm, EngineError,
    ExifMetadataResolver, FsMetadataResolver, JobOptions, MetadataResolver, Mode,
    ProgressCallback, ProgressSnapshot, RunSummary, SortJob, TransferOutcome,
};
use tracing::warn;

/// Minimum file size when neither the command line nor a config file sets one
const DEFAULT_MIN_SIZE: u64 = 2048;

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

/// mediasort - Sort photos and videos into a year/month folder tree
#[derive(Parser, Debug)]
#[command(name = "mediasort")]
#[command(version)]
#[command(about = "Sort photos and videos into a year/month folder tree")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy files; the source stays untouched
    Copy(SortArgs),
    /// Move files; the source is removed after each transfer
    Move(SortArgs),
}

impl Command {
    fn parts(&self) -> (Mode, &SortArgs) {
        match self {
            Command::Copy(args) => (Mode::Copy, args),
            Command::Move(args) => (Mode::Move, args),
        }
    }
}

#[derive(clap::Args, Debug)]
struct SortArgs {
    /// Source folder
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Target root folder
    #[arg(value_name = "TARGET")]
    target: PathBuf,

    /// File name pattern, e.g. "*.jpg" [default: *.*]
    #[arg(short = 'p', long, value_name = "GLOB")]
    pattern: Option<String>,

    /// Descend into subfolders
    #[arg(short, long)]
    recursive: bool,

    /// Replace existing files instead of adding " (n)" suffixes
    #[arg(short, long)]
    overwrite: bool,

    /// Prefix for every target file name
    #[arg(short = 'f', long, value_name = "TEXT")]
    prefix: Option<String>,

    /// Skip files smaller than this [default: 2048]
    #[arg(short = 'm', long = "min-size", value_name = "BYTES")]
    min_size: Option<u64>,

    /// Worker threads [default: number of CPUs]
    #[arg(short = 'j', long, value_name = "N")]
    workers: Option<usize>,

    /// Add GPS coordinates to photo names
    #[arg(long)]
    gps: bool,

    /// Leave image and video dimensions out of names
    #[arg(long)]
    no_dimensions: bool,

    /// Locale for month folder names, e.g. de_DE [default: en_US]
    #[arg(long, value_name = "LOCALE")]
    locale: Option<String>,

    /// Start immediately instead of counting files first
    #[arg(long)]
    no_precount: bool,

    /// Report a digest of every source file: sha256 or blake3
    #[arg(long, value_name = "ALGORITHM")]
    hash: Option<ChecksumAlgorithm>,

    /// Read EXIF tags from photos (default)
    #[arg(long, overrides_with = "no_exif")]
    exif: bool,

    /// Use file system timestamps only
    #[arg(long, overrides_with = "exif")]
    no_exif: bool,

    /// TOML file with job options; command-line flags take precedence
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print every file and debug logs
    #[arg(short, long)]
    verbose: bool,
}

/// CLI implementation of ProgressCallback for displaying sorting progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Mutex<Option<Instant>>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            last_progress_update: Mutex::new(None),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        let percent = percent.min(100);
        let filled = (percent / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    // Throttle progress updates to avoid spam (max once per 200ms)
    fn should_redraw(&self, progress: &ProgressSnapshot) -> bool {
        if progress.processed >= progress.total {
            return true;
        }
        let mut last = self
            .last_progress_update
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *last {
            Some(at) if at.elapsed() < Duration::from_millis(200) => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_run_started(&self, job: &SortJob) {
        eprintln!("Preparing {}...", job.options.mode.to_string().to_lowercase());
        eprintln!("  Source: {}", job.options.source.display());
        eprintln!("  Target: {}", job.options.target.display());
        eprintln!("  Mode: {}", job.options.mode);
        match job.planned_total {
            Some(total) => eprintln!("  Total: {} files", total),
            None => eprintln!("  Total: counting as we go"),
        }
        eprintln!();
    }

    fn on_error(&self, error: &EngineError) {
        if !error.is_cancelled() {
            eprintln!("\rError: {}", describe(error));
        }
    }

    fn on_file_completed(&self, outcome: &TransferOutcome, progress: &ProgressSnapshot) {
        if self.verbose {
            let name = outcome.candidate.file_name();
            match (&outcome.destination, outcome.is_success()) {
                (Some(destination), true) => {
                    eprintln!("[{:4}] Done: {} -> {}", progress.processed, name, destination.display())
                }
                _ => eprintln!("[{:4}] Failed: {}", progress.processed, name),
            }
            return;
        }

        if !self.should_redraw(progress) {
            return;
        }
        eprint!(
            "\rProgress: {} | {}/{} files | {}",
            Self::print_progress_bar(progress.percent() as u32),
            progress.processed,
            progress.total,
            Self::format_bytes(progress.bytes_transferred)
        );
        std::io::Write::flush(&mut std::io::stderr()).ok();
    }

    fn on_run_completed(&self, summary: &RunSummary) {
        eprintln!();
        if summary.cancelled {
            eprintln!("Cancelled.");
        } else {
            eprintln!("Sorting complete!");
        }
        eprintln!(
            "Summary: {} found, {} succeeded, {} failed",
            summary.discovered, summary.succeeded, summary.failed
        );
        eprintln!("Bytes transferred: {}", Self::format_bytes(summary.bytes_transferred));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

/// Error message with its source chain, e.g. "Failed to read file: x: Permission denied".
fn describe(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn load_config(path: &Path) -> Result<JobOptions, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

/// Config file first, then command-line overrides.
fn build_options(mode: Mode, args: &SortArgs) -> Result<JobOptions, String> {
    let mut options = match &args.config {
        Some(path) => load_config(path)?,
        None => JobOptions {
            min_file_size: DEFAULT_MIN_SIZE,
            ..JobOptions::default()
        },
    };

    options.source = args.source.clone();
    options.target = args.target.clone();
    options.mode = mode;

    if let Some(pattern) = &args.pattern {
        options.pattern = pattern.clone();
    }
    if args.recursive {
        options.recursive = true;
    }
    if args.overwrite {
        options.overwrite = true;
    }
    if let Some(prefix) = &args.prefix {
        options.naming.prefix = Some(prefix.clone());
    }
    if let Some(min_size) = args.min_size {
        options.min_file_size = min_size;
    }
    if let Some(workers) = args.workers {
        options.workers = Some(workers);
    }
    if args.gps {
        options.naming.include_gps = true;
    }
    if args.no_dimensions {
        options.naming.include_dimensions = false;
    }
    if let Some(locale) = &args.locale {
        options.naming.month_locale = locale.clone();
    }
    if let Some(hash) = args.hash {
        options.checksum = Some(hash);
    }

    Ok(options)
}

/// Parse and validate command-line arguments, then run the job
fn main() {
    let cli = Cli::parse();
    let (_, args) = cli.command.parts();
    logging::init_logging(args.verbose);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            warn!(error = %e, "Ctrl-C handler not installed");
        }
    }

    let exit_code = match run_cli(&cli, &cancel) {
        Ok(summary) if summary.cancelled => EXIT_CANCELLED,
        Ok(_) => EXIT_OK,
        Err(_) if cancel.is_cancelled() => EXIT_CANCELLED,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            EXIT_FAILURE
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
///
/// Per-file failures are reported but still return `Ok`; only problems that
/// stop the run from starting are errors.
fn run_cli(cli: &Cli, cancel: &CancellationToken) -> Result<RunSummary, String> {
    let (mode, args) = cli.command.parts();
    let options = build_options(mode, args)?;

    let resolver: Arc<dyn MetadataResolver> = if args.no_exif {
        Arc::new(FsMetadataResolver)
    } else {
        Arc::new(ExifMetadataResolver)
    };

    let mut job =
        create_job(options, resolver).map_err(|e| format!("Job creation failed: {}", describe(&e)))?;

    if !args.no_precount {
        plan_job(&mut job, cancel).map_err(|e| format!("Counting files failed: {}", describe(&e)))?;
    }

    let progress = CliProgress::new(args.verbose);
    run_job(&job, cancel, Some(&progress)).map_err(|e| format!("Run failed: {}", describe(&e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    fn write_file(dir: &Path, name: &str, size: usize) {
        fs::write(dir.join(name), vec![b'x'; size]).expect("Failed to write file");
    }

    #[test]
    fn test_parse_copy_with_defaults() {
        let cli = parse(&["mediasort", "copy", "/in", "/out"]);
        let (mode, args) = cli.command.parts();
        assert_eq!(mode, Mode::Copy);

        let options = build_options(mode, args).expect("options");
        assert_eq!(options.source, PathBuf::from("/in"));
        assert_eq!(options.target, PathBuf::from("/out"));
        assert_eq!(options.pattern, "*.*");
        assert_eq!(options.min_file_size, 2048);
        assert!(!options.recursive);
        assert!(!options.overwrite);
        assert!(options.naming.include_dimensions);
        assert!(!args.no_exif);
    }

    #[test]
    fn test_parse_move_with_short_flags() {
        let cli = parse(&[
            "mediasort", "move", "/in", "/out", "-p", "*.jpg", "-r", "-o", "-f", "Trip", "-m", "0",
            "-j", "3",
        ]);
        let (mode, args) = cli.command.parts();
        assert_eq!(mode, Mode::Move);

        let options = build_options(mode, args).expect("options");
        assert_eq!(options.pattern, "*.jpg");
        assert!(options.recursive);
        assert!(options.overwrite);
        assert_eq!(options.naming.prefix.as_deref(), Some("Trip"));
        assert_eq!(options.min_file_size, 0);
        assert_eq!(options.workers, Some(3));
    }

    #[test]
    fn test_parse_naming_and_hash_flags() {
        let cli = parse(&[
            "mediasort", "copy", "/in", "/out", "--gps", "--no-dimensions", "--locale", "de_DE",
            "--hash", "blake3", "--no-exif",
        ]);
        let (mode, args) = cli.command.parts();
        let options = build_options(mode, args).expect("options");

        assert!(options.naming.include_gps);
        assert!(!options.naming.include_dimensions);
        assert_eq!(options.naming.month_locale, "de_DE");
        assert_eq!(options.checksum, Some(ChecksumAlgorithm::Blake3));
        assert!(args.no_exif);
    }

    #[test]
    fn test_exif_flag_overrides_no_exif() {
        let cli = parse(&["mediasort", "copy", "/in", "/out", "--no-exif", "--exif"]);
        let (_, args) = cli.command.parts();
        assert!(!args.no_exif);
    }

    #[test]
    fn test_parse_rejects_unknown_hash_and_missing_target() {
        assert!(Cli::try_parse_from(["mediasort", "copy", "/in", "/out", "--hash", "md5"]).is_err());
        assert!(Cli::try_parse_from(["mediasort", "copy", "/in"]).is_err());
        assert!(Cli::try_parse_from(["mediasort", "sync", "/in", "/out"]).is_err());
    }

    #[test]
    fn test_config_file_then_overrides() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = dir.path().join("mediasort.toml");
        fs::write(
            &config,
            "pattern = \"*.heic\"\nrecursive = true\nmin_file_size = 10\nworkers = 2\n\n[naming]\nprefix = \"Family\"\ninclude_gps = true\n",
        )
        .expect("Failed to write config");

        let config_arg = config.to_string_lossy().into_owned();
        let cli = parse(&["mediasort", "copy", "/in", "/out", "-c", &config_arg, "-m", "99"]);
        let (mode, args) = cli.command.parts();
        let options = build_options(mode, args).expect("options");

        assert_eq!(options.pattern, "*.heic");
        assert!(options.recursive);
        assert_eq!(options.workers, Some(2));
        assert_eq!(options.naming.prefix.as_deref(), Some("Family"));
        assert!(options.naming.include_gps);
        assert!(options.naming.include_dimensions);
        // Command line wins
        assert_eq!(options.min_file_size, 99);
        assert_eq!(options.source, PathBuf::from("/in"));
    }

    #[test]
    fn test_bad_config_is_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = dir.path().join("broken.toml");
        fs::write(&config, "recursive = \"sometimes\"").expect("Failed to write config");

        let config_arg = config.to_string_lossy().into_owned();
        let cli = parse(&["mediasort", "copy", "/in", "/out", "--config", &config_arg]);
        let (mode, args) = cli.command.parts();
        assert!(build_options(mode, args).is_err());
    }

    #[test]
    fn test_cli_with_valid_directories() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        write_file(src_dir.path(), "photo.jpg", 4096);
        write_file(src_dir.path(), "tiny.jpg", 10);

        let src = src_dir.path().to_string_lossy().into_owned();
        let dst = dst_dir.path().to_string_lossy().into_owned();
        let cli = parse(&["mediasort", "copy", &src, &dst, "--no-exif"]);

        let summary = run_cli(&cli, &CancellationToken::new()).expect("CLI should succeed");
        assert_eq!(summary.discovered, 1, "tiny.jpg is below the default minimum size");
        assert_eq!(summary.succeeded, 1);
        assert!(src_dir.path().join("photo.jpg").exists());
    }

    #[test]
    fn test_cli_without_precount() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        write_file(src_dir.path(), "a.txt", 5);

        let src = src_dir.path().to_string_lossy().into_owned();
        let dst = dst_dir.path().to_string_lossy().into_owned();
        let cli = parse(&["mediasort", "move", &src, &dst, "-m", "0", "--no-precount"]);

        let summary = run_cli(&cli, &CancellationToken::new()).expect("CLI should succeed");
        assert_eq!(summary.succeeded, 1);
        assert!(!src_dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let dst = dst_dir.path().to_string_lossy().into_owned();
        let cli = parse(&["mediasort", "copy", "/nonexistent/path", &dst]);

        let result = run_cli(&cli, &CancellationToken::new());
        assert!(result.is_err(), "CLI should reject missing source");
    }

    #[test]
    fn test_cli_rejects_invalid_locale() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let src = src_dir.path().to_string_lossy().into_owned();
        let dst = dst_dir.path().to_string_lossy().into_owned();
        let cli = parse(&["mediasort", "copy", &src, &dst, "--locale", "zz_ZZ"]);

        assert!(run_cli(&cli, &CancellationToken::new()).is_err());
    }

    #[test]
    fn test_progress_bar_and_formatting() {
        assert_eq!(CliProgress::print_progress_bar(50), "[==========          ] 50%");
        assert_eq!(CliProgress::print_progress_bar(140), "[====================] 100%");
        assert_eq!(CliProgress::format_bytes(2048), "2.00 KB");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_describe_includes_source() {
        let error = EngineError::ReadError {
            path: PathBuf::from("a.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(describe(&error), "Failed to read file: a.jpg: denied");
    }
}
