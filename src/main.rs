use clap::Parser;
use fast_deltree::error::{Error, FailedItem};
use fast_deltree::{fsops, safety, Deleter, DeleterConfig, DeletionReport};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "fast-deltree")]
#[command(version)]
#[command(about = "Fast parallel recursive directory deletion")]
#[command(after_help = "EXAMPLES:\n  \
  fast-deltree ./node_modules          Delete a directory tree\n  \
  fast-deltree -t 8 ./target           Delete with 8 worker threads\n  \
  fast-deltree -v --stats ./dist       Delete with progress logging and statistics\n  \
  fast-deltree dir1 dir2 dir3          Delete multiple directories")]
struct Args {
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(
        short = 'f',
        long = "force",
        help = "Ignore nonexistent paths and skip overridable safety warnings"
    )]
    force: bool,

    #[arg(
        short = 't',
        long,
        help = "Number of worker threads (default: CPU count)"
    )]
    threads: Option<usize>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Explain what is being done (repeat for more detail)"
    )]
    verbose: u8,

    #[arg(long = "stats", help = "Show detailed statistics")]
    stats: bool,

    #[arg(long = "no-preserve-root", help = "Do not refuse system directories")]
    no_preserve_root: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("fast-deltree: {}", e);
    }

    // `run` has already reported each failed path.
    if let Err(e) = run(args) {
        process::exit(e.exit_code());
    }
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

fn run(args: Args) -> Result<(), Error> {
    let mut total_stats = DeletionStats::default();
    let mut last_error = None;

    for path in &args.paths {
        match process_path(path, &args) {
            Ok(stats) => total_stats.merge(&stats),
            Err(e) => {
                eprintln!("fast-deltree: cannot remove '{}': {}", path.display(), e);
                print_failed_items(e.failed_items());
                last_error = Some(e);
            }
        }
    }

    if args.stats {
        print_summary(&total_stats);
    }

    match last_error {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

#[derive(Default)]
struct DeletionStats {
    dirs_deleted: usize,
    files_deleted: usize,
    total_time: Duration,
}

impl DeletionStats {
    fn merge(&mut self, other: &DeletionStats) {
        self.dirs_deleted += other.dirs_deleted;
        self.files_deleted += other.files_deleted;
        self.total_time += other.total_time;
    }

    fn total_items(&self) -> usize {
        self.dirs_deleted + self.files_deleted
    }
}

impl From<&DeletionReport> for DeletionStats {
    fn from(report: &DeletionReport) -> Self {
        Self {
            dirs_deleted: report.dirs_removed,
            files_deleted: report.files_removed,
            total_time: report.elapsed,
        }
    }
}

fn print_summary(stats: &DeletionStats) {
    println!("\nStatistics:");
    println!("  Directories: {}", stats.dirs_deleted);
    println!("  Files:       {}", stats.files_deleted);
    println!("  Total:       {}", stats.total_items());
    println!("  Time:        {:.2?}", stats.total_time);
    if stats.total_time.as_secs_f64() > 0.0 {
        let throughput = stats.total_items() as f64 / stats.total_time.as_secs_f64();
        println!("  Throughput:  {:.0} items/sec", throughput);
    }
}

fn print_failed_items(failures: &[FailedItem]) {
    for failure in failures.iter().take(5) {
        eprintln!("fast-deltree: {}", failure);
    }
    if failures.len() > 5 {
        eprintln!("fast-deltree: ... and {} more errors", failures.len() - 5);
    }
}

fn process_path(path: &Path, args: &Args) -> Result<DeletionStats, Error> {
    if !fsops::path_exists(path) {
        if args.force {
            return Ok(DeletionStats::default());
        }
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "No such file or directory".to_string(),
        });
    }

    if fsops::is_directory(path) {
        process_directory(path, args)
    } else {
        process_file(path)
    }
}

fn process_file(path: &Path) -> Result<DeletionStats, Error> {
    let start = Instant::now();

    fsops::delete_file(path).map_err(|e| Error::io_with_path(path.to_path_buf(), e))?;

    tracing::info!("removed '{}'", path.display());

    Ok(DeletionStats {
        files_deleted: 1,
        total_time: start.elapsed(),
        ..Default::default()
    })
}

fn process_directory(path: &Path, args: &Args) -> Result<DeletionStats, Error> {
    if !args.no_preserve_root {
        match safety::check_path_safety(path) {
            safety::SafetyCheck::Safe => {}
            safety::SafetyCheck::Dangerous {
                reason,
                can_override: false,
            } => {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason,
                });
            }
            safety::SafetyCheck::Dangerous {
                reason,
                can_override: true,
            } => {
                if !args.force {
                    eprintln!("fast-deltree: warning: {}", reason);
                }
            }
        }
    }

    let deleter = Deleter::new(DeleterConfig {
        threads: args.threads,
        ..Default::default()
    });
    let report = deleter.run(path)?;

    println!("Time taken: {} ms", report.elapsed.as_millis());
    println!("{}", u8::from(report.success));

    if !report.success {
        return Err(Error::PartialFailure {
            path: path.to_path_buf(),
            failed: report.failures.len(),
            errors: report.failures,
        });
    }

    Ok(DeletionStats::from(&report))
}
