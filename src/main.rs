use bundle_insights::analyzer;
use bundle_insights::ingest::{FailurePolicy, IngestOptions, Ingestor};
use bundle_insights::report::{self, RenderOptions};
use bundle_insights::store::RecordStore;
use bundle_insights::unpack::{self, LogFilePattern, DEFAULT_LOG_PATTERN};
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Timeline widths offered, coarsest first
const INTERVAL_STEPS: [u64; 5] = [3600, 1800, 900, 300, 60];

/// Request statistics from router support bundles
#[derive(Parser, Debug)]
#[command(
    name = "bundle_insights",
    author,
    version,
    about = "Unpacks a support bundle and reports who hit the router, where, and how hard"
)]
struct Args {
    /// Support bundle (.zip) to analyze
    #[arg(
        value_name = "BUNDLE",
        required_unless_present = "log_files",
        conflicts_with = "log_files"
    )]
    bundle: Option<PathBuf>,

    /// Analyze an already unpacked router-request log (repeatable)
    #[arg(short = 'l', long = "log-file", value_name = "LOG_FILE")]
    log_files: Vec<PathBuf>,

    /// Number of rows and timeline series to display per key
    #[arg(short = 'n', long = "top", default_value_t = 10, value_name = "N")]
    top_n: usize,

    /// Timeline bucket width in seconds (3600, 1800, 900, 300 or 60)
    #[arg(
        short = 'i',
        long = "interval",
        default_value_t = 900,
        value_name = "SECONDS",
        value_parser = parse_interval
    )]
    interval: u64,

    /// Keep the router's own 127.0.0.1 health checks
    #[arg(long = "include-self")]
    include_self: bool,

    /// Tag for records that carry no `_tag`
    #[arg(short = 't', long = "default-tag", default_value = "", value_name = "TAG")]
    default_tag: String,

    /// Regex selecting log file names inside the bundle
    #[arg(short = 'p', long = "pattern", default_value = DEFAULT_LOG_PATTERN, value_name = "REGEX")]
    pattern: String,

    /// Collapse each timeline into a single total series
    #[arg(long = "totals")]
    totals: bool,

    /// Skip log files containing a malformed line instead of aborting
    #[arg(short = 'k', long = "keep-going")]
    keep_going: bool,

    /// Export results as JSON to the specified file path
    #[arg(short = 'j', long = "json-output", value_name = "OUTPUT_FILE")]
    json_output: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn parse_interval(s: &str) -> Result<u64, String> {
    let value: u64 = s.parse().map_err(|e| format!("{}", e))?;
    if INTERVAL_STEPS.contains(&value) {
        Ok(value)
    } else {
        Err(format!("interval must be one of {:?}", INTERVAL_STEPS))
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.quiet);

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let (log_files, source) = match &args.bundle {
        Some(bundle) => {
            let pattern = LogFilePattern::new(&args.pattern)?;
            (unpack::unpack(bundle, &pattern)?, bundle.clone())
        }
        None => (
            args.log_files.clone(),
            PathBuf::from(format!("{} log file(s)", args.log_files.len())),
        ),
    };
    info!("Found {} log files", log_files.len());

    let ingestor = Ingestor::new(IngestOptions {
        filter_self: !args.include_self,
        default_tag: args.default_tag.clone(),
    });
    let policy = if args.keep_going {
        FailurePolicy::SkipFile
    } else {
        FailurePolicy::Abort
    };

    let mut store = RecordStore::new();
    info!("Loading log files...");
    let summary = ingestor.ingest_all(&mut store, &log_files, policy)?;
    info!(
        files = summary.files_ingested,
        failed = summary.files_failed.len(),
        "Indexed {} records",
        store.len()
    );

    let stats = analyzer::analyze(&store, summary.totals, args.top_n, args.interval)?;

    // Print terminal report
    report::print_report(&stats, &source, RenderOptions { show_totals: args.totals });

    // Optionally export JSON
    if let Some(json_path) = &args.json_output {
        report::export_json(&stats, json_path)
            .map_err(|e| format!("failed to write JSON output: {}", e))?;
        println!("\n✓ JSON report saved to '{}'", json_path.display());
    }

    Ok(())
}
