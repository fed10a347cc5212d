//! PDF Merge CLI tool
//!
//! Entry point of the "Merge PDF" context-menu verb.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use pdf_merge::collect::SplitStrategy;
use pdf_merge::config::MergeSettings;
use pdf_merge::dialog::NoDialog;
use pdf_merge::pdf::LopdfCodec;
use pdf_merge::{exit_code, MergePipeline};

/// PDF Merge - Merge the selected PDF files into one document
#[derive(Parser)]
#[command(name = "pdf-merge")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge two files; pages of a.pdf come first (inputs are sorted by name)
    pdf-merge b.pdf a.pdf -o merged.pdf

    # Merge everything in a folder, asking where to save
    pdf-merge \"chapters/*.pdf\"

    # Context-menu verb launched once per selected file
    pdf-merge --collect \"%1\"

EXIT CODES:
    0 merged, or cancelled at the save prompt
    2 fewer than two PDF files selected
    3 another merge into the same output is running
    4 an input could not be read
    5 the output could not be written
    1 any other failure")]
struct Cli {
    /// Input PDF files, or one string holding a whole multi-select. Supports glob patterns like "*.pdf"
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output PDF file path (prompted for when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seconds to wait for another merge into the same output to finish
    #[arg(long, env = "PDF_MERGE_LOCK_TIMEOUT", default_value = "5", value_parser = parse_seconds)]
    lock_timeout: Duration,

    /// How to split a multi-select argument: auto, none, newline or a single delimiter character
    #[arg(long, env = "PDF_MERGE_SPLIT", default_value = "auto", value_parser = parse_split)]
    split: SplitStrategy,

    /// Journal file (defaults to merge_pdfs.log in the temp directory)
    #[arg(long, env = "PDF_MERGE_JOURNAL")]
    journal: Option<PathBuf>,

    /// Directory for lock files (defaults to the temp directory)
    #[arg(long, env = "PDF_MERGE_LOCK_DIR")]
    lock_dir: Option<PathBuf>,

    /// Never prompt for the output path; fail when --output is missing
    #[arg(long)]
    no_prompt: bool,

    /// Gather files from sibling invocations of the same multi-select
    #[arg(long)]
    collect: bool,

    /// Debug-level diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }

    process::exit(run(cli));
}

/// Diagnostics go to stderr; RUST_LOG overrides the default level
fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

fn parse_split(value: &str) -> Result<SplitStrategy, String> {
    value.parse().map_err(|e: pdf_merge::Error| e.to_string())
}

fn settings_from(cli: &Cli) -> MergeSettings {
    let mut settings = MergeSettings {
        lock_timeout: cli.lock_timeout,
        split: cli.split,
        ..MergeSettings::default()
    };
    if let Some(journal) = &cli.journal {
        settings.journal_path = journal.clone();
    }
    if let Some(lock_dir) = &cli.lock_dir {
        settings.lock_dir = lock_dir.clone();
    }
    settings
}

fn run(cli: Cli) -> i32 {
    let mut pipeline = MergePipeline::new(LopdfCodec, settings_from(&cli));
    if cli.no_prompt {
        pipeline = pipeline.with_dialog(NoDialog);
    }

    if cli.collect {
        // Non-claimants exit quietly; a sibling invocation runs the merge
        return match pipeline.invoke_collected(&cli.inputs, cli.output) {
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        };
    }

    exit_code(&pipeline.invoke(&cli.inputs, cli.output))
}
