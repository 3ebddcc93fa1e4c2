//! ScpiGen CLI - SCPI command-set extraction and validation from the command line.

use clap::{Parser, Subcommand, ValueEnum};
use scpigen::{
    discover_command_sets, parse_page_ranges, ClaudeClient, CommandSet, ExtractionOptions,
    ExtractionPipeline, PageExtractor, PdftotextExtractor, PipelineError, PlainTextExtractor,
    ReviewSession, SchemaValidator, Severity, ValidationReport,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CONFIGURATION_ERROR: i32 = 2;
const GENERIC_ERROR: i32 = 1;

#[derive(Parser)]
#[command(name = "scpigen")]
#[command(about = "SCPI command-set extraction and validation tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a SCPI command set from an instrument programming manual
    Extract {
        /// Manual file (.pdf via pdftotext, or pre-extracted .txt with
        /// '---- PAGE n ----' markers)
        #[arg(value_name = "MANUAL")]
        manual: PathBuf,

        /// Page ranges containing the command reference, e.g. "26-74,80"
        #[arg(short, long)]
        pages: String,

        /// Output JSON path (default: manual name with .json extension)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Skip the interactive review pass
        #[arg(long)]
        no_review: bool,

        /// Maximum characters per chunk sent to the model
        #[arg(long, default_value_t = 4000)]
        max_chars_per_chunk: i64,

        /// Concurrent extraction requests
        #[arg(long, default_value_t = 2)]
        concurrency: usize,

        /// Instrument model recorded in metadata (default: manual file stem)
        #[arg(long)]
        instrument: Option<String>,

        /// Dump the extracted page text to '<out>.txt' and stop
        #[arg(long)]
        debug_text: bool,
    },

    /// Validate command-set JSON files against the canonical schema
    Validate {
        /// Files or directories (default: every .json under ./data)
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Re-run the interactive review pass over an existing command set
    Review {
        /// Command-set JSON file to review in place
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for CI/CD
    Json,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SCPIGEN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Extract {
            manual,
            pages,
            out,
            no_review,
            max_chars_per_chunk,
            concurrency,
            instrument,
            debug_text,
        } => {
            handle_extract(
                &manual,
                &pages,
                out,
                no_review,
                max_chars_per_chunk,
                concurrency,
                instrument,
                debug_text,
            )
            .await
        }
        Commands::Validate { paths, format } => handle_validate(&paths, format),
        Commands::Review { file } => handle_review(&file),
    };

    process::exit(exit_code);
}

#[allow(clippy::too_many_arguments)]
async fn handle_extract(
    manual: &Path,
    pages: &str,
    out: Option<PathBuf>,
    no_review: bool,
    max_chars_per_chunk: i64,
    concurrency: usize,
    instrument: Option<String>,
    debug_text: bool,
) -> i32 {
    if max_chars_per_chunk <= 0 {
        eprintln!("Error: --max-chars-per-chunk must be positive");
        return CONFIGURATION_ERROR;
    }
    let page_list = match parse_page_ranges(pages) {
        Ok(list) => list,
        Err(e) => {
            eprintln!("Error: {}", e);
            return CONFIGURATION_ERROR;
        }
    };

    let out_path = out.unwrap_or_else(|| manual.with_extension("json"));
    let extractor = extractor_for(manual);

    if debug_text {
        return dump_debug_text(extractor.as_ref(), manual, &page_list, &out_path);
    }

    let api_key = match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => {
            eprintln!("Error: ANTHROPIC_API_KEY is not set");
            return CONFIGURATION_ERROR;
        }
    };
    let mut provider = ClaudeClient::new(api_key);
    if let Ok(model) = std::env::var("SCPIGEN_MODEL") {
        if !model.is_empty() {
            provider = provider.with_model(model);
        }
    }
    if let Ok(url) = std::env::var("SCPIGEN_API_URL") {
        if !url.is_empty() {
            provider = provider.with_api_url(url);
        }
    }

    let options = ExtractionOptions {
        pages: page_list,
        max_chars_per_chunk: max_chars_per_chunk as usize,
        concurrency,
        instrument: instrument.unwrap_or_default(),
        ..ExtractionOptions::default()
    };
    let pipeline = ExtractionPipeline::new(extractor, Arc::new(provider), options);

    // Ctrl-C stops dispatching chunks; completed work is still written.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupt received - finishing in-flight chunks...");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let (mut set, report) = match pipeline.run(manual, cancel.clone()).await {
        Ok(result) => result,
        Err(e @ PipelineError::Configuration(_)) => {
            eprintln!("Error: {}", e);
            return CONFIGURATION_ERROR;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return GENERIC_ERROR;
        }
    };

    if report.chunks == 0 {
        eprintln!("Error: extraction produced no usable chunks");
        return GENERIC_ERROR;
    }

    // Checkpoint before review so an interrupt never loses merged work.
    if let Err(e) = set.save(&out_path) {
        eprintln!("Error: cannot write {}: {}", out_path.display(), e);
        return GENERIC_ERROR;
    }

    println!(
        "Extracted {} command(s) from {} chunk(s) ({} candidate record(s)).",
        report.commands, report.chunks, report.candidates
    );
    if report.conflicts > 0 {
        println!(
            "{} unresolved conflict(s) need review.",
            report.conflicts
        );
    }
    if report.failed_chunks > 0 {
        println!(
            "Coverage incomplete: {} chunk(s) failed; see metadata.coverage_gaps.",
            report.failed_chunks
        );
    }
    if report.cancelled {
        println!(
            "Run was interrupted; partial command set written to {}.",
            out_path.display()
        );
        println!("Resume the review later with: scpigen review {}", out_path.display());
        return 0;
    }

    if no_review {
        println!("Skipping interactive review (--no-review).");
    } else {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let summary = {
            let mut session = ReviewSession::new(stdin.lock(), stdout.lock());
            match session.run(&mut set) {
                Ok(summary) => summary,
                Err(e) => {
                    eprintln!("Error: review failed: {}", e);
                    return GENERIC_ERROR;
                }
            }
        };
        println!(
            "Review: {} accepted, {} edited, {} rejected, {} deferred.",
            summary.accepted, summary.edited, summary.rejected, summary.deferred
        );
        if let Err(e) = set.save(&out_path) {
            eprintln!("Error: cannot write {}: {}", out_path.display(), e);
            return GENERIC_ERROR;
        }
    }

    println!("Wrote {}", out_path.display());
    0
}

fn extractor_for(manual: &Path) -> Box<dyn PageExtractor> {
    match manual.extension().and_then(|s| s.to_str()) {
        Some("pdf") => Box::new(PdftotextExtractor::default()),
        _ => Box::new(PlainTextExtractor),
    }
}

fn dump_debug_text(
    extractor: &dyn PageExtractor,
    manual: &Path,
    pages: &[u32],
    out_path: &Path,
) -> i32 {
    let mut text_path = out_path.with_extension("txt");
    if text_path == manual {
        // Never clobber a plain-text input manual.
        text_path = out_path.with_extension("pages.txt");
    }
    match extractor.extract_pages(manual, pages) {
        Ok(page_text) => {
            if let Err(e) = scpigen::source::write_debug_text(&page_text, &text_path) {
                eprintln!("Error: cannot write {}: {}", text_path.display(), e);
                return GENERIC_ERROR;
            }
            println!(
                "Wrote extracted text for {} page(s) to {}",
                page_text.len(),
                text_path.display()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            GENERIC_ERROR
        }
    }
}

fn handle_validate(paths: &[PathBuf], format: OutputFormat) -> i32 {
    let files = match collect_validation_targets(paths) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error: {}", e);
            return GENERIC_ERROR;
        }
    };
    if files.is_empty() {
        eprintln!("Error: no command-set files to validate");
        return GENERIC_ERROR;
    }

    let validator = SchemaValidator::new();
    let reports: Vec<ValidationReport> = files.iter().map(|f| validator.validate_file(f)).collect();

    match format {
        OutputFormat::Human => output_human(&reports),
        OutputFormat::Json => output_json(&reports),
    }

    if reports.iter().all(ValidationReport::passed) {
        0
    } else {
        GENERIC_ERROR
    }
}

/// No paths means the default data directory; directories expand to their
/// JSON files. Files are validated in path order.
fn collect_validation_targets(paths: &[PathBuf]) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    if paths.is_empty() {
        files = discover_command_sets(Path::new("data"))?;
    } else {
        for path in paths {
            if path.is_dir() {
                files.extend(discover_command_sets(path)?);
            } else {
                files.push(path.clone());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn output_human(reports: &[ValidationReport]) {
    for report in reports {
        println!("\nFile: {}", report.file.display());
        println!("{}", "─".repeat(60));

        if report.diagnostics.is_empty() {
            println!("  PASS: no issues found");
            continue;
        }
        for diag in &report.diagnostics {
            let tag = match diag.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            println!("  {:7} {}: {}", tag, diag.path, diag.message);
        }
        println!(
            "  {}: {} error(s), {} warning(s)",
            if report.passed() { "PASS" } else { "FAIL" },
            report.error_count(),
            report.warning_count()
        );
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    println!(
        "\n{} file(s) checked, {} passed, {} failed.",
        reports.len(),
        reports.len() - failed,
        failed
    );
}

fn output_json(reports: &[ValidationReport]) {
    let output = serde_json::json!({
        "results": reports,
        "summary": {
            "total_files": reports.len(),
            "passed": reports.iter().filter(|r| r.passed()).count(),
            "failed": reports.iter().filter(|r| !r.passed()).count(),
            "errors": reports.iter().map(|r| r.error_count()).sum::<usize>(),
            "warnings": reports.iter().map(|r| r.warning_count()).sum::<usize>(),
        }
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: cannot serialize report: {}", e),
    }
}

fn handle_review(file: &Path) -> i32 {
    let mut set = match CommandSet::load(file) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Error: cannot load {}: {}", file.display(), e);
            return GENERIC_ERROR;
        }
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let summary = {
        let mut session = ReviewSession::new(stdin.lock(), stdout.lock());
        match session.run(&mut set) {
            Ok(summary) => summary,
            Err(e) => {
                eprintln!("Error: review failed: {}", e);
                return GENERIC_ERROR;
            }
        }
    };

    if let Err(e) = set.save(file) {
        eprintln!("Error: cannot write {}: {}", file.display(), e);
        return GENERIC_ERROR;
    }
    println!(
        "Review: {} accepted, {} edited, {} rejected, {} deferred. Wrote {}",
        summary.accepted,
        summary.edited,
        summary.rejected,
        summary.deferred,
        file.display()
    );
    0
}
