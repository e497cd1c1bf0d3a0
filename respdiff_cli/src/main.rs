mod report;
mod server;

use clap::{Parser, Subcommand};
use report::{ComparisonReport, HistoryEntry};
use respdiff_common::{
    default_data_dir, ensure_config, load_config, AppConfig, CompareRequest, ComparisonRecord, DiffOp,
    EndpointRequest, HttpMethod, RawResponse, RecordId, RespDiffError,
};
use respdiff_core::{
    format_split, inline_changes, render_split, render_unified, truncate, ComparisonEngine,
    ComparisonService, ComparisonStore, FileStore, HttpFetcher, InlineSegment, LineMarker,
    MemoryStore,
};
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_IDENTICAL: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_DIFFERENT: i32 = 2;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const REVERSE: &str = "\x1b[7m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "respdiff")]
#[command(author = "RespDiff Contributors")]
#[command(version)]
#[command(about = "Compare API responses across JSON, XML and plain text", long_about = None)]
struct Cli {
    /// Use the config file next to the executable
    #[arg(long, global = true)]
    portable: bool,

    /// Directory holding saved comparisons
    #[arg(long, global = true, env = "RESPDIFF_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy)]
struct OutputOptions {
    json: bool,
    split: bool,
    color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch two endpoints and compare their responses
    Compare {
        /// URL of the left endpoint
        #[arg(long)]
        left_url: String,

        /// URL of the right endpoint
        #[arg(long)]
        right_url: String,

        /// HTTP method used for both requests
        #[arg(short = 'X', long, default_value = "GET")]
        method: HttpMethod,

        /// Request body for the left endpoint (also sent right unless --right-body is given)
        #[arg(long)]
        left_body: Option<String>,

        /// Request body for the right endpoint
        #[arg(long)]
        right_body: Option<String>,

        /// Extra request header as NAME:VALUE (can be specified multiple times)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Retries after a failed fetch
        #[arg(long)]
        retries: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Side-by-side output
        #[arg(short = 's', long)]
        split: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,

        /// Do not save the comparison
        #[arg(long)]
        no_save: bool,
    },

    /// Compare two saved response bodies without fetching
    Diff {
        /// Left body file
        left: PathBuf,

        /// Right body file
        right: PathBuf,

        /// Content type of the left body (sniffed when omitted)
        #[arg(long, default_value = "")]
        left_content_type: String,

        /// Content type of the right body (sniffed when omitted)
        #[arg(long, default_value = "")]
        right_content_type: String,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Side-by-side output
        #[arg(short = 's', long)]
        split: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,
    },

    /// List recent comparisons
    History {
        /// Number of comparisons to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a saved comparison
    Show {
        /// Comparison id
        id: String,

        /// Print the full record as JSON
        #[arg(long)]
        json: bool,

        /// Side-by-side output
        #[arg(short = 's', long)]
        split: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,
    },

    /// Show the most recent comparison
    Latest {
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,

        /// Side-by-side output
        #[arg(short = 's', long)]
        split: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,
    },

    /// Show the configuration file, writing defaults when it is missing
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the HTTP comparison API
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Configuration and storage resolved from the config file and global flags
struct Context {
    config: AppConfig,
    data_dir: PathBuf,
}

impl Context {
    fn load(portable: bool, data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let loaded = load_config(portable)?;
        let data_dir = match data_dir.or_else(|| loaded.config.storage.data_dir.clone()) {
            Some(dir) => dir,
            None => default_data_dir(loaded.portable, &loaded.path)?,
        };
        Ok(Self {
            config: loaded.config,
            data_dir,
        })
    }

    fn store(&self) -> anyhow::Result<FileStore> {
        info!("Using data directory: {}", self.data_dir.display());
        Ok(FileStore::new(&self.data_dir)?)
    }
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<RespDiffError>() {
                Some(err) => error!("Comparison failed ({}): {}", err.kind(), err),
                None => error!("Command failed: {:#}", e),
            }
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let context = Context::load(cli.portable, cli.data_dir)?;

    match cli.command {
        Commands::Compare {
            left_url,
            right_url,
            method,
            left_body,
            right_body,
            headers,
            timeout,
            retries,
            json,
            split,
            no_color,
            no_save,
        } => {
            let mut left = EndpointRequest::new(left_url, method);
            let mut right = EndpointRequest::new(right_url, method);
            for header in &headers {
                let (name, value) = parse_header(header)?;
                left = left.with_header(name, value);
                right = right.with_header(name, value);
            }
            left.payload = left_body.clone();
            right.payload = right_body.or(left_body);

            let mut config = context.config.clone();
            if let Some(timeout) = timeout {
                config.fetch.timeout_secs = timeout;
            }
            if let Some(retries) = retries {
                config.fetch.max_retries = retries;
            }

            let request = CompareRequest { left, right };
            let output = OutputOptions {
                json,
                split,
                color: use_color(no_color),
            };
            run_compare(&context, &config, request, no_save, output)
        }
        Commands::Diff {
            left,
            right,
            left_content_type,
            right_content_type,
            json,
            split,
            no_color,
        } => {
            let request = CompareRequest {
                left: EndpointRequest::new(left.display().to_string(), HttpMethod::Get),
                right: EndpointRequest::new(right.display().to_string(), HttpMethod::Get),
            };
            let left_raw = RawResponse::new(200, left_content_type, fs::read(&left)?);
            let right_raw = RawResponse::new(200, right_content_type, fs::read(&right)?);

            let engine = ComparisonEngine::from_config(&context.config.engine);
            let record = engine.compare(&request, left_raw, right_raw)?;

            let output = OutputOptions {
                json,
                split,
                color: use_color(no_color),
            };
            print_comparison(&record, &context.config, None, output)?;
            Ok(exit_code(&record))
        }
        Commands::History { limit, json } => {
            let records = context.store()?.list_recent(limit)?;
            print_history(&records, json)?;
            Ok(EXIT_IDENTICAL)
        }
        Commands::Show {
            id,
            json,
            split,
            no_color,
        } => {
            let id: RecordId = id
                .parse()
                .map_err(|e| RespDiffError::InvalidRequest(format!("Invalid comparison id '{}': {}", id, e)))?;
            let record = context
                .store()?
                .get(id)?
                .ok_or_else(|| anyhow::anyhow!("Comparison {} not found", id))?;
            print_saved(&record, &context.config, json, split, no_color)
        }
        Commands::Latest {
            json,
            split,
            no_color,
        } => {
            let record = context
                .store()?
                .latest()?
                .ok_or_else(|| anyhow::anyhow!("No comparisons found"))?;
            print_saved(&record, &context.config, json, split, no_color)
        }
        Commands::Config { json } => {
            let loaded = ensure_config(cli.portable)?;
            let created = !loaded.exists;
            if json {
                let report = serde_json::json!({
                    "path": loaded.path,
                    "created": created,
                    "portable": loaded.portable,
                    "data_dir": context.data_dir,
                    "config": loaded.config,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                if created {
                    println!("Created default configuration: {}", loaded.path.display());
                } else {
                    println!("Configuration: {}", loaded.path.display());
                }
                println!("Data directory: {}", context.data_dir.display());
                println!();
                print!("{}", toml::to_string_pretty(&loaded.config)?);
            }
            Ok(EXIT_IDENTICAL)
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| context.config.server.bind.clone());
            let state = server::AppState {
                service: build_service(&context.config, Arc::new(context.store()?))?,
                summary_chars: context.config.server.diff_summary_chars,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(state, &bind))?;
            Ok(EXIT_IDENTICAL)
        }
    }
}

fn build_service(
    config: &AppConfig,
    store: Arc<dyn ComparisonStore>,
) -> anyhow::Result<ComparisonService> {
    let fetcher = HttpFetcher::new(&config.fetch)?;
    let engine = ComparisonEngine::from_config(&config.engine);
    Ok(ComparisonService::new(
        Arc::new(fetcher),
        Arc::new(engine),
        store,
        &config.service,
    ))
}

fn run_compare(
    context: &Context,
    config: &AppConfig,
    request: CompareRequest,
    no_save: bool,
    output: OutputOptions,
) -> anyhow::Result<i32> {
    info!("Comparing:");
    info!("  Left:  {} {}", request.left.method, request.left.url);
    info!("  Right: {} {}", request.right.method, request.right.url);

    let store: Arc<dyn ComparisonStore> = if no_save {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(context.store()?)
    };
    let service = build_service(config, store)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(service.run(&request))?;
    let persisted = (!no_save).then_some(outcome.persisted);

    print_comparison(&outcome.record, config, persisted, output)?;
    Ok(exit_code(&outcome.record))
}

fn print_saved(
    record: &ComparisonRecord,
    config: &AppConfig,
    json: bool,
    split: bool,
    no_color: bool,
) -> anyhow::Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        let output = OutputOptions {
            json: false,
            split,
            color: use_color(no_color),
        };
        print_comparison(record, config, None, output)?;
    }
    Ok(exit_code(record))
}

fn exit_code(record: &ComparisonRecord) -> i32 {
    if record.diff_result.is_identical() {
        EXIT_IDENTICAL
    } else {
        EXIT_DIFFERENT
    }
}

fn use_color(no_color: bool) -> bool {
    !no_color && std::io::stdout().is_terminal()
}

fn parse_header(header: &str) -> Result<(&str, &str), RespDiffError> {
    header
        .split_once(':')
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| RespDiffError::InvalidRequest(format!("Invalid header '{}', expected NAME:VALUE", header)))
}

fn print_comparison(
    record: &ComparisonRecord,
    config: &AppConfig,
    persisted: Option<bool>,
    output: OutputOptions,
) -> anyhow::Result<()> {
    if output.json {
        let report = ComparisonReport::new(record, config.server.diff_summary_chars, persisted);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let width = if output.split { 120 } else { 80 };
    println!("\n{}", "=".repeat(width));
    println!("Comparison {}", record.id);
    println!("{}", "=".repeat(width));
    println!("Left:  {} ({})", record.left_url, record.left_format);
    println!("Right: {} ({})", record.right_url, record.right_format);
    println!("{}", "-".repeat(width));

    if output.split {
        print_split(record, output.color);
    } else {
        print_unified(record, output.color);
    }

    let stats = record.diff_result.stats();
    let metrics = &record.metrics;
    println!("{}", "=".repeat(width));
    println!("Summary:");
    println!("  Differences:     {}", metrics.diff_count);
    println!(
        "  Replaced: {}  Inserted: {}  Deleted: {}  Unchanged: {}",
        stats.replace, stats.insert, stats.delete, stats.equal
    );
    println!(
        "  Length:          {} left / {} right",
        metrics.left_length, metrics.right_length
    );
    println!("  Normalized:      {}", if metrics.normalized { "yes" } else { "no" });
    println!("  Formats matched: {}", if metrics.formats_matched { "yes" } else { "no" });
    match persisted {
        Some(true) => println!("  Saved as {}", record.id),
        Some(false) => println!("  Not saved (see log)"),
        None => {}
    }
    println!("{}", "=".repeat(width));
    Ok(())
}

fn print_unified(record: &ComparisonRecord, color: bool) {
    if record.diff_result.is_identical() {
        println!("No differences found.");
        return;
    }

    for line in render_unified(&record.diff_result) {
        let paint = match (color, line.marker) {
            (true, LineMarker::Added) => GREEN,
            (true, LineMarker::Removed) => RED,
            _ => "",
        };
        let reset = if paint.is_empty() { "" } else { RESET };
        println!("{}{}{}", paint, line, reset);
    }
}

fn print_split(record: &ComparisonRecord, color: bool) {
    const COLUMN: usize = 56;
    println!("{:<width$} {:^2} {:<width$}", "Left", "", "Right", width = COLUMN);
    println!("{}", "-".repeat(COLUMN * 2 + 4));

    if !color {
        println!("{}", format_split(&record.diff_result, COLUMN));
        return;
    }

    for row in render_split(&record.diff_result) {
        let left = truncate(row.left.as_deref().unwrap_or(""), COLUMN);
        let right = truncate(row.right.as_deref().unwrap_or(""), COLUMN);
        let (symbol, paint) = match row.op {
            DiffOp::Equal => ("  ", ""),
            DiffOp::Insert => (" >", GREEN),
            DiffOp::Delete => ("< ", RED),
            DiffOp::Replace => ("<>", YELLOW),
        };
        let reset = if paint.is_empty() { "" } else { RESET };

        // Pad on visible width; escape codes would skew `{:<width$}`
        let pad = COLUMN.saturating_sub(left.chars().count());
        let (left_text, right_text) = if row.op == DiffOp::Replace {
            highlight_changes(&left, &right)
        } else {
            (left, right)
        };
        println!(
            "{}{} {}{}{} {}",
            left_text,
            " ".repeat(pad),
            paint,
            symbol,
            reset,
            right_text
        );
    }
}

/// Reverse-video the characters that differ between two replaced lines
fn highlight_changes(left: &str, right: &str) -> (String, String) {
    let paint = |segments: Vec<InlineSegment>| {
        segments
            .into_iter()
            .map(|segment| {
                if segment.changed {
                    format!("{}{}{}", REVERSE, segment.text, RESET)
                } else {
                    segment.text
                }
            })
            .collect::<String>()
    };
    let (left_segments, right_segments) = inline_changes(left, right);
    (paint(left_segments), paint(right_segments))
}

fn print_history(records: &[ComparisonRecord], json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<HistoryEntry> = records.iter().map(HistoryEntry::from).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No comparisons found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<19}  {:>5}  {}",
        "ID", "Created", "Diffs", "Endpoints"
    );
    println!("{}", "-".repeat(100));
    for record in records {
        println!(
            "{:<36}  {:<19}  {:>5}  {} <> {}",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.metrics.diff_count,
            record.left_url,
            record.right_url
        );
    }
    Ok(())
}
