//! codegraph - Entry Point
//!
//! Parses arguments, sets up logging, runs the import pipeline and writes
//! the resulting graph as GXL. The process exits non-zero on any error,
//! including error-level log events observed during an otherwise completed
//! run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{layer::Context, prelude::*, EnvFilter, Layer, fmt};

use codegraph::config::{DiagnosticLevel, EdgeKind, ImportConfig, NodeKind};
use codegraph::gxl;
use codegraph::importer::{CancelFlag, Importer};
use codegraph::registry;

/// Extracts a code graph from a project via a language server and writes GXL.
#[derive(Parser, Debug)]
#[command(name = "codegraph")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Project root directory to analyse.
    project_root: PathBuf,

    /// Language server to drive (one of the registered names).
    #[arg(short = 's', long = "lsp-server")]
    lsp_server: String,

    /// Output GXL file; the graph is discarded when absent.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replace the output file if it exists.
    #[arg(long)]
    overwrite: bool,

    /// Source directories to include (default: the project root).
    #[arg(long = "include-dir")]
    include_dirs: Vec<PathBuf>,

    /// Paths to exclude, by prefix, or by regex when ending with `$`.
    #[arg(long = "exclude-path")]
    exclude_paths: Vec<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Edge kinds to extract (default: all).
    #[arg(long = "edge-type", value_enum)]
    edge_types: Vec<EdgeKind>,

    /// Node kinds to materialize (default: all).
    #[arg(long = "node-type", value_enum)]
    node_types: Vec<NodeKind>,

    /// Diagnostic severities to count onto nodes (default: all).
    #[arg(long = "diagnostic", value_enum)]
    diagnostics: Vec<DiagnosticLevel>,

    /// Drop edges whose source and target are the same node.
    #[arg(long)]
    avoid_self_references: bool,

    /// Drop edges that point at the source node's parent.
    #[arg(long)]
    avoid_parent_references: bool,

    /// Parallel tasks in the edge phase (default: system-chosen).
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Use the linear symbol lookup instead of the interval tree.
    #[arg(long)]
    unoptimized: bool,

    /// Append per-phase timings to this CSV file.
    #[arg(long = "perf-csv")]
    perf_csv: Option<PathBuf>,

    /// Log the LSP byte streams to temp files.
    #[arg(long = "log-lsp-io")]
    log_lsp_io: bool,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Parses the log level string into a tracing Level.
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!("invalid log level: {}", other),
        }
    }

    fn into_config(self) -> ImportConfig {
        let mut config = ImportConfig::new(self.project_root, self.lsp_server);
        config.include_dirs = self.include_dirs;
        config.exclude_paths = self.exclude_paths;
        config.timeout = std::time::Duration::from_secs(self.timeout);
        if !self.edge_types.is_empty() {
            config.edge_kinds = self.edge_types;
        }
        if !self.node_types.is_empty() {
            config.node_kinds = self.node_types;
        }
        if !self.diagnostics.is_empty() {
            config.diagnostic_levels = self.diagnostics;
        }
        config.avoid_self_references = self.avoid_self_references;
        config.avoid_parent_references = self.avoid_parent_references;
        config.jobs = self.jobs;
        config.optimized_lookup = !self.unoptimized;
        config.perf_csv = self.perf_csv;
        config.log_lsp_io = self.log_lsp_io;
        config
    }
}

/// Tracing layer that remembers whether any error-level event fired; the
/// exit code reflects it even when the run otherwise completes.
#[derive(Clone)]
struct ErrorFlagLayer(Arc<AtomicBool>);

impl<S: tracing::Subscriber> Layer<S> for ErrorFlagLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.store(true, Ordering::Relaxed);
        }
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(level: Level, error_flag: ErrorFlagLayer) -> Result<()> {
    // Create an env filter that respects RUST_LOG but has a default level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("codegraph={level},async_lsp=warn")));

    // Logs go to stderr; stdout stays clean for shell pipelines.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(error_flag)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let output = args.output.clone();
    let overwrite = args.overwrite;

    // Fail on an unwritable output before spending minutes importing.
    if let Some(path) = &output {
        gxl::ensure_writable(path, overwrite)?;
    }

    let importer = Importer::new(args.into_config()).with_context(|| {
        format!(
            "import setup failed (registered servers: {})",
            registry::names().join(", ")
        )
    })?;

    let cancel = CancelFlag::new();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling import");
            signal_flag.cancel();
        }
    });

    let graph = importer.run(&cancel).await?;
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        depth = graph.max_depth(),
        "import complete"
    );

    match output {
        Some(path) => {
            gxl::write_gxl_file(&graph, &path, overwrite)?;
            info!("graph written to {}", path.display());
        }
        None => info!("no output file given, graph discarded"),
    }

    Ok(())
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let error_seen = Arc::new(AtomicBool::new(false));
    let log_level = match args.parse_log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_tracing(log_level, ErrorFlagLayer(Arc::clone(&error_seen))) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => {
            if error_seen.load(Ordering::Relaxed) {
                tracing::warn!("completed with errors, exiting non-zero");
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
