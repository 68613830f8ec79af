mod api;
mod config;
mod engine;
mod history;
mod outbound;
mod server;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pairing_core::{
    AccuracyReport, LexicalExtractor, Pipeline, Profile, Signal, Timestamp, digest,
    extract_features,
};
use pairing_store::{DataDir, Store};
use pulldown_cmark::{Event, Parser as MarkdownParser, TagEnd};
use rmcp::{ServiceExt, transport::stdio};

use crate::config::{ENV_DATA_DIR, EngineConfig};
use crate::engine::Engine;

#[derive(Parser)]
#[command(name = "pairing", about = "Founder profile inference engine: HTTP API, MCP server and CLI")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine behind the HTTP query API
    Serve,

    /// Run the engine behind an MCP server on stdio
    Mcp,

    /// Show profile statistics
    Stats,

    /// Print the profile digest
    Summary,

    /// Ingest document files (.txt, .md)
    Ingest {
        /// File path(s) to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Export the profile to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Import a profile from a JSON file
    Import {
        /// Input file path
        path: PathBuf,
    },

    /// Discard the profile and start over
    Reset {
        /// Must be RESET_PROFILE
        #[arg(long)]
        confirm: Option<String>,
    },
}

fn open_data_dir() -> Result<DataDir> {
    let base_dir = std::env::var(ENV_DATA_DIR).ok().map(PathBuf::from);
    DataDir::open(base_dir.as_deref()).context("failed to open data directory")
}

fn open_store(data_dir: &DataDir) -> Result<Store> {
    data_dir.open_store().context("failed to open profile store")
}

fn load_config(data_dir: &DataDir) -> Result<EngineConfig> {
    EngineConfig::load(&data_dir.config_file()).context("failed to load config")
}

fn load_or_new(store: &Store, now: Timestamp) -> Result<Profile> {
    Ok(store
        .load_profile()
        .context("failed to load profile")?
        .unwrap_or_else(|| Profile::new(now)))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = open_data_dir()?;
    match &cli.command {
        Commands::Serve => cmd_serve(&data_dir).await,
        Commands::Mcp => cmd_mcp(&data_dir).await,
        Commands::Stats => cmd_stats(&data_dir),
        Commands::Summary => cmd_summary(&data_dir),
        Commands::Ingest { files } => cmd_ingest(&data_dir, files),
        Commands::Export { path } => cmd_export(&data_dir, path),
        Commands::Import { path } => cmd_import(&data_dir, path),
        Commands::Reset { confirm } => cmd_reset(&data_dir, confirm.as_deref()),
    }
}

// ---------------------------------------------------------------------------
// Advisory pidfile for observability
// ---------------------------------------------------------------------------

/// Check for an existing pidfile and log accordingly, then write our own.
fn acquire_pidfile(data_dir: &DataDir) -> Option<PathBuf> {
    let path = data_dir.pid_file();
    if let Ok(content) = std::fs::read_to_string(&path)
        && let Ok(pid) = content.trim().parse::<u32>()
    {
        if is_process_alive(pid) {
            tracing::warn!("another pairing engine (PID {pid}) is running, sharing the store");
        } else {
            tracing::info!("cleaned up stale pidfile (PID {pid} is dead)");
            let _ = std::fs::remove_file(&path);
        }
    }

    match std::fs::File::create(&path) {
        Ok(mut f) => {
            let _ = write!(f, "{}", std::process::id());
            tracing::info!("wrote pidfile: {}", path.display());
            Some(path)
        }
        Err(e) => {
            tracing::warn!("failed to write pidfile: {e}");
            None
        }
    }
}

fn release_pidfile(path: &Path) {
    let _ = std::fs::remove_file(path);
    tracing::info!("removed pidfile: {}", path.display());
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0) checks existence without sending a signal
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    false
}

fn start_engine(data_dir: &DataDir) -> Result<Engine> {
    let config = load_config(data_dir)?;
    let store = open_store(data_dir)?;
    Engine::start(store, config).context("failed to start engine")
}

async fn cmd_serve(data_dir: &DataDir) -> Result<()> {
    let engine = start_engine(data_dir)?;
    let addr = engine.config().bind_addr()?;
    let pidfile = acquire_pidfile(data_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("HTTP API listening on {addr}");
    eprintln!("pairing listening on http://{addr}");

    let served = axum::serve(listener, api::router(engine.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await;

    engine.shutdown().await;
    if let Some(path) = pidfile {
        release_pidfile(&path);
    }
    served.context("HTTP server failed")
}

async fn cmd_mcp(data_dir: &DataDir) -> Result<()> {
    let engine = start_engine(data_dir)?;
    tracing::info!("starting MCP server in {}", data_dir.root().display());

    let pidfile = acquire_pidfile(data_dir);

    let server = server::PairingServer::new(engine.clone());
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    let waited = service.waiting().await;

    engine.shutdown().await;
    if let Some(path) = pidfile {
        release_pidfile(&path);
    }
    waited?;
    Ok(())
}

fn cmd_stats(data_dir: &DataDir) -> Result<()> {
    let store = open_store(data_dir)?;
    let now = Timestamp::now();
    let saved = store.load_profile().context("failed to load profile")?;
    let last_saved = store.last_saved_at().context("failed to read save time")?;
    let fresh = saved.is_none();
    let profile = saved.unwrap_or_else(|| Profile::new(now));
    let accuracy = AccuracyReport::build(&profile, now);

    println!("data_dir:   {}", data_dir.root().display());
    println!(
        "profile:    {}{}",
        profile.profile_id,
        if fresh { " (not saved yet)" } else { "" }
    );
    println!("signals:    {}", profile.meta.signals_processed);
    println!(
        "messages:   {}, events: {}, documents: {}",
        profile.meta.total_messages_analyzed,
        profile.meta.total_events_analyzed,
        profile.meta.total_documents_ingested,
    );
    println!("answers:    {}", profile.answers.len());
    println!("overrides:  {}", profile.overrides.len());
    println!(
        "score:      {:.1} ({})",
        profile.pairing_score.composite, profile.pairing_score.level
    );
    println!("accuracy:   {:.2}", accuracy.overall_accuracy);
    println!(
        "last_saved: {}",
        last_saved.map_or_else(|| "never".to_string(), |t| t.to_iso8601())
    );
    Ok(())
}

fn cmd_summary(data_dir: &DataDir) -> Result<()> {
    let store = open_store(data_dir)?;
    let now = Timestamp::now();
    let profile = load_or_new(&store, now)?;
    println!("{}", digest(&profile, now).summary);
    Ok(())
}

/// Plain text of a markdown document, one line per block.
fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::new();
    for event in MarkdownParser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
            ) => out.push('\n'),
            _ => {}
        }
    }
    out
}

fn document_text(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_markdown = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"));
    Ok(if is_markdown {
        markdown_to_text(&content)
    } else {
        content
    })
}

fn cmd_ingest(data_dir: &DataDir, files: &[PathBuf]) -> Result<()> {
    let store = open_store(data_dir)?;
    let now = Timestamp::now();
    let mut pipeline = Pipeline::new(load_or_new(&store, now)?);
    let extractor = LexicalExtractor::default();

    let mut ingested = 0usize;
    for path in files {
        let text = document_text(path)?;
        if text.trim().is_empty() {
            tracing::warn!("skipping empty document {}", path.display());
            continue;
        }
        let source = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let mut signal = Signal::document(&text, source, now);
        signal.features = extract_features(&extractor, &signal);
        let outcome = pipeline.process(signal, now);
        for w in &outcome.warnings {
            tracing::warn!("{w}");
        }
        ingested += 1;
        println!(
            "ingested {} ({} words)",
            path.display(),
            text.split_whitespace().count()
        );
    }

    store
        .save_profile(pipeline.profile(), now)
        .context("failed to save profile")?;
    println!(
        "done. documents={}, total_documents={}",
        ingested,
        pipeline.profile().meta.total_documents_ingested
    );
    Ok(())
}

fn cmd_export(data_dir: &DataDir, path: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    store
        .export_json_file(path)
        .with_context(|| format!("failed to export to {}", path.display()))?;
    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(data_dir: &DataDir, path: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let profile = store
        .import_json_file(path, Timestamp::now())
        .context("failed to import JSON")?;
    println!(
        "imported from {}. profile={}, signals={}",
        path.display(),
        profile.profile_id,
        profile.meta.signals_processed
    );
    Ok(())
}

fn cmd_reset(data_dir: &DataDir, confirm: Option<&str>) -> Result<()> {
    if confirm != Some(api::RESET_CONFIRMATION) {
        bail!(
            "refusing to reset without --confirm {}",
            api::RESET_CONFIRMATION
        );
    }
    let store = open_store(data_dir)?;
    let now = Timestamp::now();
    let profile = Profile::new(now);
    store
        .save_profile(&profile, now)
        .context("failed to save fresh profile")?;
    tracing::info!(profile_id = %profile.profile_id, "profile reset");
    println!("profile reset. new profile={}", profile.profile_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_to_text_strips_markup() {
        let md = "# Launch plan\n\nWe **ship** the `beta` today.\nThen iterate.\n\n- fast\n- cheap\n";
        let text = markdown_to_text(md);
        assert!(text.contains("Launch plan\n"));
        assert!(text.contains("We ship the beta today. Then iterate.\n"));
        assert!(text.contains("fast\n"));
        assert!(!text.contains('#'));
        assert!(!text.contains('*'));
        assert!(!text.contains('`'));
    }

    #[test]
    fn test_document_text_plain_passthrough() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "# not a heading here").unwrap();
        assert_eq!(document_text(&path).unwrap(), "# not a heading here");
    }
}
