use anyhow::{bail, Context, Result};
use clap::Parser;
use polars::prelude::*;
use std::path::PathBuf;
use tablechat::{AssistantConfig, BackendKind, DataAssistant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tablechat")]
#[command(about = "Ask natural-language questions about a CSV dataset")]
struct Args {
    /// Path to the CSV file to query
    csv: PathBuf,

    /// The question, in natural language
    question: String,

    /// Backend to use: "openai" or "ollama" (default: auto-detect from env)
    #[arg(short, long)]
    backend: Option<String>,

    /// Model identifier (default: backend-specific auto-selection)
    #[arg(short, long)]
    model: Option<String>,

    /// Override the backend base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Retry budget for script generation
    #[arg(long, default_value_t = 3)]
    max_attempts: u8,

    /// Rows of the table shown to the model as a preview
    #[arg(long, default_value_t = 5)]
    sample_rows: usize,
}

fn parse_backend(s: &str) -> Result<BackendKind> {
    match s.to_lowercase().as_str() {
        "openai" => Ok(BackendKind::OpenAi),
        "ollama" => Ok(BackendKind::Ollama),
        other => bail!("unknown backend '{}' (expected 'openai' or 'ollama')", other),
    }
}

fn load_csv(path: &PathBuf) -> Result<DataFrame> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_try_parse_dates(true)
        .with_infer_schema_length(Some(1000))
        .finish()
        .and_then(|lf| lf.collect())
        .with_context(|| format!("failed to load CSV from {}", path.display()))?;
    Ok(df)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let kind = args.backend.as_deref().map(parse_backend).transpose()?;
    let mut backend = AssistantConfig::backend_from_env(kind)?;
    if args.model.is_some() {
        backend.model = args.model.clone();
    }
    if let Some(base_url) = args.base_url {
        backend.base_url = base_url;
    }

    let mut config = AssistantConfig::new(backend);
    config.max_attempts = args.max_attempts;
    config.sample_rows = args.sample_rows;

    let df = load_csv(&args.csv)?;
    info!(
        "loaded {}: {} rows x {} columns",
        args.csv.display(),
        df.height(),
        df.width()
    );

    let assistant = DataAssistant::new(config);

    let probe = assistant.probe().await?;
    if !probe.reachable {
        bail!(
            "backend {} is not reachable; check the server or your credentials",
            assistant.config().backend.kind
        );
    }
    if probe.models.is_empty() {
        warn!("backend reports no installed models; completions may fail");
    }

    let response = assistant.ask(&args.question, &df).await?;

    println!("\n=== Answer ===");
    println!("{}", response.answer);
    println!("\n=== Script (attempt {}) ===", response.attempts);
    println!("{}", response.script);
    println!("\n=== Derived data ===");
    println!("{}", response.frame);

    if !response.error_history.is_empty() {
        println!("\n=== Failed attempts ===");
        for e in &response.error_history {
            println!("attempt {}: {}", e.attempt, e.message);
        }
    }

    Ok(())
}
