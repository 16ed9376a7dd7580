//! finkg CLI - Command-line interface
//!
//! Usage:
//!   finkg --mode build --input-file data/raw_news.txt --clear
//!   finkg --mode build --from-table data/cleaned_triplets.csv
//!   finkg --mode query
//!   finkg --mode both --use-llm-queries
//!
//! Author: hephaex@gmail.com

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use finkg_core::{AppConfig, LoggingConfig, Row};
use finkg_pipeline::{Pipeline, RunReport};

const DEFAULT_CONFIG: &str = "config/config.toml";
const DEFAULT_INPUT: &str = "data/raw_news.txt";

const SAMPLE_NEWS: &str = "\
Apple acquired DarwinAI for $100 million in January 2024.
Microsoft invested $10 billion in OpenAI to expand its AI capabilities.
Google's CEO Sundar Pichai announced the launch of Gemini AI model in December 2023.
Tesla launched its new Model Y in Europe with improved battery technology.
Amazon partnered with NVIDIA to develop new AI chips for cloud computing.
Meta acquired Within Unlimited for $400 million to strengthen its VR business.
IBM acquired HashiCorp for $6.4 billion in 2024.
Tim Cook is the CEO of Apple.
";

#[derive(Parser)]
#[command(name = "finkg")]
#[command(about = "Financial news knowledge graph pipeline")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// News text to extract from
    #[arg(long, default_value = DEFAULT_INPUT)]
    input_file: PathBuf,

    /// Build from an exported canonical triplet table instead of news text
    #[arg(long)]
    from_table: Option<PathBuf>,

    /// Delete the existing graph before building
    #[arg(long)]
    clear: bool,

    /// What to run
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    mode: Mode,

    /// Let a language model translate questions no template or rule covers
    #[arg(long)]
    use_llm_queries: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Build the graph only
    Build,
    /// Interactive questions only
    Query,
    /// Build, then take questions
    Both,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (mut config, config_missing) = match load_config(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if cli.use_llm_queries {
        config.query.use_llm = true;
    }

    init_tracing(&config.logging);
    if config_missing {
        warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match run(&cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Pipeline failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Load the config file, or defaults when it does not exist
fn load_config(path: &Path) -> anyhow::Result<(AppConfig, bool)> {
    if !path.exists() {
        return Ok((AppConfig::default().with_env_override()?, true));
    }

    let config = AppConfig::from_file(path)
        .and_then(AppConfig::with_env_override)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok((config, false))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli, config: AppConfig) -> anyhow::Result<()> {
    let use_llm_queries = config.query.use_llm;
    let pipeline = Pipeline::connect(config)
        .await
        .context("Failed to initialize pipeline")?;

    if matches!(cli.mode, Mode::Build | Mode::Both) {
        let report = match &cli.from_table {
            Some(table) => pipeline.run_table(table, cli.clear).await,
            None => {
                ensure_input(&cli.input_file)?;
                pipeline.run(&cli.input_file, cli.clear).await
            }
        }
        .context("Pipeline run failed")?;
        print_report(&report);
    }

    if matches!(cli.mode, Mode::Query | Mode::Both) {
        interactive(&pipeline, use_llm_queries).await?;
    }

    Ok(())
}

/// Write the bundled sample news when the default input is absent
fn ensure_input(path: &Path) -> anyhow::Result<()> {
    if path.exists() || path != Path::new(DEFAULT_INPUT) {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, SAMPLE_NEWS)
        .with_context(|| format!("Failed to write sample input {}", path.display()))?;
    info!(path = %path.display(), "Created sample news file");
    Ok(())
}

fn print_report(report: &RunReport) {
    let elapsed = report.finished_at - report.started_at;

    println!("Pipeline run {} completed in {} ms", report.run_id, elapsed.num_milliseconds());
    println!("  Sentences:          {}", report.sentences);
    println!("  Raw triplets:       {}", report.raw_triplets);
    println!("  Canonical triplets: {}", report.canonical_triplets);
    println!(
        "  Batches:            {} ({} failed)",
        report.build.batches_total, report.build.batches_failed
    );
    println!("  Nodes:              {}", report.stats.total_nodes);
    println!("  Labels:             {}", report.stats.unique_labels);
    println!("  Relationships:      {}", report.stats.total_relationships);
    println!("  Relationship types: {}", report.stats.unique_relationship_types);

    println!("\nSample queries:");
    for sample in &report.sample_results {
        println!("  {} -> {} row(s)", sample.question, sample.rows);
    }
}

async fn interactive(pipeline: &Pipeline, use_llm_queries: bool) -> anyhow::Result<()> {
    println!("\nAsk a question about the graph (exit, quit or q to leave).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }

        let rows = pipeline.ask_with(question, use_llm_queries).await;
        print_rows(&rows);
    }

    Ok(())
}

fn print_rows(rows: &[Row]) {
    if rows.is_empty() {
        println!("No results.");
        return;
    }

    for (index, row) in rows.iter().enumerate() {
        let fields: Vec<String> = row
            .iter()
            .map(|(key, value)| format!("{key}: {}", display_value(value)))
            .collect();
        println!("{}. {}", index + 1, fields.join(", "));
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
