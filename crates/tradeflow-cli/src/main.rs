//! Command-line interface for tradeflow

mod script;

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use script::ReplayScript;
use std::path::PathBuf;
use tracing::info;
use tradeflow_utils::LogFormat;
use tradeflow_workflow::prompts::default_catalog;

#[derive(Parser, Debug)]
#[command(name = "tradeflow")]
#[command(author, version, about = "Multi-agent stock analysis runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter directive; overrides RUST_LOG
    #[arg(long, global = true)]
    log_filter: Option<String>,

    /// Log output: pretty or json
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a full analysis against the canned replies of a script
    Replay {
        /// Path to the replay script (JSON)
        #[arg(short, long)]
        script: PathBuf,

        /// Output format for the outcome
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Override the script's ticker
        #[arg(long)]
        ticker: Option<String>,

        /// Override the script's trade date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Apply TRADEFLOW_* environment overrides to the script's config
        #[arg(long)]
        env: bool,
    },

    /// List the built-in prompt templates and their versions
    Prompts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tradeflow_utils::init_tracing_with(cli.log_filter.as_deref(), cli.log_format);

    match cli.command {
        Commands::Replay {
            script,
            format,
            ticker,
            date,
            env,
        } => {
            let replay = ReplayScript::load(&script)?;
            let config = if env {
                replay.config.clone().with_env()?
            } else {
                replay.config.clone()
            };
            let ticker = ticker.unwrap_or_else(|| replay.ticker.clone());
            let trade_date = date.unwrap_or(replay.trade_date);

            info!(script = %script.display(), %ticker, %trade_date, "Starting replay");
            let outcome = replay
                .orchestrator(config)?
                .run(&ticker, trade_date)
                .await;

            match format {
                OutputFormat::Text => print!("{}", outcome.render_text()),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).context("Failed to encode outcome")?
                ),
            }
        }
        Commands::Prompts => {
            let catalog = default_catalog()?;
            for name in catalog.names() {
                println!("{name}\t{}", catalog.version(name).unwrap_or("-"));
            }
        }
    }

    Ok(())
}
