use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse::agent::Agent;
use pulse::analytics::{self, AnalyticsSnapshot};
use pulse::providers::configs::OpenAiProviderConfig;
use pulse::providers::openai::OpenAiProvider;

mod session;

use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// API key (can also be set via the OPENAI_API_KEY environment variable)
    #[arg(long)]
    api_key: Option<String>,

    /// Completions endpoint host
    #[arg(long, default_value = "https://api.openai.com")]
    host: String,

    /// Model to use
    #[arg(short, long, default_value = "gpt-4o")]
    model: String,

    /// Path to the analytics snapshot to answer from
    #[arg(short, long, default_value = "data/analytics.json")]
    data: PathBuf,

    /// Maximum tool iterations per question
    #[arg(long, default_value_t = 10)]
    max_iterations: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| env::var("OPENAI_API_KEY").ok())
        .context("API key must be provided via --api-key or OPENAI_API_KEY environment variable")?;

    let snapshot = match AnalyticsSnapshot::from_path(&cli.data) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!(error = %err, "continuing without analytics data");
            AnalyticsSnapshot::default()
        }
    };
    let snapshot = Arc::new(snapshot);

    let provider = OpenAiProvider::new(OpenAiProviderConfig::new(
        cli.host.clone(),
        api_key,
        cli.model.clone(),
    ))?;

    let agent = Agent::new(Box::new(provider))
        .with_system_prompt(analytics::SYSTEM_PROMPT)
        .with_tools(analytics::registry(snapshot.clone()))
        .with_max_iterations(cli.max_iterations);

    println!("Pulse {}", style("- your business analyst").dim());
    println!("Model: {}", style(&cli.model).cyan());
    println!(
        "Metrics loaded: {}",
        style(snapshot.available_events().len()).cyan()
    );
    println!(
        "{}",
        style("Commands: 'quit' to exit, 'clear' to reset the conversation").dim()
    );
    println!();

    Session::new(agent).start().await
}
