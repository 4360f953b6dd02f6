use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::info;
use webresearch_core::{
    ConfigLoader, DiskCache, ResearchAgent, ResearchOptions, TelemetryOptions, TraceCollector,
    init_metrics_from_env, init_telemetry,
};

#[derive(Parser, Debug)]
#[command(
    name = "webresearch-cli",
    version,
    about = "AI web research agent: searches the web and writes a cited markdown report"
)]
struct Cli {
    /// Research query or question. Prompted for on stdin when omitted.
    #[arg(long)]
    query: Option<String>,

    /// Path to a TOML config file (defaults to $WEBRESEARCH_CONFIG, then ./config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ignore cached reports for this run.
    #[arg(long)]
    no_cache: bool,

    /// Delete expired cache entries before doing anything else.
    #[arg(long)]
    purge_cache: bool,

    /// Print the pipeline stages after the report.
    #[arg(long)]
    show_trace: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = ConfigLoader::load(cli.config.clone()).context("failed to load configuration")?;

    init_telemetry(TelemetryOptions {
        env_filter: Some(config.logging.level.clone()),
        with_ansi: true,
    })?;
    init_metrics_from_env("webresearch-cli");

    if cli.purge_cache {
        let cache = DiskCache::from_config(&config.cache);
        let removed = cache.purge_expired()?;
        println!(
            "Removed {removed} expired cache entries from {}",
            cache.dir().display()
        );
        if cli.query.is_none() {
            return Ok(());
        }
    }

    let agent = ResearchAgent::from_config(config)?;

    let query = match cli.query {
        Some(query) => query,
        None => prompt_for_query()?,
    };

    let mut options = ResearchOptions::new(query);
    if cli.no_cache {
        options = options.without_cache();
    }

    let rt = Runtime::new()?;
    let outcome = rt.block_on(async move {
        info!(query = %options.query, "starting research");
        agent.research_with_options(options).await
    });

    println!(
        "Research completed in {:.1} seconds!",
        outcome.duration_secs
    );
    println!("\n{}", outcome.report);

    if cli.show_trace {
        let trace = TraceCollector::from_events(outcome.trace_events);
        eprintln!("\n{}", trace.render_lines());
    }

    Ok(())
}

fn prompt_for_query() -> Result<String> {
    println!("\nAI Web Research Agent");
    println!(
        "Enter your research question, and the agent will search the web, analyze the content, and provide a research report.\n"
    );
    print!("Enter your research query:\n> ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read query from stdin")?;
    Ok(line.trim().to_string())
}
