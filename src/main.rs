use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use email_harvester::config::{ConfigOverrides, build_config};
use email_harvester::processor::{Harvester, append_emails, read_url_list, until_cancelled};
use email_harvester::{SiteReport, api};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn,warp=warn,fantoccini=warn,trust_dns_proto=warn,trust_dns_resolver=warn,html5ever=error,selectors=error";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract emails from one or more websites
    Extract {
        /// Website URLs. Without URLs or --input, URLs are read interactively.
        urls: Vec<String>,

        /// File with one URL per line
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Arc::new(build_config(&cli.overrides)?);
    let harvester = Arc::new(Harvester::new(config).context("Failed to initialise extractor")?);

    let outcome = run(cli.command, &harvester).await;
    harvester.shutdown().await;
    outcome
}

async fn run(command: Commands, harvester: &Arc<Harvester>) -> Result<()> {
    match command {
        Commands::Extract { mut urls, input } => {
            if let Some(path) = &input {
                let listed = read_url_list(path)
                    .with_context(|| format!("Failed to read URL list {}", path.display()))?;
                info!("Loaded {} URLs from {}", listed.len(), path.display());
                urls.extend(listed);
            }

            let outcome = if urls.is_empty() && input.is_none() {
                until_cancelled(interactive_loop(harvester), shutdown_signal()).await
            } else {
                until_cancelled(run_batch(harvester, urls), shutdown_signal()).await
            };
            outcome.unwrap_or_else(|| {
                warn!("Interrupted; results of unfinished sites were not saved");
                Ok(())
            })
        }
        Commands::Serve { port } => {
            info!("Starting API server on port {}", port);
            api::start_api_server(harvester.clone(), port, shutdown_signal()).await?;
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C. Never resolves when the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_batch(harvester: &Harvester, urls: Vec<String>) -> Result<()> {
    let reports = harvester.process_batch(urls, true).await;
    for report in &reports {
        print_report(report);
    }
    save_reports(harvester, &reports)
}

/// Reads URLs from stdin until `exit`, `quit`, `q` or end of input.
async fn interactive_loop(harvester: &Harvester) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("Enter website URL (or 'exit' to quit): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let url = line.trim();
        if matches!(url.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }
        if url.is_empty() {
            continue;
        }

        let report = harvester.process_url(url).await;
        print_report(&report);
        save_reports(harvester, std::slice::from_ref(&report))?;
    }
    Ok(())
}

fn print_report(report: &SiteReport) {
    if let Some(error) = &report.error {
        println!("{}: {}", report.url, error);
    } else if report.emails.is_empty() {
        println!("{}: no emails found", report.url);
    } else {
        println!("{}:", report.url);
        for email in &report.emails {
            println!("  {}", email);
        }
    }
}

fn save_reports(harvester: &Harvester, reports: &[SiteReport]) -> Result<()> {
    let output = &harvester.config().output_file;
    let written = append_emails(output, reports)
        .with_context(|| format!("Failed to write results to {}", output))?;
    if written > 0 {
        info!("Appended {} email(s) to {}", written, output);
    }
    Ok(())
}
