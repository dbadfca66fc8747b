// src/main.rs
// BRANDSCOPE - brand & competitor research
// `run` executes one research job in the foreground, `serve` exposes the job API.

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand};
use dashmap::DashMap;
use tracing_subscriber::EnvFilter;

use brandscope_core::api::{self, AppState};
use brandscope_core::config::{load_config, ResearchConfig};
use brandscope_core::orchestrator::{ResearchOrchestrator, ResearchRequest};
use brandscope_core::progress::Progress;
use brandscope_core::reporter::Reporter;
use brandscope_core::search::ProviderKind;

#[derive(Parser)]
#[command(name = "brandscope", version, about = "Brand and competitor research pipeline")]
struct Cli {
    /// Configuration file (defaults to ./brandscope.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research one brand and write the report
    Run {
        /// Official site URL, or a brand name to look up
        #[arg(long)]
        seed: Option<String>,
        #[arg(long, default_value = "")]
        industry: String,
        #[arg(long, default_value = "")]
        audience: String,
        /// Brand name to try when no seed URL is given (repeatable)
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        /// Competitor used when the ontology lists none (repeatable)
        #[arg(long = "competitor")]
        competitors: Vec<String>,
        /// Preferred search provider: tavily or duckduckgo
        #[arg(long)]
        provider: Option<ProviderKind>,
        /// Competitor pipelines to run in parallel
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Serve the job API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Run {
            seed,
            industry,
            audience,
            keywords,
            competitors,
            provider,
            workers,
            output_dir,
        } => {
            let mut config = config;
            if let Some(provider) = provider {
                config.search.preferred_provider = provider;
            }
            if let Some(workers) = workers {
                config.competitor_workers = workers.max(1);
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            let request = ResearchRequest {
                seed,
                industry,
                audience,
                keywords,
                competitors,
            };
            run(config, &request)
        }
        Command::Serve { host, port } => serve(config, &host, port),
    }
}

fn run(config: ResearchConfig, request: &ResearchRequest) -> anyhow::Result<()> {
    let orchestrator = ResearchOrchestrator::from_config(config).context("failed to build pipeline")?;
    let run = orchestrator
        .run_research(request, &Progress::tracing())
        .context("research aborted")?;
    Reporter::print_summary(&run.report, run.output_path.as_deref());
    Ok(())
}

fn serve(config: ResearchConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let orchestrator = Arc::new(ResearchOrchestrator::from_config(config).context("failed to build pipeline")?);
    let app_state = web::Data::new(AppState {
        orchestrator,
        jobs: Arc::new(DashMap::new()),
    });

    tracing::info!(host, port, "job API listening");
    let server_state = app_state.clone();
    let served = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(server_state.clone())
                .configure(api::configure)
        })
        .bind((host, port))?
        .run()
        .await
    });
    // The last orchestrator handle owns the listings runtime, which must not
    // be dropped inside an async context.
    drop(app_state);
    served?;
    Ok(())
}
