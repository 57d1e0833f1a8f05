//! Agentry orchestrator entry point.
//!
//! Binary name: `agentryd`
//!
//! Parses CLI arguments, loads and validates the agent catalog (failing
//! fast on an invalid one), initializes the database and services, then
//! serves the HTTP API or runs a one-shot catalog check.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agentry_api::http;
use agentry_api::state::AppState;

#[derive(Parser)]
#[command(name = "agentryd", version, about = "Agent execution orchestrator")]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestrator HTTP server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Orchestrator configuration (secrets, budgets, tuning)
        #[arg(long, default_value = "agentry.toml")]
        config: PathBuf,

        /// Agent catalog
        #[arg(long, default_value = "agents.toml")]
        catalog: PathBuf,

        /// Database URL (defaults to AGENTRY_DATA_DIR or ~/.agentry)
        #[arg(long)]
        db: Option<String>,

        /// Export spans via OpenTelemetry (stdout exporter)
        #[arg(long)]
        otel: bool,
    },

    /// Validate the agent catalog and exit
    Check {
        #[arg(long, default_value = "agents.toml")]
        catalog: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let otel = matches!(cli.command, Commands::Serve { otel: true, .. });
    if otel {
        agentry_observe::tracing_setup::init_tracing(true)
            .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    } else {
        let filter = match cli.verbose {
            0 if cli.quiet => "error",
            0 => "info",
            1 => "info,agentry=debug",
            _ => "trace",
        };
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve {
            host,
            port,
            config,
            catalog,
            db,
            ..
        } => {
            let config = agentry_infra::config::load_config(&config)
                .await
                .context("loading orchestrator config")?;
            // Invalid catalog aborts startup, before any socket is bound.
            let catalog = agentry_infra::catalog::load_catalog(&catalog)
                .await
                .context("loading agent catalog")?;

            let db_url = db.unwrap_or_else(agentry_infra::sqlite::pool::default_database_url);
            let state = AppState::init(config, catalog, &db_url).await?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(
                addr = %addr,
                agents = state.catalog.len(),
                "orchestrator listening"
            );

            println!(
                "  {} Agentry orchestrator listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!(
                "  {} agents loaded across {} departments",
                console::style(state.catalog.len()).bold(),
                state.catalog.departments().len()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if otel {
                agentry_observe::tracing_setup::shutdown_tracing();
            }
            println!("\n  Server stopped.");
        }

        Commands::Check { catalog } => {
            let catalog = agentry_infra::catalog::load_catalog(&catalog)
                .await
                .context("loading agent catalog")?;

            println!();
            println!(
                "  {} Catalog valid: {} agents",
                console::style("✓").green(),
                console::style(catalog.len()).bold()
            );
            for dept in catalog.departments() {
                let count = catalog
                    .agents()
                    .iter()
                    .filter(|a| a.department_key == dept)
                    .count();
                println!("    {} {dept}: {count}", console::style("•").dim());
            }
            println!();
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
