use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use dbkit::{ConnectOpts, DbHandle};
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use users::api::rest::handlers::REQUEST_TIMEOUT;
use users::domain::service::Service;
use users::infra::storage::pg_repo::PgUsersRepository;

mod ingress;
mod server;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Users Server - CRUD HTTP API over a PostgreSQL users table
#[derive(Parser)]
#[command(name = "users-server")]
#[command(about = "Users Server - CRUD HTTP API over a PostgreSQL users table")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for HTTP server (overrides config and APP_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Check configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; a broken one is reported
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env file: {e}");
        }
    }

    let args = CliArgs {
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    let mut config = AppConfig::load_layered(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    if args.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    runtime::logging::init_logging_from_config(&config.logging);
    tracing::info!("Users Server starting");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
    }
}

async fn run_server(config: AppConfig) -> Result<()> {
    config.validate()?;
    let shutdown = runtime::shutdown::signal_token();

    // Server-side cap matches the per-request deadline
    let connect_opts = ConnectOpts {
        statement_timeout: Some(REQUEST_TIMEOUT),
        ..ConnectOpts::default()
    };

    tracing::info!("Connecting to database: {}", config.database.dsn_redacted());
    let db = DbHandle::connect(&config.database.dsn(), connect_opts)
        .await
        .context("failed to connect to database")?;

    let repo = PgUsersRepository::new(db.pool().clone());
    let service = Arc::new(Service::new(Arc::new(repo)));
    let app = ingress::build_app(users::register_routes(Router::new(), service));

    let bind = (config.server.host.as_str(), config.server.port);
    let listener = match TcpListener::bind(bind).await {
        Ok(l) => l,
        Err(e) => {
            db.close().await;
            return Err(e).with_context(|| format!("failed to bind {}:{}", bind.0, bind.1));
        }
    };
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    let served = server::serve(listener, app, shutdown, server::ServerTimeouts::default()).await;

    db.close().await;
    tracing::info!("Database pool closed");
    served
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    config.validate()?;

    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!("Database: {}", config.database.dsn_redacted());
    println!("{}", config.to_yaml()?);

    Ok(())
}
