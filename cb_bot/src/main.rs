//! Group-chat Blackjack bot.
//!
//! Long-polls the Telegram Bot API, feeds updates to a fixed pool of workers
//! and serves the admin HTTP API until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use cb_bot::{
    api::{self, AppState},
    config::BotConfig,
    logging, metrics,
    telegram::{self, TelegramClient, TelegramSink},
};
use chat_blackjack::{
    bot::{Dispatcher, ReplyTemplates, WorkerPool, update_queue},
    db::{Database, GameStore, MemoryStore, PgGameStore},
    game::{BlackjackEngine, RandomCards},
};
use log::info;
use pico_args::Arguments;
use tokio::sync::watch;

const HELP: &str = "\
Run the group-chat Blackjack bot

USAGE:
  cb_bot [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Admin API bind address  [default: env ADMIN_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --workers    N           Number of update workers  [default: env NUM_WORKERS or 3]

FLAGS:
  --memory                 Keep sessions in memory instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  BOT_TOKEN                Bot API token (required)
  DATABASE_URL             PostgreSQL connection string
  ADMIN_TOKEN_SHA256       Hex SHA-256 digest of the admin API token
  METRICS_BIND             Prometheus exporter address (e.g., 0.0.0.0:9090)
  REPLY_TEMPLATES          Path to a reply template JSON file
  (See README.md for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    num_workers: Option<usize>,
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        num_workers: pargs.opt_value_from_str("--workers")?,
        memory: pargs.contains("--memory"),
    };

    logging::init();

    let config = BotConfig::from_env(args.bind, args.database_url, args.num_workers)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(Error::msg)?;
        info!("Metrics exported at http://{addr}/metrics");
    }

    let templates = match &config.reply_templates {
        Some(path) => ReplyTemplates::from_path(path)
            .with_context(|| format!("Failed to load reply templates from {}", path.display()))?,
        None => ReplyTemplates::bundled()?,
    };
    info!("Loaded {} reply templates", templates.len());

    let engine = BlackjackEngine::new(config.rules.clone(), Arc::new(RandomCards));

    if args.memory {
        info!("Using in-memory session store");
        let store = MemoryStore::new(config.rules.starting_balance);
        return run(&config, store, engine, templates).await;
    }

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to apply schema")?;
    info!("Database connected successfully");

    let store = PgGameStore::new(db.pool().clone(), config.rules.starting_balance);
    run(&config, store, engine, templates).await?;

    db.close().await;
    Ok(())
}

/// Run the poller, the workers and the admin API until Ctrl+C
async fn run<S: GameStore + Clone>(
    config: &BotConfig,
    store: S,
    engine: BlackjackEngine,
    templates: ReplyTemplates,
) -> Result<(), Error> {
    let client = TelegramClient::new(&config.telegram)?;
    let sink = Arc::new(TelegramSink::new(client.clone()));

    let (queue_tx, queue_rx) = update_queue();
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), engine, templates, sink));
    let workers = WorkerPool::spawn(dispatcher, queue_rx, config.num_workers);
    info!("Started {} workers", workers.len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let poller = tokio::spawn(telegram::poll_updates(
        client,
        queue_tx,
        config.telegram.poll_timeout_secs,
        shutdown_rx.clone(),
    ));

    let state = AppState::new(
        Arc::new(store),
        config.admin.token_sha256.clone(),
        config.num_workers,
    );
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.admin.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.admin.bind))?;
    info!(
        "Admin API is running at http://{}. Press Ctrl+C to stop.",
        config.admin.bind
    );

    let mut api_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = api_shutdown.changed().await;
        })
        .await
        .context("Admin API error")?;

    // The poller owns the only queue sender; workers drain what is left once it stops.
    if let Err(e) = poller.await {
        log::error!("Poller task failed: {e}");
    }
    workers.join().await;

    info!("Bot stopped");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {e}");
    }
}
