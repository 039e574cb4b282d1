use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use teloxide::Bot;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use watcher::config::{Config, StoreKind};
use watcher::db::{make_pool, PostgresStore};
use watcher::manager::{SubscriptionManager, SystemClock};
use watcher::notify::TelegramNotifier;
use watcher::poll::PollCycle;
use watcher::store::{MemoryStore, SubscriptionStore};
use watcher::telemetry::FirebaseTelemetry;
use watcher::{bot, metrics, rest};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("watcher=info,teloxide=warn")),
        )
        .init();

    info!("Starting moisture watcher");
    info!("Telemetry: {}", config.firebase_database);
    info!("Store: {:?}", config.store);
    info!("HTTP server: {}", config.http_addr);

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
        std::process::exit(1);
    }

    let store: Arc<dyn SubscriptionStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Postgres => {
            let pool = match config.database_url() {
                Ok(url) => make_pool(url).await,
                Err(e) => Err(e),
            };
            match pool {
                Ok(pool) => Arc::new(PostgresStore::new(pool)),
                Err(e) => {
                    error!("Failed to connect to database: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let telemetry = match FirebaseTelemetry::new(
        &config.firebase_database,
        config.firebase_auth.clone(),
        Duration::from_secs(config.send_timeout_secs),
    ) {
        Ok(telemetry) => Arc::new(telemetry),
        Err(e) => {
            error!("Failed to create telemetry client: {}", e);
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_token);
    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let clock = Arc::new(SystemClock);

    let manager = Arc::new(SubscriptionManager::new(
        Arc::clone(&store),
        telemetry.clone(),
        clock,
    ));
    let poll = PollCycle::new(Arc::clone(&store), telemetry, notifier, config.poll_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut poll_handle = tokio::spawn(async move {
        poll.run(shutdown_rx).await;
    });

    let bot_handle = tokio::spawn(bot::run_bot(bot, manager));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", config.http_addr);

    let app = rest::create_router(Arc::clone(&store));
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = &mut poll_handle => {
            error!("Poll task terminated");
        }
        _ = bot_handle => {
            error!("Telegram dispatcher terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            // Let an in-flight tick finish its sends and watermark updates
            let _ = poll_handle.await;
        }
    }

    info!("Shutting down");
}
