use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tokio::signal;
use tracing::{error, info};

use whalewatch::cli::{Cli, Commands};
use whalewatch::config::{self, Config};
use whalewatch::orchestrator::Orchestrator;
use whalewatch::store::{MongoStore, StoreGateway};
use whalewatch::upstream::{HttpUpstreamClient, UpstreamClient};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    config::init_logging();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    info!("whalewatch starting");

    let result = match cli.command {
        Commands::Run => run(config).await,
        Commands::Check => check(config).await,
        Commands::MigrateIndexes => migrate_indexes(config).await,
    };

    if let Err(e) = result {
        error!(error = format!("{e:#}"), "fatal error");
        std::process::exit(1);
    }

    info!("whalewatch stopped");
}

async fn run(config: Config) -> Result<()> {
    let store = Arc::new(
        MongoStore::connect(&config.mongodb_uri, &config.mongodb_database)
            .await
            .context("failed to connect to the document store")?,
    );
    let upstream = Arc::new(build_upstream(&config));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let orchestrator = Orchestrator::new(store, upstream, config);

    // Run the poll loop on its own task so the shutdown signal can be
    // awaited independently: racing the two in one `select!` would drop
    // (cancel) the orchestrator future the instant the signal resolves,
    // before it ever observes `shutdown_tx` and drains the delivery queue.
    let run_handle = tokio::spawn(orchestrator.run(shutdown_rx));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining in-flight work");
    let _ = shutdown_tx.send(true);

    if let Err(e) = run_handle.await {
        error!(error = %e, "orchestrator task panicked");
    }

    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let store = MongoStore::connect(&config.mongodb_uri, &config.mongodb_database)
        .await
        .context("failed to connect to the document store")?;
    println!("{} store connection", "\u{2713}".green());

    let upstream = build_upstream(&config);

    store
        .list_active_user_filters()
        .await
        .context("failed to read userFilterConfigs/chatAccounts")?;
    println!("{} store read path (userFilterConfigs, chatAccounts)", "\u{2713}".green());

    upstream
        .load_taxonomy()
        .await
        .context("failed to reach the upstream taxonomy service")?;
    println!("{} upstream taxonomy service reachable", "\u{2713}".green());

    info!("store and upstream connectivity verified");
    Ok(())
}

async fn migrate_indexes(config: Config) -> Result<()> {
    let store = MongoStore::connect(&config.mongodb_uri, &config.mongodb_database)
        .await
        .context("failed to connect to the document store")?;
    store
        .ensure_indexes(
            std::time::Duration::from_secs(config.market_ttl_hours * 3600),
            std::time::Duration::from_secs(config.taxonomy_ttl_hours * 3600),
        )
        .await
        .context("failed to create or repair store indexes")?;
    println!("{} indexes created or already present", "\u{2713}".green());
    info!("indexes created or already present");
    Ok(())
}

fn build_upstream(config: &Config) -> HttpUpstreamClient {
    HttpUpstreamClient::new(
        config.trade_feed_url.clone(),
        config.market_service_url.clone(),
        config.taxonomy_sports_url.clone(),
        config.taxonomy_tags_url.clone(),
        config.chat_api_base_url.clone(),
    )
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
