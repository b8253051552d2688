use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use approvalwatch_scanner::approvals::ingest::EventIngestor;
use approvalwatch_scanner::config::Config;
use approvalwatch_scanner::notify::build_notifier;
use approvalwatch_scanner::scanner::orchestrator::Scanner;
use approvalwatch_scanner::scanner::provider::ProviderRegistry;
use approvalwatch_scanner::scanner::scheduler::run_scan_scheduler;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=info for output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("ApprovalWatch Scanner starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        chains = config.chains.len(),
        "Configuration loaded from {}",
        config_path
    );

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;

    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| eyre::eyre!("Failed to run migrations: {}", e))?;

    tracing::info!("Database migrations complete");

    // One cached provider per configured chain, shared by the scanner
    // and the wallet registration endpoint
    let providers = Arc::new(ProviderRegistry::new(&config.chains));

    // Spawn API server
    if config.api.enabled {
        let api_pool = pool.clone();
        let api_providers = providers.clone();
        let host = config.api.host.clone();
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) =
                approvalwatch_scanner::api::serve(api_pool, api_providers, &host, port).await
            {
                tracing::error!(error = %e, "API server failed");
            }
        });
    }

    // Assemble the scanner
    let ingestor = EventIngestor::from_config(&config.chains);
    let notifier = build_notifier(&config.notifications);
    let scanner = Arc::new(Scanner::new(
        pool.clone(),
        providers.clone(),
        ingestor,
        notifier,
        &config,
    ));

    // Create shutdown signal
    let shutdown = CancellationToken::new();

    let poll_interval = Duration::from_millis(config.scanner.poll_interval_ms);
    let scheduler_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        run_scan_scheduler(scanner, poll_interval, scheduler_shutdown).await;
    });

    tracing::info!("Scan scheduler started. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping scanner...");
    shutdown.cancel();

    let _ = handle.await;

    tracing::info!("ApprovalWatch Scanner stopped gracefully");
    Ok(())
}
