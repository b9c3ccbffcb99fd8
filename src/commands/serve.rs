use anyhow::{Context, Result};
use std::sync::Arc;

use postpilot::config::Config;
use postpilot::metrics::init_metrics;
use postpilot::server::ApiServer;

/// Start the autopilot API server
pub async fn serve(config: Config) -> Result<()> {
    println!("Starting Postpilot API Server");
    println!("=============================");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Database: {}", config.storage.sqlite_path.display());
    println!("  Publisher: {}", config.publisher.base_url);
    println!("  Max Accounts / Tick: {}", config.scheduler.max_per_tick);
    println!("  Lock TTL: {}s", config.scheduler.lock_ttl_secs);
    println!();

    // Register Prometheus metrics before the first request lands
    if let Err(e) = init_metrics() {
        tracing::warn!("Failed to initialize metrics: {}", e);
    }

    let (autopilot, store) = super::build_autopilot(&config).context("Failed to wire autopilot")?;

    let server = ApiServer::new(config.server.clone(), Arc::clone(&autopilot), store);

    println!("{}", server.info().display());
    println!();
    println!("API Endpoints:");
    println!("  POST /tick                    - Trigger a posting sweep");
    println!("  GET  /status                  - Scheduler snapshot");
    println!("  GET  /accounts                - List accounts");
    println!("  POST /accounts/{{id}}/enable    - Enable autopilot for an account");
    println!("  POST /accounts/{{id}}/disable   - Disable autopilot for an account");
    println!("  GET  /health                  - Health check");
    println!("  GET  /metrics                 - Prometheus metrics endpoint");
    println!();
    println!(
        "Postpilot server listening on http://{}",
        config.server.bind_address
    );
    println!("Press Ctrl+C to stop.\n");

    // Start with graceful shutdown
    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    println!("Postpilot server stopped.");
    Ok(())
}
