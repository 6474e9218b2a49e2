use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gossamer::api;
use gossamer::cli;
use gossamer::Cluster;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gossamer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let args = cli::Cli::parse();
    let http_address = args.http_address();
    let config = args.into_config()?;

    let cluster = Arc::new(Cluster::join(config).await?);
    info!(
        "Member {} joined on {} with {} members",
        cluster.member_id(),
        cluster.address(),
        cluster.members().len()
    );

    // Build Axum Router
    let api = api::api(Arc::clone(&cluster));

    // Start server
    info!("Starting status API on {}", http_address);
    axum::Server::bind(&http_address)
        .serve(api.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Leaving cluster");
    cluster.shutdown().await?;
    Ok(())
}
