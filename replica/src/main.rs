use cdn_common::{LoggingOptions, init_logging};
use cdn_replica::{AppState, ReplicaConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _guard = init_logging(
        &LoggingOptions::new(
            "cdn_replica=info,asset_store=info,cdn_common=info,tower_http=info",
            "cdn-replica",
        )
        .with_env_log_dir(),
    )?;

    let config = ReplicaConfig::from_env_or_default();
    let state = AppState::open(config).await?;

    let cancel_token = CancellationToken::new();
    cdn_common::server::cancel_on_shutdown_signal(cancel_token.clone());

    cdn_replica::run(state, cancel_token).await?;

    tracing::info!("Replica stopped");
    Ok(())
}
