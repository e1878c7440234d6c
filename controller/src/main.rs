use cdn_common::{LoggingOptions, init_logging};
use cdn_controller::{AppState, ControllerConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _guard = init_logging(
        &LoggingOptions::new(
            "cdn_controller=info,cdn_common=info,tower_http=info",
            "cdn-controller",
        )
        .with_env_log_dir(),
    )?;

    let config = ControllerConfig::from_env_or_default()?;
    let state = AppState::new(config)?;

    let cancel_token = CancellationToken::new();
    cdn_common::server::cancel_on_shutdown_signal(cancel_token.clone());

    cdn_controller::run(state, cancel_token).await?;

    tracing::info!("Controller stopped");
    Ok(())
}
