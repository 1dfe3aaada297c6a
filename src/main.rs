use std::sync::Arc;

use shardgate::{await_shutdown, ChannelEventForwarder, Config, GatewayManager};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_envvar();
    let options = config.into_options();

    let forwarder = Arc::new(ChannelEventForwarder::new());
    let manager = Arc::new(GatewayManager::new(options, forwarder));

    manager.connect();

    tokio::select! {
        _ = manager.run_error_loop() => {}
        res = await_shutdown() => {
            res?;
            info!("shutting down");
        }
    }

    manager.shutdown();
    Ok(())
}
