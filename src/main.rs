use exostack_hub::app::AppContext;
use exostack_hub::api::ApiServer;
use exostack_hub::HubConfig;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("starting exostack hub");

    let config = HubConfig::load()?;
    let ctx = AppContext::new(config.clone());
    let liveness = ctx.liveness_monitor();
    let api_server = ApiServer::new(ctx, config);

    tokio::select! {
        _ = liveness.run() => {
            error!("liveness monitor exited unexpectedly");
        }
        result = api_server.run() => {
            if let Err(e) = result {
                error!("api server failed: {}", e);
            }
        }
    }

    Ok(())
}
