use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use classroom_hub::api;
use classroom_hub::classroom::{Hub, Room, SandboxEvaluator};
use classroom_hub::config::{Config, LogFormat};

#[tokio::main]
async fn main() {
    let config = Arc::new(Config::from_env());
    init_tracing(config.log_format);

    let evaluator = Arc::new(SandboxEvaluator::from_config(&config.evaluator));
    let hub = Hub::spawn(config.room.name.clone(), Room::with_seed_catalog(), evaluator);

    tracing::info!(
        room = %config.room.name,
        evaluator = %config.evaluator.program,
        args = ?config.evaluator.args,
        timeout = ?config.evaluator.timeout,
        "Classroom hub configured"
    );

    let routes = api::classroom_routes::classroom_routes(hub, config.clone());

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(config.bind_address(), async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
    });

    tracing::info!(address = %addr, "Classroom hub listening");
    server.await;
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("classroom_hub=info,warp=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
