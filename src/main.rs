use axum::serve;
use entity_gateway::build_app;
use entity_gateway::config::AppConfig;
use entity_gateway::logic::ControllerRegistry;
use entity_gateway::seed;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}, prefix={}",
        config.server.host,
        config.server.port,
        config.api.route_prefix
    );

    let load_seed_data = std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true";
    let store = Arc::new(seed::build_store(load_seed_data)?);

    let app = build_app(store, ControllerRegistry::new(), config.api.clone());

    run_server(app, &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Entity gateway running on http://{}", bind_address);
    log::info!(
        "Service document at http://{}{}",
        bind_address,
        config.api.normalized_prefix()
    );

    serve(listener, app).await?;

    Ok(())
}
