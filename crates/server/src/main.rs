use coastline::api::start_webserver;
use coastline::config::load_config_or_panic;
use coastline::oauth2::OAuth2State;
use coastline::storage::create_storage;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "coastline=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    // -------- Tracing Initialization --------
    initialize_tracing();

    // Load config
    let config = load_config_or_panic();

    // Storage backend (durable connects and migrates)
    let storage = create_storage(&config.storage).await?;
    tracing::info!(backend = ?storage.kind(), "storage ready");

    let state = OAuth2State::from_config(storage, config.oauth2.clone(), &config.upstream)?;

    start_webserver(state, &config.listen_addr).await?;
    Ok(())
}
