use anyhow::Context;
use tower_http::cors::CorsLayer;

use ollama_relay::{config::RelayConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    ollama_relay::init_tracing("ollama_relay=info,tower_http=info");

    let config = RelayConfig::from_env()?;
    let addr = config.bind_addr;
    tracing::info!(
        ollama_host = %config.ollama_host,
        model = %config.default_model,
        timeout_secs = config.chat_timeout.as_secs(),
        "starting relay"
    );

    let state = AppState::new(config)?.shared();

    let cors = CorsLayer::very_permissive();

    let app = routes::create_router().with_state(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("relay listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
