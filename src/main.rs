use std::sync::Arc;

use tower_http::cors::CorsLayer;

use npc_backend::ai::OpenRouterClient;
use npc_backend::api;
use npc_backend::config::Config;
use npc_backend::db::Database;
use npc_backend::metrics;
use npc_backend::npc::NpcDirectory;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let npcs = NpcDirectory::load(&config.npc_config).expect("Failed to load NPC config");
    tracing::info!("loaded {} NPC profiles", npcs.len());
    let npcs = Arc::new(npcs);

    if config.ai.api_key.is_empty() {
        tracing::warn!("OPENROUTER_API_KEY is not set; completion requests will be rejected");
    }
    let provider =
        Arc::new(OpenRouterClient::new(config.ai.clone()).expect("Failed to build AI client"));

    let app = api::router(
        db,
        npcs,
        provider,
        config.history_window,
        config.event_window,
    )
    .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("Failed to bind port");

    tracing::info!("NPC backend listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
