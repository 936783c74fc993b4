use parley_ai::{ModelCatalog, ModelRegistry, OllamaGateway};
use parley_conversation::{ConversationService, ToolRegistry};
use parley_server::{config::ServerConfig, routes, tools::register_builtin_tools};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!(
        ollama = %config.ollama.base_url,
        default_model = %config.conversation.default_model,
        "Loaded configuration"
    );

    let gateway = OllamaGateway::new(config.ollama.base_url.clone(), config.ollama.timeout())
        .expect("failed to build Ollama client");
    let models = ModelRegistry::new(ModelCatalog::ollama_defaults(), Arc::new(gateway));

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools).expect("failed to register built-in tools");
    tracing::info!(tools = tools.len(), "Registered tools");

    let service = Arc::new(ConversationService::new(models, tools, config.conversation));
    let app = routes::router(service);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
