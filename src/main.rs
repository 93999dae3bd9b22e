mod config;
mod event;
mod llm;
mod routes;
mod services;
mod state;
mod tools;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env();

    // Sample data for the SQL tool (non-fatal: the tool reports errors in-band).
    if let Err(e) = tools::sql::seed_sample_database(&config.sql_tool_db_path) {
        tracing::warn!(error = %e, path = %config.sql_tool_db_path.display(), "sample database not seeded");
    }

    let http = llm::build_http_client(config.timeouts).expect("http client init failed");
    let models = llm::registry::ModelRegistry::load(&config.llm_config_path, http, config.default_max_tokens);
    if models.is_empty() {
        tracing::warn!(path = %config.llm_config_path.display(), "no LLM configurations loaded; chat turns will fail");
    } else {
        tracing::info!(count = models.len(), "LLM catalog loaded");
    }

    // Non-fatal: a failing provider only shows up in the log.
    if !config.disable_llm_calls {
        match models.check_default().await {
            Ok(model) => tracing::info!(%model, "LLM health check passed"),
            Err(e) => tracing::warn!(error = %e, "LLM health check failed"),
        }
    }

    let port = config.port;
    let app_name = config.app_name.clone();
    let state = state::AppState::new(config, models);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, %app_name, "server listening");
    axum::serve(listener, app).await.expect("server failed");
}
