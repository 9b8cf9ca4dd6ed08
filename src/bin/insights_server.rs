//! Natural-Language Analytics REST API Server
//!
//! Exposes the question pipeline over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Start the server
//! DB_HOST=db.internal DB_NAME=analytics GROQ_API_KEY=... \
//!   cargo run --bin insights_server --features server
//!
//! # Ask a question
//! curl -X POST http://localhost:8005/ask \
//!   -H "Content-Type: application/json" \
//!   -d '{"query": "show total sales yesterday"}'
//!
//! curl http://localhost:8005/api/health
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlPoolOptions;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use standard_insights::executor::MySqlExecutor;
use standard_insights::llm::GroqClient;
use standard_insights::schema::MySqlSchemaSource;
use standard_insights::{PipelineResult, QueryPipeline, Settings};

// Application state
#[derive(Clone)]
struct AppState {
    pipeline: Arc<QueryPipeline>,
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "insights_server=info,standard_insights=info,tower_http=info".to_string()),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;

    let database_url = settings.database_url();
    info!("Connecting to database at {}:{}", settings.db_host, settings.db_port);
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    let llm = Arc::new(GroqClient::from_env()?);
    let schema_source = Arc::new(MySqlSchemaSource::new(
        pool.clone(),
        settings.db_name.clone(),
        settings.allowed_tables(),
    ));
    let executor = Arc::new(MySqlExecutor::new(pool, settings.statement_timeout_secs));

    let pipeline = Arc::new(QueryPipeline::new(settings, schema_source, llm, executor));
    let app_state = AppState { pipeline };

    let app = create_router(app_state);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8005".to_string())
        .parse::<u16>()
        .unwrap_or(8005);

    let addr = format!("0.0.0.0:{}", port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/api/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// Ask a natural-language question
async fn ask(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<PipelineResult>, (StatusCode, Json<ErrorBody>)> {
    match state.pipeline.ask(&request.query).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            error!("Pipeline failure: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    detail: e.to_string(),
                }),
            ))
        }
    }
}
