// Meter Reading Ingestion - Web Server
// REST API with Axum: CSV upload endpoint over the ingestion pipeline

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use meter_ingest::config::{init_tracing, load_env, DatabaseArgs};
use meter_ingest::{handle_upload, IngestService, UploadOutcome};

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "meter-server", version, about = "Meter reading upload API")]
struct ServerCli {
    #[command(flatten)]
    db: DatabaseArgs,

    /// Address to listen on
    #[arg(long, env = "METER_BIND_ADDR", default_value = "0.0.0.0:3000")]
    bind: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<IngestService>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Serialize)]
struct RefreshResponse {
    refreshed: bool,
    accounts: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/meter-readings/meter-reading-uploads - multipart CSV upload
async fn upload_meter_readings(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file_name = None;
    let mut content = Vec::new();

    // First part that carries a filename is the upload; other parts are ignored
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let Some(name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                match field.bytes().await {
                    Ok(bytes) => {
                        file_name = Some(name);
                        content = bytes.to_vec();
                        break;
                    }
                    Err(e) => {
                        return (StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e))
                            .into_response()
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e)).into_response()
            }
        }
    }

    let service = state.service.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        handle_upload(&service.pipeline, file_name.as_deref(), content)
    })
    .await;

    match outcome {
        Ok(UploadOutcome::Processed(result)) => (StatusCode::OK, Json(result)).into_response(),
        Ok(UploadOutcome::Rejected(message)) => (StatusCode::BAD_REQUEST, message).into_response(),
        Ok(UploadOutcome::Failed(message)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
        Err(e) => {
            error!(error = %e, "upload worker aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing file: {}", e),
            )
                .into_response()
        }
    }
}

/// POST /api/accounts/refresh - reload account ids after an administrative write
async fn refresh_accounts(State(state): State<AppState>) -> Response {
    let service = state.service.clone();
    let refreshed = tokio::task::spawn_blocking(move || {
        let refreshed = service.accounts_changed();
        RefreshResponse {
            refreshed,
            accounts: service.pipeline.cache().len(),
        }
    })
    .await;

    match refreshed {
        Ok(body) if body.refreshed => (StatusCode::OK, Json(ApiResponse::ok(body))).into_response(),
        Ok(body) => (StatusCode::SERVICE_UNAVAILABLE, Json(ApiResponse::ok(body))).into_response(),
        Err(e) => {
            error!(error = %e, "refresh worker aborted");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing("meter_ingest=info,meter_server=info,tower_http=info");

    let cli = ServerCli::parse();

    let service = IngestService::open(&cli.db)?;
    info!(
        database = %cli.db.path.display(),
        accounts = service.pipeline.cache().len(),
        "meter reading service ready"
    );

    let state = AppState {
        service: Arc::new(service),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route(
            "/meter-readings/meter-reading-uploads",
            post(upload_meter_readings),
        )
        .route("/accounts/refresh", post(refresh_accounts))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", cli.bind))?;

    info!(addr = %cli.bind, "server listening");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
