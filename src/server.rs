use crate::config::ServerConfig;
use crate::errors::GatewayError;
use crate::model::FindReplaceOutcome;
use crate::state::AppState;
use crate::tools;
use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        Ok(Self::from_state(Arc::new(AppState::new(config)?)))
    }

    pub fn from_state(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/drives", get(list_drives))
            .route("/items", get(list_items))
            .route("/sheets", get(list_sheets))
            .route("/read", post(read_range))
            .route("/write", post(write_range))
            .route("/format", post(format_range))
            .route("/rename-sheet", post(rename_sheet))
            .route("/rename-item", post(rename_item))
            .route("/find-replace", post(find_replace))
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.state.config().http_bind_address;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "gateway listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

async fn healthz() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

/// Shared per-operation plumbing: enablement check and timeout. Returns the
/// finished error response directly when the operation cannot run or fails.
async fn run_raw<T, F>(state: &Arc<AppState>, tool: &'static str, fut: F) -> Result<T, Response>
where
    F: Future<Output = Result<T>>,
{
    let config = state.config();
    if !config.is_tool_enabled(tool) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": format!("operation '{tool}' is disabled") })),
        )
            .into_response());
    }
    tracing::info!(tool, "operation requested");

    let result = match config.tool_timeout() {
        Some(timeout) => match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                return Err((
                    StatusCode::GATEWAY_TIMEOUT,
                    Json(json!({
                        "error": format!(
                            "operation '{tool}' timed out after {}ms",
                            timeout.as_millis()
                        )
                    })),
                )
                    .into_response());
            }
        },
        None => fut.await,
    };

    result.map_err(|error| error_response(tool, error))
}

async fn run_tool<T, F>(state: Arc<AppState>, tool: &'static str, fut: F) -> Response
where
    T: Serialize,
    F: Future<Output = Result<T>>,
{
    match run_raw(&state, tool, fut).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(response) => response,
    }
}

fn error_response(tool: &str, error: anyhow::Error) -> Response {
    if let Some(gateway) = error.downcast_ref::<GatewayError>() {
        let status = StatusCode::from_u16(gateway.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::debug!(tool, status = status.as_u16(), error = %gateway, "operation rejected");
        return (status, Json(gateway.to_body())).into_response();
    }

    tracing::error!(tool, error = %error, "operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": error.to_string() })),
    )
        .into_response()
}

async fn list_drives(
    State(state): State<Arc<AppState>>,
    Query(params): Query<tools::ListDrivesParams>,
) -> Response {
    run_tool(
        state.clone(),
        "list_drives",
        tools::list_drives(state, params),
    )
    .await
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(params): Query<tools::ListItemsParams>,
) -> Response {
    run_tool(state.clone(), "list_items", tools::list_items(state, params)).await
}

async fn list_sheets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<tools::ListSheetsParams>,
) -> Response {
    run_tool(
        state.clone(),
        "list_sheets",
        tools::list_sheets(state, params),
    )
    .await
}

async fn read_range(
    State(state): State<Arc<AppState>>,
    Json(params): Json<tools::ReadRangeParams>,
) -> Response {
    run_tool(state.clone(), "read_range", tools::read_range(state, params)).await
}

async fn write_range(
    State(state): State<Arc<AppState>>,
    Json(params): Json<tools::WriteRangeParams>,
) -> Response {
    run_tool(
        state.clone(),
        "write_range",
        tools::write_range(state, params),
    )
    .await
}

async fn format_range(
    State(state): State<Arc<AppState>>,
    Json(params): Json<tools::FormatRangeParams>,
) -> Response {
    run_tool(
        state.clone(),
        "format_range",
        tools::format_range(state, params),
    )
    .await
}

async fn rename_sheet(
    State(state): State<Arc<AppState>>,
    Json(params): Json<tools::RenameSheetParams>,
) -> Response {
    run_tool(
        state.clone(),
        "rename_sheet",
        tools::rename_sheet(state, params),
    )
    .await
}

async fn rename_item(
    State(state): State<Arc<AppState>>,
    Json(params): Json<tools::RenameItemParams>,
) -> Response {
    run_tool(
        state.clone(),
        "rename_item",
        tools::rename_item(state, params),
    )
    .await
}

async fn find_replace(
    State(state): State<Arc<AppState>>,
    Json(params): Json<tools::FindReplaceParams>,
) -> Response {
    let outcome = run_raw(&state, "find_replace", tools::find_replace(state.clone(), params)).await;

    match outcome {
        // A preview is deliberately a 409: nothing was applied and the
        // caller must confirm before anything will be.
        Ok(FindReplaceOutcome::Preview(preview)) => {
            (StatusCode::CONFLICT, Json(preview)).into_response()
        }
        Ok(FindReplaceOutcome::NoMatches(response)) => {
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(FindReplaceOutcome::Applied(response)) => {
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(response) => response,
    }
}
