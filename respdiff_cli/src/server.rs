use crate::report::{ComparisonReport, HistoryEntry};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use respdiff_common::{CompareRequest, ComparisonRecord, RecordId, RespDiffError};
use respdiff_core::{ComparisonService, ComparisonStore};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub service: ComparisonService,
    pub summary_chars: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/v1/compare", post(compare))
        .route("/api/v1/history", get(history))
        .route("/api/v1/latest", get(latest))
        .route("/api/v1/comparisons/:id", get(show))
        .with_state(state)
}

/// Serve the API until Ctrl+C
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Shutting down server...");
}

#[derive(Debug)]
pub enum ApiError {
    Engine(RespDiffError),
    NotFound(String),
}

impl From<RespDiffError> for ApiError {
    fn from(err: RespDiffError) -> Self {
        ApiError::Engine(err)
    }
}

/// HTTP status for an engine failure; fetch failures are upstream problems
pub fn status_for(err: &RespDiffError) -> StatusCode {
    if err.is_fetch_failure() {
        return StatusCode::BAD_GATEWAY;
    }
    match err {
        RespDiffError::Parse { .. } | RespDiffError::UnsupportedFormat { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RespDiffError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self {
            ApiError::Engine(err) => (status_for(&err), err.kind(), err.to_string()),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "not_found", detail),
        };
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, detail);
        }
        (status, Json(json!({ "error": kind, "detail": detail }))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<ComparisonReport>, ApiError> {
    let outcome = state.service.run(&request).await?;
    Ok(Json(ComparisonReport::new(
        &outcome.record,
        state.summary_chars,
        Some(outcome.persisted),
    )))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let limit = params.limit.unwrap_or(10);
    let records = with_store(&state, move |store| store.list_recent(limit)).await?;
    Ok(Json(records.iter().map(HistoryEntry::from).collect()))
}

async fn latest(State(state): State<AppState>) -> Result<Json<ComparisonRecord>, ApiError> {
    with_store(&state, |store| store.latest())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No comparisons found".to_string()))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ComparisonRecord>, ApiError> {
    let id: RecordId = id
        .parse()
        .map_err(|e| RespDiffError::InvalidRequest(format!("Invalid comparison id '{}': {}", id, e)))?;
    with_store(&state, move |store| store.get(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Comparison {} not found", id)))
}

/// Run a store call on the blocking pool
async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&dyn ComparisonStore) -> Result<T, RespDiffError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(state.service.store());
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| RespDiffError::Persistence(format!("Store task failed: {}", e)))?
        .map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use respdiff_common::{EndpointRequest, RawResponse, ServiceConfig};
    use respdiff_core::{ComparisonEngine, Fetcher, MemoryStore};
    use serde_json::Value;
    use tower::ServiceExt;

    /// Responds by URL path: `/empty` has no body, `/down` fails to connect
    struct StubFetcher;

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, endpoint: &EndpointRequest) -> Result<RawResponse, RespDiffError> {
            let (content_type, body) = match endpoint.url.rsplit('/').next().unwrap_or("") {
                "one" => ("application/json", r#"{"user":{"name":"ann","age":30}}"#),
                "two" => ("application/json", r#"{"user":{"age":31,"name":"ann"}}"#),
                "xml" => ("application/xml", "<user><name>ann</name></user>"),
                "bad" => ("application/json", r#"{"user":"#),
                "empty" => ("text/plain", ""),
                _ => {
                    return Err(RespDiffError::Transport {
                        url: endpoint.url.clone(),
                        message: "connection refused".into(),
                    })
                }
            };
            Ok(RawResponse::new(200, content_type, body))
        }
    }

    fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = ComparisonService::new(
            Arc::new(StubFetcher),
            Arc::new(ComparisonEngine::default()),
            store.clone(),
            &ServiceConfig::default(),
        );
        let state = AppState {
            service,
            summary_chars: 500,
        };
        (router(state), store)
    }

    fn compare_request(left: &str, right: &str) -> Request<Body> {
        let body = json!({
            "left": { "url": format!("http://svc.test/{}", left), "method": "get" },
            "right": { "url": format!("http://svc.test/{}", right), "method": "GET" },
        });
        Request::builder()
            .method("POST")
            .uri("/api/v1/compare")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_compare_returns_report() {
        let (app, store) = app();
        let (status, body) = send(app, compare_request("one", "two")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["metrics"]["diff_count"], 1);
        assert_eq!(body["metrics"]["formats_matched"], true);
        assert_eq!(body["left_content_type"], "json");
        assert_eq!(body["persisted"], true);
        assert!(body["diff_summary"].as_str().unwrap().contains("$.user.age"));
        assert_eq!(store.list_recent(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_format_mismatch() {
        let (app, _) = app();
        let (status, body) = send(app, compare_request("one", "xml")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metrics"]["formats_matched"], false);
        assert_eq!(body["right_content_type"], "xml");
    }

    #[tokio::test]
    async fn test_fetch_failures_are_bad_gateway() {
        let (app, store) = app();
        let (status, body) = send(app.clone(), compare_request("one", "empty")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "empty_response");

        let (status, body) = send(app, compare_request("down", "one")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "empty_response");
        assert!(body["detail"].as_str().unwrap().contains("left"));

        assert!(store.latest().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parse_failure_is_unprocessable() {
        let (app, _) = app();
        let (status, body) = send(app, compare_request("one", "bad")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "unsupported_format");
    }

    #[tokio::test]
    async fn test_history_latest_and_show() {
        let (app, _) = app();

        let (status, _) = send(app.clone(), get("/api/v1/latest")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, first) = send(app.clone(), compare_request("one", "two")).await;
        let (_, second) = send(app.clone(), compare_request("one", "one")).await;

        let (status, history) = send(app.clone(), get("/api/v1/history?limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["id"], second["id"]);

        let (status, latest) = send(app.clone(), get("/api/v1/latest")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["id"], second["id"]);

        let uri = format!("/api/v1/comparisons/{}", first["id"].as_str().unwrap());
        let (status, record) = send(app.clone(), get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["metrics"]["diff_count"], 1);
        assert_eq!(record["left_raw"]["body"], r#"{"user":{"name":"ann","age":30}}"#);

        let (status, _) = send(app.clone(), get(&format!("/api/v1/comparisons/{}", RecordId::new()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app, get("/api/v1/comparisons/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }
}
