//! Route definitions
//!
//! - `POST   /v2/nodes`           register a profile URL
//! - `GET    /v2/nodes/:node_id`  node status
//! - `GET    /v2/nodes`           search posted nodes
//! - `DELETE /v2/nodes/:node_id`  delete a node whose profile is gone
//! - `GET    /v2/ping`            health check
//! - `GET    /metrics`            Prometheus text exposition

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use profile_index_core::{NodeError, NodeQuery, NodeServices, SearchDocument};

use super::{AddNodeRequest, ApiResponse, DeletedView, ErrorObject, HealthResponse, NodeView, ResponseMeta};

/// Shared handler state
pub struct AppState {
    pub services: Arc<NodeServices>,
}

impl AppState {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }
}

/// Build the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v2/ping", get(ping))
        .route("/v2/nodes", get(search_nodes).post(add_node))
        .route("/v2/nodes/:node_id", get(get_node).delete(delete_node))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error response carrying a `NodeError`
#[derive(Debug)]
pub struct ApiError {
    error: NodeError,
    pointer: Option<String>,
}

impl ApiError {
    pub fn at(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }

    pub fn to_error_object(&self) -> ErrorObject {
        let object = ErrorObject::new(
            self.error.status_code(),
            self.error.title(),
            self.error.to_string(),
        );
        match &self.pointer {
            Some(pointer) => object.with_pointer(pointer.clone()),
            None => object,
        }
    }
}

impl From<NodeError> for ApiError {
    fn from(error: NodeError) -> Self {
        Self {
            error,
            pointer: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.error.is_user_error() {
            tracing::info!(error = %self.error, "Request rejected");
        } else {
            tracing::error!(error = %self.error, "Request failed");
        }
        let status =
            StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiResponse::failure(vec![self.to_error_object()]);
        (status, Json(body)).into_response()
    }
}

/// Which request field a bad-request message refers to
fn request_pointer(error: &NodeError) -> Option<&'static str> {
    match error {
        NodeError::BadRequest(msg) if msg.starts_with("profile_url") => Some("/profile_url"),
        NodeError::BadRequest(msg) if msg.starts_with("version") || msg.starts_with("stale") => {
            Some("/version")
        }
        _ => None,
    }
}

async fn ping() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn add_node(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddNodeRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<NodeView>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::from(NodeError::bad_request(e.body_text())))?;

    let node = state
        .services
        .registry
        .add_node(&request.profile_url, request.version)
        .await
        .map_err(|e| {
            let pointer = request_pointer(&e);
            let err = ApiError::from(e);
            match pointer {
                Some(p) => err.at(p),
                None => err,
            }
        })?;

    Ok(Json(ApiResponse::success(NodeView::from(node))))
}

async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> Result<Json<ApiResponse<NodeView>>, ApiError> {
    let node = state.services.registry.get_node(&node_id).await?;
    Ok(Json(ApiResponse::success(NodeView::from(node))))
}

async fn search_nodes(
    State(state): State<Arc<AppState>>,
    query: Result<Query<NodeQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<SearchDocument>>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::from(NodeError::bad_request(e.body_text())))?;

    let results = state.services.indexing.search(&query).await?;
    let meta = ResponseMeta::new().with_pages(results.total, results.total_pages);
    Ok(Json(ApiResponse::success(results.hits).with_meta(meta)))
}

async fn delete_node(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> Result<Json<ApiResponse<DeletedView>>, ApiError> {
    let deleted = state.services.deletion.delete(&node_id).await?;
    let message = format!(
        "The Index has been updated. node_id: {} profile_url: {}",
        deleted.node_id, deleted.profile_url
    );
    let data = DeletedView {
        node_id: deleted.node_id,
        profile_url: deleted.profile_url,
    };
    Ok(Json(
        ApiResponse::success(data).with_meta(ResponseMeta::new().with_message(message)),
    ))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let text = state
        .services
        .metrics
        .gather_text()
        .map_err(|e| ApiError::from(NodeError::internal(e.to_string())))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    )
        .into_response())
}
