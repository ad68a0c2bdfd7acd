//! HTTP routes.
//!
//! Each handler is a thin shim over [`MetadataService`] or
//! [`ConnectionSession`]; failures leave through [`DbError`]'s `IntoResponse`
//! so every error body is `{detail}`.

use crate::db::ConnectionSession;
use crate::error::{DbError, DbResult};
use crate::metadata::MetadataService;
use crate::models::{
    ColumnSearchResult, ConnectionDescriptor, DatabaseOverview, DatabaseType, SessionInfo,
    SimilarTables, TableDetails, TableIndexes, TableRef, ViewDefinition, ViewDependencies,
    ViewRef,
};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub session: ConnectionSession,
    pub metadata: MetadataService,
}

impl AppState {
    pub fn new(metadata: MetadataService) -> Self {
        Self {
            session: metadata.session().clone(),
            metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub status: &'static str,
    pub db_type: DatabaseType,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(flatten)]
    pub session: Option<SessionInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnSearchRequest {
    pub column_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DependencyRequest {
    pub schema: String,
    pub view: String,
    #[serde(default)]
    pub max_depth: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Build the application router.
///
/// An empty `allowed_origins` list allows any origin.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/status", get(status))
        .route("/overview", get(overview))
        .route("/tables", get(list_tables))
        .route("/tables/similar", get(similar_tables))
        .route("/views", get(list_views))
        .route("/table/details", post(table_details))
        .route("/table/indexes", post(table_indexes))
        .route("/column/search", post(column_search))
        .route("/view/definition", post(view_definition))
        .route("/view/dependencies", post(view_dependencies))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Log a failed request before it is rendered.
fn reply<T>(operation: &'static str, result: DbResult<T>) -> DbResult<Json<T>> {
    result.map(Json).inspect_err(|e| {
        warn!(operation, status = e.status_code().as_u16(), error = %e, "Request failed");
    })
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> DbResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| DbError::invalid_input(rejection.body_text()))
}

async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectionDescriptor>, JsonRejection>,
) -> DbResult<Json<ConnectResponse>> {
    let descriptor = payload
        .map(|Json(value)| value)
        .map_err(|rejection| DbError::invalid_descriptor(rejection.body_text()));

    let result = match descriptor {
        Ok(descriptor) => state.session.open(&descriptor).await,
        Err(e) => Err(e),
    };

    reply(
        "connect",
        result.map(|info| ConnectResponse {
            status: "connected",
            db_type: info.db_type,
        }),
    )
}

async fn disconnect(State(state): State<AppState>) -> Json<DisconnectResponse> {
    if !state.session.close().await {
        info!("Disconnect requested with no active session");
    }
    Json(DisconnectResponse {
        status: "disconnected",
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let session = state.session.info().await;
    Json(StatusResponse {
        connected: session.is_some(),
        session,
    })
}

async fn overview(State(state): State<AppState>) -> DbResult<Json<DatabaseOverview>> {
    reply("overview", state.metadata.overview().await)
}

async fn list_tables(State(state): State<AppState>) -> DbResult<Json<Vec<TableRef>>> {
    reply("list_tables", state.metadata.list_tables().await)
}

async fn list_views(State(state): State<AppState>) -> DbResult<Json<Vec<ViewRef>>> {
    reply("list_views", state.metadata.list_views().await)
}

async fn table_details(
    State(state): State<AppState>,
    payload: Result<Json<TableRef>, JsonRejection>,
) -> DbResult<Json<TableDetails>> {
    let result = match body(payload) {
        Ok(req) => state.metadata.table_details(&req.schema, &req.table).await,
        Err(e) => Err(e),
    };
    reply("table_details", result)
}

async fn table_indexes(
    State(state): State<AppState>,
    payload: Result<Json<TableRef>, JsonRejection>,
) -> DbResult<Json<TableIndexes>> {
    let result = match body(payload) {
        Ok(req) => state.metadata.table_indexes(&req.schema, &req.table).await,
        Err(e) => Err(e),
    };
    reply("table_indexes", result)
}

async fn column_search(
    State(state): State<AppState>,
    payload: Result<Json<ColumnSearchRequest>, JsonRejection>,
) -> DbResult<Json<ColumnSearchResult>> {
    let result = match body(payload) {
        Ok(req) => state.metadata.search_columns(&req.column_name).await,
        Err(e) => Err(e),
    };
    reply("column_search", result)
}

async fn view_definition(
    State(state): State<AppState>,
    payload: Result<Json<ViewRef>, JsonRejection>,
) -> DbResult<Json<ViewDefinition>> {
    let result = match body(payload) {
        Ok(req) => state.metadata.view_definition(&req.schema, &req.view).await,
        Err(e) => Err(e),
    };
    reply("view_definition", result)
}

async fn view_dependencies(
    State(state): State<AppState>,
    payload: Result<Json<DependencyRequest>, JsonRejection>,
) -> DbResult<Json<ViewDependencies>> {
    let result = match body(payload) {
        Ok(req) => {
            state
                .metadata
                .view_dependencies(&req.schema, &req.view, req.max_depth)
                .await
        }
        Err(e) => Err(e),
    };
    reply("view_dependencies", result)
}

async fn similar_tables(
    State(state): State<AppState>,
    params: Result<Query<SimilarParams>, QueryRejection>,
) -> DbResult<Json<SimilarTables>> {
    let result = match params {
        Ok(Query(params)) => state.metadata.similar_tables(params.threshold).await,
        Err(rejection) => Err(DbError::invalid_input(rejection.body_text())),
    };
    reply("similar_tables", result)
}
