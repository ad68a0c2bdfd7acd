//! HTTP round-trips through the router with `tower::ServiceExt::oneshot`.

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{FakeConnector, sample_catalog, service_with};
use db_schema_explorer::transport::{AppState, router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn app(connector: Arc<FakeConnector>) -> Router {
    let (_, metadata) = service_with(connector);
    router(AppState::new(metadata), &[])
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn postgres_body() -> Value {
    json!({
        "db_type": "postgresql",
        "host": "localhost",
        "port": 5432,
        "database": "app",
        "username": "u",
        "password": "p"
    })
}

#[tokio::test]
async fn test_connect_then_overview() {
    let app = app(Arc::new(FakeConnector::new(sample_catalog())));

    let (status, body) = send(&app, post("/connect", postgres_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "connected", "db_type": "postgresql" }));

    let (status, body) = send(&app, get("/overview")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["db_type"], "postgresql");
    assert!(body["tables_count"].as_u64().is_some());
    assert!(body["database_size"].is_string());
}

#[tokio::test]
async fn test_trusted_sqlserver_connect() {
    let app = app(Arc::new(FakeConnector::new(sample_catalog())));

    let (status, body) = send(
        &app,
        post(
            "/connect",
            json!({ "db_type": "sqlserver", "server": "SRV", "database": "app", "trusted_connection": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["db_type"], "sqlserver");
}

#[tokio::test]
async fn test_metadata_before_connect_is_conflict() {
    let app = app(Arc::new(FakeConnector::new(sample_catalog())));

    for uri in ["/overview", "/tables", "/views", "/tables/similar"] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::CONFLICT, "{uri}");
        assert!(body["detail"].as_str().unwrap().contains("Not connected"));
    }

    let (status, _) = send(
        &app,
        post("/table/details", json!({ "schema": "public", "table": "customers" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_connect_errors() {
    let connector = Arc::new(FakeConnector::new(sample_catalog()));
    let app = app(connector.clone());

    let (status, body) = send(&app, post("/connect", json!({ "db_type": "oracle" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, body) = send(
        &app,
        post("/connect", json!({ "db_type": "mysql", "port": 0, "username": "root" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("port"));

    connector.reject_logins(true);
    let (status, body) = send(&app, post("/connect", postgres_body())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"].as_str().unwrap().contains("authentication failed"));
}

#[tokio::test]
async fn test_table_endpoints() {
    let app = app(Arc::new(FakeConnector::new(sample_catalog())));
    send(&app, post("/connect", postgres_body())).await;

    let (status, body) = send(&app, get("/tables")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0], json!({ "schema": "public", "table": "customers" }));

    let (status, body) = send(&app, get("/views")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0], json!({ "schema": "public", "view": "active_customers" }));

    let (status, body) = send(
        &app,
        post("/table/details", json!({ "schema": "public", "table": "customers" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"][1]["type"], "varchar(255)");
    assert_eq!(body["columns"][1]["nullable"], "YES");

    let (status, body) = send(
        &app,
        post("/table/indexes", json!({ "schema": "public", "table": "customers" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["indexes"][0]["index_name"], "customers_pkey");
    assert_eq!(body["indexes"][0]["columns"], "id");
    assert_eq!(body["indexes"][0]["is_primary"], true);

    let (status, body) = send(
        &app,
        post("/table/details", json!({ "schema": "public", "table": "ghost" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Table 'public.ghost' not found" }));
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_request() {
    let app = app(Arc::new(FakeConnector::new(sample_catalog())));
    send(&app, post("/connect", postgres_body())).await;

    let (status, body) = send(&app, post("/table/details", json!({ "schema": "public" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, _) = send(&app, post("/column/search", json!({ "column_name": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/tables/similar?threshold=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_supplemented_endpoints() {
    let app = app(Arc::new(FakeConnector::new(sample_catalog())));
    send(&app, post("/connect", postgres_body())).await;

    let (status, body) = send(&app, post("/column/search", json!({ "column_name": "id" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["column"], "id");
    assert_eq!(body["tables"].as_array().unwrap().len(), 3);

    let (status, body) = send(
        &app,
        post("/view/definition", json!({ "schema": "public", "view": "hidden" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("definition").is_none());

    let (status, body) = send(
        &app,
        post(
            "/view/dependencies",
            json!({ "schema": "public", "view": "order_summary", "max_depth": 3 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"][0]["kind"], "view");
    assert_eq!(body["edges"].as_array().unwrap().len(), 3);

    let (status, body) = send(&app, get("/tables/similar?threshold=0.9")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["threshold"], 0.9);
    assert_eq!(
        body["groups"][0]["tables"],
        json!(["public.orders", "public.orders_archive"])
    );
}

#[tokio::test]
async fn test_status_and_disconnect() {
    let app = app(Arc::new(FakeConnector::new(sample_catalog())));

    let (status, body) = send(&app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "connected": false }));

    send(&app, post("/connect", postgres_body())).await;
    let (_, body) = send(&app, get("/status")).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["db_type"], "postgresql");
    assert_eq!(body["database"], "app");

    for _ in 0..2 {
        let (status, body) = send(&app, post("/disconnect", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "disconnected" }));
    }

    let (status, _) = send(&app, get("/overview")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let app = app(Arc::new(FakeConnector::new(sample_catalog())));

    let request = Request::builder()
        .uri("/status")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
