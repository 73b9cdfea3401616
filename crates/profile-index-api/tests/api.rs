//! HTTP boundary tests

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use profile_index_api::{create_router, AppState};
use profile_index_core::deletion::StaticProbe;
use profile_index_core::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SCHEMAS: &str = "https://schemas.example";
const PROFILE: &str = "https://member.example/profile.json";

struct TestApp {
    router: Router,
    store: Arc<InMemoryNodeStore>,
    bus: Arc<InMemoryBus>,
    loader: Arc<StaticLoader>,
    probe: Arc<StaticProbe>,
}

async fn test_app() -> TestApp {
    let store = Arc::new(InMemoryNodeStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let loader = Arc::new(StaticLoader::new());
    let probe = Arc::new(StaticProbe::new());
    loader.insert_json(
        format!("{SCHEMAS}/default-v1.json"),
        &json!({"type": "object", "required": ["name"]}),
    );

    let deps = Collaborators {
        store: store.clone(),
        search: Arc::new(InMemorySearch::new()),
        bus: bus.clone(),
        cache: Arc::new(InMemoryDedupCache::new()),
        loader: loader.clone(),
        probe: probe.clone(),
        clock: Arc::new(FixedClock::new(1_700_000_000)),
    };
    let config = CoreConfig::builder().schemas_url(SCHEMAS).build();
    let services = Arc::new(NodeServices::new(
        config,
        deps,
        Arc::new(NodeMetrics::new().unwrap()),
    ));
    services.start_consumers().await.unwrap();

    TestApp {
        router: create_router(Arc::new(AppState::new(services))),
        store,
        bus,
        loader,
        probe,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_node(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v2/nodes")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn add_and_settle(app: &TestApp) -> String {
    let (status, body) = send(
        &app.router,
        post_node(json!({"profile_url": PROFILE, "version": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.bus.wait_idle(Duration::from_secs(2)).await);
    body["data"]["node_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_ping() {
    let app = test_app().await;
    let (status, body) = send(&app.router, get("/v2/ping")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_add_then_get_node() {
    let app = test_app().await;
    app.loader
        .insert_json(PROFILE, &json!({"name": "Acme", "linked_schemas": []}));

    let node_id = add_and_settle(&app).await;
    assert_eq!(node_id, profile_index_core::node_id(PROFILE));

    let (status, body) = send(&app.router, get(&format!("/v2/nodes/{node_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "posted");
    assert_eq!(body["data"]["profile_url"], PROFILE);
    assert!(body["data"]["profile_hash"].is_string());
}

#[tokio::test]
async fn test_get_node_reports_failure_reasons() {
    let app = test_app().await;
    app.loader.insert_json(PROFILE, &json!({"name": "Acme"}));

    let node_id = add_and_settle(&app).await;
    let (_, body) = send(&app.router, get(&format!("/v2/nodes/{node_id}"))).await;
    assert_eq!(body["data"]["status"], "validation_failed");
    assert_eq!(
        body["data"]["failure_reasons"],
        json!([format!("Could not read linked_schemas from profile_url: {PROFILE}")])
    );
}

#[tokio::test]
async fn test_add_node_validation_errors() {
    let app = test_app().await;

    let (status, body) = send(&app.router, post_node(json!({"version": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["status"], 400);
    assert_eq!(body["errors"][0]["source"]["pointer"], "/profile_url");

    let (status, body) = send(&app.router, post_node(json!({"profile_url": PROFILE}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["source"]["pointer"], "/version");

    let bad_json = Request::builder()
        .method("POST")
        .uri("/v2/nodes")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app.router, bad_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["title"], "Bad Request");
}

#[tokio::test]
async fn test_get_unknown_node_is_404() {
    let app = test_app().await;
    let (status, body) = send(&app.router, get("/v2/nodes/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["title"], "Node Not Found");
}

#[tokio::test]
async fn test_search_nodes() {
    let app = test_app().await;
    app.loader.insert_json(
        PROFILE,
        &json!({"name": "Acme", "linked_schemas": [], "country": "Germany"}),
    );
    add_and_settle(&app).await;

    let (status, body) = send(&app.router, get("/v2/nodes?country=de&page_size=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["meta"]["total_pages"], 1);
    assert_eq!(body["data"][0]["profileUrl"], PROFILE);
    assert_eq!(body["data"][0]["maplocation"]["country"], "DE");

    let (status, body) = send(&app.router, get("/v2/nodes?lat=1.0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["status"], 400);
}

#[tokio::test]
async fn test_delete_conflict_then_success() {
    let app = test_app().await;
    app.loader
        .insert_json(PROFILE, &json!({"name": "Acme", "linked_schemas": []}));
    let node_id = add_and_settle(&app).await;

    app.probe.set(
        PROFILE,
        ProbeOutcome::Response {
            status: 200,
            json_body: true,
        },
    );
    let (status, body) = send(&app.router, delete(&format!("/v2/nodes/{node_id}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["title"], "Profile Still Exists");

    app.probe.set(
        PROFILE,
        ProbeOutcome::Response {
            status: 404,
            json_body: false,
        },
    );
    let (status, body) = send(&app.router, delete(&format!("/v2/nodes/{node_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["meta"]["message"],
        format!("The Index has been updated. node_id: {node_id} profile_url: {PROFILE}")
    );

    let tombstone = app.store.get(&node_id).await.unwrap().unwrap();
    assert_eq!(tombstone.status, NodeStatus::Deleted);

    let (status, _) = send(&app.router, delete(&format!("/v2/nodes/{node_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let app = test_app().await;
    app.loader.insert_json(PROFILE, &json!({"name": "Acme"}));
    add_and_settle(&app).await;

    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("profile_index_validations_total"));
}
