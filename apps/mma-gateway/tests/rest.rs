use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use mma_config::{AppConfig, build_memories};
use mma_gateway::{AppState, RestFeatures, build_app};
use mma_ingest::IngestService;
use mma_telemetry::GatewayStats;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const CONFIG: &str = r#"
memory:
  memories:
    plant:
      default: true
      coils: { size: 16 }
      discrete_inputs: { size: 16 }
      holding_registers: { start: 40000, size: 16 }
      input_registers: { size: 16 }
      state_sealing:
        enable: true
        gate: { area: discrete_inputs, address: 0 }
    lab:
      coils: { size: 4 }
      discrete_inputs: { size: 4 }
      holding_registers: { size: 4 }
      input_registers: { size: 4 }
routing:
  unit_id_map:
    1: plant
rest:
  enabled: true
  tokens: ["secret"]
"#;

const TOKEN: &str = "Bearer secret";

fn setup(features: RestFeatures) -> (Router, AppState) {
    let config = AppConfig::from_yaml_str(CONFIG).expect("config");
    let memories = Arc::new(build_memories(&config.memory).expect("memories"));
    let ingest = Arc::new(IngestService::new(memories));
    let mut state = AppState::new(
        &config.rest,
        config.memory.clone(),
        ingest,
        Arc::new(GatewayStats::new()),
        None,
    );
    state.features = features;
    (build_app(state.clone()), state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json")
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, TOKEN)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    post_raw(uri, body.to_string())
}

fn post_raw(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, TOKEN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("request")
}

#[tokio::test]
async fn health_is_public_and_carries_request_ids() {
    let (app, _) = setup(RestFeatures::all());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-trace-id"));
}

#[tokio::test]
async fn missing_or_wrong_token_is_unauthorized() {
    let (app, state) = setup(RestFeatures::all());

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/api/v1/diagnostics/stats")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH.UNAUTHORIZED");

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/api/v1/diagnostics/stats")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let snapshot = state.stats.snapshot();
    assert_eq!(snapshot.rest_unauthorized, 2);
    assert_eq!(snapshot.rest_requests, 2);
}

#[tokio::test]
async fn ingest_then_read_discrete_inputs() {
    let (app, state) = setup(RestFeatures::all());

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/ingest",
            json!({ "memory": "plant", "area": "discrete_inputs", "address": 1, "bools": [1, 0, 1] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "accepted");
    assert_eq!(body["data"]["written"], 3);

    let (status, body) = send(
        &app,
        get("/api/v1/memory/read?memory=plant&area=discrete_inputs&address=0&count=4"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["values"], json!([false, true, false, true]));

    let snapshot = state.stats.snapshot();
    assert_eq!(snapshot.rest_ingest, 1);
    assert_eq!(snapshot.ingest_written, 3);
    assert_eq!(snapshot.rest_reads, 1);
}

#[tokio::test]
async fn ingest_input_registers_into_secondary_memory() {
    let (app, state) = setup(RestFeatures::all());
    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/ingest",
            json!({ "memory": "lab", "area": "input_registers", "address": 2, "values": [7, 65535] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let lab = state.memories.get("lab").expect("lab");
    assert_eq!(lab.read_input_registers(2, 2).expect("read"), vec![7, 65535]);
}

#[tokio::test]
async fn ingest_rejects_operator_areas() {
    let (app, state) = setup(RestFeatures::all());
    for area in ["coils", "holding_registers"] {
        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/ingest",
                json!({ "memory": "plant", "area": area, "address": 0, "values": [1] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["message"], "area is not writable via ingest");
    }
    assert_eq!(state.stats.snapshot().rest_rejected, 2);
}

#[tokio::test]
async fn ingest_error_mapping() {
    let (app, state) = setup(RestFeatures::all());

    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/ingest",
            json!({ "memory": "missing", "area": "input_registers", "address": 0, "values": [1] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/ingest",
            json!({ "memory": "plant", "area": "discrete_inputs", "address": 0, "bools": [2] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/ingest",
            json!({ "memory": "plant", "area": "input_registers", "address": 15, "values": [1, 2] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, post_raw("/api/v1/ingest", "{not json".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID.REQUEST");

    let snapshot = state.stats.snapshot();
    assert_eq!(snapshot.rest_rejected, 4);
    assert_eq!(snapshot.ingest_rejected, 3);
}

#[tokio::test]
async fn memory_read_validation() {
    let (app, _) = setup(RestFeatures::all());

    let (status, body) = send(&app, get("/api/v1/memory/read?area=coils&address=0&count=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "memory is required");

    let (status, _) = send(
        &app,
        get("/api/v1/memory/read?memory=nope&area=coils&address=0&count=1"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        get("/api/v1/memory/read?memory=plant&area=bogus&address=0&count=1"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "unknown area");

    let (status, _) = send(&app, get("/api/v1/memory/read?memory=plant&area=coils")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        get("/api/v1/memory/read?memory=plant&area=holding_registers&address=10&count=10"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn diagnostics_report_layout_state_and_mqtt() {
    let (app, _) = setup(RestFeatures::all());

    let (status, body) = send(&app, get("/api/v1/diagnostics/memory")).await;
    assert_eq!(status, StatusCode::OK);
    let memories = body["data"].as_array().expect("array");
    assert_eq!(memories.len(), 2);
    let plant = memories
        .iter()
        .find(|memory| memory["key"] == "plant")
        .expect("plant");
    assert_eq!(plant["default"], true);
    assert_eq!(plant["run_state"], "pre_run");
    assert_eq!(plant["gate_address"], 0);
    assert_eq!(plant["holding_registers"]["start"], 40000);

    let (status, body) = send(&app, get("/api/v1/diagnostics/mqtt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "enabled": false }));

    let (status, body) = send(&app, get("/api/v1/diagnostics/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["rest"]["requests"].as_u64().expect("requests") >= 3);
}

#[tokio::test]
async fn disabled_features_are_forbidden() {
    let (app, _) = setup(RestFeatures {
        ingest: false,
        read: false,
        diagnostics: false,
    });

    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/ingest",
            json!({ "memory": "plant", "area": "input_registers", "address": 0, "values": [1] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        get("/api/v1/memory/read?memory=plant&area=coils&address=0&count=1"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, get("/api/v1/diagnostics/stats")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
