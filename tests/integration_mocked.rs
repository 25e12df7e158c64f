/// Integration tests with mocked external APIs
/// Exercises county lookup and plan search against wiremock upstreams
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use hypo_insurance_api::area_data_client::{AreaDataClient, RetryPolicy};
use hypo_insurance_api::config::Config;
use hypo_insurance_api::consultation_store::{MemoryConsultationStore, WriteMode};
use hypo_insurance_api::errors::AppError;
use hypo_insurance_api::handlers::AppState;
use hypo_insurance_api::routes;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_json, header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COUNTY_PATH: &str = "/classes/Uscounties_Area";
const PLANS_PATH: &str = "/api/v1/plans/search";

/// Helper function to create test config
fn create_test_config(base_url: String) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 3001,
        area_data_base_url: base_url.clone(),
        area_data_app_id: "test_app_id".to_string(),
        area_data_api_key: "test_area_key".to_string(),
        marketplace_base_url: base_url.clone(),
        marketplace_api_key: "test_marketplace_key".to_string(),
        hospital_gateway_url: Some(base_url.clone()),
        stripe_base_url: base_url,
        stripe_secret_key: "sk_test_123".to_string(),
        stripe_webhook_secret: "whsec_test".to_string(),
        stripe_price_id: None,
        consultation_price_cents: 1000,
        public_base_url: "http://localhost:3000".to_string(),
        write_mode: WriteMode::Insert,
        county_lookup_timeout_secs: 5,
        county_cache_ttl_secs: 3600,
        webhook_tolerance_secs: 300,
    }
}

fn test_app(base_url: String) -> axum::Router {
    let store = Arc::new(MemoryConsultationStore::new(WriteMode::Insert));
    let state = AppState::new(create_test_config(base_url), store).unwrap();
    routes::app(Arc::new(state), routes::api_routes())
}

fn area_client(base_url: String, timeout: Duration, max_retries: u32) -> AreaDataClient {
    AreaDataClient::new(
        base_url,
        "test_app_id".to_string(),
        "test_area_key".to_string(),
        timeout,
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(5),
        },
    )
    .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn search_body() -> Value {
    json!({
        "income": "52000",
        "zipCode": "80202",
        "county": "Denver",
        "state": "co",
        "people": [
            {"age": "40", "tobaccoUser": false, "gender": "Female", "eligibleForCoverage": true}
        ],
        "market": "Individual",
        "year": 2024
    })
}

async fn mount_denver(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(COUNTY_PATH))
        .and(query_param(
            "where",
            r#"{"stateAbbreviation":"CO","countyName":"Denver"}"#,
        ))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"countyName": "Denver", "FIPSCode": "08", "countyCode": "031"}]
        })))
        .mount(mock_server)
        .await;
}

// ============ County lookup ============

#[tokio::test]
async fn test_counties_returned_in_upstream_order_with_cache_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COUNTY_PATH))
        .and(query_param("where", r#"{"stateAbbreviation":"CO"}"#))
        .and(query_param("limit", "1000"))
        .and(header_eq("X-Parse-Application-Id", "test_app_id"))
        .and(header_eq("X-Parse-REST-API-Key", "test_area_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"countyName": "Denver", "FIPSCode": "08", "countyCode": "031"},
                {"countyName": "Adams", "FIPSCode": "08", "countyCode": "001"}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/counties/co")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=3600"
    );
    assert_eq!(read_json(response).await, json!(["Denver", "Adams"]));

    // Second call is served from the cache (mock expects exactly one hit)
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/counties/CO")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_state_code_is_rejected() {
    let mock_server = MockServer::start().await;
    let app = test_app(mock_server.uri());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/counties/Colorado")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["category"], "input_mismatch");
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let mock_server = MockServer::start().await;
    let app = test_app(mock_server.uri());

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/counties/CO")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_persistent_5xx_is_attempted_three_times() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COUNTY_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = area_client(mock_server.uri(), Duration::from_secs(5), 2);
    let result = client.list_counties("CO").await;

    match result {
        Err(AppError::UpstreamRejected { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected rejected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COUNTY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(COUNTY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"countyName": "Kent"}]
        })))
        .mount(&mock_server)
        .await;

    let client = area_client(mock_server.uri(), Duration::from_secs(5), 2);
    let counties = client.list_counties("DE").await.unwrap();

    assert_eq!(counties, vec!["Kent".to_string()]);
}

#[tokio::test]
async fn test_missing_results_is_malformed_and_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COUNTY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "oops"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = area_client(mock_server.uri(), Duration::from_secs(5), 2);
    let result = client.list_counties("CO").await;

    assert!(matches!(result, Err(AppError::UpstreamMalformed { .. })));
}

#[tokio::test]
async fn test_slow_upstream_surfaces_as_gateway_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COUNTY_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let client = area_client(mock_server.uri(), Duration::from_millis(100), 0);
    let err = client.list_counties("CO").await.unwrap_err();

    assert!(matches!(err, AppError::UpstreamTimeout { .. }));
    assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_unreachable_upstream() {
    // Nothing listens on port 9 (discard) in the test environment
    let client = area_client("http://127.0.0.1:9".to_string(), Duration::from_secs(2), 0);
    let err = client.list_counties("CO").await.unwrap_err();

    assert!(matches!(err, AppError::UpstreamUnreachable { .. }));
    assert!(err.is_transient());
}

// ============ Plan search ============

#[tokio::test]
async fn test_plan_search_resolves_fips_and_forwards_body() {
    let mock_server = MockServer::start().await;
    mount_denver(&mock_server).await;

    let expected_body = json!({
        "household": {
            "income": 52000,
            "people": [{"age": 40, "aptc_eligible": true, "gender": "Female", "uses_tobacco": false}]
        },
        "market": "Individual",
        "place": {"countyfips": "08031", "state": "CO", "zipcode": "80202"},
        "year": 2024
    });

    Mock::given(method("POST"))
        .and(path(PLANS_PATH))
        .and(query_param("apikey", "test_marketplace_key"))
        .and(body_json(&expected_body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plans": [{"id": "plan-1", "premium": 321.5}],
            "total": 1
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(post_json("/api/insurance-plans", &search_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body, json!({"plans": [{"id": "plan-1", "premium": 321.5}]}));
}

#[tokio::test]
async fn test_identical_searches_send_identical_bodies() {
    let mock_server = MockServer::start().await;
    mount_denver(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(PLANS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"plans": []})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/api/insurance-plans", &search_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let requests = mock_server.received_requests().await.unwrap();
    let bodies: Vec<&Vec<u8>> = requests
        .iter()
        .filter(|r| r.url.path() == PLANS_PATH)
        .map(|r| &r.body)
        .collect();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn test_unknown_county_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COUNTY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(PLANS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"plans": []})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(post_json("/api/insurance-plans", &search_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "not_found");
    assert_eq!(body["category"], "no_results");
}

#[tokio::test]
async fn test_marketplace_rejection_echoes_status_without_key() {
    let mock_server = MockServer::start().await;
    mount_denver(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(PLANS_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "invalid countyfips"})),
        )
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(post_json("/api/insurance-plans", &search_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "upstream_rejected");
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["apiResponse"]["message"], "invalid countyfips");
    assert!(!body.to_string().contains("test_marketplace_key"));
}

#[tokio::test]
async fn test_marketplace_payload_without_plans_is_malformed() {
    let mock_server = MockServer::start().await;
    mount_denver(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(PLANS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 0})))
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(post_json("/api/insurance-plans", &search_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "upstream_malformed");
    assert_eq!(body["category"], "technical_difficulty");
}

#[tokio::test]
async fn test_invalid_search_never_reaches_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut body = search_body();
    body["zipCode"] = json!("802");
    body["people"] = json!([]);

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(post_json("/api/insurance-plans", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "invalid_input");
    assert_eq!(body["details"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_filters_and_sort_add_filter_options() {
    let mock_server = MockServer::start().await;
    mount_denver(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(PLANS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plans": [
                {"id": "a", "metal_level": "Gold", "premium": 500, "issuer": {"name": "Acme"}},
                {"id": "b", "metal_level": "Bronze", "premium": 200, "issuer": {"name": "Peak"}},
                {"id": "c", "metal_level": "Silver", "premium": 300, "issuer": {"name": "Acme"}}
            ]
        })))
        .mount(&mock_server)
        .await;

    let mut body = search_body();
    body["filters"] = json!({"issuers": ["Acme"]});
    body["sort"] = json!("premium_asc");

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(post_json("/api/insurance-plans", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let ids: Vec<&str> = body["plans"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["c", "a"]);
    assert_eq!(body["filterOptions"]["issuers"], json!(["Acme", "Peak"]));
    assert_eq!(body["filterOptions"]["minPremium"], json!(200.0));
}

// ============ Hospital search ============

#[tokio::test]
async fn test_hospital_name_search_forwards_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/hospitals"))
        .and(query_param("query", "General"))
        .and(query_param("state", "CO"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hospitals": [{"name": "Denver General"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/hospitals?query=General&state=CO")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({"hospitals": [{"name": "Denver General"}]})
    );
}

#[tokio::test]
async fn test_hospital_radius_search_forwards_body() {
    let mock_server = MockServer::start().await;
    let search = json!({"latitude": 39.74, "longitude": -104.99, "radius": 10});

    Mock::given(method("POST"))
        .and(path("/hospitals"))
        .and(body_json(&search))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hospitals": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(post_json("/api/hospitals", &search))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"hospitals": []}));
}

#[tokio::test]
async fn test_hospital_gateway_rejection_is_echoed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hospitals"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "radius too large"})))
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let response = app
        .oneshot(post_json("/api/hospitals", &json!({"radius": 5000})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "upstream_rejected");
    assert_eq!(body["statusCode"], 422);
    assert_eq!(body["apiResponse"]["message"], "radius too large");
}

#[tokio::test]
async fn test_hospital_search_without_gateway_is_500() {
    let mock_server = MockServer::start().await;
    let mut config = create_test_config(mock_server.uri());
    config.hospital_gateway_url = None;
    let store = Arc::new(MemoryConsultationStore::new(WriteMode::Insert));
    let app = routes::app(
        Arc::new(AppState::new(config, store).unwrap()),
        routes::api_routes(),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/hospitals?query=General")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_health_and_openapi() {
    let mock_server = MockServer::start().await;
    let app = test_app(mock_server.uri());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "healthy");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = read_json(response).await;
    assert!(doc["paths"]["/api/insurance-plans"].is_object());
}
