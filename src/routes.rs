use crate::errors::ErrorBody;
use crate::handlers::{self, AppState};
use crate::models::*;
use crate::plan_filter::{FilterOptions, PlanFilters, PlanSortKey};
use crate::webhook_handler;
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use utoipa::OpenApi;

/// Largest accepted request body (1 MB).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    info(title = "Hypo Insurance API", description = "County lookup, plan and hospital search, and consultation checkout"),
    paths(
        handlers::health,
        handlers::get_counties,
        handlers::search_plans,
        handlers::create_checkout_session,
        handlers::search_hospitals_by_name,
        handlers::search_hospitals_by_radius,
        webhook_handler::stripe_webhook
    ),
    components(schemas(
        ErrorBody,
        PlanSearchRequest,
        PersonInput,
        PlanSearchResponse,
        PlanFilters,
        PlanSortKey,
        FilterOptions,
        CheckoutRequest,
        CheckoutResponse,
        ConsultationAnswers,
        HouseholdMemberAnswers,
        WebhookAck
    ))
)]
pub struct ApiDoc;

/// Serves the generated OpenAPI document.
///
/// # Returns
///
/// * `impl IntoResponse` - The OpenAPI document as JSON.
async fn serve_openapi_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Serves the Swagger UI HTML page.
///
/// This endpoint returns an HTML page that embeds the Swagger UI, configured to
/// load the OpenAPI document served by `serve_openapi_spec`.
///
/// # Returns
///
/// * `impl IntoResponse` - The HTTP response containing the Swagger UI HTML.
async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Hypo Insurance API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// Documentation and API endpoints, with the request size limit applied.
///
/// Rate limiting is layered on by the binary so router tests run without a
/// peer address.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // API Documentation
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.json", get(serve_openapi_spec))
        // API endpoints
        .route("/api/counties/:state", get(handlers::get_counties))
        .route("/api/insurance-plans", post(handlers::search_plans))
        .route(
            "/api/hospitals",
            get(handlers::search_hospitals_by_name).post(handlers::search_hospitals_by_radius),
        )
        .route(
            "/api/create-checkout-session",
            post(handlers::create_checkout_session),
        )
        // Payment provider webhook (signature checked on the raw body)
        .route("/api/webhook-stripe", post(webhook_handler::stripe_webhook))
        .layer(
            ServiceBuilder::new()
                // Request size limit (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
}

/// Final app: health check (outside `api`'s layers) merged with `api`, plus
/// tracing and CORS.
pub fn app(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
