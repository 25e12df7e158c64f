use crate::area_data_client::{AreaDataClient, RetryPolicy};
use crate::config::Config;
use crate::consultation_store::ConsultationStore;
use crate::errors::{AppError, ErrorBody};
use crate::hospital_client::HospitalClient;
use crate::marketplace_client::MarketplaceClient;
use crate::metadata_chunks::split_into_metadata;
use crate::models::*;
use crate::payment_client::{CheckoutPrice, PaymentClient};
use crate::plan_filter;
use crate::validation::{normalize_state, validate_answers, validate_plan_search};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use moka::future::Cache;
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Client for the county/FIPS area-data service.
    pub area_data: AreaDataClient,
    /// Client for the marketplace plan-search API.
    pub marketplace: MarketplaceClient,
    /// Client for the payment provider.
    pub payments: PaymentClient,
    /// Hospital search gateway, when configured.
    pub hospitals: Option<HospitalClient>,
    /// Where paid consultations are written.
    pub store: Arc<dyn ConsultationStore>,
    /// County names per upper-cased state code.
    pub county_cache: Cache<String, Vec<String>>,
}

impl AppState {
    /// Builds every upstream client from configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration.
    /// * `store` - Consultation store the webhook writes to.
    pub fn new(config: Config, store: Arc<dyn ConsultationStore>) -> Result<Self, AppError> {
        let area_data = AreaDataClient::new(
            config.area_data_base_url.clone(),
            config.area_data_app_id.clone(),
            config.area_data_api_key.clone(),
            config.county_lookup_timeout(),
            RetryPolicy::default(),
        )?;
        let marketplace = MarketplaceClient::new(
            config.marketplace_base_url.clone(),
            config.marketplace_api_key.clone(),
        )?;
        let payments = PaymentClient::new(
            config.stripe_base_url.clone(),
            config.stripe_secret_key.clone(),
        )?;
        let hospitals = config
            .hospital_gateway_url
            .clone()
            .map(HospitalClient::new)
            .transpose()?;

        // One entry per state, so capacity only needs to cover the state list
        let county_cache = Cache::builder()
            .time_to_live(config.county_cache_ttl())
            .max_capacity(100)
            .build();

        Ok(Self {
            config,
            area_data,
            marketplace,
            payments,
            hospitals,
            store,
            county_cache,
        })
    }
}

pub(crate) fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::BadRequest(rejection.body_text())
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/counties/:state
///
/// Lists the counties of a state, in the order the area-data service returns
/// them. Results are cached in process and marked publicly cacheable.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `state_code` - Two-letter state code, any case.
///
/// # Returns
///
/// * `Result<impl IntoResponse, AppError>` - JSON array of county names or an error.
#[utoipa::path(
    get,
    path = "/api/counties/{state}",
    params(("state" = String, Path, description = "Two-letter state code")),
    responses(
        (status = 200, description = "County names", body = [String]),
        (status = 400, description = "Not a state code", body = ErrorBody),
        (status = 500, description = "Area data service failure", body = ErrorBody),
        (status = 504, description = "Area data service timed out", body = ErrorBody)
    )
)]
pub async fn get_counties(
    State(state): State<Arc<AppState>>,
    Path(state_code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let state_code = normalize_state(&state_code)?;
    tracing::info!("GET /api/counties/{}", state_code);

    let counties = match state.county_cache.get(&state_code).await {
        Some(cached) => {
            tracing::debug!("County cache hit for {}", state_code);
            cached
        }
        None => {
            let counties = state.area_data.list_counties(&state_code).await?;
            state
                .county_cache
                .insert(state_code.clone(), counties.clone())
                .await;
            counties
        }
    };

    let cache_control = format!("public, max-age={}", state.config.county_cache_ttl_secs);
    Ok(([(header::CACHE_CONTROL, cache_control)], Json(counties)))
}

/// POST /api/insurance-plans
///
/// Resolves the county to its FIPS code, then forwards the household to the
/// marketplace plan search. Filters and sort, when present, are applied to
/// the returned plans and the response gains `filterOptions`.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - Plan search request body.
///
/// # Returns
///
/// * `Result<Json<PlanSearchResponse>, AppError>` - Matching plans or an error.
#[utoipa::path(
    post,
    path = "/api/insurance-plans",
    request_body = PlanSearchRequest,
    responses(
        (status = 200, description = "Plans from the marketplace", body = PlanSearchResponse),
        (status = 400, description = "Invalid search", body = ErrorBody),
        (status = 404, description = "County not found", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody)
    )
)]
pub async fn search_plans(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PlanSearchRequest>, JsonRejection>,
) -> Result<Json<PlanSearchResponse>, AppError> {
    let Json(mut request) = payload.map_err(json_rejection)?;
    validate_plan_search(&request)?;
    request.state = normalize_state(&request.state)?;

    tracing::info!(
        "POST /api/insurance-plans - {} / {} ({} people, {})",
        request.county,
        request.state,
        request.people.len(),
        request.year
    );

    let county = state
        .area_data
        .find_county(&request.state, &request.county)
        .await?;
    let body = MarketplaceSearchBody::from_request(&request, &county);
    let plans = state.marketplace.search_plans(&body).await?;

    let response = if request.filters.is_some() || request.sort.is_some() {
        // Options describe the full result set so the browser can widen filters again
        let options = plan_filter::filter_options(&plans);
        let plans = plan_filter::apply(plans, request.filters.as_ref(), request.sort);
        tracing::debug!("{} plans left after filtering", plans.len());
        PlanSearchResponse {
            plans,
            filter_options: Some(options),
        }
    } else {
        PlanSearchResponse {
            plans,
            filter_options: None,
        }
    };

    Ok(Json(response))
}

/// POST /api/create-checkout-session
///
/// Stores the questionnaire answers on a new provider customer and opens a
/// hosted checkout session for the consultation.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `headers` - Request headers; `Origin` sets the return URLs.
/// * `payload` - `{answers}` body.
///
/// # Returns
///
/// * `Result<Json<CheckoutResponse>, AppError>` - Session id and redirect URL or an error.
#[utoipa::path(
    post,
    path = "/api/create-checkout-session",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Invalid answers", body = ErrorBody),
        (status = 500, description = "Payment provider failure", body = ErrorBody)
    )
)]
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let Json(CheckoutRequest { answers }) = payload.map_err(json_rejection)?;
    validate_answers(&answers)?;

    let serialized = serde_json::to_string(&answers)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize answers: {}", e)))?;
    let metadata = split_into_metadata(&serialized)?;
    tracing::info!(
        "POST /api/create-checkout-session - answers {} chars in {} metadata entries",
        serialized.chars().count(),
        metadata.len()
    );

    let name = full_name(&answers);
    let customer_id = state
        .payments
        .create_customer(answers.email.as_deref(), name.as_deref(), &metadata)
        .await?;

    let price = match &state.config.stripe_price_id {
        Some(price_id) => CheckoutPrice::Catalog(price_id.clone()),
        None => CheckoutPrice::Inline {
            amount_cents: state.config.consultation_price_cents,
        },
    };
    let origin = request_origin(&headers, &state.config.public_base_url);

    let session = state
        .payments
        .create_checkout_session(&customer_id, &price, &origin)
        .await?;

    Ok(Json(session))
}

fn hospital_client(state: &AppState) -> Result<&HospitalClient, AppError> {
    state.hospitals.as_ref().ok_or_else(|| {
        AppError::InternalError("Hospital search gateway URL is not configured".to_string())
    })
}

/// GET /api/hospitals
///
/// Hospital name search. Query parameters are forwarded to the gateway
/// unchanged and its JSON is returned as-is.
#[utoipa::path(
    get,
    path = "/api/hospitals",
    params(("query" = Option<String>, Query, description = "Hospital name to search for")),
    responses(
        (status = 200, description = "Gateway search result"),
        (status = 500, description = "Gateway failure or not configured", body = ErrorBody)
    )
)]
pub async fn search_hospitals_by_name(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!("GET /api/hospitals - {} query parameters", params.len());
    let result = hospital_client(&state)?.search_by_name(&params).await?;
    Ok(Json(result))
}

/// POST /api/hospitals
///
/// Hospital radius search. The JSON body is forwarded to the gateway
/// unchanged and its JSON is returned as-is.
#[utoipa::path(
    post,
    path = "/api/hospitals",
    request_body(content = Object, description = "Radius search passed to the gateway"),
    responses(
        (status = 200, description = "Gateway search result"),
        (status = 400, description = "Body is not JSON", body = ErrorBody),
        (status = 500, description = "Gateway failure or not configured", body = ErrorBody)
    )
)]
pub async fn search_hospitals_by_radius(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(body) = payload.map_err(json_rejection)?;
    tracing::info!("POST /api/hospitals");
    let result = hospital_client(&state)?.search_by_radius(&body).await?;
    Ok(Json(result))
}

fn full_name(answers: &ConsultationAnswers) -> Option<String> {
    let parts: Vec<&str> = [answers.first_name.as_deref(), answers.last_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// `Origin` header when it is an http(s) origin, otherwise the configured base URL.
fn request_origin(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .and_then(|o| url::Url::parse(o.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|| fallback.trim_end_matches('/').to_string())
}
