use crate::config::presence;
use crate::errors::AppError;
use crate::models::MarketplaceSearchBody;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const SERVICE: &str = "marketplace API";
const PLAN_SEARCH_PATH: &str = "/api/v1/plans/search";

#[derive(Debug, Deserialize)]
struct PlanSearchResult {
    plans: Option<Vec<Value>>,
}

/// Client for the government marketplace plan-search API.
#[derive(Clone)]
pub struct MarketplaceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MarketplaceClient {
    /// Creates a new `MarketplaceClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the marketplace API.
    /// * `api_key` - API key, sent as the `apikey` query parameter.
    pub fn new(base_url: String, api_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create marketplace client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Submits a plan search and returns the plans exactly as received.
    ///
    /// # Arguments
    ///
    /// * `body` - Household, place and year for the search.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<Value>, AppError>` - The `plans` array, or an upstream error.
    pub async fn search_plans(&self, body: &MarketplaceSearchBody) -> Result<Vec<Value>, AppError> {
        let url = format!("{}{}", self.base_url, PLAN_SEARCH_PATH);

        tracing::debug!("Marketplace URL: {}", url);
        tracing::debug!("Marketplace API key: {}", presence(&self.api_key));
        tracing::debug!(
            "Marketplace request body: {}",
            serde_json::to_string(body).unwrap_or_default()
        );

        let response = self
            .client
            .post(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        tracing::debug!("Marketplace response status: {}", response.status());

        if !response.status().is_success() {
            return Err(AppError::from_rejected_response(SERVICE, response).await);
        }

        let result: PlanSearchResult = response
            .json()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        let plans = result.plans.ok_or_else(|| AppError::UpstreamMalformed {
            service: SERVICE,
            message: "response is missing the 'plans' array".to_string(),
        })?;

        tracing::info!("✓ Marketplace returned {} plans", plans.len());
        Ok(plans)
    }
}
