use crate::errors::AppError;
use crate::models::CountyRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "area data service";
const COUNTY_CLASS_PATH: &str = "/classes/Uscounties_Area";
const COUNTY_LIST_LIMIT: u32 = 1000;

/// Bounded retry for transient area-data failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Parse `where` clause; serialized with a fixed key order.
#[derive(Debug, Serialize)]
struct CountyFilter<'a> {
    #[serde(rename = "stateAbbreviation")]
    state: &'a str,
    #[serde(rename = "countyName", skip_serializing_if = "Option::is_none")]
    county: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AreaDataResponse {
    results: Option<Vec<CountyRecord>>,
}

/// Client for the county/FIPS area-data service (Parse REST API).
#[derive(Clone)]
pub struct AreaDataClient {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    api_key: String,
    retry: RetryPolicy,
}

impl AreaDataClient {
    /// Creates a new `AreaDataClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the Parse server.
    /// * `app_id` - Value of `X-Parse-Application-Id`.
    /// * `api_key` - Value of `X-Parse-REST-API-Key`.
    /// * `timeout` - Per-attempt request timeout.
    /// * `retry` - Retry policy for county listing.
    pub fn new(
        base_url: String,
        app_id: String,
        api_key: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create area data client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id,
            api_key,
            retry,
        })
    }

    /// Lists county names for a state, in upstream order.
    ///
    /// Transient failures are retried according to the [`RetryPolicy`];
    /// a malformed payload is surfaced immediately.
    pub async fn list_counties(&self, state: &str) -> Result<Vec<String>, AppError> {
        let filter = CountyFilter {
            state,
            county: None,
        };
        let mut attempt = 0;

        loop {
            match self.query(&filter, COUNTY_LIST_LIMIT).await {
                Ok(records) => {
                    let counties: Vec<String> =
                        records.into_iter().map(|record| record.county_name).collect();
                    tracing::info!("Fetched {} counties for state {}", counties.len(), state);
                    return Ok(counties);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "County lookup for {} failed (attempt {}/{}): {}",
                        state,
                        attempt,
                        self.retry.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Looks up the exact county record for a state and county name.
    pub async fn find_county(&self, state: &str, county: &str) -> Result<CountyRecord, AppError> {
        let filter = CountyFilter {
            state,
            county: Some(county),
        };
        let record = self
            .query(&filter, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::NotFound(format!("County '{}' not found in state {}", county, state))
            })?;

        tracing::debug!(
            "Resolved county {} ({}) to FIPS {}",
            record.county_name,
            state,
            record.fips()
        );
        Ok(record)
    }

    async fn query(
        &self,
        filter: &CountyFilter<'_>,
        limit: u32,
    ) -> Result<Vec<CountyRecord>, AppError> {
        let url = format!("{}{}", self.base_url, COUNTY_CLASS_PATH);
        let where_clause = serde_json::to_string(filter)
            .map_err(|e| AppError::InternalError(format!("Failed to encode county filter: {}", e)))?;
        let limit = limit.to_string();

        tracing::debug!("Querying area data service: where={}", where_clause);

        let response = self
            .client
            .get(&url)
            .query(&[("where", where_clause.as_str()), ("limit", limit.as_str())])
            .header("X-Parse-Application-Id", &self.app_id)
            .header("X-Parse-REST-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(AppError::from_rejected_response(SERVICE, response).await);
        }

        let body: AreaDataResponse = response
            .json()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        body.results.ok_or_else(|| AppError::UpstreamMalformed {
            service: SERVICE,
            message: "response is missing the 'results' field".to_string(),
        })
    }
}
