use crate::errors::AppError;
use serde_json::Value;
use std::time::Duration;

const SERVICE: &str = "hospital search gateway";
const HOSPITALS_PATH: &str = "/hospitals";

/// Client for the hospital search gateway.
///
/// Both searches are pass-through: the gateway's JSON is returned unchanged.
#[derive(Clone)]
pub struct HospitalClient {
    client: reqwest::Client,
    base_url: String,
}

impl HospitalClient {
    /// Creates a new `HospitalClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Gateway base URL; `/hospitals` is appended.
    pub fn new(base_url: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create hospital client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Name search: forwards the caller's query parameters as-is.
    pub async fn search_by_name(&self, params: &[(String, String)]) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, HOSPITALS_PATH);
        tracing::debug!("Hospital name search with {} query parameters", params.len());

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        Self::read(response).await
    }

    /// Radius search: forwards the caller's JSON body as-is.
    pub async fn search_by_radius(&self, body: &Value) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, HOSPITALS_PATH);
        tracing::debug!("Hospital radius search body: {}", body);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> Result<Value, AppError> {
        tracing::debug!("Hospital gateway response status: {}", response.status());

        if !response.status().is_success() {
            return Err(AppError::from_rejected_response(SERVICE, response).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))
    }
}
