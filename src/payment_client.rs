//! Payment provider calls made through the Stripe SDK.
//!
//! Only the three calls the checkout flow needs are covered: creating a
//! customer, creating a hosted checkout session and reading a customer back
//! when its checkout completes.

use crate::errors::AppError;
use crate::models::CheckoutResponse;
use std::collections::HashMap;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateCheckoutSessionPaymentMethodTypes,
    CreateCustomer, Currency, Customer, CustomerId, StripeError,
};

/// Product name shown on the hosted checkout page when no catalog price is used.
pub const CONSULTATION_PRODUCT_NAME: &str = "Personalized Health Insurance Plan";

/// The parts of a provider customer the webhook needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCustomer {
    pub id: String,
    pub email: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl From<Customer> for ProviderCustomer {
    fn from(customer: Customer) -> Self {
        Self {
            id: customer.id.to_string(),
            email: customer.email,
            metadata: customer.metadata.unwrap_or_default(),
        }
    }
}

/// What the checkout session charges for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutPrice {
    /// A catalog price id.
    Catalog(String),
    /// Inline USD price data, in cents.
    Inline { amount_cents: i64 },
}

impl CheckoutPrice {
    fn line_item(&self) -> CreateCheckoutSessionLineItems {
        match self {
            CheckoutPrice::Catalog(price_id) => CreateCheckoutSessionLineItems {
                price: Some(price_id.clone()),
                quantity: Some(1),
                ..Default::default()
            },
            CheckoutPrice::Inline { amount_cents } => CreateCheckoutSessionLineItems {
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: Currency::USD,
                    unit_amount: Some(*amount_cents),
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: CONSULTATION_PRODUCT_NAME.to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                quantity: Some(1),
                ..Default::default()
            },
        }
    }
}

/// Return URLs for a front-end origin.
fn return_urls(origin: &str) -> (String, String) {
    (
        format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", origin),
        format!("{}/cancel", origin),
    )
}

fn provider_failure(action: &str, err: StripeError) -> AppError {
    AppError::PaymentProvider(format!("{} failed: {}", action, err))
}

/// Stripe client wrapper
#[derive(Clone)]
pub struct PaymentClient {
    client: Client,
}

impl PaymentClient {
    /// Creates a new `PaymentClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Provider API base URL (overridable for tests).
    /// * `secret_key` - Secret API key.
    pub fn new(base_url: String, secret_key: String) -> Result<Self, AppError> {
        let base = format!("{}/", base_url.trim_end_matches('/'));
        url::Url::parse(&base).map_err(|e| {
            AppError::InternalError(format!("Invalid payment provider URL {}: {}", base_url, e))
        })?;

        Ok(Self {
            client: Client::from_url(base.as_str(), secret_key),
        })
    }

    /// Creates a customer carrying the given metadata entries.
    ///
    /// # Returns
    ///
    /// * `Result<CustomerId, AppError>` - The provider customer id.
    pub async fn create_customer(
        &self,
        email: Option<&str>,
        name: Option<&str>,
        metadata: &[(String, String)],
    ) -> Result<CustomerId, AppError> {
        let mut params = CreateCustomer::new();
        params.email = email;
        params.name = name;
        params.metadata = Some(metadata.iter().cloned().collect());

        let customer = Customer::create(&self.client, params)
            .await
            .map_err(|e| provider_failure("Customer creation", e))?;

        tracing::info!(
            "✓ Customer {} created with {} metadata entries",
            customer.id,
            metadata.len()
        );
        Ok(customer.id)
    }

    /// Creates a one-item, payment-mode checkout session for a customer.
    ///
    /// # Arguments
    ///
    /// * `customer_id` - Customer the session is linked to.
    /// * `price` - Catalog price or inline price data.
    /// * `origin` - Front-end origin used to build the return URLs.
    pub async fn create_checkout_session(
        &self,
        customer_id: &CustomerId,
        price: &CheckoutPrice,
        origin: &str,
    ) -> Result<CheckoutResponse, AppError> {
        let (success_url, cancel_url) = return_urls(origin);

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.customer = Some(customer_id.clone());
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.line_items = Some(vec![price.line_item()]);
        params.success_url = Some(success_url.as_str());
        params.cancel_url = Some(cancel_url.as_str());

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| provider_failure("Checkout session creation", e))?;

        tracing::info!("✓ Checkout session {} created for {}", session.id, customer_id);

        Ok(CheckoutResponse {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    /// Reads a customer, including its metadata.
    pub async fn retrieve_customer(&self, customer_id: &str) -> Result<ProviderCustomer, AppError> {
        let id: CustomerId = customer_id.parse().map_err(|_| {
            AppError::PayloadParse(format!("'{}' is not a customer id", customer_id))
        })?;

        let customer = Customer::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| provider_failure("Customer lookup", e))?;

        Ok(customer.into())
    }
}
