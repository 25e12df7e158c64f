use serde::Deserialize;
use serde_json::Value;

/// Event type that completes a consultation purchase.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Payment provider webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub id: String,

    /// Event type (e.g., "checkout.session.completed")
    #[serde(rename = "type")]
    pub event_type: String,

    pub data: ProviderEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEventData {
    /// Raw event object; its shape depends on the event type
    pub object: Value,
}

/// The checkout session carried by a `checkout.session.completed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,

    /// Linked customer id, if the session has one
    #[serde(default)]
    pub customer: Option<String>,

    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,

    /// Email the session was created with, when set directly
    #[serde(default)]
    pub customer_email: Option<String>,

    #[serde(default)]
    pub payment_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

impl CheckoutSessionObject {
    /// Email entered at checkout, falling back to the one the session was
    /// created with.
    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }
}
