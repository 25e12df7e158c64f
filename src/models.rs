use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::plan_filter::{FilterOptions, PlanFilters, PlanSortKey};

// ============ Consultation Models ============

/// Answers collected by the consultation questionnaire.
///
/// The set of questions is closed: unknown keys are rejected at
/// deserialization. Numeric answers accept JSON numbers or numeric strings,
/// yes/no answers accept booleans or `"Yes"`/`"No"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConsultationAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::int_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub income: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::int_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub household_size: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::int_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub monthly_budget: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::int_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub emergency_fund: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::int_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub coverage_year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::int_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub eligible_for_coverage: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub legal_guardian: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub pregnant: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub tobacco: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub special_needs: Option<bool>,
    /// Free-text follow-up asked when `specialNeeds` is yes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_needs_list: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub prescription_drugs: Option<bool>,
    /// Free-text follow-up asked when `prescriptionDrugs` is yes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_drugs_list: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub aptc_eligible: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub household_members: Vec<HouseholdMemberAnswers>,
}

/// Per-member answers for everyone in the household besides the applicant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HouseholdMemberAnswers {
    #[serde(
        default,
        deserialize_with = "lenient::int_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub eligible_for_coverage: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub pregnant: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub tobacco: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub special_needs: Option<bool>,
    /// Free-text follow-up asked when `specialNeeds` is yes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_needs_list: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::yes_no_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub prescription_drugs: Option<bool>,
    /// Free-text follow-up asked when `prescriptionDrugs` is yes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_drugs_list: Option<String>,
}

/// Body of `POST /api/create-checkout-session`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub answers: ConsultationAnswers,
}

/// Identifier the browser redirects to the hosted checkout with.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Persisted result of a paid consultation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRecord {
    pub id: Uuid,
    pub session_id: String,
    pub customer_email: Option<String>,
    pub answers: sqlx::types::Json<ConsultationAnswers>,
    pub payment_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConsultationRecord {
    pub fn new(
        session_id: String,
        customer_email: Option<String>,
        answers: ConsultationAnswers,
        payment_status: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            customer_email,
            answers: sqlx::types::Json(answers),
            payment_status,
            created_at: Utc::now(),
        }
    }
}

/// Webhook acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

// ============ Plan Search Models ============

/// Body of `POST /api/insurance-plans`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanSearchRequest {
    #[serde(deserialize_with = "lenient::int")]
    #[schema(value_type = i64)]
    pub income: i64,
    pub zip_code: String,
    pub county: String,
    pub state: String,
    #[serde(default)]
    pub people: Vec<PersonInput>,
    pub market: String,
    #[serde(deserialize_with = "lenient::int")]
    #[schema(value_type = i64)]
    pub year: i64,
    /// Optional server-side filtering of the returned plans.
    #[serde(default)]
    pub filters: Option<PlanFilters>,
    /// Optional server-side ordering of the returned plans.
    #[serde(default)]
    pub sort: Option<PlanSortKey>,
}

/// One person to be covered.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersonInput {
    #[serde(deserialize_with = "lenient::int")]
    #[schema(value_type = i64)]
    pub age: i64,
    #[serde(default, deserialize_with = "lenient::yes_no")]
    pub tobacco_user: bool,
    #[serde(default)]
    pub gender: String,
    #[serde(default, deserialize_with = "lenient::yes_no")]
    pub eligible_for_coverage: bool,
    #[serde(default, deserialize_with = "lenient::yes_no")]
    pub pregnant: bool,
}

/// Response of `POST /api/insurance-plans`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanSearchResponse {
    /// Plans exactly as returned by the marketplace API.
    #[schema(value_type = Vec<Object>)]
    pub plans: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_options: Option<FilterOptions>,
}

/// County row from the area-data service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountyRecord {
    #[serde(rename = "countyName")]
    pub county_name: String,
    /// State part of the FIPS code.
    #[serde(rename = "FIPSCode", default)]
    pub fips_prefix: String,
    #[serde(rename = "countyCode", default)]
    pub county_code: String,
}

impl CountyRecord {
    /// Full county FIPS code: the state prefix followed by the county code.
    pub fn fips(&self) -> String {
        format!("{}{}", self.fips_prefix, self.county_code)
    }
}

/// Request body of the marketplace plan-search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketplaceSearchBody {
    pub household: MarketplaceHousehold,
    pub market: String,
    pub place: MarketplacePlace,
    pub year: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketplaceHousehold {
    pub income: i64,
    pub people: Vec<MarketplacePerson>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketplacePerson {
    pub age: i64,
    pub aptc_eligible: bool,
    pub gender: String,
    pub uses_tobacco: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketplacePlace {
    pub countyfips: String,
    pub state: String,
    pub zipcode: String,
}

impl MarketplaceSearchBody {
    /// Builds the marketplace request for a search once the county is resolved.
    pub fn from_request(request: &PlanSearchRequest, county: &CountyRecord) -> Self {
        Self {
            household: MarketplaceHousehold {
                income: request.income,
                people: request
                    .people
                    .iter()
                    .map(|person| MarketplacePerson {
                        age: person.age,
                        aptc_eligible: person.eligible_for_coverage,
                        gender: person.gender.clone(),
                        uses_tobacco: person.tobacco_user,
                    })
                    .collect(),
            },
            market: request.market.clone(),
            place: MarketplacePlace {
                countyfips: county.fips(),
                state: request.state.clone(),
                zipcode: request.zip_code.clone(),
            },
            year: request.year,
        }
    }
}

/// Lenient deserializers for values typed by browser form widgets.
pub mod lenient {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    /// Integer prefix of a string, with `parseInt` semantics: leading
    /// whitespace and an optional sign are accepted, trailing garbage is
    /// ignored, no digits at all is `None`.
    pub fn parse_int_prefix(raw: &str) -> Option<i64> {
        let trimmed = raw.trim_start();
        let (negative, rest) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        let value: i64 = digits.parse().ok()?;
        Some(if negative { -value } else { value })
    }

    fn value_to_int(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
            Value::String(s) => parse_int_prefix(s),
            _ => None,
        }
    }

    fn value_to_bool(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" => Some(true),
                "no" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value_to_int(&value)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, got {}", value)))
    }

    pub fn int_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(value) => value_to_int(&value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected an integer, got {}", value))),
        }
    }

    pub fn yes_no<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(yes_no_opt(deserializer)?.unwrap_or(false))
    }

    pub fn yes_no_opt<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<bool>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value_to_bool(&value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected yes/no, got {}", value))),
        }
    }
}
