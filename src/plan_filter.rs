//! Filtering, ordering and filter-option summaries over marketplace plans.
//!
//! Plans stay as the raw JSON returned upstream; only the handful of fields
//! the plan browser filters on are read through [`PlanView`]. A plan whose
//! fields have unexpected types reads as all-defaults instead of failing the
//! whole search.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use utoipa::ToSchema;

/// User-selected plan constraints. Empty lists mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanFilters {
    pub metal_levels: Vec<String>,
    pub plan_types: Vec<String>,
    pub issuers: Vec<String>,
    /// Inclusive `[min, max]` monthly premium.
    #[schema(value_type = Option<Vec<f64>>)]
    pub premium: Option<(f64, f64)>,
    /// Inclusive `[min, max]` of the first listed deductible.
    #[schema(value_type = Option<Vec<f64>>)]
    pub deductible: Option<(f64, f64)>,
    pub hsa_eligible: bool,
    pub has_national_network: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanSortKey {
    PremiumAsc,
    PremiumDesc,
    DeductibleAsc,
    DeductibleDesc,
    RatingDesc,
}

/// Choices the plan browser offers, derived from one result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub issuers: Vec<String>,
    pub plan_types: Vec<String>,
    pub metal_levels: Vec<String>,
    pub min_premium: Option<f64>,
    pub max_premium: Option<f64>,
    pub min_deductible: Option<f64>,
    pub max_deductible: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlanView {
    metal_level: Option<String>,
    #[serde(rename = "type")]
    plan_type: Option<String>,
    issuer: Option<IssuerView>,
    #[serde(deserialize_with = "number_or_none")]
    premium: Option<f64>,
    deductibles: Vec<DeductibleView>,
    hsa_eligible: bool,
    has_national_network: bool,
    quality_rating: Option<QualityRatingView>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IssuerView {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeductibleView {
    #[serde(deserialize_with = "number_or_none")]
    amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QualityRatingView {
    #[serde(deserialize_with = "number_or_none")]
    global_rating: Option<f64>,
}

/// Numbers read as-is; anything else (e.g. "not rated") reads as absent.
fn number_or_none<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_f64())
}

impl PlanView {
    fn of(plan: &Value) -> Self {
        PlanView::deserialize(plan).unwrap_or_default()
    }

    fn issuer_name(&self) -> Option<&str> {
        self.issuer.as_ref().and_then(|i| i.name.as_deref())
    }

    fn first_deductible(&self) -> f64 {
        self.deductibles
            .first()
            .and_then(|d| d.amount)
            .unwrap_or(0.0)
    }

    fn premium(&self) -> f64 {
        self.premium.unwrap_or(0.0)
    }

    fn rating(&self) -> f64 {
        self.quality_rating
            .as_ref()
            .and_then(|q| q.global_rating)
            .unwrap_or(0.0)
    }
}

fn listed(allowed: &[String], value: Option<&str>) -> bool {
    allowed.is_empty() || value.is_some_and(|v| allowed.iter().any(|a| a == v))
}

fn within(range: Option<(f64, f64)>, value: f64) -> bool {
    range.map_or(true, |(min, max)| value >= min && value <= max)
}

impl PlanFilters {
    /// Whether a single plan satisfies every constraint.
    pub fn matches(&self, plan: &Value) -> bool {
        let view = PlanView::of(plan);
        listed(&self.metal_levels, view.metal_level.as_deref())
            && listed(&self.plan_types, view.plan_type.as_deref())
            && listed(&self.issuers, view.issuer_name())
            && within(self.premium, view.premium())
            && within(self.deductible, view.first_deductible())
            && (!self.hsa_eligible || view.hsa_eligible)
            && (!self.has_national_network || view.has_national_network)
    }
}

/// Applies the optional filters then the optional ordering. The sort is
/// stable, so plans with equal keys keep the upstream order.
pub fn apply(plans: Vec<Value>, filters: Option<&PlanFilters>, sort: Option<PlanSortKey>) -> Vec<Value> {
    let mut plans: Vec<Value> = match filters {
        Some(filters) => plans.into_iter().filter(|p| filters.matches(p)).collect(),
        None => plans,
    };

    if let Some(key) = sort {
        plans.sort_by(|a, b| compare(key, &PlanView::of(a), &PlanView::of(b)));
    }
    plans
}

fn compare(key: PlanSortKey, a: &PlanView, b: &PlanView) -> Ordering {
    match key {
        PlanSortKey::PremiumAsc => a.premium().total_cmp(&b.premium()),
        PlanSortKey::PremiumDesc => b.premium().total_cmp(&a.premium()),
        PlanSortKey::DeductibleAsc => a.first_deductible().total_cmp(&b.first_deductible()),
        PlanSortKey::DeductibleDesc => b.first_deductible().total_cmp(&a.first_deductible()),
        PlanSortKey::RatingDesc => b.rating().total_cmp(&a.rating()),
    }
}

/// Distinct issuers, plan types and metal levels in first-seen order, plus the
/// premium and first-deductible bounds.
pub fn filter_options(plans: &[Value]) -> FilterOptions {
    let mut options = FilterOptions::default();

    for plan in plans {
        let view = PlanView::of(plan);
        push_distinct(&mut options.issuers, view.issuer_name());
        push_distinct(&mut options.plan_types, view.plan_type.as_deref());
        push_distinct(&mut options.metal_levels, view.metal_level.as_deref());

        let premium = view.premium();
        options.min_premium = Some(options.min_premium.map_or(premium, |m| m.min(premium)));
        options.max_premium = Some(options.max_premium.map_or(premium, |m| m.max(premium)));

        let deductible = view.first_deductible();
        options.min_deductible = Some(
            options
                .min_deductible
                .map_or(deductible, |m| m.min(deductible)),
        );
        options.max_deductible = Some(
            options
                .max_deductible
                .map_or(deductible, |m| m.max(deductible)),
        );
    }

    options
}

fn push_distinct(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
}
