use regex::Regex;
use std::sync::OnceLock;

use crate::errors::AppError;
use crate::models::{ConsultationAnswers, PlanSearchRequest};

const MAX_INCOME: i64 = 999_999_999;

fn zip_regex() -> &'static Regex {
    static ZIP: OnceLock<Regex> = OnceLock::new();
    ZIP.get_or_init(|| Regex::new(r"^\d{5}$").expect("valid ZIP regex"))
}

fn state_regex() -> &'static Regex {
    static STATE: OnceLock<Regex> = OnceLock::new();
    STATE.get_or_init(|| Regex::new(r"^[A-Za-z]{2}$").expect("valid state regex"))
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

/// Validates a 5-digit ZIP code.
pub fn is_valid_zip(zip: &str) -> bool {
    zip_regex().is_match(zip)
}

/// Validates a two-letter state code (any case).
pub fn is_valid_state(state: &str) -> bool {
    state_regex().is_match(state)
}

/// Validates an email address the way the questionnaire does.
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

/// Normalizes a state path/body parameter to upper case, rejecting anything
/// that is not two letters.
pub fn normalize_state(state: &str) -> Result<String, AppError> {
    let state = state.trim();
    if !is_valid_state(state) {
        return Err(AppError::BadRequest(format!(
            "'{}' is not a two-letter state code",
            state
        )));
    }
    Ok(state.to_ascii_uppercase())
}

/// Collects every problem with a plan search request.
pub fn validate_plan_search(request: &PlanSearchRequest) -> Result<(), AppError> {
    let mut errors = Vec::new();

    if request.income < 0 {
        errors.push("Income cannot be negative".to_string());
    }
    if request.income > MAX_INCOME {
        errors.push("Please enter a valid income amount".to_string());
    }
    if !is_valid_zip(&request.zip_code) {
        errors.push("Please enter a valid 5-digit ZIP code".to_string());
    }
    if !is_valid_state(&request.state) {
        errors.push("Please select a state".to_string());
    }
    if request.county.trim().is_empty() {
        errors.push("Please select a county".to_string());
    }
    if request.market.trim().is_empty() {
        errors.push("Please select a market".to_string());
    }
    if request.people.is_empty() {
        errors.push("Please add at least one person".to_string());
    }

    for (index, person) in request.people.iter().enumerate() {
        let person_num = index + 1;
        if !(0..=120).contains(&person.age) {
            errors.push(format!(
                "Person {}: Please enter a valid age between 0 and 120",
                person_num
            ));
        }
        if person.gender.trim().is_empty() {
            errors.push(format!("Person {}: Please select a gender", person_num));
        }
        if person.pregnant && person.gender.eq_ignore_ascii_case("male") {
            errors.push(format!(
                "Person {}: Males cannot be marked as pregnant",
                person_num
            ));
        }
        if person.pregnant && !(12..=60).contains(&person.age) {
            errors.push(format!(
                "Person {}: Please verify pregnancy status for the given age",
                person_num
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Collects every problem with submitted consultation answers. Absent
/// answers are allowed; present ones must be well formed.
pub fn validate_answers(answers: &ConsultationAnswers) -> Result<(), AppError> {
    let mut errors = Vec::new();

    if let Some(email) = &answers.email {
        if !is_valid_email(email) {
            errors.push("Please enter a valid email address".to_string());
        }
    }
    if let Some(zip) = &answers.zip_code {
        if !is_valid_zip(zip) {
            errors.push("Please enter a valid 5-digit ZIP code".to_string());
        }
    }
    if let Some(income) = answers.income {
        if income <= 0 || income > MAX_INCOME {
            errors.push("Please enter a valid income amount".to_string());
        }
    }
    if let Some(size) = answers.household_size {
        if !(1..=19).contains(&size) {
            errors.push("Please enter a valid household size (1-19)".to_string());
        }
    }
    if let Some(age) = answers.age {
        if !(0..=119).contains(&age) {
            errors.push("Please enter a valid age (0-119)".to_string());
        }
    }
    for (index, member) in answers.household_members.iter().enumerate() {
        if let Some(age) = member.age {
            if !(0..=119).contains(&age) {
                errors.push(format!(
                    "Household member {}: Please enter a valid age (0-119)",
                    index + 1
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}
