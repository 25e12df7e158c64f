//! Fitting serialized consultation answers into payment provider metadata.
//!
//! Stripe metadata values are capped at 500 characters and an object holds at
//! most 50 keys. Short payloads go under `answers`; longer ones are split into
//! 490-character segments under `answers_0`, `answers_1`, ... and reassembled
//! in index order.

use std::collections::HashMap;

use crate::errors::AppError;

/// Provider limit on a single metadata value, in characters.
pub const METADATA_VALUE_LIMIT: usize = 500;
/// Segment size used once a payload exceeds [`METADATA_VALUE_LIMIT`].
pub const CHUNK_SIZE: usize = 490;
/// Provider limit on metadata keys per object.
pub const METADATA_MAX_KEYS: usize = 50;

const SINGLE_KEY: &str = "answers";
const CHUNK_PREFIX: &str = "answers_";

/// Splits a serialized payload into metadata entries, in key order.
pub fn split_into_metadata(serialized: &str) -> Result<Vec<(String, String)>, AppError> {
    if serialized.chars().count() <= METADATA_VALUE_LIMIT {
        return Ok(vec![(SINGLE_KEY.to_string(), serialized.to_string())]);
    }

    let chars: Vec<char> = serialized.chars().collect();
    let entries: Vec<(String, String)> = chars
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(index, chunk)| (format!("{}{}", CHUNK_PREFIX, index), chunk.iter().collect()))
        .collect();

    if entries.len() > METADATA_MAX_KEYS {
        return Err(AppError::BadRequest(format!(
            "Consultation answers are too large to store ({} segments, limit {})",
            entries.len(),
            METADATA_MAX_KEYS
        )));
    }

    Ok(entries)
}

/// Rebuilds the serialized payload from provider metadata.
///
/// `answers` wins when present. Otherwise segments are concatenated from
/// `answers_0` upwards until the first missing index. `None` when neither
/// form is present.
pub fn reassemble_from_metadata(metadata: &HashMap<String, String>) -> Option<String> {
    if let Some(single) = metadata.get(SINGLE_KEY) {
        return Some(single.clone());
    }

    let mut assembled = String::new();
    let mut index = 0;
    while let Some(segment) = metadata.get(&format!("{}{}", CHUNK_PREFIX, index)) {
        assembled.push_str(segment);
        index += 1;
    }

    if index == 0 {
        None
    } else {
        Some(assembled)
    }
}
