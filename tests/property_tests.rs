/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use hypo_insurance_api::metadata_chunks::{
    reassemble_from_metadata, split_into_metadata, CHUNK_SIZE, METADATA_MAX_KEYS,
    METADATA_VALUE_LIMIT,
};
use hypo_insurance_api::models::{lenient, CountyRecord};
use hypo_insurance_api::signature::{signature_header, verify};
use hypo_insurance_api::validation::{is_valid_email, is_valid_zip};
use proptest::prelude::*;
use std::collections::HashMap;

// Property: metadata chunking is lossless and sized as the provider requires
proptest! {
    #[test]
    fn chunks_reassemble_to_original(payload in "\\PC{0,3000}") {
        let entries = split_into_metadata(&payload).unwrap();
        let metadata: HashMap<String, String> = entries.iter().cloned().collect();
        prop_assert_eq!(reassemble_from_metadata(&metadata), Some(payload));
    }

    #[test]
    fn chunk_count_is_ceiling_of_length(len in (METADATA_VALUE_LIMIT + 1)..(CHUNK_SIZE * METADATA_MAX_KEYS)) {
        let payload = "a".repeat(len);
        let entries = split_into_metadata(&payload).unwrap();
        prop_assert_eq!(entries.len(), len.div_ceil(CHUNK_SIZE));
        prop_assert!(entries.iter().all(|(_, v)| v.chars().count() <= CHUNK_SIZE));
        prop_assert!(entries.iter().all(|(k, _)| k.starts_with("answers_")));
    }

    #[test]
    fn short_payloads_use_one_key(len in 0usize..=METADATA_VALUE_LIMIT) {
        let payload = "b".repeat(len);
        let entries = split_into_metadata(&payload).unwrap();
        prop_assert_eq!(entries.len(), 1);
        prop_assert_eq!(entries[0].0.as_str(), "answers");
    }
}

// Property: FIPS code is plain concatenation
proptest! {
    #[test]
    fn fips_is_prefix_then_county_code(prefix in "[0-9]{2}", code in "[0-9]{3}") {
        let county = CountyRecord {
            county_name: "Any".to_string(),
            fips_prefix: prefix.clone(),
            county_code: code.clone(),
        };
        let fips = county.fips();
        prop_assert_eq!(fips.len(), 5);
        prop_assert!(fips.starts_with(&prefix));
        prop_assert!(fips.ends_with(&code));
    }
}

// Property: signature verification never panics and only accepts the signer's payload
proptest! {
    #[test]
    fn verify_never_panics(header in "\\PC*", payload in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = verify(&payload, Some(&header), "whsec_prop", 300, 1_700_000_000);
    }

    #[test]
    fn any_header_timestamp_is_handled(timestamp in any::<i64>(), now in any::<i64>()) {
        let header = format!("t={},v1={}", timestamp, "00".repeat(32));
        let result = verify(b"{}", Some(&header), "whsec_prop", 300, now);
        prop_assert!(result.is_err());
    }

    #[test]
    fn signed_payload_verifies(payload in proptest::collection::vec(any::<u8>(), 0..512), skew in -300i64..=300) {
        let now = 1_700_000_000;
        let header = signature_header(&payload, "whsec_prop", now + skew);
        prop_assert!(verify(&payload, Some(&header), "whsec_prop", 300, now).is_ok());
    }

    #[test]
    fn altered_payload_fails(payload in proptest::collection::vec(any::<u8>(), 1..256), index in any::<prop::sample::Index>()) {
        let now = 1_700_000_000;
        let header = signature_header(&payload, "whsec_prop", now);
        let mut altered = payload.clone();
        let i = index.index(altered.len());
        altered[i] ^= 0x01;
        prop_assert!(verify(&altered, Some(&header), "whsec_prop", 300, now).is_err());
    }
}

// Property: form-value coercion and validators never panic
proptest! {
    #[test]
    fn parse_int_prefix_never_panics(raw in "\\PC*") {
        let _ = lenient::parse_int_prefix(&raw);
    }

    #[test]
    fn parse_int_prefix_reads_leading_digits(value in 0i64..1_000_000_000, suffix in "[a-z ]{0,5}") {
        let raw = format!("{}{}", value, suffix);
        prop_assert_eq!(lenient::parse_int_prefix(&raw), Some(value));
    }

    #[test]
    fn validators_never_panic(input in "\\PC*") {
        let _ = is_valid_email(&input);
        let _ = is_valid_zip(&input);
    }

    #[test]
    fn five_digit_zips_are_valid(zip in "[0-9]{5}") {
        prop_assert!(is_valid_zip(&zip));
    }
}
