//! PII masking for log output
//!
//! Identity codes in free text are replaced by a truncated SHA-256 digest so
//! the same code still correlates across log lines without being readable.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref PAN_IN_TEXT: Regex =
        Regex::new(r"\b[A-Za-z]{5}[0-9]{4}[A-Za-z]\b").expect("valid PAN regex");
    static ref AADHAAR_IN_TEXT: Regex =
        Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}\b").expect("valid Aadhaar regex");
}

const PAN_DIGEST_LEN: usize = 10;
const AADHAAR_DIGEST_LEN: usize = 12;

fn digest_prefix(value: &str, len: usize) -> String {
    let mut encoded = hex::encode(Sha256::digest(value.as_bytes()));
    encoded.truncate(len);
    encoded
}

/// Replaces PAN-like codes and 12-digit national IDs with digest prefixes.
pub fn anonymize_pii(text: &str) -> String {
    let masked = PAN_IN_TEXT.replace_all(text, |caps: &regex::Captures<'_>| {
        digest_prefix(&caps[0].to_ascii_uppercase(), PAN_DIGEST_LEN)
    });
    AADHAAR_IN_TEXT
        .replace_all(&masked, |caps: &regex::Captures<'_>| {
            digest_prefix(&caps[0], AADHAAR_DIGEST_LEN)
        })
        .into_owned()
}
