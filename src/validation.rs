//! Field validators
//!
//! Pure parse/predicate functions, one per collected field. Each returns the
//! normalized value on success and `None` on rejection; the dialogue decides
//! whether a rejection counts against the attempt limit.

use crate::models::{EmploymentType, LoanType};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const CREDIT_SCORE_MIN: i64 = 300;
pub const CREDIT_SCORE_MAX: i64 = 900;
pub const AADHAAR_DIGITS: usize = 12;

lazy_static! {
    static ref PAN_PATTERN: Regex = Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("valid PAN regex");
    static ref STRICT_DATE: Regex = Regex::new(r"^\d{2}-\d{2}-\d{4}$").expect("valid date regex");
}

/// Accepts a PAN-like code in any letter case, returns it uppercased.
/// Only ASCII input is considered; Unicode case mapping could otherwise
/// turn non-Latin letters into a matching code.
pub fn validate_pan(input: &str) -> Option<String> {
    let input = input.trim();
    if !input.is_ascii() {
        return None;
    }
    let pan = input.to_ascii_uppercase();
    PAN_PATTERN.is_match(&pan).then_some(pan)
}

/// Parses `DD-MM-YYYY`, rejecting impossible calendar dates.
pub fn parse_date_of_birth(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if !STRICT_DATE.is_match(input) {
        return None;
    }
    NaiveDate::parse_from_str(input, DATE_FORMAT).ok()
}

/// Strips every non-digit and requires exactly 12 digits to remain.
pub fn normalize_aadhaar(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == AADHAAR_DIGITS).then_some(digits)
}

pub fn parse_credit_score(input: &str) -> Option<u16> {
    let score: i64 = input.trim().parse().ok()?;
    if (CREDIT_SCORE_MIN..=CREDIT_SCORE_MAX).contains(&score) {
        u16::try_from(score).ok()
    } else {
        None
    }
}

/// Non-negative, finite amount (income, EMIs, years employed).
pub fn parse_amount(input: &str) -> Option<f64> {
    let value: f64 = input.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

pub fn classify_employment(input: &str) -> Option<EmploymentType> {
    let lowered = input.to_lowercase();
    if lowered.contains("salaried") {
        Some(EmploymentType::Salaried)
    } else if lowered.contains("self") {
        Some(EmploymentType::SelfEmployed)
    } else {
        None
    }
}

/// Menu choice: "1"/"personal" or "2"/"credit card".
pub fn parse_loan_type(input: &str) -> Option<LoanType> {
    let lowered = input.to_lowercase();
    if lowered.contains('1') || lowered.contains("personal") {
        Some(LoanType::Personal)
    } else if lowered.contains('2') || lowered.contains("credit card") {
        Some(LoanType::CreditCard)
    } else {
        None
    }
}

/// Title-cases a full name; blank input is rejected.
pub fn normalize_name(input: &str) -> Option<String> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then(|| title_case(trimmed))
}

pub fn normalize_address(input: &str) -> Option<String> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Uppercases the first letter of every alphabetic run, lowercases the rest.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_alpha = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pan_accepts_any_case_and_uppercases() {
        for input in ["ABCDE1234F", "abcde1234f", "AbCdE1234f", "  abcde1234F "] {
            assert_eq!(validate_pan(input).as_deref(), Some("ABCDE1234F"), "{input}");
        }
    }

    #[test]
    fn test_pan_rejects_wrong_shapes() {
        for input in [
            "", "abc123", "ABCD1234F", "ABCDE12345", "ABCDE1234FG", "1BCDE1234F", "ABCDE 1234F",
            // Letters whose Unicode uppercase form is ASCII
            "abcdı1234f", "abcß1234f", "ﬀabc1234f", "ABCDE1234ſ",
        ] {
            assert_eq!(validate_pan(input), None, "{input}");
        }
    }

    #[test]
    fn test_date_of_birth() {
        assert_eq!(
            parse_date_of_birth("15-06-1985"),
            NaiveDate::from_ymd_opt(1985, 6, 15)
        );
        assert_eq!(
            parse_date_of_birth("29-02-2000"),
            NaiveDate::from_ymd_opt(2000, 2, 29)
        );
        assert_eq!(parse_date_of_birth("29-02-2001"), None);
        assert_eq!(parse_date_of_birth("31-04-1990"), None);
        assert_eq!(parse_date_of_birth("1985-06-15"), None);
        assert_eq!(parse_date_of_birth("15/06/1985"), None);
        assert_eq!(parse_date_of_birth("5-6-1985"), None);
    }

    #[test]
    fn test_aadhaar_strips_separators() {
        assert_eq!(
            normalize_aadhaar("1234 5678 9012").as_deref(),
            Some("123456789012")
        );
        assert_eq!(
            normalize_aadhaar("1234-5678-9012").as_deref(),
            Some("123456789012")
        );
        assert_eq!(normalize_aadhaar("12345678901"), None);
        assert_eq!(normalize_aadhaar("1234567890123"), None);
    }

    #[test]
    fn test_credit_score_range_is_closed() {
        assert_eq!(parse_credit_score("300"), Some(300));
        assert_eq!(parse_credit_score(" 900 "), Some(900));
        assert_eq!(parse_credit_score("299"), None);
        assert_eq!(parse_credit_score("901"), None);
        assert_eq!(parse_credit_score("780.5"), None);
        assert_eq!(parse_credit_score("good"), None);
    }

    #[test]
    fn test_amounts_must_be_non_negative_numbers() {
        assert_eq!(parse_amount("75000"), Some(75000.0));
        assert_eq!(parse_amount("0"), Some(0.0));
        assert_eq!(parse_amount("2.5"), Some(2.5));
        assert_eq!(parse_amount("-1"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
        assert_eq!(parse_amount("lots"), None);
    }

    #[test]
    fn test_employment_and_loan_keywords() {
        assert_eq!(classify_employment("I am SALARIED"), Some(EmploymentType::Salaried));
        assert_eq!(classify_employment("self employed"), Some(EmploymentType::SelfEmployed));
        assert_eq!(classify_employment("freelancer"), None);

        assert_eq!(parse_loan_type("1"), Some(LoanType::Personal));
        assert_eq!(parse_loan_type("Personal please"), Some(LoanType::Personal));
        assert_eq!(parse_loan_type("2"), Some(LoanType::CreditCard));
        assert_eq!(parse_loan_type("Credit Card"), Some(LoanType::CreditCard));
        assert_eq!(parse_loan_type("mortgage"), None);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("rahul SHARMA"), "Rahul Sharma");
        assert_eq!(title_case("anne-marie o'neil"), "Anne-Marie O'Neil");
        assert_eq!(normalize_name("   "), None);
    }
}
