//! Error types for the loan eligibility assistant
//!
//! Applicant input mistakes are never errors: they become re-prompts inside
//! the dialogue. These variants cover configuration and infrastructure faults.

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Core Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Incomplete applicant record: missing {0}")]
    IncompleteRecord(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
