//! Loan Eligibility Assistant
//!
//! A guided, turn-by-turn dialogue that:
//! - Collects an applicant's identity and financial details one field at a time
//! - Validates every field before storing it
//! - Limits retries on identity fields and locks the session on abuse
//! - Produces a deterministic, itemized eligibility verdict
//!
//! TURN LOOP:
//! RESOLVE SESSION → LOCK CHECK → VALIDATE → STORE | RE-PROMPT | LOCK → EVALUATE?

pub mod api;
pub mod clock;
pub mod config;
pub mod dialogue;
pub mod eligibility;
pub mod error;
pub mod limiter;
pub mod models;
pub mod privacy;
pub mod session;
pub mod validation;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use dialogue::DialogueEngine;
pub use session::{InMemorySessionStore, SessionStore};
