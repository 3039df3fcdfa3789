//! Guided collection dialogue
//!
//! One turn: resolve session → check lockout → run the current step's
//! validator → store or re-prompt → evaluate once the last field lands.
//!
//! Steps are described by a transition table (`step_for`) keyed on the closed
//! `DialogueState` enum. Each entry names its field, validator, retry policy
//! and success target.

use crate::clock::Clock;
use crate::config::DialogueConfig;
use crate::eligibility::EligibilityEvaluator;
use crate::limiter::{AttemptLimiter, AttemptOutcome};
use crate::models::{
    ApplicantProfile, DialogueState, EligibilityVerdict, EmploymentType, Field, FieldValue,
    Session, TurnRequest, TurnResponse,
};
use crate::privacy::anonymize_pii;
use crate::session::{ResolvedSession, SessionStore};
use crate::validation;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

pub const GREETING: &str =
    "Hi 👋 I can help you check your loan eligibility. Please choose: 1️⃣ Personal Loan 2️⃣ Credit Card Loan";
pub const LOAN_MENU: &str = "Please choose: 1️⃣ Personal Loan 2️⃣ Credit Card Loan";
pub const COMPLETED_NOTICE: &str =
    "Your eligibility check is complete. Please start a new session to check again.";
const LOCKED_NOTICE: &str = "This session is locked. Please start a new session.";

/// Whether rejected input on a step counts towards lockout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Limited,
    Unlimited,
}

/// Transition-table entry for one input-collecting state
#[derive(Clone, Copy)]
pub struct Step {
    pub field: Field,
    pub validate: fn(&str) -> Option<FieldValue>,
    pub retry: RetryPolicy,
    pub next: DialogueState,
    pub reprompt: &'static str,
}

fn loan_type_value(input: &str) -> Option<FieldValue> {
    validation::parse_loan_type(input).map(FieldValue::LoanType)
}

fn pan_value(input: &str) -> Option<FieldValue> {
    validation::validate_pan(input).map(FieldValue::Text)
}

fn name_value(input: &str) -> Option<FieldValue> {
    validation::normalize_name(input).map(FieldValue::Text)
}

fn dob_value(input: &str) -> Option<FieldValue> {
    validation::parse_date_of_birth(input).map(FieldValue::Date)
}

fn aadhaar_value(input: &str) -> Option<FieldValue> {
    validation::normalize_aadhaar(input).map(FieldValue::Text)
}

fn amount_value(input: &str) -> Option<FieldValue> {
    validation::parse_amount(input).map(FieldValue::Amount)
}

fn credit_score_value(input: &str) -> Option<FieldValue> {
    validation::parse_credit_score(input).map(FieldValue::Score)
}

fn employment_value(input: &str) -> Option<FieldValue> {
    validation::classify_employment(input).map(FieldValue::Employment)
}

fn address_value(input: &str) -> Option<FieldValue> {
    validation::normalize_address(input).map(FieldValue::Text)
}

/// Transition table. `None` for states that collect no field.
pub fn step_for(state: DialogueState) -> Option<Step> {
    use DialogueState as S;
    use RetryPolicy::{Limited, Unlimited};

    let step = match state {
        S::LoanTypeSelection => Step {
            field: Field::LoanType,
            validate: loan_type_value,
            retry: Unlimited,
            next: S::PanInput,
            reprompt: LOAN_MENU,
        },
        S::PanInput => Step {
            field: Field::Pan,
            validate: pan_value,
            retry: Limited,
            next: S::NameInput,
            reprompt: "Invalid PAN format. Please enter a valid PAN number (e.g., ABCDE1234F).",
        },
        S::NameInput => Step {
            field: Field::Name,
            validate: name_value,
            retry: Unlimited,
            next: S::DobInput,
            reprompt: "Please enter your full name.",
        },
        S::DobInput => Step {
            field: Field::DateOfBirth,
            validate: dob_value,
            retry: Limited,
            next: S::AadhaarInput,
            reprompt: "Invalid date format. Please use DD-MM-YYYY.",
        },
        S::AadhaarInput => Step {
            field: Field::Aadhaar,
            validate: aadhaar_value,
            retry: Limited,
            next: S::IncomeInput,
            reprompt: "Invalid Aadhaar number. Please enter 12 digits.",
        },
        S::IncomeInput => Step {
            field: Field::MonthlyIncome,
            validate: amount_value,
            retry: Unlimited,
            next: S::EmisInput,
            reprompt: "Please enter a valid number for monthly income.",
        },
        S::EmisInput => Step {
            field: Field::ExistingEmis,
            validate: amount_value,
            retry: Unlimited,
            next: S::CreditScoreInput,
            reprompt: "Please enter a valid number for existing EMIs.",
        },
        S::CreditScoreInput => Step {
            field: Field::CreditScore,
            validate: credit_score_value,
            retry: Unlimited,
            next: S::EmploymentTypeInput,
            reprompt: "Please enter a valid credit score between 300 and 900.",
        },
        S::EmploymentTypeInput => Step {
            field: Field::EmploymentType,
            validate: employment_value,
            retry: Unlimited,
            next: S::EmploymentYearsInput,
            reprompt: "Please specify: Salaried or Self-Employed?",
        },
        S::EmploymentYearsInput => Step {
            field: Field::YearsEmployed,
            validate: amount_value,
            retry: Unlimited,
            next: S::AddressInput,
            reprompt: "Please enter a valid number for years employed.",
        },
        S::AddressInput => Step {
            field: Field::Address,
            validate: address_value,
            retry: Unlimited,
            next: S::Completed,
            reprompt: "Please enter your current address.",
        },
        S::Greeting | S::Completed | S::Locked => return None,
    };

    Some(step)
}

/// Message sent after a field is accepted, prompting for the next one.
fn acknowledgement(field: Field, value: &FieldValue) -> String {
    match field {
        Field::LoanType => "Great! Let's start with your PAN card number.".to_string(),
        Field::Pan => format!(
            "Thanks. I've converted it to uppercase: {} ✅ Please enter your full name.",
            value.as_text().unwrap_or_default()
        ),
        Field::Name => format!(
            "Registered name: {} ✅ Please enter your Date of Birth (DD-MM-YYYY).",
            value.as_text().unwrap_or_default()
        ),
        Field::DateOfBirth => "✅ DOB verified. Enter Aadhaar number (12 digits).".to_string(),
        Field::Aadhaar => "✅ Aadhaar verified. Now, we'll collect financial details. What is your monthly income?".to_string(),
        Field::MonthlyIncome => "How much are your total existing EMIs per month?".to_string(),
        Field::ExistingEmis => "What is your latest credit score (CIBIL)?".to_string(),
        Field::CreditScore => "Are you Salaried or Self-Employed?".to_string(),
        Field::EmploymentType => match value.as_employment() {
            Some(EmploymentType::SelfEmployed) => "How many years have you been in business?",
            _ => "How many years have you been employed?",
        }
        .to_string(),
        Field::YearsEmployed => "Please enter your current address.".to_string(),
        Field::Address => String::new(),
    }
}

fn render_verdict(profile: &ApplicantProfile, verdict: &EligibilityVerdict) -> String {
    let mut out = String::new();

    if verdict.eligible {
        out.push_str(&format!("✅ You are eligible for a {}\n\nReasons:\n", profile.loan_type));
        for check in &verdict.checks {
            out.push_str(&format!("- {}\n", check.details));
        }
        out.push_str("\nNext Steps:\n");
    } else {
        out.push_str(&format!("❌ You are not eligible for a {}\n\nReasons:\n", profile.loan_type));
        for reason in &verdict.reasons {
            out.push_str(&format!("- {}\n", reason));
        }
        out.push_str("\nSuggestions to improve eligibility:\n");
    }

    let steps: Vec<String> = verdict.next_steps.iter().map(|s| format!("- {}", s)).collect();
    out.push_str(&steps.join("\n"));
    out
}

/// What one turn produced, before it is wrapped into a `TurnResponse`
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub message: String,
    pub verdict: Option<EligibilityVerdict>,
}

impl TurnOutcome {
    fn say(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            verdict: None,
        }
    }
}

/// Drives sessions through the collection dialogue
pub struct DialogueEngine {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    limiter: AttemptLimiter,
    evaluator: EligibilityEvaluator,
}

impl DialogueEngine {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, config: &DialogueConfig) -> Self {
        Self {
            store,
            clock,
            limiter: AttemptLimiter::new(config.max_attempts, config.lockout),
            evaluator: EligibilityEvaluator::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn evaluator(&self) -> &EligibilityEvaluator {
        &self.evaluator
    }

    /// Processes one applicant message. Turns for the same session are
    /// serialised by the session's lock.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        let (resolved, mut session) = self.lock_session(request.session_id.as_deref()).await?;
        let now = self.clock.now();

        debug!(
            session_id = %resolved.session_id,
            state = %session.state(),
            created = resolved.created,
            input = %anonymize_pii(&request.message),
            "Processing turn"
        );

        let outcome = self.advance(&mut session, &request.message, now)?;

        Ok(TurnResponse {
            message: outcome.message,
            session_id: resolved.session_id,
            current_step: session.state(),
            completed: session.is_completed(),
            eligibility: outcome.verdict,
        })
    }

    /// Resolves and locks the session. A sweep can evict the session between
    /// resolve and lock; once locked it can no longer be evicted, so the
    /// entry is re-checked and an evicted session is replaced by a new one.
    async fn lock_session(
        &self,
        requested: Option<&str>,
    ) -> Result<(ResolvedSession, OwnedMutexGuard<Session>)> {
        let mut requested = requested.map(str::to_string);
        loop {
            let resolved = self
                .store
                .resolve(requested.as_deref(), self.clock.now())
                .await?;
            let guard = resolved.handle.clone().lock_owned().await;

            match self.store.get(&resolved.session_id).await? {
                Some(current) if Arc::ptr_eq(&current, &resolved.handle) => {
                    return Ok((resolved, guard));
                }
                _ => {
                    debug!(
                        session_id = %resolved.session_id,
                        "Session evicted before its turn, resolving again"
                    );
                    requested = Some(resolved.session_id);
                }
            }
        }
    }

    /// Applies one input to a session. At most one field is stored, one
    /// counter incremented, or one lockout set per call.
    pub fn advance(&self, session: &mut Session, input: &str, now: DateTime<Utc>) -> Result<TurnOutcome> {
        if let Some(until) = session.locked_until() {
            if session.is_locked_at(now) {
                let minutes = AttemptLimiter::remaining_minutes(until, now);
                return Ok(TurnOutcome::say(format!(
                    "Too many failed attempts. Please try again after {} minutes.",
                    minutes
                )));
            }

            let field = session.resume_state().and_then(step_for).map(|s| s.field);
            self.limiter.release_expired(session, field, now);
            info!(
                session_id = %session.session_id(),
                resumed_at = %session.state(),
                "Lockout expired, resuming dialogue"
            );
        }

        let state = session.state();
        match state {
            DialogueState::Greeting => {
                session.set_state(DialogueState::LoanTypeSelection, now);
                Ok(TurnOutcome::say(GREETING))
            }
            DialogueState::Completed => Ok(TurnOutcome::say(COMPLETED_NOTICE)),
            DialogueState::Locked => Ok(TurnOutcome::say(LOCKED_NOTICE)),
            _ => match step_for(state) {
                Some(step) => self.apply_step(session, step, input, now),
                None => Ok(TurnOutcome::say(LOCKED_NOTICE)),
            },
        }
    }

    fn apply_step(
        &self,
        session: &mut Session,
        step: Step,
        input: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome> {
        let Some(value) = (step.validate)(input) else {
            return Ok(self.reject(session, step, now));
        };

        if step.next == DialogueState::Completed {
            return self.complete(session, step.field, value, now);
        }

        let message = acknowledgement(step.field, &value);
        session.store_field(step.field, value, now);
        if step.retry == RetryPolicy::Limited {
            self.limiter.record_success(session, step.field);
        }

        info!(
            session_id = %session.session_id(),
            field = %step.field,
            next = %step.next,
            "Field accepted"
        );
        session.set_state(step.next, now);
        Ok(TurnOutcome::say(message))
    }

    fn reject(&self, session: &mut Session, step: Step, now: DateTime<Utc>) -> TurnOutcome {
        match step.retry {
            RetryPolicy::Unlimited => TurnOutcome::say(step.reprompt),
            RetryPolicy::Limited => match self.limiter.record_failure(session, step.field, now) {
                AttemptOutcome::Retry {
                    attempt,
                    max_attempts,
                } => TurnOutcome::say(format!(
                    "{} Attempt {}/{}",
                    step.reprompt, attempt, max_attempts
                )),
                AttemptOutcome::Locked { .. } => TurnOutcome::say(format!(
                    "Too many failed {} attempts. Please try again after {} minutes.",
                    step.field.label(),
                    self.limiter.lockout().num_minutes()
                )),
            },
        }
    }

    /// Evaluates the record with the final field applied. Nothing is stored
    /// unless the record is complete.
    fn complete(
        &self,
        session: &mut Session,
        field: Field,
        value: FieldValue,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome> {
        let mut fields = session.fields().clone();
        fields.insert(field, value.clone());
        let profile = ApplicantProfile::from_fields(&fields)?;
        session.store_field(field, value, now);

        let verdict = self
            .evaluator
            .evaluate(&profile.eligibility_input(), now.date_naive());

        session.set_state(DialogueState::Completed, now);
        info!(
            session_id = %session.session_id(),
            eligible = verdict.eligible,
            "Dialogue completed"
        );

        Ok(TurnOutcome {
            message: render_verdict(&profile, &verdict),
            verdict: Some(verdict),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::{InMemorySessionStore, SessionHandle};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose next `resolve` is followed by a sweep of every session,
    /// landing in the gap before the turn takes the session lock.
    struct SweptAfterResolve {
        inner: InMemorySessionStore,
        sweep_next: AtomicBool,
    }

    #[async_trait::async_trait]
    impl SessionStore for SweptAfterResolve {
        async fn resolve(
            &self,
            session_id: Option<&str>,
            now: DateTime<Utc>,
        ) -> Result<ResolvedSession> {
            let resolved = self.inner.resolve(session_id, now).await?;
            if self.sweep_next.swap(false, Ordering::SeqCst) {
                self.inner
                    .evict_created_before(now + chrono::Duration::days(1))
                    .await?;
            }
            Ok(resolved)
        }

        async fn get(&self, session_id: &str) -> Result<Option<SessionHandle>> {
            self.inner.get(session_id).await
        }

        async fn evict_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
            self.inner.evict_created_before(cutoff).await
        }

        async fn len(&self) -> usize {
            self.inner.len().await
        }
    }

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn engine() -> DialogueEngine {
        DialogueEngine::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(ManualClock::new(ts())),
            &DialogueConfig::default(),
        )
    }

    fn session_at(state: DialogueState) -> Session {
        let mut session = Session::new("test".into(), ts());
        session.set_state(state, ts());
        session
    }

    #[test]
    fn test_table_follows_collection_order() {
        let order = DialogueState::COLLECTION_ORDER;
        for pair in order.windows(2).skip(1) {
            let step = step_for(pair[0]).expect("collecting state has a step");
            assert_eq!(step.next, pair[1], "after {}", pair[0]);
        }
        assert!(step_for(DialogueState::Greeting).is_none());
        assert!(step_for(DialogueState::Completed).is_none());
        assert!(step_for(DialogueState::Locked).is_none());
    }

    #[test]
    fn test_only_identity_fields_are_limited() {
        let limited: Vec<Field> = DialogueState::COLLECTION_ORDER
            .iter()
            .filter_map(|s| step_for(*s))
            .filter(|s| s.retry == RetryPolicy::Limited)
            .map(|s| s.field)
            .collect();
        assert_eq!(limited, vec![Field::Pan, Field::DateOfBirth, Field::Aadhaar]);
    }

    #[test]
    fn test_greeting_ignores_input() {
        let engine = engine();
        let mut session = session_at(DialogueState::Greeting);
        let outcome = engine.advance(&mut session, "ABCDE1234F", ts()).unwrap();

        assert_eq!(outcome.message, GREETING);
        assert_eq!(session.state(), DialogueState::LoanTypeSelection);
        assert!(session.fields().is_empty());
    }

    #[test]
    fn test_loan_menu_reprompts_without_penalty() {
        let engine = engine();
        let mut session = session_at(DialogueState::LoanTypeSelection);
        let outcome = engine.advance(&mut session, "a mortgage", ts()).unwrap();

        assert_eq!(outcome.message, LOAN_MENU);
        assert_eq!(session.state(), DialogueState::LoanTypeSelection);
        assert_eq!(session.attempts(Field::LoanType), 0);

        engine.advance(&mut session, "2", ts()).unwrap();
        assert_eq!(
            session.field(Field::LoanType),
            Some(&FieldValue::LoanType(crate::models::LoanType::CreditCard))
        );
        assert_eq!(session.state(), DialogueState::PanInput);
    }

    #[test]
    fn test_pan_success_uppercases_and_resets_counter() {
        let engine = engine();
        let mut session = session_at(DialogueState::PanInput);
        engine.advance(&mut session, "bad", ts()).unwrap();
        assert_eq!(session.attempts(Field::Pan), 1);

        let outcome = engine.advance(&mut session, "abcde1234f", ts()).unwrap();
        assert!(outcome.message.contains("ABCDE1234F"));
        assert_eq!(session.attempts(Field::Pan), 0);
        assert_eq!(session.state(), DialogueState::NameInput);
    }

    #[test]
    fn test_name_is_title_cased() {
        let engine = engine();
        let mut session = session_at(DialogueState::NameInput);
        let outcome = engine.advance(&mut session, "  rahul sharma ", ts()).unwrap();

        assert!(outcome.message.starts_with("Registered name: Rahul Sharma"));
        assert_eq!(
            session.field(Field::Name).and_then(FieldValue::as_text),
            Some("Rahul Sharma")
        );
    }

    #[test]
    fn test_credit_score_out_of_range_is_not_counted() {
        let engine = engine();
        let mut session = session_at(DialogueState::CreditScoreInput);
        for _ in 0..10 {
            engine.advance(&mut session, "950", ts()).unwrap();
        }
        assert_eq!(session.state(), DialogueState::CreditScoreInput);
        assert_eq!(session.attempts(Field::CreditScore), 0);
        assert_eq!(session.locked_until(), None);
    }

    #[test]
    fn test_self_employed_prompt() {
        let engine = engine();
        let mut session = session_at(DialogueState::EmploymentTypeInput);
        let outcome = engine.advance(&mut session, "self employed", ts()).unwrap();
        assert_eq!(outcome.message, "How many years have you been in business?");
    }

    #[test]
    fn test_address_with_missing_fields_is_an_error() {
        let engine = engine();
        let mut session = session_at(DialogueState::AddressInput);
        let result = engine.advance(&mut session, "12 MG Road", ts());
        assert!(result.is_err());
        assert_eq!(session.state(), DialogueState::AddressInput);
        assert!(session.field(Field::Address).is_none());
        assert!(session.fields().is_empty());
    }

    #[tokio::test]
    async fn test_turn_survives_eviction_before_lock() {
        let store = Arc::new(SweptAfterResolve {
            inner: InMemorySessionStore::new(),
            sweep_next: AtomicBool::new(true),
        });
        let engine = DialogueEngine::new(
            store.clone(),
            Arc::new(ManualClock::new(ts())),
            &DialogueConfig::default(),
        );

        let response = engine
            .handle_turn(TurnRequest {
                message: "hi".to_string(),
                session_id: None,
            })
            .await
            .unwrap();

        assert_eq!(response.current_step, DialogueState::LoanTypeSelection);
        assert_eq!(store.len().await, 1);
        let handle = store.get(&response.session_id).await.unwrap().unwrap();
        assert_eq!(handle.lock().await.state(), DialogueState::LoanTypeSelection);
    }
}
