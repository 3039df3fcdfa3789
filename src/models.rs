//! Core data models for the loan eligibility assistant

use crate::error::AssistantError;
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//
// ================= Dialogue States =================
//

/// Position of a session in the guided collection dialogue.
///
/// The serialized names are part of the wire contract (`current_step`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    Greeting,
    LoanTypeSelection,
    PanInput,
    NameInput,
    DobInput,
    AadhaarInput,
    IncomeInput,
    EmisInput,
    CreditScoreInput,
    EmploymentTypeInput,
    EmploymentYearsInput,
    AddressInput,
    Completed,
    Locked,
}

impl DialogueState {
    /// The main path, in collection order. `Locked` is a side branch.
    pub const COLLECTION_ORDER: [DialogueState; 13] = [
        DialogueState::Greeting,
        DialogueState::LoanTypeSelection,
        DialogueState::PanInput,
        DialogueState::NameInput,
        DialogueState::DobInput,
        DialogueState::AadhaarInput,
        DialogueState::IncomeInput,
        DialogueState::EmisInput,
        DialogueState::CreditScoreInput,
        DialogueState::EmploymentTypeInput,
        DialogueState::EmploymentYearsInput,
        DialogueState::AddressInput,
        DialogueState::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueState::Greeting => "greeting",
            DialogueState::LoanTypeSelection => "loan_type_selection",
            DialogueState::PanInput => "pan_input",
            DialogueState::NameInput => "name_input",
            DialogueState::DobInput => "dob_input",
            DialogueState::AadhaarInput => "aadhaar_input",
            DialogueState::IncomeInput => "income_input",
            DialogueState::EmisInput => "emis_input",
            DialogueState::CreditScoreInput => "credit_score_input",
            DialogueState::EmploymentTypeInput => "employment_type_input",
            DialogueState::EmploymentYearsInput => "employment_years_input",
            DialogueState::AddressInput => "address_input",
            DialogueState::Completed => "completed",
            DialogueState::Locked => "locked",
        }
    }
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Fields =================
//

/// Applicant attributes collected by the dialogue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    LoanType,
    Pan,
    Name,
    DateOfBirth,
    Aadhaar,
    MonthlyIncome,
    ExistingEmis,
    CreditScore,
    EmploymentType,
    YearsEmployed,
    Address,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::LoanType => "loan_type",
            Field::Pan => "pan",
            Field::Name => "name",
            Field::DateOfBirth => "date_of_birth",
            Field::Aadhaar => "aadhaar",
            Field::MonthlyIncome => "monthly_income",
            Field::ExistingEmis => "existing_emis",
            Field::CreditScore => "credit_score",
            Field::EmploymentType => "employment_type",
            Field::YearsEmployed => "years_employed",
            Field::Address => "address",
        }
    }

    /// Short label used in applicant-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Field::LoanType => "loan type",
            Field::Pan => "PAN",
            Field::Name => "name",
            Field::DateOfBirth => "DOB",
            Field::Aadhaar => "Aadhaar",
            Field::MonthlyIncome => "monthly income",
            Field::ExistingEmis => "existing EMIs",
            Field::CreditScore => "credit score",
            Field::EmploymentType => "employment type",
            Field::YearsEmployed => "years employed",
            Field::Address => "address",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LoanType {
    #[serde(rename = "Personal Loan")]
    Personal,
    #[serde(rename = "Credit Card Loan")]
    CreditCard,
}

impl fmt::Display for LoanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoanType::Personal => "Personal Loan",
            LoanType::CreditCard => "Credit Card Loan",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EmploymentType {
    Salaried,
    #[serde(rename = "Self-Employed")]
    SelfEmployed,
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EmploymentType::Salaried => "Salaried",
            EmploymentType::SelfEmployed => "Self-Employed",
        };
        write!(f, "{}", s)
    }
}

/// A value that has already passed its field validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    LoanType(LoanType),
    Employment(EmploymentType),
    Date(NaiveDate),
    Score(u16),
    Amount(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<f64> {
        match self {
            FieldValue::Amount(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_score(&self) -> Option<u16> {
        match self {
            FieldValue::Score(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_loan_type(&self) -> Option<LoanType> {
        match self {
            FieldValue::LoanType(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_employment(&self) -> Option<EmploymentType> {
        match self {
            FieldValue::Employment(e) => Some(*e),
            _ => None,
        }
    }
}

//
// ================= Session =================
//

/// Per-applicant dialogue record.
///
/// Mutation goes through crate-internal methods so that `fields` only ever
/// holds validated values and is frozen once the session completes.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    session_id: String,
    state: DialogueState,
    fields: BTreeMap<Field, FieldValue>,
    attempts: BTreeMap<Field, u32>,
    locked_until: Option<DateTime<Utc>>,
    /// Step to return to once a lockout has expired
    resume_state: Option<DialogueState>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: String, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            state: DialogueState::Greeting,
            fields: BTreeMap::new(),
            attempts: BTreeMap::new(),
            locked_until: None,
            resume_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    pub fn fields(&self) -> &BTreeMap<Field, FieldValue> {
        &self.fields
    }

    pub fn field(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Current failure count for a field (0 if never failed)
    pub fn attempts(&self, field: Field) -> u32 {
        self.attempts.get(&field).copied().unwrap_or(0)
    }

    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        self.locked_until
    }

    pub fn resume_state(&self) -> Option<DialogueState> {
        self.resume_state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_completed(&self) -> bool {
        self.state == DialogueState::Completed
    }

    /// True while a lockout is in force at `now`
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }

    pub(crate) fn set_state(&mut self, state: DialogueState, now: DateTime<Utc>) {
        self.state = state;
        self.updated_at = now;
    }

    /// Stores a validated value. Ignored once the session has completed.
    pub(crate) fn store_field(&mut self, field: Field, value: FieldValue, now: DateTime<Utc>) {
        if self.is_completed() {
            return;
        }
        self.fields.insert(field, value);
        self.updated_at = now;
    }

    pub(crate) fn set_attempts(&mut self, field: Field, count: u32) {
        self.attempts.insert(field, count);
    }

    pub(crate) fn lock(&mut self, until: DateTime<Utc>, now: DateTime<Utc>) {
        self.resume_state = Some(self.state);
        self.locked_until = Some(until);
        self.set_state(DialogueState::Locked, now);
    }

    /// Clears an expired lock and returns the step to resume at.
    pub(crate) fn unlock(&mut self, now: DateTime<Utc>) -> Option<DialogueState> {
        self.locked_until = None;
        let resume = self.resume_state.take()?;
        self.set_state(resume, now);
        Some(resume)
    }
}

//
// ================= Applicant Record =================
//

/// Inputs the eligibility rules read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityInput {
    pub date_of_birth: NaiveDate,
    pub monthly_income: f64,
    pub existing_emis: f64,
    pub credit_score: u16,
    pub years_employed: f64,
}

/// Fully validated applicant, assembled from a completed field set.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicantProfile {
    pub loan_type: LoanType,
    pub pan: String,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub aadhaar: String,
    pub monthly_income: f64,
    pub existing_emis: f64,
    pub credit_score: u16,
    pub employment_type: EmploymentType,
    pub years_employed: f64,
    pub address: String,
}

impl ApplicantProfile {
    pub fn from_fields(fields: &BTreeMap<Field, FieldValue>) -> Result<Self> {
        fn take<T>(
            fields: &BTreeMap<Field, FieldValue>,
            field: Field,
            get: impl Fn(&FieldValue) -> Option<T>,
        ) -> Result<T> {
            fields
                .get(&field)
                .and_then(get)
                .ok_or_else(|| AssistantError::IncompleteRecord(field.to_string()))
        }

        Ok(Self {
            loan_type: take(fields, Field::LoanType, FieldValue::as_loan_type)?,
            pan: take(fields, Field::Pan, |v| v.as_text().map(str::to_string))?,
            name: take(fields, Field::Name, |v| v.as_text().map(str::to_string))?,
            date_of_birth: take(fields, Field::DateOfBirth, FieldValue::as_date)?,
            aadhaar: take(fields, Field::Aadhaar, |v| v.as_text().map(str::to_string))?,
            monthly_income: take(fields, Field::MonthlyIncome, FieldValue::as_amount)?,
            existing_emis: take(fields, Field::ExistingEmis, FieldValue::as_amount)?,
            credit_score: take(fields, Field::CreditScore, FieldValue::as_score)?,
            employment_type: take(fields, Field::EmploymentType, FieldValue::as_employment)?,
            years_employed: take(fields, Field::YearsEmployed, FieldValue::as_amount)?,
            address: take(fields, Field::Address, |v| v.as_text().map(str::to_string))?,
        })
    }

    pub fn eligibility_input(&self) -> EligibilityInput {
        EligibilityInput {
            date_of_birth: self.date_of_birth,
            monthly_income: self.monthly_income,
            existing_emis: self.existing_emis,
            credit_score: self.credit_score,
            years_employed: self.years_employed,
        }
    }
}

//
// ================= Eligibility Verdict =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibilityCheck {
    pub rule_name: String,
    pub passed: bool,
    pub details: String,
}

/// Derived once from a completed applicant record; never stored on the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    /// One entry per failed rule, in rule order. Empty when eligible.
    pub reasons: Vec<String>,
    pub explanation: String,
    pub next_steps: Vec<String>,
    pub checks: Vec<EligibilityCheck>,
}

//
// ================= Turn I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub message: String,
    pub session_id: String,
    pub current_step: DialogueState,
    pub completed: bool,
    /// Present only on the turn that completes the dialogue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<EligibilityVerdict>,
}
