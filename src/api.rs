//! REST API Server for the Loan Eligibility Assistant
//!
//! Exposes the dialogue engine via HTTP endpoints
//! Integrates with the chat frontend

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::dialogue::DialogueEngine;
use crate::error::AssistantError;
use crate::models::{EligibilityInput, EligibilityVerdict, TurnRequest};
use crate::validation;

/// =============================
/// Request Models
/// =============================

/// Complete applicant record submitted in one request
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerData {
    pub pan: String,
    pub name: String,
    pub date_of_birth: String,
    pub address: String,
    pub monthly_income: f64,
    pub employment_type: String,
    pub years_employed: f64,
    pub existing_emis: f64,
    pub credit_score: i64,
    #[serde(default)]
    pub loan_amount: Option<f64>,
    #[serde(default)]
    pub loan_purpose: Option<String>,
    #[serde(default)]
    pub aadhaar: Option<String>,
}

impl CustomerData {
    /// Runs the dialogue's field validators over the whole record.
    pub fn to_eligibility_input(&self) -> crate::Result<EligibilityInput> {
        let invalid = |msg: &str| AssistantError::InvalidRequest(msg.to_string());

        validation::validate_pan(&self.pan).ok_or_else(|| invalid("Invalid PAN format"))?;
        validation::normalize_name(&self.name).ok_or_else(|| invalid("Name is required"))?;
        validation::normalize_address(&self.address)
            .ok_or_else(|| invalid("Address is required"))?;
        let date_of_birth = validation::parse_date_of_birth(&self.date_of_birth)
            .ok_or_else(|| invalid("Date of birth must be in DD-MM-YYYY format"))?;
        let credit_score = validation::parse_credit_score(&self.credit_score.to_string())
            .ok_or_else(|| invalid("Credit score must be between 300 and 900"))?;
        validation::classify_employment(&self.employment_type)
            .ok_or_else(|| invalid("Employment type must be Salaried or Self-Employed"))?;
        if let Some(aadhaar) = &self.aadhaar {
            validation::normalize_aadhaar(aadhaar)
                .ok_or_else(|| invalid("Invalid Aadhaar format"))?;
        }

        for (label, value) in [
            ("monthly_income", self.monthly_income),
            ("existing_emis", self.existing_emis),
            ("years_employed", self.years_employed),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AssistantError::InvalidRequest(format!(
                    "{} must be a non-negative number",
                    label
                )));
            }
        }

        Ok(EligibilityInput {
            date_of_birth,
            monthly_income: self.monthly_income,
            existing_emis: self.existing_emis,
            credit_score,
            years_employed: self.years_employed,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerificationRequest {
    pub pan: String,
    pub name: String,
    pub date_of_birth: String,
    #[serde(default)]
    pub aadhaar: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub verified: bool,
    pub message: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Rejected JSON bodies get the same envelope as other request errors
fn rejection_response(rejection: JsonRejection) -> (StatusCode, Json<ApiResponse>) {
    warn!("Rejected request body: {}", rejection.body_text());
    (
        rejection.status(),
        Json(ApiResponse::error(rejection.body_text())),
    )
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<DialogueEngine>,
}

/// =============================
/// Health Endpoints
/// =============================

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Loan Eligibility Chatbot API is running"
    }))
}

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let active_sessions = state.engine.store().len().await;
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_sessions": active_sessions,
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection).into_response(),
    };

    info!(
        session_id = ?req.session_id,
        "Received chat turn"
    );

    match state.engine.handle_turn(req).await {
        Ok(response) => {
            info!(
                session_id = %response.session_id,
                current_step = %response.current_step,
                completed = response.completed,
                "Chat turn processed"
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("Chat turn failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Chat turn failed: {}", e))),
            )
                .into_response()
        }
    }
}

/// =============================
/// Direct Evaluation Endpoints
/// =============================

async fn check_eligibility(
    State(state): State<ApiState>,
    body: Result<Json<CustomerData>, JsonRejection>,
) -> Result<Json<EligibilityVerdict>, (StatusCode, Json<ApiResponse>)> {
    let Json(customer) = body.map_err(rejection_response)?;
    let input = customer.to_eligibility_input().map_err(|e| {
        warn!("Rejected eligibility request: {}", e);
        (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())))
    })?;

    let today = state.engine.clock().today();
    Ok(Json(state.engine.evaluator().evaluate(&input, today)))
}

async fn verify_user(
    body: Result<Json<VerificationRequest>, JsonRejection>,
) -> Result<Json<VerificationResponse>, (StatusCode, Json<ApiResponse>)> {
    let Json(req) = body.map_err(rejection_response)?;
    let failure = |message: &str| {
        Ok(Json(VerificationResponse {
            verified: false,
            message: message.to_string(),
        }))
    };

    if validation::validate_pan(&req.pan).is_none() {
        return failure("Invalid PAN format");
    }
    if let Some(aadhaar) = &req.aadhaar {
        if validation::normalize_aadhaar(aadhaar).is_none() {
            return failure("Invalid Aadhaar format");
        }
    }
    if validation::parse_date_of_birth(&req.date_of_birth).is_none() {
        return failure("Invalid date format. Use DD-MM-YYYY");
    }

    Ok(Json(VerificationResponse {
        verified: true,
        message: "User verified successfully".to_string(),
    }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(engine: Arc<DialogueEngine>) -> Router {
    let state = ApiState { engine };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat_handler))
        .route("/check-eligibility", post(check_eligibility))
        .route("/verify-user", post(verify_user))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn start_server(engine: Arc<DialogueEngine>, port: u16) -> crate::Result<()> {
    let router = create_router(engine);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
