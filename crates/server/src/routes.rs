use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use claimflow_core::{ApprovalId, Decision, NewClaim};
use claimflow_db::DbPool;
use claimflow_engine::{EngineError, WorkflowEngine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::auth::Principal;

#[derive(Clone)]
pub struct AppState {
    pub engine: WorkflowEngine,
    pub db_pool: DbPool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/claims", post(submit_claim).get(list_claims))
        .route("/api/claims/stats", get(claim_stats))
        .route("/api/approvals/pending", get(pending_approvals))
        .route("/api/approvals/{approval_id}/decision", post(record_decision))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Engine and store failures mapped onto HTTP statuses. Internal errors are
/// logged server-side and returned opaque.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match &error {
            // The zero-rows decision outcome collapses a missing row, a
            // wrong approver, and an already-decided row into one variant;
            // all three read as not-found to the caller.
            EngineError::ClaimNotFound(_)
            | EngineError::SubmitterNotFound(_)
            | EngineError::ApprovalNotPending(_) => {
                Self::new(StatusCode::NOT_FOUND, error.to_string())
            }
            EngineError::Domain(_) => Self::new(StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
            EngineError::Store(store_error) => {
                error!(event_name = "api.store_error", %store_error, "request failed in the store");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitClaimRequest {
    pub title: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    /// Amount in the company base currency; conversion happens upstream.
    pub converted_amount: Decimal,
    pub expense_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct SubmitClaimResponse {
    pub claim_id: i64,
    pub approver_count: u32,
}

pub async fn submit_claim(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<SubmitClaimRequest>,
) -> Result<(StatusCode, Json<SubmitClaimResponse>), ApiError> {
    if request.title.trim().is_empty() {
        return Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "title must not be empty"));
    }
    if request.amount <= Decimal::ZERO || request.converted_amount <= Decimal::ZERO {
        return Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "amount must be positive"));
    }

    let submission = state
        .engine
        .submit_claim(
            principal.user.id,
            NewClaim {
                title: request.title,
                category: request.category,
                description: request.description,
                amount: request.amount,
                currency: request.currency,
                converted_amount: request.converted_amount,
                expense_date: request.expense_date,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitClaimResponse {
            claim_id: submission.claim_id.0,
            approver_count: submission.approver_count,
        }),
    ))
}

pub async fn list_claims(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<serde_json::Value>, ApiError> {
    let claims = state.engine.claims_for_user(principal.user.id).await?;
    Ok(Json(serde_json::json!({ "claims": claims })))
}

pub async fn claim_stats(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state.engine.stats_for_user(principal.user.id).await?;
    Ok(Json(serde_json::json!({ "stats": stats })))
}

pub async fn pending_approvals(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pending = state.engine.pending_approvals(principal.user.id).await?;
    Ok(Json(serde_json::json!({ "pending": pending })))
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub claim_id: i64,
    pub claim_status: String,
    pub claim_settled_now: bool,
}

pub async fn record_decision(
    State(state): State<AppState>,
    principal: Principal,
    Path(approval_id): Path<i64>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let outcome = state
        .engine
        .record_decision(
            ApprovalId(approval_id),
            principal.user.id,
            request.decision,
            request.comment,
        )
        .await?;

    Ok(Json(DecisionResponse {
        claim_id: outcome.claim_id.0,
        claim_status: outcome.claim_status.as_str().to_string(),
        claim_settled_now: outcome.claim_settled_now,
    }))
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use claimflow_core::Decision;
    use claimflow_db::fixtures::DemoDataset;
    use claimflow_db::repositories::{approval, user};
    use claimflow_db::{connect_with_settings, migrations};
    use claimflow_engine::WorkflowEngine;
    use rust_decimal::Decimal;

    use super::{
        record_decision, submit_claim, AppState, DecisionRequest, SubmitClaimRequest,
    };
    use crate::auth::Principal;

    async fn setup() -> (AppState, claimflow_db::fixtures::SeededCompany) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let seeded = DemoDataset::load(&pool).await.expect("seed");
        let state = AppState { engine: WorkflowEngine::new(pool.clone()), db_pool: pool };
        (state, seeded)
    }

    async fn principal(state: &AppState, user_id: claimflow_core::UserId) -> Principal {
        let user = user::find_by_id(&state.db_pool, user_id)
            .await
            .expect("lookup")
            .expect("user exists");
        Principal { user }
    }

    fn taxi_request() -> SubmitClaimRequest {
        SubmitClaimRequest {
            title: "Taxi".to_string(),
            category: "travel".to_string(),
            description: None,
            amount: Decimal::new(2500, 2),
            currency: "USD".to_string(),
            converted_amount: Decimal::new(2500, 2),
            expense_date: chrono::NaiveDate::from_ymd_opt(2026, 5, 2).expect("date"),
        }
    }

    #[tokio::test]
    async fn submitting_a_claim_returns_created_with_the_chain_size() {
        let (state, seeded) = setup().await;
        let principal = principal(&state, seeded.employee_one).await;

        let (status, Json(response)) =
            submit_claim(State(state), principal, Json(taxi_request()))
                .await
                .expect("submit should succeed");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.approver_count, 2);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected_before_the_engine_runs() {
        let (state, seeded) = setup().await;
        let principal = principal(&state, seeded.employee_one).await;

        let mut request = taxi_request();
        request.amount = Decimal::ZERO;
        let result = submit_claim(State(state), principal, Json(request)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn deciding_an_already_decided_approval_reads_as_not_found() {
        let (state, seeded) = setup().await;
        let submitter = principal(&state, seeded.employee_one).await;
        let (_, Json(response)) =
            submit_claim(State(state.clone()), submitter, Json(taxi_request()))
                .await
                .expect("submit");

        let approvals = approval::list_for_claim(
            &state.db_pool,
            claimflow_core::ClaimId(response.claim_id),
        )
        .await
        .expect("list");
        let manager = principal(&state, seeded.manager_one).await;

        let Json(first) = record_decision(
            State(state.clone()),
            manager.clone(),
            Path(approvals[0].id.0),
            Json(DecisionRequest { decision: Decision::Approved, comment: None }),
        )
        .await
        .expect("first decision");
        assert_eq!(first.claim_status, "pending");

        let second = record_decision(
            State(state),
            manager,
            Path(approvals[0].id.0),
            Json(DecisionRequest { decision: Decision::Rejected, comment: None }),
        )
        .await;
        let error = second.expect_err("second decision must fail");
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }
}
