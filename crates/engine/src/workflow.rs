use std::sync::Arc;

use chrono::Utc;
use claimflow_core::{
    evaluate_claim_status, ApprovalId, AuditAction, AuditEntry, ClaimId, ClaimStatus, Decision,
    EntityKind, ExpenseClaim, NewClaim, SequenceResolver, ResolutionContext, User, UserId,
};
use claimflow_db::repositories::{approval, claim, sequence, user, ClaimStats, PendingApproval};
use claimflow_db::{write_scope, AuditRecorder, DbPool, StoreError};
use sqlx::SqliteConnection;
use tracing::warn;

use crate::error::EngineError;

/// Outcome of recording one decision, after re-evaluating the claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub approval_id: ApprovalId,
    pub claim_id: ClaimId,
    pub decision: Decision,
    pub claim_status: ClaimStatus,
    /// True when this decision moved the claim into a terminal state.
    pub claim_settled_now: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimSubmission {
    pub claim_id: ClaimId,
    pub approver_count: u32,
}

/// Drives claim workflows over the transactional store: one write scope per
/// mutation, audit entries appended afterwards in their own scope.
#[derive(Clone)]
pub struct WorkflowEngine {
    pool: DbPool,
    resolver: Arc<SequenceResolver>,
    audit: AuditRecorder,
}

impl WorkflowEngine {
    pub fn new(pool: DbPool) -> Self {
        let audit = AuditRecorder::new(pool.clone());
        Self { pool, resolver: Arc::new(SequenceResolver::default()), audit }
    }

    /// Inserts the claim and creates its approval workflow in a single
    /// write scope, then audits both.
    pub async fn submit_claim(
        &self,
        submitter_id: UserId,
        new_claim: NewClaim,
    ) -> Result<ClaimSubmission, EngineError> {
        enum Outcome {
            Created { claim_id: ClaimId, approvers: u32 },
            SubmitterMissing,
        }

        let resolver = Arc::clone(&self.resolver);
        let outcome = write_scope(&self.pool, move |conn| {
            let resolver = Arc::clone(&resolver);
            let new_claim = new_claim.clone();
            Box::pin(async move {
                let Some(submitter) = user::find_by_id(&mut *conn, submitter_id).await? else {
                    return Ok(Outcome::SubmitterMissing);
                };
                let claim_id =
                    claim::insert(&mut *conn, submitter.id, submitter.company_id, &new_claim)
                        .await?;
                let approvers = resolve_and_insert(&resolver, conn, claim_id, &submitter).await?;
                Ok(Outcome::Created { claim_id, approvers })
            })
        })
        .await?;

        match outcome {
            Outcome::SubmitterMissing => Err(EngineError::SubmitterNotFound(submitter_id)),
            Outcome::Created { claim_id, approvers } => {
                if approvers == 0 {
                    warn!(
                        event_name = "workflow.empty_chain",
                        claim_id = claim_id.0,
                        submitter_id = submitter_id.0,
                        "no eligible approvers resolved; claim will stall until one is assigned"
                    );
                }
                self.record_audit(AuditEntry::new(
                    submitter_id,
                    AuditAction::Create,
                    EntityKind::ExpenseClaim,
                    claim_id.0,
                    serde_json::json!({ "approvers": approvers }).to_string(),
                ))
                .await;
                self.record_audit(AuditEntry::new(
                    submitter_id,
                    AuditAction::Create,
                    EntityKind::ApprovalWorkflow,
                    claim_id.0,
                    serde_json::json!({ "approvers": approvers }).to_string(),
                ))
                .await;
                Ok(ClaimSubmission { claim_id, approver_count: approvers })
            }
        }
    }

    /// Resolves the approver chain for an existing claim and inserts one
    /// pending approval row per approver. Returns the approver count; zero
    /// is a valid outcome and only logs a warning.
    pub async fn create_workflow(
        &self,
        claim_id: ClaimId,
        submitter_id: UserId,
    ) -> Result<u32, EngineError> {
        enum Outcome {
            Resolved(u32),
            SubmitterMissing,
            ClaimMissing,
        }

        let resolver = Arc::clone(&self.resolver);
        let outcome = write_scope(&self.pool, move |conn| {
            let resolver = Arc::clone(&resolver);
            Box::pin(async move {
                if claim::find_by_id(&mut *conn, claim_id).await?.is_none() {
                    return Ok(Outcome::ClaimMissing);
                }
                let Some(submitter) = user::find_by_id(&mut *conn, submitter_id).await? else {
                    return Ok(Outcome::SubmitterMissing);
                };
                let approvers = resolve_and_insert(&resolver, conn, claim_id, &submitter).await?;
                Ok(Outcome::Resolved(approvers))
            })
        })
        .await?;

        match outcome {
            Outcome::ClaimMissing => Err(EngineError::ClaimNotFound(claim_id)),
            Outcome::SubmitterMissing => Err(EngineError::SubmitterNotFound(submitter_id)),
            Outcome::Resolved(approvers) => {
                if approvers == 0 {
                    warn!(
                        event_name = "workflow.empty_chain",
                        claim_id = claim_id.0,
                        submitter_id = submitter_id.0,
                        "no eligible approvers resolved; claim will stall until one is assigned"
                    );
                }
                self.record_audit(AuditEntry::new(
                    submitter_id,
                    AuditAction::Create,
                    EntityKind::ApprovalWorkflow,
                    claim_id.0,
                    serde_json::json!({ "approvers": approvers }).to_string(),
                ))
                .await;
                Ok(approvers)
            }
        }
    }

    /// Stamps one approver's decision and re-evaluates the claim:
    /// any rejection settles it as rejected, a fully approved chain settles
    /// it as approved, anything else leaves it pending. Already-settled
    /// claims keep their status regardless of straggler decisions.
    pub async fn record_decision(
        &self,
        approval_id: ApprovalId,
        approver_id: UserId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<DecisionOutcome, EngineError> {
        let decision = decision.recordable()?;

        enum Outcome {
            Applied { claim_id: ClaimId, claim_status: ClaimStatus, settled_now: bool },
            NotPending,
        }

        let outcome = write_scope(&self.pool, move |conn| {
            let comment = comment.clone();
            Box::pin(async move {
                let rows = approval::record_decision(
                    &mut *conn,
                    approval_id,
                    approver_id,
                    decision,
                    comment.as_deref(),
                    Utc::now(),
                )
                .await?;
                if rows == 0 {
                    return Ok(Outcome::NotPending);
                }

                // The guard matched, so the row exists.
                let decided = approval::find_by_id(&mut *conn, approval_id)
                    .await?
                    .ok_or_else(|| StoreError::from(sqlx::Error::RowNotFound))?;
                let claim_id = decided.claim_id;

                let approvals = approval::list_for_claim(&mut *conn, claim_id).await?;
                let mut settled_now = false;
                if let Some(next_status) = evaluate_claim_status(decision, &approvals) {
                    let changed =
                        claim::set_status_if_open(&mut *conn, claim_id, next_status).await?;
                    settled_now = changed == 1 && next_status.is_terminal();
                }

                let claim_status = claim::find_by_id(&mut *conn, claim_id)
                    .await?
                    .map(|c| c.status)
                    .ok_or_else(|| StoreError::from(sqlx::Error::RowNotFound))?;

                Ok(Outcome::Applied { claim_id, claim_status, settled_now })
            })
        })
        .await?;

        match outcome {
            Outcome::NotPending => Err(EngineError::ApprovalNotPending(approval_id)),
            Outcome::Applied { claim_id, claim_status, settled_now } => {
                let action = match decision {
                    Decision::Approved => AuditAction::Approved,
                    _ => AuditAction::Rejected,
                };
                self.record_audit(AuditEntry::new(
                    approver_id,
                    action,
                    EntityKind::ExpenseApproval,
                    approval_id.0,
                    serde_json::json!({ "claim_id": claim_id.0 }).to_string(),
                ))
                .await;
                if settled_now {
                    self.record_audit(AuditEntry::new(
                        approver_id,
                        action,
                        EntityKind::ExpenseClaim,
                        claim_id.0,
                        serde_json::json!({ "status": claim_status.as_str() }).to_string(),
                    ))
                    .await;
                }
                Ok(DecisionOutcome {
                    approval_id,
                    claim_id,
                    decision,
                    claim_status,
                    claim_settled_now: settled_now,
                })
            }
        }
    }

    /// Pending work queue for one approver, newest claim first.
    pub async fn pending_approvals(
        &self,
        approver_id: UserId,
    ) -> Result<Vec<PendingApproval>, EngineError> {
        Ok(approval::list_pending_for_approver(&self.pool, approver_id).await.map_err(StoreError::from)?)
    }

    pub async fn claims_for_user(&self, user_id: UserId) -> Result<Vec<ExpenseClaim>, EngineError> {
        Ok(claim::list_for_user(&self.pool, user_id).await.map_err(StoreError::from)?)
    }

    pub async fn stats_for_user(&self, user_id: UserId) -> Result<ClaimStats, EngineError> {
        Ok(claim::stats_for_user(&self.pool, user_id).await.map_err(StoreError::from)?)
    }

    pub async fn claim(&self, claim_id: ClaimId) -> Result<Option<ExpenseClaim>, EngineError> {
        Ok(claim::find_by_id(&self.pool, claim_id).await.map_err(StoreError::from)?)
    }

    /// Audit writes never fail the business mutation they describe.
    async fn record_audit(&self, entry: AuditEntry) {
        if let Err(error) = self.audit.record(&entry).await {
            warn!(
                event_name = "audit.write_failed",
                entity = entry.entity.as_str(),
                entity_id = entry.entity_id,
                %error,
                "audit entry dropped"
            );
        }
    }
}

/// Loads the directory and template, resolves the approver chain, and
/// inserts one pending approval row per resolved approver.
async fn resolve_and_insert(
    resolver: &SequenceResolver,
    conn: &mut SqliteConnection,
    claim_id: ClaimId,
    submitter: &User,
) -> Result<u32, StoreError> {
    let directory = user::load_directory(&mut *conn, submitter.company_id).await?;
    let template = sequence::list_for_company(&mut *conn, submitter.company_id).await?;
    let ctx = ResolutionContext { submitter, directory: &directory, template: &template };

    let chain = resolver.resolve(&ctx);
    for ranked in &chain {
        approval::insert_pending(&mut *conn, claim_id, ranked.user_id, ranked.sequence_order)
            .await?;
    }
    Ok(chain.len() as u32)
}
