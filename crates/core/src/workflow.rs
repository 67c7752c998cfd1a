use crate::domain::approval::{Approval, Decision};
use crate::domain::claim::ClaimStatus;

/// Folds one freshly recorded decision into the claim's aggregate state.
///
/// A single rejection vetoes the claim outright, regardless of every other
/// slot. Otherwise the claim completes as approved only once no slot
/// remains pending. `None` means the claim status is left untouched.
///
/// The approvals slice must be the claim's full set, reloaded after the
/// decision write inside the same transaction; sequence order is never
/// consulted here — any approver may decide at any time.
pub fn evaluate_claim_status(recorded: Decision, approvals: &[Approval]) -> Option<ClaimStatus> {
    if recorded == Decision::Rejected {
        return Some(ClaimStatus::Rejected);
    }

    let any_pending = approvals.iter().any(|approval| approval.decision == Decision::Pending);
    if any_pending {
        None
    } else {
        Some(ClaimStatus::Approved)
    }
}
