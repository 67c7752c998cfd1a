pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod routing;
pub mod workflow;

pub use audit::{AuditAction, AuditEntry, EntityKind};
pub use domain::approval::{Approval, ApprovalId, Decision};
pub use domain::claim::{ClaimId, ClaimStatus, ExpenseClaim, NewClaim};
pub use domain::company::{Company, CompanyId};
pub use domain::sequence::SequenceSlot;
pub use domain::user::{Role, User, UserId};
pub use errors::DomainError;
pub use routing::{Directory, RankedApprover, ResolutionContext, SequenceResolver};
pub use workflow::evaluate_claim_status;
