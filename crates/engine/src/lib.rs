//! Approval workflow engine: chain creation and decision processing over
//! the transactional store.

pub mod error;
pub mod workflow;

pub use error::EngineError;
pub use workflow::{ClaimSubmission, DecisionOutcome, WorkflowEngine};
