use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// One entry of a company's default approver order, independent of any
/// specific claim. The manager slot marks the position a submitter's direct
/// manager would occupy, so the resolver can avoid inserting the same
/// logical approver twice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSlot {
    pub user_id: UserId,
    pub is_manager_slot: bool,
}
