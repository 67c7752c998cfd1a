use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::sequence::SequenceSlot;
use crate::domain::user::{Role, User, UserId};

/// One resolved approver with its 1-based position in the final chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedApprover {
    pub user_id: UserId,
    pub sequence_order: u32,
}

/// Read-only snapshot of one company's user table, keyed for the lookups
/// the resolver performs. Built once per resolution from rows loaded inside
/// the enclosing transaction.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    users: BTreeMap<UserId, DirectoryEntry>,
}

#[derive(Clone, Debug)]
struct DirectoryEntry {
    role: Role,
    is_active: bool,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user_id: UserId, role: Role, is_active: bool) {
        self.users.insert(user_id, DirectoryEntry { role, is_active });
    }

    pub fn from_users<I>(users: I) -> Self
    where
        I: IntoIterator<Item = User>,
    {
        let users = users
            .into_iter()
            .map(|user| (user.id, DirectoryEntry { role: user.role, is_active: user.is_active }))
            .collect();
        Self { users }
    }

    /// A referenced user is usable as an approver only while active with
    /// role manager or admin.
    pub fn is_eligible_approver(&self, user_id: UserId) -> bool {
        self.users
            .get(&user_id)
            .map(|entry| entry.is_active && entry.role.can_approve())
            .unwrap_or(false)
    }

    /// Active admins in ascending user-id order. BTreeMap iteration is the
    /// ordering guarantee.
    pub fn active_admins(&self) -> impl Iterator<Item = UserId> + '_ {
        self.users
            .iter()
            .filter(|(_, entry)| entry.is_active && entry.role == Role::Admin)
            .map(|(id, _)| *id)
    }
}

#[derive(Clone, Debug)]
pub struct ResolutionContext<'a> {
    pub submitter: &'a User,
    pub directory: &'a Directory,
    pub template: &'a [SequenceSlot],
}

/// Accumulates the chain across tiers. Tier 2 needs to know whether tier 1
/// actually appended the direct manager, not merely whether one is set.
#[derive(Clone, Debug, Default)]
pub struct ChainBuilder {
    approvers: Vec<UserId>,
    manager_appended: bool,
}

impl ChainBuilder {
    fn push(&mut self, user_id: UserId) {
        self.approvers.push(user_id);
    }

    pub fn is_empty(&self) -> bool {
        self.approvers.is_empty()
    }

    pub fn manager_appended(&self) -> bool {
        self.manager_appended
    }
}

/// One ranked fallback tier. Tiers append to the shared chain; they never
/// replace what earlier tiers produced.
pub trait ApproverPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Gated tiers run only while the chain is still empty when their turn
    /// comes; ungated tiers always run.
    fn gated_on_empty_chain(&self) -> bool {
        false
    }

    fn extend(&self, ctx: &ResolutionContext<'_>, chain: &mut ChainBuilder);
}

/// Tier 1: the submitter's direct manager, when eligible.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectManagerPolicy;

impl ApproverPolicy for DirectManagerPolicy {
    fn name(&self) -> &'static str {
        "direct_manager"
    }

    fn extend(&self, ctx: &ResolutionContext<'_>, chain: &mut ChainBuilder) {
        let Some(manager_id) = ctx.submitter.manager_id else {
            return;
        };
        if ctx.directory.is_eligible_approver(manager_id) {
            chain.push(manager_id);
            chain.manager_appended = true;
        }
    }
}

/// Tier 2: the company sequence template in stored order. Manager-slot
/// entries are skipped only when tier 1 already appended a manager; other
/// entries are not deduplicated against tier 1, which is accepted input
/// behavior rather than something the resolver filters.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceTemplatePolicy;

impl ApproverPolicy for SequenceTemplatePolicy {
    fn name(&self) -> &'static str {
        "sequence_template"
    }

    fn extend(&self, ctx: &ResolutionContext<'_>, chain: &mut ChainBuilder) {
        for slot in ctx.template {
            if slot.is_manager_slot && chain.manager_appended() {
                continue;
            }
            if ctx.directory.is_eligible_approver(slot.user_id) {
                chain.push(slot.user_id);
            }
        }
    }
}

/// Tier 3: every active company admin except the submitter, ascending id.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdminFallbackPolicy;

impl ApproverPolicy for AdminFallbackPolicy {
    fn name(&self) -> &'static str {
        "admin_fallback"
    }

    fn gated_on_empty_chain(&self) -> bool {
        true
    }

    fn extend(&self, ctx: &ResolutionContext<'_>, chain: &mut ChainBuilder) {
        for admin_id in ctx.directory.active_admins() {
            if admin_id != ctx.submitter.id {
                chain.push(admin_id);
            }
        }
    }
}

/// Tier 4: the single active admin with the smallest id, submitter included.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleAdminPolicy;

impl ApproverPolicy for SingleAdminPolicy {
    fn name(&self) -> &'static str {
        "single_admin"
    }

    fn gated_on_empty_chain(&self) -> bool {
        true
    }

    fn extend(&self, ctx: &ResolutionContext<'_>, chain: &mut ChainBuilder) {
        if let Some(admin_id) = ctx.directory.active_admins().next() {
            chain.push(admin_id);
        }
    }
}

/// Cascading approver resolution: tiers run in rank order under their gating
/// rules and the surviving chain is numbered 1..=n. An empty chain is a
/// valid, degenerate output; the caller decides what to do with it.
pub struct SequenceResolver {
    policies: Vec<Box<dyn ApproverPolicy>>,
}

impl Default for SequenceResolver {
    fn default() -> Self {
        Self {
            policies: vec![
                Box::new(DirectManagerPolicy),
                Box::new(SequenceTemplatePolicy),
                Box::new(AdminFallbackPolicy),
                Box::new(SingleAdminPolicy),
            ],
        }
    }
}

impl SequenceResolver {
    pub fn resolve(&self, ctx: &ResolutionContext<'_>) -> Vec<RankedApprover> {
        let mut chain = ChainBuilder::default();

        for policy in &self.policies {
            if policy.gated_on_empty_chain() && !chain.is_empty() {
                continue;
            }
            policy.extend(ctx, &mut chain);
        }

        chain
            .approvers
            .into_iter()
            .enumerate()
            .map(|(index, user_id)| RankedApprover {
                user_id,
                sequence_order: (index + 1) as u32,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::company::CompanyId;
    use crate::domain::sequence::SequenceSlot;
    use crate::domain::user::{Role, User, UserId};

    use super::{Directory, RankedApprover, ResolutionContext, SequenceResolver};

    fn user(id: i64, role: Role, manager_id: Option<i64>, is_active: bool) -> User {
        User {
            id: UserId(id),
            company_id: CompanyId(1),
            name: format!("user-{id}"),
            email: format!("user-{id}@example.com"),
            role,
            manager_id: manager_id.map(UserId),
            is_active,
            created_at: Utc::now(),
        }
    }

    fn slot(user_id: i64, is_manager_slot: bool) -> SequenceSlot {
        SequenceSlot { user_id: UserId(user_id), is_manager_slot }
    }

    fn resolve(submitter: &User, users: Vec<User>, template: Vec<SequenceSlot>) -> Vec<RankedApprover> {
        let directory = Directory::from_users(users);
        let ctx = ResolutionContext { submitter, directory: &directory, template: &template };
        SequenceResolver::default().resolve(&ctx)
    }

    #[test]
    fn active_manager_resolves_alone_with_order_one() {
        let submitter = user(10, Role::Employee, Some(3), true);
        let chain = resolve(
            &submitter,
            vec![submitter.clone(), user(3, Role::Manager, None, true)],
            vec![],
        );

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].user_id, UserId(3));
        assert_eq!(chain[0].sequence_order, 1);
    }

    #[test]
    fn inactive_manager_is_not_usable_as_approver() {
        let submitter = user(10, Role::Employee, Some(3), true);
        let chain = resolve(
            &submitter,
            vec![
                submitter.clone(),
                user(3, Role::Manager, None, false),
                user(7, Role::Admin, None, true),
            ],
            vec![],
        );

        // Tier 1 and 2 produce nothing, so the admin fallback kicks in.
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].user_id, UserId(7));
    }

    #[test]
    fn employee_roled_manager_reference_is_skipped() {
        let submitter = user(10, Role::Employee, Some(3), true);
        let chain = resolve(
            &submitter,
            vec![
                submitter.clone(),
                user(3, Role::Employee, None, true),
                user(7, Role::Admin, None, true),
            ],
            vec![],
        );

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].user_id, UserId(7));
    }

    #[test]
    fn template_appends_after_manager_and_orders_are_strictly_increasing() {
        let submitter = user(10, Role::Employee, Some(3), true);
        let chain = resolve(
            &submitter,
            vec![
                submitter.clone(),
                user(3, Role::Manager, None, true),
                user(5, Role::Admin, None, true),
                user(6, Role::Manager, None, true),
            ],
            vec![slot(5, false), slot(6, false)],
        );

        let ids: Vec<i64> = chain.iter().map(|approver| approver.user_id.0).collect();
        let orders: Vec<u32> = chain.iter().map(|approver| approver.sequence_order).collect();
        assert_eq!(ids, vec![3, 5, 6]);
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn manager_slot_is_skipped_only_when_manager_was_appended() {
        // Manager appended in tier 1: the manager slot is skipped.
        let submitter = user(10, Role::Employee, Some(3), true);
        let users = vec![
            submitter.clone(),
            user(3, Role::Manager, None, true),
            user(5, Role::Admin, None, true),
        ];
        let chain = resolve(&submitter, users.clone(), vec![slot(3, true), slot(5, false)]);
        let ids: Vec<i64> = chain.iter().map(|approver| approver.user_id.0).collect();
        assert_eq!(ids, vec![3, 5]);

        // Manager reference set but ineligible: tier 1 appends nothing, so
        // the manager slot participates like any other entry.
        let submitter = user(10, Role::Employee, Some(4), true);
        let users = vec![
            submitter.clone(),
            user(4, Role::Employee, None, true),
            user(3, Role::Manager, None, true),
            user(5, Role::Admin, None, true),
        ];
        let chain = resolve(&submitter, users, vec![slot(3, true), slot(5, false)]);
        let ids: Vec<i64> = chain.iter().map(|approver| approver.user_id.0).collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[test]
    fn duplicate_across_tiers_is_accepted_not_filtered() {
        let submitter = user(10, Role::Employee, Some(3), true);
        let chain = resolve(
            &submitter,
            vec![submitter.clone(), user(3, Role::Manager, None, true)],
            vec![slot(3, false)],
        );

        let ids: Vec<i64> = chain.iter().map(|approver| approver.user_id.0).collect();
        assert_eq!(ids, vec![3, 3]);
    }

    #[test]
    fn admin_fallback_orders_by_ascending_user_id() {
        let submitter = user(10, Role::Employee, None, true);
        let chain = resolve(
            &submitter,
            vec![
                submitter.clone(),
                user(5, Role::Admin, None, true),
                user(2, Role::Admin, None, true),
            ],
            vec![],
        );

        let ids: Vec<i64> = chain.iter().map(|approver| approver.user_id.0).collect();
        let orders: Vec<u32> = chain.iter().map(|approver| approver.sequence_order).collect();
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn admin_fallback_excludes_the_submitter() {
        let submitter = user(2, Role::Admin, None, true);
        let chain = resolve(
            &submitter,
            vec![submitter.clone(), user(5, Role::Admin, None, true)],
            vec![],
        );

        let ids: Vec<i64> = chain.iter().map(|approver| approver.user_id.0).collect();
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn single_admin_last_resort_may_select_the_submitter() {
        // The only active admin is the submitter: tier 3 excludes them,
        // tier 4 does not.
        let submitter = user(2, Role::Admin, None, true);
        let chain = resolve(&submitter, vec![submitter.clone()], vec![]);

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].user_id, UserId(2));
        assert_eq!(chain[0].sequence_order, 1);
    }

    #[test]
    fn empty_chain_is_a_valid_degenerate_output() {
        let submitter = user(10, Role::Employee, None, true);
        let chain = resolve(&submitter, vec![submitter.clone()], vec![]);
        assert!(chain.is_empty());
    }

    #[test]
    fn template_tier_still_runs_when_manager_tier_matched() {
        // Tiers 1 and 2 are not gated on each other: both contribute.
        let submitter = user(10, Role::Employee, Some(3), true);
        let chain = resolve(
            &submitter,
            vec![
                submitter.clone(),
                user(3, Role::Manager, None, true),
                user(8, Role::Admin, None, true),
            ],
            vec![slot(8, false)],
        );

        let ids: Vec<i64> = chain.iter().map(|approver| approver.user_id.0).collect();
        assert_eq!(ids, vec![3, 8]);
    }
}
