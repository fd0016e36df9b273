//! Sequential approval ordering between executive roles
//!
//! Three roles approve in a fixed order: director, deputy director and captain
//! of accounting. Payment documents and their stages under the payment threshold
//! swap the order to deputy director, captain of accounting, director. Every
//! other approver may approve at any time, but the ordered roles only start
//! once all of them are done. A role group holding several users completes
//! only when each member has approved.
//!
//! The same resolver serves whole documents and individual payment stages;
//! callers pass the scope (kind plus amount) explicitly.
use super::approval::{ApprovalRecord, Approver, UserId};
use super::document::DocumentKind;
use super::error::ApprovalError;
use super::role::Role;

pub const DEFAULT_PAYMENT_THRESHOLD: u64 = 100_000_000;

/// An assigned approver with their current global role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApprover {
    pub user_id: UserId,
    pub username: String,
    pub sub_role: String,
    pub role: Role,
}

impl ResolvedApprover {
    pub fn new(approver: &Approver, role: Role) -> Self {
        Self {
            user_id: approver.user_id.clone(),
            username: approver.username.clone(),
            sub_role: approver.sub_role.clone(),
            role,
        }
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.username, self.role)
    }
}

/// What is being approved: the document kind and the amount at stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyScope {
    pub kind: DocumentKind,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Allowed,
    Blocked { waiting_for: Vec<String> },
}

impl ApprovalDecision {
    pub fn can_approve(&self) -> bool {
        matches!(self, ApprovalDecision::Allowed)
    }
    pub fn waiting_for(&self) -> &[String] {
        match self {
            ApprovalDecision::Allowed => &[],
            ApprovalDecision::Blocked { waiting_for } => waiting_for,
        }
    }
    pub fn into_result(self) -> Result<(), ApprovalError> {
        match self {
            ApprovalDecision::Allowed => Ok(()),
            ApprovalDecision::Blocked { waiting_for } => {
                Err(ApprovalError::HierarchyBlocked { waiting_for })
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HierarchyResolver {
    payment_threshold: u64,
}

impl Default for HierarchyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PAYMENT_THRESHOLD)
    }
}

impl HierarchyResolver {
    pub fn new(payment_threshold: u64) -> Self {
        Self { payment_threshold }
    }

    pub fn payment_threshold(&self) -> u64 {
        self.payment_threshold
    }

    /// The ordered roles for this scope, first to approve first.
    pub fn order(&self, scope: HierarchyScope) -> [Role; 3] {
        if scope.kind == DocumentKind::Payment && scope.amount < self.payment_threshold {
            [
                Role::DeputyDirector,
                Role::CaptainOfAccounting,
                Role::Director,
            ]
        } else {
            [
                Role::Director,
                Role::DeputyDirector,
                Role::CaptainOfAccounting,
            ]
        }
    }

    /// Decides whether `requester` may approve now given who already has.
    pub fn can_approve_now(
        &self,
        requester_role: &Role,
        requester_id: &UserId,
        approvers: &[ResolvedApprover],
        approved: &[ApprovalRecord],
        scope: HierarchyScope,
    ) -> ApprovalDecision {
        let order = self.order(scope);
        let assigned: Vec<&Role> = order
            .iter()
            .filter(|role| approvers.iter().any(|a| &a.role == *role))
            .collect();

        if self.bypasses_order(requester_role, scope) {
            return ApprovalDecision::Allowed;
        }
        let Some(position) = assigned.iter().position(|role| *role == requester_role) else {
            // not an ordered role, approves whenever
            return ApprovalDecision::Allowed;
        };

        let is_pending =
            |a: &&ResolvedApprover| !approved.iter().any(|record| record.user_id == a.user_id);

        let waiting_others: Vec<String> = approvers
            .iter()
            .filter(|a| &a.user_id != requester_id && !order.contains(&a.role))
            .filter(is_pending)
            .map(ResolvedApprover::describe)
            .collect();
        if !waiting_others.is_empty() {
            return ApprovalDecision::Blocked {
                waiting_for: waiting_others,
            };
        }

        let waiting_predecessors: Vec<String> = assigned[..position]
            .iter()
            .flat_map(move |role| approvers.iter().filter(move |a| &a.role == *role))
            .filter(is_pending)
            .map(ResolvedApprover::describe)
            .collect();
        if !waiting_predecessors.is_empty() {
            return ApprovalDecision::Blocked {
                waiting_for: waiting_predecessors,
            };
        }

        ApprovalDecision::Allowed
    }

    // Directors always go through. Deputy directors go through on payments
    // strictly below or strictly above the threshold; at exactly the
    // threshold they wait like everyone else.
    fn bypasses_order(&self, role: &Role, scope: HierarchyScope) -> bool {
        match role {
            Role::Director => true,
            Role::DeputyDirector => {
                scope.kind == DocumentKind::Payment && scope.amount != self.payment_threshold
            }
            _ => false,
        }
    }
}
