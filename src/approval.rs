//! Approval state shared by whole documents and payment stages
//!
//! `ApprovalState` is the Pending / Approved / Suspended machine. It owns the
//! assigned approvers and the completed approval records and enforces the
//! record invariants itself: at most one record per user, records only for
//! assigned users, and `Approved` exactly when every approver has a record.
//! Ordering between approvers is not its concern, see [`crate::hierarchy`].
use super::error::{ApprovalError, ValidationError};
use super::role::Role;
use super::timestamp::TimeStamp;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self(super::utils::new_uuid_to_bech32("user_")?))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for UserId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for UserId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Self(d.str()?.to_string()))
    }
}

/// A user assigned to approve, not necessarily done yet.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Approver {
    #[n(0)]
    pub user_id: UserId,
    #[n(1)]
    pub username: String, // snapshot at assignment time
    #[n(2)]
    pub sub_role: String, // free text describing the approver's function here
}

impl Approver {
    pub fn new(user_id: UserId, username: impl Into<String>, sub_role: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            sub_role: sub_role.into(),
        }
    }
}

/// Evidence that an approver completed their approval.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalRecord {
    #[n(0)]
    pub user_id: UserId,
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub role: Role, // global role at approval time
    #[n(3)]
    pub approval_date: TimeStamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ApprovalStatus {
    #[n(0)]
    #[default]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalState {
    #[n(0)]
    approvers: Vec<Approver>,
    #[n(1)]
    approved_by: Vec<ApprovalRecord>,
    #[n(2)]
    status: ApprovalStatus,
    #[n(3)]
    suspend_reason: String,
}

impl ApprovalState {
    /// Fresh pending state. Needs at least one approver, each user at most once.
    pub fn new(approvers: Vec<Approver>) -> Result<Self, ValidationError> {
        if approvers.is_empty() {
            return Err(ValidationError::NoApprovers);
        }
        let mut seen = HashSet::new();
        for approver in &approvers {
            if !seen.insert(&approver.user_id) {
                return Err(ValidationError::DuplicateApprover(
                    approver.user_id.to_string(),
                ));
            }
        }

        Ok(Self {
            approvers,
            approved_by: vec![],
            status: ApprovalStatus::Pending,
            suspend_reason: String::new(),
        })
    }

    pub fn approvers(&self) -> &[Approver] {
        &self.approvers
    }
    pub fn approved_by(&self) -> &[ApprovalRecord] {
        &self.approved_by
    }
    pub fn status(&self) -> ApprovalStatus {
        self.status
    }
    pub fn suspend_reason(&self) -> &str {
        &self.suspend_reason
    }
    pub fn approved_count(&self) -> u32 {
        self.approved_by.len() as u32
    }
    pub fn total_approvers(&self) -> u32 {
        self.approvers.len() as u32
    }
    pub fn approver(&self, user_id: &UserId) -> Option<&Approver> {
        self.approvers.iter().find(|a| &a.user_id == user_id)
    }
    pub fn is_assigned(&self, user_id: &UserId) -> bool {
        self.approver(user_id).is_some()
    }
    pub fn has_approved(&self, user_id: &UserId) -> bool {
        self.approved_by.iter().any(|r| &r.user_id == user_id)
    }
    pub fn has_started(&self) -> bool {
        !self.approved_by.is_empty()
    }
    /// Some, but not all, approvers are done.
    pub fn is_partially_approved(&self) -> bool {
        let approved = self.approved_count();
        approved > 0 && approved < self.total_approvers()
    }
    pub fn pending_approvers(&self) -> Vec<&Approver> {
        self.approvers
            .iter()
            .filter(|a| !self.has_approved(&a.user_id))
            .collect()
    }
    pub fn latest_approval(&self) -> Option<TimeStamp> {
        self.approved_by.iter().map(|r| r.approval_date).max()
    }

    /// Checks everything about an approval attempt except hierarchy order.
    pub fn ensure_can_approve(&self, user_id: &UserId) -> Result<&Approver, ApprovalError> {
        let approver = self
            .approver(user_id)
            .ok_or_else(|| ApprovalError::NotAnApprover(user_id.to_string()))?;
        if self.has_approved(user_id) {
            return Err(ApprovalError::AlreadyApproved(user_id.to_string()));
        }
        if self.status != ApprovalStatus::Pending {
            return Err(ApprovalError::InvalidTransition {
                status: self.status,
                action: "approve",
            });
        }
        Ok(approver)
    }

    /// Appends the record and moves to `Approved` once everyone is done.
    /// Returns the resulting status.
    pub fn approve(&mut self, record: ApprovalRecord) -> Result<ApprovalStatus, ApprovalError> {
        self.ensure_can_approve(&record.user_id)?;
        self.approved_by.push(record);
        self.settle();
        Ok(self.status)
    }

    /// Rolls back every approval and records the reason. The cleared records
    /// are handed back to the caller.
    pub fn suspend(&mut self, reason: &str) -> Result<Vec<ApprovalRecord>, ApprovalError> {
        if self.status == ApprovalStatus::Suspended {
            return Err(ApprovalError::InvalidTransition {
                status: self.status,
                action: "suspend",
            });
        }
        let cleared = std::mem::take(&mut self.approved_by);
        self.status = ApprovalStatus::Suspended;
        self.suspend_reason = reason.to_string();
        Ok(cleared)
    }

    /// Back to `Pending` with an empty approval history.
    pub fn open(&mut self) -> Result<(), ApprovalError> {
        if self.status != ApprovalStatus::Suspended {
            return Err(ApprovalError::InvalidTransition {
                status: self.status,
                action: "open",
            });
        }
        self.status = ApprovalStatus::Pending;
        self.suspend_reason.clear();
        Ok(())
    }

    pub fn add_approver(&mut self, approver: Approver) -> Result<(), ApprovalError> {
        if self.status != ApprovalStatus::Pending {
            return Err(ApprovalError::InvalidTransition {
                status: self.status,
                action: "add an approver",
            });
        }
        if self.is_assigned(&approver.user_id) {
            return Err(ValidationError::DuplicateApprover(approver.user_id.to_string()).into());
        }
        self.approvers.push(approver);
        Ok(())
    }

    /// Removes an approver and any record they left. The last approver stays.
    pub fn remove_approver(&mut self, user_id: &UserId) -> Result<Approver, ApprovalError> {
        if self.status != ApprovalStatus::Pending {
            return Err(ApprovalError::InvalidTransition {
                status: self.status,
                action: "remove an approver",
            });
        }
        let position = self
            .approvers
            .iter()
            .position(|a| &a.user_id == user_id)
            .ok_or_else(|| ApprovalError::NotAnApprover(user_id.to_string()))?;
        if self.approvers.len() == 1 {
            return Err(ValidationError::LastStageApprover.into());
        }

        let removed = self.approvers.remove(position);
        self.approved_by.retain(|r| &r.user_id != user_id);
        self.settle();
        Ok(removed)
    }

    /// True when the stored state satisfies the record invariants.
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        let unique = self.approved_by.iter().all(|r| seen.insert(&r.user_id));
        let assigned = self.approved_by.iter().all(|r| self.is_assigned(&r.user_id));
        let complete = self.approved_by.len() == self.approvers.len();
        let status_matches = match self.status {
            ApprovalStatus::Approved => complete,
            ApprovalStatus::Pending => !complete,
            ApprovalStatus::Suspended => self.approved_by.is_empty(),
        };

        unique && assigned && status_matches
    }

    fn settle(&mut self) {
        if self.status == ApprovalStatus::Pending
            && !self.approvers.is_empty()
            && self.approvers.iter().all(|a| self.has_approved(&a.user_id))
        {
            self.status = ApprovalStatus::Approved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approver(id: &str) -> Approver {
        Approver::new(UserId::from(id), id, "review")
    }

    fn record(id: &str) -> ApprovalRecord {
        ApprovalRecord {
            user_id: UserId::from(id),
            username: id.to_string(),
            role: Role::Employee,
            approval_date: TimeStamp::now(),
        }
    }

    #[test]
    fn rejects_empty_and_duplicate_approvers() {
        assert_eq!(ApprovalState::new(vec![]), Err(ValidationError::NoApprovers));
        assert_eq!(
            ApprovalState::new(vec![approver("a"), approver("a")]),
            Err(ValidationError::DuplicateApprover("a".into()))
        );
    }

    #[test]
    fn last_record_completes_approval() {
        let mut state = ApprovalState::new(vec![approver("a"), approver("b")]).unwrap();

        assert_eq!(state.approve(record("a")).unwrap(), ApprovalStatus::Pending);
        assert!(state.is_partially_approved());
        assert_eq!(state.approve(record("b")).unwrap(), ApprovalStatus::Approved);
        assert!(state.is_consistent());
    }

    #[test]
    fn second_approval_by_same_user_is_rejected() {
        let mut state = ApprovalState::new(vec![approver("a"), approver("b")]).unwrap();
        state.approve(record("a")).unwrap();

        let err = state.approve(record("a")).unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyApproved(_)));
        assert_eq!(state.approved_count(), 1);
    }

    #[test]
    fn outsiders_cannot_approve() {
        let mut state = ApprovalState::new(vec![approver("a")]).unwrap();
        let err = state.approve(record("z")).unwrap_err();
        assert!(matches!(err, ApprovalError::NotAnApprover(_)));
    }

    #[test]
    fn suspend_clears_progress_and_open_does_not_restore_it() {
        let mut state = ApprovalState::new(vec![approver("a"), approver("b")]).unwrap();
        state.approve(record("a")).unwrap();

        let cleared = state.suspend("wrong supplier").unwrap();
        assert_eq!(cleared.len(), 1);
        assert_eq!(state.status(), ApprovalStatus::Suspended);
        assert_eq!(state.suspend_reason(), "wrong supplier");
        assert!(state.approved_by().is_empty());

        state.open().unwrap();
        assert_eq!(state.status(), ApprovalStatus::Pending);
        assert_eq!(state.suspend_reason(), "");
        assert!(state.approved_by().is_empty());
    }

    #[test]
    fn approving_a_suspended_state_fails() {
        let mut state = ApprovalState::new(vec![approver("a")]).unwrap();
        state.suspend("hold").unwrap();
        assert!(matches!(
            state.approve(record("a")),
            Err(ApprovalError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn open_on_pending_is_an_error() {
        let mut state = ApprovalState::new(vec![approver("a")]).unwrap();
        assert!(matches!(
            state.open(),
            Err(ApprovalError::InvalidTransition {
                status: ApprovalStatus::Pending,
                ..
            })
        ));
    }

    #[test]
    fn removing_the_only_pending_approver_completes_the_state() {
        let mut state = ApprovalState::new(vec![approver("a"), approver("b")]).unwrap();
        state.approve(record("a")).unwrap();
        state.remove_approver(&UserId::from("b")).unwrap();

        assert_eq!(state.status(), ApprovalStatus::Approved);
        assert!(state.is_consistent());
        assert!(matches!(
            state.remove_approver(&UserId::from("a")),
            Err(ApprovalError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn last_approver_cannot_be_removed() {
        let mut state = ApprovalState::new(vec![approver("a")]).unwrap();
        assert!(matches!(
            state.remove_approver(&UserId::from("a")),
            Err(ApprovalError::Validation(ValidationError::LastStageApprover))
        ));
    }
}
