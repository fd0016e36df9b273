//! Payment stages: independently approved milestones of a payment
use super::approval::{ApprovalRecord, ApprovalState, ApprovalStatus, Approver};
use super::document::DocumentKind;
use super::error::{ApprovalError, ValidationError};
use super::file_store::FileMetadata;
use super::hierarchy::HierarchyScope;
use super::timestamp::DayStamp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Priority {
    #[n(0)]
    High,
    #[n(1)]
    #[default]
    Medium,
    #[n(2)]
    Low,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "Cao",
            Priority::Medium => "Trung bình",
            Priority::Low => "Thấp",
        }
    }
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim() {
            "Cao" => Ok(Priority::High),
            "Trung bình" => Ok(Priority::Medium),
            "Thấp" => Ok(Priority::Low),
            other => Err(ValidationError::InvalidPriority(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Stage {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub amount: u64,
    #[n(2)]
    pub deadline: DayStamp,
    #[n(3)]
    pub priority: Priority,
    #[n(4)]
    pub payment_method: String,
    #[n(5)]
    pub notes: String,
    #[n(6)]
    pub file_metadata: Option<FileMetadata>,
    #[n(7)]
    pub approval: ApprovalState,
}

impl Stage {
    pub fn status(&self) -> ApprovalStatus {
        self.approval.status()
    }

    pub fn is_approved(&self) -> bool {
        self.status() == ApprovalStatus::Approved
    }

    /// Stages of payments are ordered by the stage amount, not the document total.
    pub fn scope(&self, kind: DocumentKind) -> HierarchyScope {
        HierarchyScope {
            kind,
            amount: self.amount,
        }
    }

    pub fn approve(&mut self, record: ApprovalRecord) -> Result<ApprovalStatus, ApprovalError> {
        self.approval.approve(record)
    }

    /// An approved stage stays approved, unlike a whole document.
    pub fn suspend(&mut self, reason: &str) -> Result<Vec<ApprovalRecord>, ApprovalError> {
        if self.is_approved() {
            return Err(ApprovalError::InvalidTransition {
                status: ApprovalStatus::Approved,
                action: "suspend an approved stage",
            });
        }
        self.approval.suspend(reason)
    }

    pub fn open(&mut self) -> Result<(), ApprovalError> {
        self.approval.open()
    }
}

/// Unvalidated stage input as it arrives from a caller.
#[derive(Debug, Clone, Default)]
pub struct StageDraft {
    pub name: String,
    pub amount: u64,
    pub deadline: String,
    pub priority: Option<String>,
    pub payment_method: String,
    pub notes: String,
    pub file_metadata: Option<FileMetadata>,
    pub approvers: Vec<Approver>,
}

impl StageDraft {
    pub fn new(name: impl Into<String>, amount: u64, deadline: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount,
            deadline: deadline.into(),
            ..Self::default()
        }
    }
    pub fn set_priority(mut self, priority: &str) -> Self {
        self.priority = Some(priority.to_string());
        self
    }
    pub fn set_payment_method(mut self, method: &str) -> Self {
        self.payment_method = method.to_string();
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }
    pub fn add_approver(mut self, approver: Approver) -> Self {
        self.approvers.push(approver);
        self
    }

    pub fn validate(self) -> Result<Stage, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("stage name"));
        }
        if self.amount == 0 {
            return Err(ValidationError::StageAmount(self.name));
        }
        if self.deadline.trim().is_empty() {
            return Err(ValidationError::MissingField("stage deadline"));
        }
        let deadline = DayStamp::parse(&self.deadline)?;
        let priority = match self.priority.as_deref() {
            Some(label) => Priority::parse(label)?,
            None => Priority::default(),
        };
        if self.approvers.is_empty() {
            return Err(ValidationError::EmptyStageApprovers(self.name));
        }
        let approval = ApprovalState::new(self.approvers)?;

        Ok(Stage {
            name: self.name,
            amount: self.amount,
            deadline,
            priority,
            payment_method: self.payment_method,
            notes: self.notes,
            file_metadata: self.file_metadata,
            approval,
        })
    }
}

/// Validates every draft before any of them is used.
pub fn validate_stages(drafts: Vec<StageDraft>) -> Result<Vec<Stage>, ValidationError> {
    drafts.into_iter().map(StageDraft::validate).collect()
}
