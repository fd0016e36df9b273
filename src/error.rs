//! Error types shared by the approval workflow
use super::approval::ApprovalStatus;

/// Failures of the approval workflow. The service layer wraps these in
/// `anyhow::Error`; callers classify them with `downcast_ref`.
#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("role `{role}` may not {operation} a {kind} document")]
    Unauthorized {
        role: String,
        operation: String,
        kind: String,
    },
    #[error("user {0} is not an assigned approver")]
    NotAnApprover(String),
    #[error("user {0} has already approved")]
    AlreadyApproved(String),
    #[error("approval must wait for: {}", .waiting_for.join(", "))]
    HierarchyBlocked { waiting_for: Vec<String> },
    #[error("every payment stage must be approved first, pending: {}", .pending.join(", "))]
    StagesPending { pending: Vec<String> },
    #[error("cannot {action} while {status:?}")]
    InvalidTransition {
        status: ApprovalStatus,
        action: &'static str,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cascade failed: {0}")]
    Cascade(String),
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("repository failure: {0}")]
    Repository(String),
    #[error("codec failure: {0}")]
    Codec(String),
}

impl From<minicbor::decode::Error> for ApprovalError {
    fn from(value: minicbor::decode::Error) -> Self {
        ApprovalError::Codec(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for ApprovalError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        ApprovalError::Codec(value.to_string())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("at least one approver is required")]
    NoApprovers,
    #[error("approver {0} is listed more than once")]
    DuplicateApprover(String),
    #[error("stage `{0}` must have an amount greater than zero")]
    StageAmount(String),
    #[error("stage `{0}` has no approvers")]
    EmptyStageApprovers(String),
    #[error("the last approver of a stage cannot be removed")]
    LastStageApprover,
    #[error("stage index {0} is out of range")]
    StageIndex(u32),
    #[error("`{0}` is not a valid date")]
    InvalidDate(String),
    #[error("`{0}` is not a valid priority")]
    InvalidPriority(String),
    #[error("priority can only change while partially approved ({approved}/{total})")]
    PriorityWindow { approved: u32, total: u32 },
    #[error("document already has approvals and can no longer be edited")]
    ApprovalStarted,
    #[error("{operation} does not apply to a {kind} document")]
    WrongKind {
        operation: &'static str,
        kind: String,
    },
    #[error("source document {0} must be approved before it can be appended")]
    SourceNotApproved(String),
    #[error("file `{0}` is not attached to this document")]
    UnknownFile(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(thiserror::Error, Debug)]
pub enum FileStoreError {
    #[error("upload of {name} failed: {source}")]
    Upload {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("delete of {path} failed: {source}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
