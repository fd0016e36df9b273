//! Global user roles and the per-operation allow-lists
use super::document::DocumentKind;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    SuperAdmin,
    Director,
    DeputyDirector,
    HeadOfAccounting,
    HeadOfPurchasing,
    HeadOfOperations,
    CaptainOfAccounting,
    CaptainOfPurchasing,
    CaptainOfFinance,
    CaptainOfBusiness,
    CaptainOfMechanical,
    CaptainOfTechnical,
    Accounting,
    Employee,
    // roles this build doesn't know about still round-trip through storage
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::SuperAdmin => "superAdmin",
            Role::Director => "director",
            Role::DeputyDirector => "deputyDirector",
            Role::HeadOfAccounting => "headOfAccounting",
            Role::HeadOfPurchasing => "headOfPurchasing",
            Role::HeadOfOperations => "headOfOperations",
            Role::CaptainOfAccounting => "captainOfAccounting",
            Role::CaptainOfPurchasing => "captainOfPurchasing",
            Role::CaptainOfFinance => "captainOfFinance",
            Role::CaptainOfBusiness => "captainOfBusiness",
            Role::CaptainOfMechanical => "captainOfMechanical",
            Role::CaptainOfTechnical => "captainOfTechnical",
            Role::Accounting => "accounting",
            Role::Employee => "employee",
            Role::Other(name) => name,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "superAdmin" => Role::SuperAdmin,
            "director" => Role::Director,
            "deputyDirector" => Role::DeputyDirector,
            "headOfAccounting" => Role::HeadOfAccounting,
            "headOfPurchasing" => Role::HeadOfPurchasing,
            "headOfOperations" => Role::HeadOfOperations,
            "captainOfAccounting" => Role::CaptainOfAccounting,
            "captainOfPurchasing" => Role::CaptainOfPurchasing,
            "captainOfFinance" => Role::CaptainOfFinance,
            "captainOfBusiness" => Role::CaptainOfBusiness,
            "captainOfMechanical" => Role::CaptainOfMechanical,
            "captainOfTechnical" => Role::CaptainOfTechnical,
            "accounting" => Role::Accounting,
            "employee" => Role::Employee,
            other => Role::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<C> minicbor::Encode<C> for Role {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(self.as_str())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Role {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Role::parse(d.str()?))
    }
}

/// Mutating operations that pass through the role gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Approve,
    Suspend,
    Open,
    SuspendStage,
    OpenStage,
    Declare,
    ExtendDeadline,
    UpdatePriority,
    Tag,
    EditStages,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Approve => "approve",
            Operation::Suspend => "suspend",
            Operation::Open => "open",
            Operation::SuspendStage => "suspend a stage of",
            Operation::OpenStage => "open a stage of",
            Operation::Declare => "declare",
            Operation::ExtendDeadline => "extend the deadline of",
            Operation::UpdatePriority => "change the priority of",
            Operation::Tag => "tag",
            Operation::EditStages => "edit the stages of",
        }
    }
}

/// Whether `role` passes the gate for `operation` on a document of `kind`.
pub fn permits(kind: DocumentKind, operation: Operation, role: &Role) -> bool {
    use Role::*;

    let executive = matches!(role, SuperAdmin | Director | DeputyDirector);
    match operation {
        Operation::Approve => true,
        Operation::Suspend | Operation::Open => {
            executive
                || match kind {
                    DocumentKind::Payment
                    | DocumentKind::AdvancePayment
                    | DocumentKind::AdvancePaymentReclaim => *role == HeadOfAccounting,
                    _ => *role == HeadOfPurchasing,
                }
        }
        Operation::SuspendStage | Operation::OpenStage => {
            executive || matches!(role, HeadOfAccounting | HeadOfPurchasing)
        }
        Operation::Declare | Operation::ExtendDeadline | Operation::UpdatePriority => {
            executive || matches!(role, HeadOfAccounting | CaptainOfAccounting)
        }
        Operation::Tag | Operation::EditStages => {
            executive || matches!(role, HeadOfAccounting | HeadOfPurchasing | CaptainOfAccounting)
        }
    }
}
