//! Document kinds and their domain fields
use super::approval::{ApprovalState, ApprovalStatus, UserId};
use super::file_store::FileMetadata;
use super::hierarchy::HierarchyScope;
use super::stage::{Priority, Stage};
use super::timestamp::{DayStamp, TimeStamp};
use super::utils;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum DocumentKind {
    #[n(0)]
    Generic,
    #[n(1)]
    Proposal,
    #[n(2)]
    Purchasing,
    #[n(3)]
    Delivery,
    #[n(4)]
    Receipt,
    #[n(5)]
    Payment,
    #[n(6)]
    AdvancePayment,
    #[n(7)]
    AdvancePaymentReclaim,
    #[n(8)]
    ProjectProposal,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 9] = [
        DocumentKind::Generic,
        DocumentKind::Proposal,
        DocumentKind::Purchasing,
        DocumentKind::Delivery,
        DocumentKind::Receipt,
        DocumentKind::Payment,
        DocumentKind::AdvancePayment,
        DocumentKind::AdvancePaymentReclaim,
        DocumentKind::ProjectProposal,
    ];

    /// bech32 prefix of ids for this kind
    pub fn hrp(&self) -> &'static str {
        match self {
            DocumentKind::Generic => "generic_",
            DocumentKind::Proposal => "proposal_",
            DocumentKind::Purchasing => "purchasing_",
            DocumentKind::Delivery => "delivery_",
            DocumentKind::Receipt => "receipt_",
            DocumentKind::Payment => "payment_",
            DocumentKind::AdvancePayment => "advance_",
            DocumentKind::AdvancePaymentReclaim => "reclaim_",
            DocumentKind::ProjectProposal => "project_",
        }
    }

    /// Folder attachments of this kind are uploaded to.
    pub fn folder(&self) -> &'static str {
        self.hrp().trim_end_matches('_')
    }

    pub fn has_stages(&self) -> bool {
        matches!(
            self,
            DocumentKind::Payment | DocumentKind::AdvancePaymentReclaim
        )
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(kind: DocumentKind) -> anyhow::Result<Self> {
        Ok(Self(utils::new_uuid_to_bech32(kind.hrp())?))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    /// The kind encoded in the id prefix, if it carries one.
    pub fn kind(&self) -> Option<DocumentKind> {
        DocumentKind::ALL
            .into_iter()
            .find(|kind| self.0.starts_with(&format!("{}1", kind.hrp())))
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for DocumentId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for DocumentId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Self(d.str()?.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ContentField {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Product {
    #[n(0)]
    pub product_name: String,
    #[n(1)]
    pub cost_per_unit: u64,
    #[n(2)]
    pub amount: u64,
    #[n(3)]
    pub vat_percent: u8,
    #[n(4)]
    pub cost_center: String,
    #[n(5)]
    pub note: String,
}

impl Product {
    pub fn total_cost(&self) -> u64 {
        self.cost_per_unit.saturating_mul(self.amount)
    }
    pub fn total_cost_after_vat(&self) -> u64 {
        let total = self.total_cost();
        total.saturating_add(total.saturating_mul(u64::from(self.vat_percent)) / 100)
    }
}

pub fn grand_total(products: &[Product]) -> u64 {
    products
        .iter()
        .map(Product::total_cost_after_vat)
        .fold(0, u64::saturating_add)
}

/// A by-value copy of another document taken when it was appended.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Snapshot {
    #[n(0)]
    pub fingerprint: String, // sha256 of the source encoding at append time
    #[n(1)]
    pub document: Document,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum DocumentBody {
    #[n(0)]
    Generic {
        #[n(0)]
        content: Vec<ContentField>,
    },
    #[n(1)]
    Proposal {
        #[n(0)]
        task: String,
        #[n(1)]
        cost_center: String,
        #[n(2)]
        date_of_error: String,
        #[n(3)]
        detail_description: String,
        #[n(4)]
        direction: String,
    },
    #[n(2)]
    Purchasing {
        #[n(0)]
        products: Vec<Product>,
        #[n(1)]
        grand_total_cost: u64,
        #[n(2)]
        appended_proposals: Vec<Snapshot>,
    },
    #[n(3)]
    Delivery {
        #[n(0)]
        products: Vec<Product>,
        #[n(1)]
        grand_total_cost: u64,
        #[n(2)]
        appended_proposals: Vec<Snapshot>,
    },
    #[n(4)]
    Receipt {
        #[n(0)]
        products: Vec<Product>,
        #[n(1)]
        grand_total_cost: u64,
        #[n(2)]
        appended_proposals: Vec<Snapshot>,
    },
    #[n(5)]
    Payment {
        #[n(0)]
        payment_method: String,
        #[n(1)]
        amount_of_money: u64,
        #[n(2)]
        paid_amount: u64,
        #[n(3)]
        payment_deadline: Option<DayStamp>,
        #[n(4)]
        priority: Priority,
        #[n(5)]
        stages: Vec<Stage>,
        #[n(6)]
        appended_purchasing: Vec<Snapshot>,
    },
    #[n(6)]
    AdvancePayment {
        #[n(0)]
        payment_method: String,
        #[n(1)]
        advance_payment: u64,
        #[n(2)]
        payment_deadline: Option<DayStamp>,
        #[n(3)]
        appended_purchasing: Vec<Snapshot>,
    },
    #[n(7)]
    AdvancePaymentReclaim {
        #[n(0)]
        payment_method: String,
        #[n(1)]
        advance_payment_reclaim: u64,
        #[n(2)]
        payment_deadline: DayStamp,
        #[n(3)]
        extended_payment_deadline: DayStamp,
        #[n(4)]
        stages: Vec<Stage>,
        #[n(5)]
        appended_purchasing: Vec<Snapshot>,
    },
    #[n(8)]
    ProjectProposal {
        #[n(0)]
        content: Vec<ContentField>,
        #[n(1)]
        appended_proposals: Vec<Snapshot>,
    },
}

impl DocumentBody {
    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentBody::Generic { .. } => DocumentKind::Generic,
            DocumentBody::Proposal { .. } => DocumentKind::Proposal,
            DocumentBody::Purchasing { .. } => DocumentKind::Purchasing,
            DocumentBody::Delivery { .. } => DocumentKind::Delivery,
            DocumentBody::Receipt { .. } => DocumentKind::Receipt,
            DocumentBody::Payment { .. } => DocumentKind::Payment,
            DocumentBody::AdvancePayment { .. } => DocumentKind::AdvancePayment,
            DocumentBody::AdvancePaymentReclaim { .. } => DocumentKind::AdvancePaymentReclaim,
            DocumentBody::ProjectProposal { .. } => DocumentKind::ProjectProposal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Document {
    #[n(0)]
    pub id: DocumentId,
    #[n(1)]
    pub tag: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub submitted_by: UserId,
    #[n(4)]
    pub submission_date: TimeStamp,
    #[n(5)]
    pub file_metadata: Vec<FileMetadata>,
    #[n(6)]
    pub group_name: Option<String>,
    #[n(7)]
    pub group_declaration_name: Option<String>,
    #[n(8)]
    pub project_name: Option<String>,
    #[n(9)]
    pub declaration: Option<String>,
    #[n(10)]
    pub approval: ApprovalState,
    #[n(11)]
    pub body: DocumentBody,
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        self.body.kind()
    }

    pub fn status(&self) -> ApprovalStatus {
        self.approval.status()
    }

    /// The amount the approval hierarchy is evaluated against.
    pub fn approval_amount(&self) -> u64 {
        match &self.body {
            DocumentBody::Payment {
                amount_of_money, ..
            } => *amount_of_money,
            DocumentBody::AdvancePayment {
                advance_payment, ..
            } => *advance_payment,
            DocumentBody::AdvancePaymentReclaim {
                advance_payment_reclaim,
                ..
            } => *advance_payment_reclaim,
            DocumentBody::Purchasing {
                grand_total_cost, ..
            }
            | DocumentBody::Delivery {
                grand_total_cost, ..
            }
            | DocumentBody::Receipt {
                grand_total_cost, ..
            } => *grand_total_cost,
            _ => 0,
        }
    }

    pub fn scope(&self) -> HierarchyScope {
        HierarchyScope {
            kind: self.kind(),
            amount: self.approval_amount(),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        match &self.body {
            DocumentBody::Payment { stages, .. }
            | DocumentBody::AdvancePaymentReclaim { stages, .. } => stages,
            _ => &[],
        }
    }

    pub fn stages_mut(&mut self) -> Option<&mut Vec<Stage>> {
        match &mut self.body {
            DocumentBody::Payment { stages, .. }
            | DocumentBody::AdvancePaymentReclaim { stages, .. } => Some(stages),
            _ => None,
        }
    }

    /// Names of stages that still block document level approval.
    pub fn pending_stages(&self) -> Vec<String> {
        self.stages()
            .iter()
            .filter(|stage| !stage.is_approved())
            .map(|stage| stage.name.clone())
            .collect()
    }

    pub fn appended_proposals_mut(&mut self) -> Option<&mut Vec<Snapshot>> {
        match &mut self.body {
            DocumentBody::Purchasing {
                appended_proposals, ..
            }
            | DocumentBody::Delivery {
                appended_proposals, ..
            }
            | DocumentBody::Receipt {
                appended_proposals, ..
            }
            | DocumentBody::ProjectProposal {
                appended_proposals, ..
            } => Some(appended_proposals),
            _ => None,
        }
    }

    pub fn appended_purchasing(&self) -> &[Snapshot] {
        match &self.body {
            DocumentBody::Payment {
                appended_purchasing,
                ..
            }
            | DocumentBody::AdvancePayment {
                appended_purchasing,
                ..
            }
            | DocumentBody::AdvancePaymentReclaim {
                appended_purchasing,
                ..
            } => appended_purchasing,
            _ => &[],
        }
    }

    pub fn appended_purchasing_mut(&mut self) -> Option<&mut Vec<Snapshot>> {
        match &mut self.body {
            DocumentBody::Payment {
                appended_purchasing,
                ..
            }
            | DocumentBody::AdvancePayment {
                appended_purchasing,
                ..
            }
            | DocumentBody::AdvancePaymentReclaim {
                appended_purchasing,
                ..
            } => Some(appended_purchasing),
            _ => None,
        }
    }

    pub fn to_cbor(&self) -> anyhow::Result<Vec<u8>> {
        Ok(minicbor::to_vec(self)?)
    }

    /// sha256 over the document's encoding.
    pub fn fingerprint(&self) -> anyhow::Result<String> {
        Ok(utils::fingerprint(&self.to_cbor()?))
    }

    pub fn snapshot(&self) -> anyhow::Result<Snapshot> {
        Ok(Snapshot {
            fingerprint: self.fingerprint()?,
            document: self.clone(),
        })
    }
}
