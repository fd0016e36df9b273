//! Side effects fired when a document becomes fully approved
//!
//! Cascades only build the dependent documents; the service persists them and
//! treats any failure as non-fatal for the approval that triggered it.
use super::approval::{ApprovalState, Approver};
use super::document::{Document, DocumentBody, DocumentId, DocumentKind};
use super::error::ApprovalError;
use super::role::Role;
use super::store::UserRepository;
use super::timestamp::{DayStamp, TimeStamp};

pub const RECLAIM_TAG_PREFIX: &str = "Hoàn ứng_";

pub struct CascadeContext<'a> {
    pub users: &'a dyn UserRepository,
    pub today: DayStamp,
    pub reclaim_period_days: u64,
}

pub trait ApprovalCascade: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, kind: DocumentKind) -> bool;

    /// Builds the dependent document, or `None` when there is nothing to do.
    fn on_approved(
        &self,
        source: &Document,
        ctx: &CascadeContext<'_>,
    ) -> Result<Option<Document>, ApprovalError>;
}

pub struct CascadeRegistry {
    cascades: Vec<Box<dyn ApprovalCascade>>,
}

impl CascadeRegistry {
    pub fn empty() -> Self {
        Self { cascades: vec![] }
    }

    pub fn register(mut self, cascade: impl ApprovalCascade + 'static) -> Self {
        self.cascades.push(Box::new(cascade));
        self
    }

    pub fn for_kind(&self, kind: DocumentKind) -> impl Iterator<Item = &dyn ApprovalCascade> {
        self.cascades
            .iter()
            .map(|cascade| -> &dyn ApprovalCascade { cascade.as_ref() })
            .filter(move |cascade| cascade.applies_to(kind))
    }
}

impl Default for CascadeRegistry {
    fn default() -> Self {
        Self::empty().register(ReclaimFromAdvancePayment)
    }
}

/// An approved advance payment opens a reclaim document for the same amount,
/// assigned to the deputy director and due after the reclaim period.
pub struct ReclaimFromAdvancePayment;

impl ApprovalCascade for ReclaimFromAdvancePayment {
    fn name(&self) -> &'static str {
        "reclaim-from-advance-payment"
    }

    fn applies_to(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::AdvancePayment
    }

    fn on_approved(
        &self,
        source: &Document,
        ctx: &CascadeContext<'_>,
    ) -> Result<Option<Document>, ApprovalError> {
        let DocumentBody::AdvancePayment {
            payment_method,
            advance_payment,
            appended_purchasing,
            ..
        } = &source.body
        else {
            return Ok(None);
        };

        let deputy = ctx
            .users
            .find_one_by_role(&Role::DeputyDirector)
            .map_err(|e| ApprovalError::Cascade(e.to_string()))?;
        let Some(deputy) = deputy else {
            tracing::warn!(source = %source.id, "no deputy director registered, skipping reclaim");
            return Ok(None);
        };

        let approval = ApprovalState::new(vec![Approver::new(
            deputy.id.clone(),
            deputy.username.clone(),
            "Phó giám đốc",
        )])?;
        let deadline = ctx.today.add_days(ctx.reclaim_period_days);
        let id = DocumentId::new(DocumentKind::AdvancePaymentReclaim)
            .map_err(|e| ApprovalError::Cascade(e.to_string()))?;

        Ok(Some(Document {
            id,
            tag: format!("{RECLAIM_TAG_PREFIX}{}", source.tag),
            title: format!("{RECLAIM_TAG_PREFIX}{}", source.title),
            submitted_by: source.submitted_by.clone(),
            submission_date: TimeStamp::now(),
            file_metadata: source.file_metadata.iter().map(|f| f.reduced()).collect(),
            group_name: source.group_name.clone(),
            group_declaration_name: None,
            project_name: source.project_name.clone(),
            declaration: None,
            approval,
            body: DocumentBody::AdvancePaymentReclaim {
                payment_method: payment_method.clone(),
                advance_payment_reclaim: *advance_payment,
                payment_deadline: deadline,
                extended_payment_deadline: deadline,
                stages: vec![],
                appended_purchasing: appended_purchasing.clone(),
            },
        }))
    }
}
