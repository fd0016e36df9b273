//! Draft construction and validation of submitted documents
use super::approval::{ApprovalState, Approver, UserId};
use super::document::{Document, DocumentBody, DocumentId, DocumentKind, grand_total};
use super::error::{ApprovalError, ValidationError};
use super::file_store::FileMetadata;
use super::stage::{StageDraft, validate_stages};
use super::timestamp::TimeStamp;
use super::utils;

// used for constructing drafts before submission
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    kind: DocumentKind,
    title: Option<String>,
    submitted_by: Option<UserId>,
    approvers: Vec<Approver>,
    file_metadata: Vec<FileMetadata>,
    group_name: Option<String>,
    group_declaration_name: Option<String>,
    project_name: Option<String>,
    body: Option<DocumentBody>,
    stages: Vec<StageDraft>,
}

impl DocumentDraft {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            title: None,
            submitted_by: None,
            approvers: vec![],
            file_metadata: vec![],
            group_name: None,
            group_declaration_name: None,
            project_name: None,
            body: None,
            stages: vec![],
        }
    }
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_submitted_by(mut self, user: UserId) -> Self {
        self.submitted_by = Some(user);
        self
    }
    pub fn add_approver(mut self, approver: Approver) -> Self {
        self.approvers.push(approver);
        self
    }
    pub fn add_file(mut self, file: FileMetadata) -> Self {
        self.file_metadata.push(file);
        self
    }
    pub fn set_group(mut self, group_name: &str, declaration_name: Option<&str>) -> Self {
        self.group_name = Some(group_name.to_string());
        self.group_declaration_name = declaration_name.map(str::to_string);
        self
    }
    pub fn set_project(mut self, project_name: &str) -> Self {
        self.project_name = Some(project_name.to_string());
        self
    }
    pub fn set_body(mut self, body: DocumentBody) -> Self {
        self.body = Some(body);
        self
    }
    pub fn add_stage(mut self, stage: StageDraft) -> Self {
        self.stages.push(stage);
        self
    }

    /// Checks every field and builds the pending document. Nothing is
    /// produced unless all approvers, stages and amounts validate.
    ///
    /// Field problems surface as `ApprovalError::Validation`.
    pub fn validate_and_finalise(self) -> anyhow::Result<Document> {
        let id = DocumentId::new(self.kind)?;
        Ok(self.finalise(id)?)
    }

    fn finalise(self, id: DocumentId) -> Result<Document, ApprovalError> {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or(ValidationError::MissingField("title"))?;
        let submitted_by = self
            .submitted_by
            .ok_or(ValidationError::MissingField("submitted by"))?;
        let mut body = self.body.ok_or(ValidationError::MissingField("body"))?;
        if body.kind() != self.kind {
            return Err(ValidationError::WrongKind {
                operation: "submission",
                kind: body.kind().to_string(),
            }
            .into());
        }
        if !self.stages.is_empty() && !self.kind.has_stages() {
            return Err(ValidationError::WrongKind {
                operation: "stages",
                kind: self.kind.to_string(),
            }
            .into());
        }

        let approval = ApprovalState::new(self.approvers)?;
        let mut stages = validate_stages(self.stages)?;

        match &mut body {
            DocumentBody::Purchasing {
                products,
                grand_total_cost,
                ..
            }
            | DocumentBody::Delivery {
                products,
                grand_total_cost,
                ..
            }
            | DocumentBody::Receipt {
                products,
                grand_total_cost,
                ..
            } => {
                if products.is_empty() {
                    return Err(ValidationError::MissingField("products").into());
                }
                *grand_total_cost = grand_total(products);
            }
            DocumentBody::Payment {
                amount_of_money: 0, ..
            }
            | DocumentBody::AdvancePayment {
                advance_payment: 0, ..
            }
            | DocumentBody::AdvancePaymentReclaim {
                advance_payment_reclaim: 0,
                ..
            } => return Err(ValidationError::MissingField("amount").into()),
            DocumentBody::Payment {
                stages: existing, ..
            }
            | DocumentBody::AdvancePaymentReclaim {
                stages: existing, ..
            } => existing.append(&mut stages),
            _ => {}
        }

        let submission_date = TimeStamp::now();

        Ok(Document {
            id,
            tag: utils::document_tag(&title, &submission_date),
            title,
            submitted_by,
            submission_date,
            file_metadata: self.file_metadata,
            group_name: self.group_name,
            group_declaration_name: self.group_declaration_name,
            project_name: self.project_name,
            declaration: None,
            approval,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalStatus;
    use crate::document::Product;
    use crate::stage::Priority;

    fn approver() -> Approver {
        Approver::new(UserId::from("user_a"), "an", "trưởng phòng")
    }

    fn payment_body(amount: u64) -> DocumentBody {
        DocumentBody::Payment {
            payment_method: "chuyển khoản".into(),
            amount_of_money: amount,
            paid_amount: 0,
            payment_deadline: None,
            priority: Priority::Medium,
            stages: vec![],
            appended_purchasing: vec![],
        }
    }

    #[test]
    fn payment_draft_collects_stages() {
        let doc = DocumentDraft::new(DocumentKind::Payment)
            .set_title("Thanh toán")
            .set_submitted_by(UserId::from("user_s"))
            .add_approver(approver())
            .set_body(payment_body(50_000_000))
            .add_stage(
                StageDraft::new("Đợt 1", 20_000_000, "01-01-2026").add_approver(approver()),
            )
            .validate_and_finalise()
            .unwrap();

        assert_eq!(doc.kind(), DocumentKind::Payment);
        assert_eq!(doc.status(), ApprovalStatus::Pending);
        assert_eq!(doc.stages().len(), 1);
        assert!(doc.tag.starts_with("Thanh toán-"));
        assert_eq!(doc.id.kind(), Some(DocumentKind::Payment));
    }

    #[test]
    fn purchasing_total_is_computed() {
        let doc = DocumentDraft::new(DocumentKind::Purchasing)
            .set_title("Mua hàng")
            .set_submitted_by(UserId::from("user_s"))
            .add_approver(approver())
            .set_body(DocumentBody::Purchasing {
                products: vec![Product {
                    product_name: "ốc".into(),
                    cost_per_unit: 100,
                    amount: 10,
                    vat_percent: 8,
                    cost_center: String::new(),
                    note: String::new(),
                }],
                grand_total_cost: 0,
                appended_proposals: vec![],
            })
            .validate_and_finalise()
            .unwrap();

        assert_eq!(doc.approval_amount(), 1_080);
    }

    #[test]
    fn rejects_missing_approvers_title_and_amount() {
        let base = DocumentDraft::new(DocumentKind::Payment)
            .set_title("x")
            .set_submitted_by(UserId::from("user_s"))
            .set_body(payment_body(1));
        assert!(base.clone().validate_and_finalise().is_err());

        let untitled = base.clone().set_title("  ").add_approver(approver());
        assert!(untitled.validate_and_finalise().is_err());

        let zero = base.add_approver(approver()).set_body(payment_body(0));
        let err = zero.validate_and_finalise().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApprovalError>(),
            Some(ApprovalError::Validation(ValidationError::MissingField("amount")))
        ));
        assert!(err.downcast_ref::<ValidationError>().is_none());
    }

    #[test]
    fn stages_only_on_payment_family() {
        let draft = DocumentDraft::new(DocumentKind::Proposal)
            .set_title("p")
            .set_submitted_by(UserId::from("user_s"))
            .add_approver(approver())
            .set_body(DocumentBody::Proposal {
                task: "sửa máy".into(),
                cost_center: String::new(),
                date_of_error: String::new(),
                detail_description: String::new(),
                direction: String::new(),
            })
            .add_stage(StageDraft::new("s", 1, "01-01-2026").add_approver(approver()));
        assert!(draft.validate_and_finalise().is_err());
    }
}
