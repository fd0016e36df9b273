//! Service layer API for document workflow operations
use super::approval::{ApprovalRecord, ApprovalStatus, Approver, UserId};
use super::builder::DocumentDraft;
use super::cascade::{CascadeContext, CascadeRegistry};
use super::config::ServiceConfig;
use super::document::{Document, DocumentBody, DocumentId, DocumentKind, Snapshot};
use super::error::{ApprovalError, ValidationError};
use super::file_store::{FileMetadata, FileStore, LocalFileStore};
use super::hierarchy::{ApprovalDecision, HierarchyResolver, ResolvedApprover};
use super::role::{Operation, Role, permits};
use super::stage::{Priority, Stage, StageDraft};
use super::store::{DocumentFilter, DocumentPatch, DocumentRepository, SledStore, User, UserRepository};
use super::timestamp::{DayStamp, TimeStamp};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    users: Arc<dyn UserRepository>,
    files: Arc<dyn FileStore>,
    cascades: CascadeRegistry,
    resolver: HierarchyResolver,
    reclaim_period_days: u64,
}

impl DocumentService {
    pub fn new(store: Arc<SledStore>, files: Arc<dyn FileStore>, config: &ServiceConfig) -> Self {
        Self::with_repositories(store.clone(), store, files, config)
    }

    pub fn with_repositories(
        documents: Arc<dyn DocumentRepository>,
        users: Arc<dyn UserRepository>,
        files: Arc<dyn FileStore>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            documents,
            users,
            files,
            cascades: CascadeRegistry::default(),
            resolver: HierarchyResolver::new(config.payment_threshold),
            reclaim_period_days: config.reclaim_period_days,
        }
    }

    /// Opens the sled database and local file store named by the config.
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let store = SledStore::open(&config.database_path).with_context(|| {
            format!("opening database at {}", config.database_path.display())
        })?;
        let files = LocalFileStore::new(&config.file_root, config.public_base_url.clone());
        Ok(Self::new(Arc::new(store), Arc::new(files), config))
    }

    pub fn with_cascades(mut self, cascades: CascadeRegistry) -> Self {
        self.cascades = cascades;
        self
    }

    pub fn register_user(&self, username: &str, role: Role) -> anyhow::Result<User> {
        let user = User {
            id: UserId::new()?,
            username: username.to_string(),
            role,
        };
        self.users.save_user(&user)?;
        Ok(user)
    }

    pub fn get_document(&self, id: &DocumentId) -> anyhow::Result<Document> {
        self.documents
            .find_by_id(id)?
            .ok_or_else(|| not_found("document", id.as_str()).into())
    }

    pub fn find_documents(&self, filter: &DocumentFilter) -> anyhow::Result<Vec<Document>> {
        self.documents.find(filter)
    }

    fn load_user(&self, id: &UserId) -> anyhow::Result<User> {
        self.users
            .find_user(id)?
            .ok_or_else(|| not_found("user", id.as_str()).into())
    }

    /// Pairs each approver with their current role. Users that no longer
    /// exist approve like any other non-ordered approver.
    fn resolve_approvers(&self, approvers: &[Approver]) -> Result<Vec<ResolvedApprover>, ApprovalError> {
        approvers
            .iter()
            .map(|approver| -> Result<ResolvedApprover, ApprovalError> {
                let user = self
                    .users
                    .find_user(&approver.user_id)
                    .map_err(|e| ApprovalError::Repository(e.to_string()))?;
                let role = match user {
                    Some(user) => user.role,
                    None => {
                        warn!(user = %approver.user_id, "approver has no user record");
                        Role::Other(String::new())
                    }
                };
                Ok(ResolvedApprover::new(approver, role))
            })
            .collect()
    }

    /// Submit a new document for approval
    pub fn submit_document(&self, draft: DocumentDraft) -> anyhow::Result<Document> {
        let document = draft.validate_and_finalise()?;
        self.load_user(&document.submitted_by)
            .context("submitting user")?;

        self.documents.save(&document)?;
        info!(document = %document.id, kind = %document.kind(), tag = %document.tag, "document submitted");
        Ok(document)
    }

    /// Dry run of `approve_document`: what would block the user right now.
    pub fn check_approval(&self, id: &DocumentId, user_id: &UserId) -> anyhow::Result<ApprovalDecision> {
        let user = self.load_user(user_id)?;
        let document = self.get_document(id)?;
        document.approval.ensure_can_approve(&user.id)?;

        let pending = document.pending_stages();
        if !pending.is_empty() {
            return Ok(ApprovalDecision::Blocked {
                waiting_for: pending,
            });
        }
        let approvers = self.resolve_approvers(document.approval.approvers())?;
        Ok(self.resolver.can_approve_now(
            &user.role,
            &user.id,
            &approvers,
            document.approval.approved_by(),
            document.scope(),
        ))
    }

    /// Whether every stage is approved, so document level approval may begin.
    pub fn can_approve_document(&self, id: &DocumentId) -> anyhow::Result<bool> {
        Ok(self.get_document(id)?.pending_stages().is_empty())
    }

    /// Approve a document on behalf of one of its approvers
    pub fn approve_document(&self, id: &DocumentId, user_id: &UserId) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;
        let record = approval_record(&user);
        let mut completed = false;

        let document = self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::Approve, &user)?;
            document.approval.ensure_can_approve(&user.id)?;

            let pending = document.pending_stages();
            if !pending.is_empty() {
                return Err(ApprovalError::StagesPending { pending });
            }

            let approvers = self.resolve_approvers(document.approval.approvers())?;
            self.resolver
                .can_approve_now(
                    &user.role,
                    &user.id,
                    &approvers,
                    document.approval.approved_by(),
                    document.scope(),
                )
                .into_result()?;

            completed = document.approval.approve(record.clone())? == ApprovalStatus::Approved;
            Ok(())
        })?;

        info!(
            document = %document.id,
            approver = %user.username,
            approved = document.approval.approved_count(),
            total = document.approval.total_approvers(),
            "document approval recorded"
        );
        if completed {
            info!(document = %document.id, "document fully approved");
            self.run_cascades(&document);
        }
        Ok(document)
    }

    // Cascade failures are logged and never undo the approval.
    fn run_cascades(&self, source: &Document) {
        let ctx = CascadeContext {
            users: self.users.as_ref(),
            today: DayStamp::today(),
            reclaim_period_days: self.reclaim_period_days,
        };

        for cascade in self.cascades.for_kind(source.kind()) {
            match cascade.on_approved(source, &ctx) {
                Ok(Some(dependent)) => match self.documents.save(&dependent) {
                    Ok(()) => info!(
                        cascade = cascade.name(),
                        source = %source.id,
                        created = %dependent.id,
                        "cascade created document"
                    ),
                    Err(e) => error!(cascade = cascade.name(), source = %source.id, "cascade save failed: {e:#}"),
                },
                Ok(None) => {}
                Err(e) => error!(cascade = cascade.name(), source = %source.id, "cascade failed: {e}"),
            }
        }
    }

    /// Suspend a document, discarding every approval so far
    pub fn suspend_document(
        &self,
        id: &DocumentId,
        user_id: &UserId,
        reason: &str,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;
        if reason.trim().is_empty() {
            return Err(ApprovalError::from(ValidationError::MissingField("suspend reason")).into());
        }
        let mut cleared = vec![];

        let document = self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::Suspend, &user)?;
            cleared = document.approval.suspend(reason)?;
            Ok(())
        })?;

        // the cleared records exist nowhere else once the document is saved
        for record in &cleared {
            info!(
                document = %document.id,
                approver = %record.username,
                role = %record.role,
                approval_date = %record.approval_date.format_local(),
                "approval discarded by suspension"
            );
        }
        info!(document = %document.id, by = %user.username, reason, "document suspended");
        Ok(document)
    }

    /// Reopen a suspended document. Approval starts over from nobody.
    pub fn open_document(&self, id: &DocumentId, user_id: &UserId) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;

        let document = self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::Open, &user)?;
            document.approval.open()
        })?;

        info!(document = %document.id, by = %user.username, "document reopened");
        Ok(document)
    }

    pub fn approve_stage(
        &self,
        id: &DocumentId,
        index: u32,
        user_id: &UserId,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;
        let record = approval_record(&user);

        let document = self.documents.update(id, &mut |document| {
            let kind = document.kind();
            gate(kind, Operation::Approve, &user)?;
            let stage = stage_mut(document, index)?;
            stage.approval.ensure_can_approve(&user.id)?;

            let approvers = self.resolve_approvers(stage.approval.approvers())?;
            self.resolver
                .can_approve_now(
                    &user.role,
                    &user.id,
                    &approvers,
                    stage.approval.approved_by(),
                    stage.scope(kind),
                )
                .into_result()?;

            stage.approve(record.clone())?;
            Ok(())
        })?;

        info!(document = %document.id, stage = index, approver = %user.username, "stage approval recorded");
        Ok(document)
    }

    pub fn suspend_stage(
        &self,
        id: &DocumentId,
        index: u32,
        user_id: &UserId,
        reason: &str,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;
        if reason.trim().is_empty() {
            return Err(ApprovalError::from(ValidationError::MissingField("suspend reason")).into());
        }

        let document = self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::SuspendStage, &user)?;
            stage_mut(document, index)?.suspend(reason)?;
            Ok(())
        })?;

        info!(document = %document.id, stage = index, by = %user.username, reason, "stage suspended");
        Ok(document)
    }

    pub fn open_stage(&self, id: &DocumentId, index: u32, user_id: &UserId) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;

        let document = self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::OpenStage, &user)?;
            stage_mut(document, index)?.open()
        })?;

        info!(document = %document.id, stage = index, by = %user.username, "stage reopened");
        Ok(document)
    }

    /// Adds a stage while document level approval has not started.
    pub fn add_stage(
        &self,
        id: &DocumentId,
        user_id: &UserId,
        draft: StageDraft,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;
        let stage = draft.validate().map_err(ApprovalError::from)?;

        Ok(self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::EditStages, &user)?;
            ensure_editable(document)?;
            let kind = document.kind();
            let stages = document.stages_mut().ok_or_else(|| wrong_kind("stages", kind))?;
            stages.push(stage.clone());
            Ok(())
        })?)
    }

    pub fn add_stage_approver(
        &self,
        id: &DocumentId,
        index: u32,
        user_id: &UserId,
        approver: Approver,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;

        Ok(self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::EditStages, &user)?;
            stage_mut(document, index)?.approval.add_approver(approver.clone())
        })?)
    }

    pub fn remove_stage_approver(
        &self,
        id: &DocumentId,
        index: u32,
        user_id: &UserId,
        approver_id: &UserId,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;

        Ok(self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::EditStages, &user)?;
            stage_mut(document, index)?
                .approval
                .remove_approver(approver_id)
                .map(|_| ())
        })?)
    }

    /// Pushes a reclaim's extended deadline out by another reclaim period.
    pub fn extend_reclaim_deadline(&self, id: &DocumentId, user_id: &UserId) -> anyhow::Result<DayStamp> {
        let user = self.load_user(user_id)?;
        let period = self.reclaim_period_days;
        let mut extended = None;

        let document = self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::ExtendDeadline, &user)?;
            let kind = document.kind();
            match &mut document.body {
                DocumentBody::AdvancePaymentReclaim {
                    extended_payment_deadline,
                    ..
                } => {
                    *extended_payment_deadline = extended_payment_deadline.add_days(period);
                    extended = Some(*extended_payment_deadline);
                    Ok(())
                }
                _ => Err(wrong_kind("deadline extension", kind)),
            }
        })?;

        let extended = extended.context("extended deadline was not recorded")?;
        info!(document = %document.id, deadline = %extended.format(), "reclaim deadline extended");
        Ok(extended)
    }

    pub fn update_declaration(
        &self,
        id: &DocumentId,
        user_id: &UserId,
        declaration: &str,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;

        Ok(self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::Declare, &user)?;
            document.declaration = Some(declaration.to_string());
            Ok(())
        })?)
    }

    pub fn set_group(
        &self,
        id: &DocumentId,
        user_id: &UserId,
        group_name: Option<&str>,
        group_declaration_name: Option<&str>,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;

        Ok(self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::Tag, &user)?;
            document.group_name = group_name.map(str::to_string);
            document.group_declaration_name = group_declaration_name.map(str::to_string);
            Ok(())
        })?)
    }

    pub fn set_project(
        &self,
        id: &DocumentId,
        user_id: &UserId,
        project_name: Option<&str>,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;

        Ok(self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::Tag, &user)?;
            document.project_name = project_name.map(str::to_string);
            Ok(())
        })?)
    }

    /// Renames a group on every document carrying it.
    pub fn rename_group(&self, user_id: &UserId, old: &str, new: &str) -> anyhow::Result<usize> {
        self.rename(user_id, DocumentFilter::new().group(old), DocumentPatch {
            group_name: Some(Some(new.to_string())),
            ..DocumentPatch::default()
        })
    }

    /// Renames a project on every document carrying it.
    pub fn rename_project(&self, user_id: &UserId, old: &str, new: &str) -> anyhow::Result<usize> {
        self.rename(user_id, DocumentFilter::new().project(old), DocumentPatch {
            project_name: Some(Some(new.to_string())),
            ..DocumentPatch::default()
        })
    }

    fn rename(&self, user_id: &UserId, filter: DocumentFilter, patch: DocumentPatch) -> anyhow::Result<usize> {
        let user = self.load_user(user_id)?;
        // tagging rights are the same for every kind
        gate(DocumentKind::Generic, Operation::Tag, &user)?;

        let changed = self.documents.update_many(&filter, &patch)?;
        info!(changed, by = %user.username, "documents retagged");
        Ok(changed)
    }

    /// Priority of a payment may only change while it is partially approved.
    pub fn update_payment_priority(
        &self,
        id: &DocumentId,
        user_id: &UserId,
        priority: Priority,
    ) -> anyhow::Result<Document> {
        let user = self.load_user(user_id)?;

        Ok(self.documents.update(id, &mut |document| {
            gate(document.kind(), Operation::UpdatePriority, &user)?;
            if !document.approval.is_partially_approved() {
                return Err(ValidationError::PriorityWindow {
                    approved: document.approval.approved_count(),
                    total: document.approval.total_approvers(),
                }
                .into());
            }
            let kind = document.kind();
            match &mut document.body {
                DocumentBody::Payment { priority: current, .. } => {
                    *current = priority;
                    Ok(())
                }
                _ => Err(wrong_kind("priority update", kind)),
            }
        })?)
    }

    /// Appends an approved proposal by value to a purchasing, delivery,
    /// receipt or project proposal document. Appending the same proposal
    /// again refreshes its snapshot.
    pub fn append_proposal(&self, target: &DocumentId, proposal: &DocumentId) -> anyhow::Result<Document> {
        self.append(target, proposal, DocumentKind::Proposal, Document::appended_proposals_mut)
    }

    /// Appends an approved purchasing document by value to a payment,
    /// advance payment or reclaim.
    pub fn append_purchasing(&self, target: &DocumentId, purchasing: &DocumentId) -> anyhow::Result<Document> {
        self.append(target, purchasing, DocumentKind::Purchasing, Document::appended_purchasing_mut)
    }

    fn append(
        &self,
        target: &DocumentId,
        source: &DocumentId,
        source_kind: DocumentKind,
        slot: fn(&mut Document) -> Option<&mut Vec<Snapshot>>,
    ) -> anyhow::Result<Document> {
        let source = self.get_document(source)?;
        if source.kind() != source_kind {
            return Err(wrong_kind("appending", source.kind()).into());
        }
        if source.status() != ApprovalStatus::Approved {
            return Err(ApprovalError::from(ValidationError::SourceNotApproved(source.id.to_string())).into());
        }
        let snapshot = source.snapshot()?;

        let document = self.documents.update(target, &mut |document| {
            ensure_editable(document)?;
            let kind = document.kind();
            let appended = slot(document).ok_or_else(|| wrong_kind("appending", kind))?;
            appended.retain(|s| s.document.id != snapshot.document.id);
            appended.push(snapshot.clone());
            Ok(())
        })?;

        info!(document = %document.id, appended = %source.id, "document appended");
        Ok(document)
    }

    /// Uploads a temporary local file and attaches it. The temporary file is
    /// removed whether or not the upload succeeds.
    pub fn attach_file(&self, id: &DocumentId, temp_path: &Path, name: &str) -> anyhow::Result<Document> {
        let current = self.get_document(id)?;
        ensure_editable(&current)?;

        let uploaded = self.files.upload(temp_path, current.kind().folder(), name);
        if let Err(e) = std::fs::remove_file(temp_path) {
            warn!(path = %temp_path.display(), "temp file cleanup failed: {e}");
        }
        let stored = uploaded?;
        let metadata = FileMetadata::from_stored(name, stored);

        let attached = self.documents.update(id, &mut |document| {
            ensure_editable(document)?;
            document.file_metadata.push(metadata.clone());
            Ok(())
        });
        match attached {
            Ok(document) => {
                info!(document = %document.id, path = %metadata.path, "file attached");
                Ok(document)
            }
            Err(e) => {
                if let Err(delete_err) = self.files.delete(&metadata.path) {
                    warn!(path = %metadata.path, "orphaned upload not removed: {delete_err}");
                }
                Err(e)
            }
        }
    }

    /// Detaches a file. A failed remote delete is logged and does not block.
    pub fn remove_file(&self, id: &DocumentId, path: &str) -> anyhow::Result<Document> {
        let document = self.documents.update(id, &mut |document| {
            ensure_editable(document)?;
            let before = document.file_metadata.len();
            document.file_metadata.retain(|f| f.path != path);
            if document.file_metadata.len() == before {
                return Err(ValidationError::UnknownFile(path.to_string()).into());
            }
            Ok(())
        })?;

        if let Err(e) = self.files.delete(path) {
            warn!(document = %document.id, path, "remote delete failed: {e}");
        }
        Ok(document)
    }

    /// Documents this user could approve right now.
    pub fn pending_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Document>> {
        let user = self.load_user(user_id)?;
        let candidates = self.documents.find(
            &DocumentFilter::new()
                .approver(&user.id)
                .status(ApprovalStatus::Pending),
        )?;

        let mut ready = vec![];
        for document in candidates {
            if document.approval.has_approved(&user.id) || !document.pending_stages().is_empty() {
                continue;
            }
            let approvers = self.resolve_approvers(document.approval.approvers())?;
            let decision = self.resolver.can_approve_now(
                &user.role,
                &user.id,
                &approvers,
                document.approval.approved_by(),
                document.scope(),
            );
            if decision.can_approve() {
                ready.push(document);
            }
        }
        Ok(ready)
    }

    /// Approved documents, most recently completed first.
    pub fn approved_documents(&self) -> anyhow::Result<Vec<Document>> {
        let mut approved = self
            .documents
            .find(&DocumentFilter::new().status(ApprovalStatus::Approved))?;
        approved.sort_by_key(|d| std::cmp::Reverse(d.approval.latest_approval()));
        Ok(approved)
    }
}

fn approval_record(user: &User) -> ApprovalRecord {
    ApprovalRecord {
        user_id: user.id.clone(),
        username: user.username.clone(),
        role: user.role.clone(),
        approval_date: TimeStamp::now(),
    }
}

fn gate(kind: DocumentKind, operation: Operation, user: &User) -> Result<(), ApprovalError> {
    if permits(kind, operation, &user.role) {
        return Ok(());
    }
    Err(ApprovalError::Unauthorized {
        role: user.role.to_string(),
        operation: operation.as_str().to_string(),
        kind: kind.to_string(),
    })
}

fn stage_mut(document: &mut Document, index: u32) -> Result<&mut Stage, ApprovalError> {
    let kind = document.kind();
    document
        .stages_mut()
        .ok_or_else(|| wrong_kind("stages", kind))?
        .get_mut(index as usize)
        .ok_or_else(|| ValidationError::StageIndex(index).into())
}

// edits are only allowed before anyone approved the document
fn ensure_editable(document: &Document) -> Result<(), ApprovalError> {
    if document.status() != ApprovalStatus::Pending {
        return Err(ApprovalError::InvalidTransition {
            status: document.status(),
            action: "edit",
        });
    }
    if document.approval.has_started() {
        return Err(ValidationError::ApprovalStarted.into());
    }
    Ok(())
}

fn wrong_kind(operation: &'static str, kind: DocumentKind) -> ApprovalError {
    ValidationError::WrongKind {
        operation,
        kind: kind.to_string(),
    }
    .into()
}

fn not_found(entity: &'static str, id: &str) -> ApprovalError {
    ApprovalError::NotFound {
        entity,
        id: id.to_string(),
    }
}
