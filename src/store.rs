//! Persistence of documents and users
//!
//! Documents and users live in their own sled trees, encoded as CBOR and keyed
//! by id. Every read-modify-write goes through `update`, which retries the
//! mutation on a compare-and-swap conflict instead of overwriting a concurrent
//! writer.
use super::approval::{ApprovalStatus, UserId};
use super::document::{Document, DocumentId, DocumentKind};
use super::error::ApprovalError;
use super::role::Role;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct User {
    #[n(0)]
    pub id: UserId,
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub role: Role,
}

pub trait UserRepository: Send + Sync {
    fn find_user(&self, id: &UserId) -> anyhow::Result<Option<User>>;
    fn find_one_by_role(&self, role: &Role) -> anyhow::Result<Option<User>>;
    fn save_user(&self, user: &User) -> anyhow::Result<()>;
}

/// Mutation applied inside `DocumentRepository::update`. It may run more than
/// once when a concurrent writer wins the race.
pub type DocumentMutation<'a> = dyn FnMut(&mut Document) -> Result<(), ApprovalError> + 'a;

pub trait DocumentRepository: Send + Sync {
    fn find_by_id(&self, id: &DocumentId) -> anyhow::Result<Option<Document>>;
    fn find(&self, filter: &DocumentFilter) -> anyhow::Result<Vec<Document>>;
    fn save(&self, document: &Document) -> anyhow::Result<()>;
    /// Atomically applies `mutate` to the stored document and returns the result.
    fn update(
        &self,
        id: &DocumentId,
        mutate: &mut DocumentMutation<'_>,
    ) -> anyhow::Result<Document>;
    /// Applies the patch to every matching document, returning how many changed.
    fn update_many(&self, filter: &DocumentFilter, patch: &DocumentPatch) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub kind: Option<DocumentKind>,
    pub status: Option<ApprovalStatus>,
    pub group_name: Option<String>,
    pub project_name: Option<String>,
    pub approver: Option<UserId>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn kind(mut self, kind: DocumentKind) -> Self {
        self.kind = Some(kind);
        self
    }
    pub fn status(mut self, status: ApprovalStatus) -> Self {
        self.status = Some(status);
        self
    }
    pub fn group(mut self, group_name: &str) -> Self {
        self.group_name = Some(group_name.to_string());
        self
    }
    pub fn project(mut self, project_name: &str) -> Self {
        self.project_name = Some(project_name.to_string());
        self
    }
    pub fn approver(mut self, user: &UserId) -> Self {
        self.approver = Some(user.clone());
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.kind.is_none_or(|kind| document.kind() == kind)
            && self.status.is_none_or(|status| document.status() == status)
            && self
                .group_name
                .as_ref()
                .is_none_or(|g| document.group_name.as_ref() == Some(g))
            && self
                .project_name
                .as_ref()
                .is_none_or(|p| document.project_name.as_ref() == Some(p))
            && self
                .approver
                .as_ref()
                .is_none_or(|u| document.approval.is_assigned(u))
    }
}

/// Field overwrites for `update_many`. `Some(None)` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    pub group_name: Option<Option<String>>,
    pub group_declaration_name: Option<Option<String>>,
    pub project_name: Option<Option<String>>,
}

impl DocumentPatch {
    pub fn apply(&self, document: &mut Document) {
        if let Some(group_name) = &self.group_name {
            document.group_name = group_name.clone();
        }
        if let Some(declaration_name) = &self.group_declaration_name {
            document.group_declaration_name = declaration_name.clone();
        }
        if let Some(project_name) = &self.project_name {
            document.project_name = project_name.clone();
        }
    }
}

pub struct SledStore {
    documents: sled::Tree,
    users: sled::Tree,
}

impl SledStore {
    pub fn new(db: &sled::Db) -> anyhow::Result<Self> {
        Ok(Self {
            documents: db.open_tree("documents")?,
            users: db.open_tree("users")?,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = sled::open(path)?;
        Self::new(&db)
    }

    fn documents(&self) -> impl Iterator<Item = anyhow::Result<Document>> + '_ {
        self.documents.iter().map(|entry| {
            let (_, bytes) = entry?;
            Ok(minicbor::decode::<Document>(&bytes)?)
        })
    }

    fn users(&self) -> impl Iterator<Item = anyhow::Result<User>> + '_ {
        self.users.iter().map(|entry| {
            let (_, bytes) = entry?;
            Ok(minicbor::decode::<User>(&bytes)?)
        })
    }
}

impl UserRepository for SledStore {
    fn find_user(&self, id: &UserId) -> anyhow::Result<Option<User>> {
        match self.users.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find_one_by_role(&self, role: &Role) -> anyhow::Result<Option<User>> {
        for user in self.users() {
            let user = user?;
            if &user.role == role {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    fn save_user(&self, user: &User) -> anyhow::Result<()> {
        self.users
            .insert(user.id.as_str().as_bytes(), minicbor::to_vec(user)?)?;
        Ok(())
    }
}

impl DocumentRepository for SledStore {
    fn find_by_id(&self, id: &DocumentId) -> anyhow::Result<Option<Document>> {
        match self.documents.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find(&self, filter: &DocumentFilter) -> anyhow::Result<Vec<Document>> {
        let mut found = vec![];
        for document in self.documents() {
            let document = document?;
            if filter.matches(&document) {
                found.push(document);
            }
        }
        Ok(found)
    }

    fn save(&self, document: &Document) -> anyhow::Result<()> {
        self.documents
            .insert(document.id.as_str().as_bytes(), document.to_cbor()?)?;
        Ok(())
    }

    fn update(
        &self,
        id: &DocumentId,
        mutate: &mut DocumentMutation<'_>,
    ) -> anyhow::Result<Document> {
        let key = id.as_str().as_bytes();
        loop {
            let current = self
                .documents
                .get(key)?
                .ok_or_else(|| ApprovalError::NotFound {
                    entity: "document",
                    id: id.to_string(),
                })?;
            let mut document: Document = minicbor::decode(&current)?;
            mutate(&mut document)?;

            let swapped =
                self.documents
                    .compare_and_swap(key, Some(&current), Some(document.to_cbor()?))?;
            match swapped {
                Ok(()) => return Ok(document),
                Err(_) => debug!(document = %id, "concurrent write, retrying update"),
            }
        }
    }

    fn update_many(&self, filter: &DocumentFilter, patch: &DocumentPatch) -> anyhow::Result<usize> {
        let ids: Vec<DocumentId> = self
            .find(filter)?
            .into_iter()
            .map(|document| document.id)
            .collect();

        let mut changed = 0;
        for id in &ids {
            let mut still_matches = false;
            self.update(id, &mut |document| {
                still_matches = filter.matches(document);
                if still_matches {
                    patch.apply(document);
                }
                Ok(())
            })?;
            if still_matches {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalState, Approver};
    use crate::document::DocumentBody;
    use crate::timestamp::TimeStamp;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn document(kind_body: DocumentBody, group: Option<&str>) -> Document {
        let kind = kind_body.kind();
        Document {
            id: DocumentId::new(kind).unwrap(),
            tag: "t".into(),
            title: "t".into(),
            submitted_by: UserId::from("user_s"),
            submission_date: TimeStamp::now(),
            file_metadata: vec![],
            group_name: group.map(str::to_string),
            group_declaration_name: None,
            project_name: None,
            declaration: None,
            approval: ApprovalState::new(vec![Approver::new(UserId::from("user_a"), "a", "")])
                .unwrap(),
            body: kind_body,
        }
    }

    fn generic() -> DocumentBody {
        DocumentBody::Generic { content: vec![] }
    }

    #[test]
    fn save_and_find() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = SledStore::open(dir.path().join("db"))?;

        let doc = document(generic(), Some("g1"));
        store.save(&doc)?;

        assert_eq!(store.find_by_id(&doc.id)?, Some(doc.clone()));
        assert_eq!(store.find(&DocumentFilter::new().group("g1"))?.len(), 1);
        assert!(store.find(&DocumentFilter::new().group("g2"))?.is_empty());
        assert!(
            store
                .find(&DocumentFilter::new().kind(DocumentKind::Payment))?
                .is_empty()
        );
        Ok(())
    }

    #[test]
    fn update_reports_missing_documents() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = SledStore::open(dir.path().join("db"))?;

        let err = store
            .update(&DocumentId::from("generic_1missing"), &mut |_| Ok(()))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApprovalError>(),
            Some(ApprovalError::NotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn update_many_renames_a_group() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = SledStore::open(dir.path().join("db"))?;
        for group in [Some("old"), Some("old"), Some("other"), None] {
            store.save(&document(generic(), group))?;
        }

        let patch = DocumentPatch {
            group_name: Some(Some("new".into())),
            ..DocumentPatch::default()
        };
        let changed = store.update_many(&DocumentFilter::new().group("old"), &patch)?;

        assert_eq!(changed, 2);
        assert_eq!(store.find(&DocumentFilter::new().group("new"))?.len(), 2);
        assert!(store.find(&DocumentFilter::new().group("old"))?.is_empty());
        Ok(())
    }

    #[test]
    fn concurrent_updates_are_not_lost() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(SledStore::open(dir.path().join("db"))?);
        let doc = document(generic(), None);
        store.save(&doc)?;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = doc.id.clone();
                std::thread::spawn(move || {
                    store.update(&id, &mut |document| {
                        document.file_metadata.push(crate::file_store::FileMetadata {
                            drive_file_id: None,
                            name: format!("f{i}"),
                            link: String::new(),
                            path: format!("p{i}"),
                            size: None,
                            mime_type: None,
                            uploaded_at: None,
                        });
                        Ok(())
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked")?;
        }

        let stored = store.find_by_id(&doc.id)?.expect("document exists");
        assert_eq!(stored.file_metadata.len(), 8);
        Ok(())
    }

    #[test]
    fn users_by_role() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = SledStore::open(dir.path().join("db"))?;
        let deputy = User {
            id: UserId::new()?,
            username: "phó".into(),
            role: Role::DeputyDirector,
        };
        store.save_user(&deputy)?;

        assert_eq!(store.find_user(&deputy.id)?, Some(deputy.clone()));
        assert_eq!(
            store.find_one_by_role(&Role::DeputyDirector)?,
            Some(deputy)
        );
        assert_eq!(store.find_one_by_role(&Role::Director)?, None);
        Ok(())
    }
}
