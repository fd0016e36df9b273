//! Blob storage for document attachments
//!
//! The workflow only needs two things from storage: put a local file under a
//! folder and get back a permanent link, and delete by path. `LocalFileStore`
//! keeps blobs in a directory and builds links from a public base url.
use super::error::FileStoreError;
use super::timestamp::TimeStamp;
use super::utils;
use std::fs;
use std::path::{Path, PathBuf};

/// Descriptor of an attached file as stored on a document.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct FileMetadata {
    #[n(0)]
    pub drive_file_id: Option<String>,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub link: String,
    #[n(3)]
    pub path: String,
    #[n(4)]
    pub size: Option<u64>,
    #[n(5)]
    pub mime_type: Option<String>,
    #[n(6)]
    pub uploaded_at: Option<TimeStamp>,
}

impl FileMetadata {
    pub fn from_stored(name: &str, stored: StoredFile) -> Self {
        Self {
            drive_file_id: None,
            name: name.to_string(),
            link: stored.download_url,
            path: stored.path,
            size: Some(stored.size),
            mime_type: Some(stored.mime_type),
            uploaded_at: Some(TimeStamp::now()),
        }
    }

    /// Only the identifying fields: id, name, link and path.
    pub fn reduced(&self) -> Self {
        Self {
            drive_file_id: self.drive_file_id.clone(),
            name: self.name.clone(),
            link: self.link.clone(),
            path: self.path.clone(),
            size: None,
            mime_type: None,
            uploaded_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: String,
    pub download_url: String,
    pub size: u64,
    pub mime_type: String,
}

pub trait FileStore: Send + Sync {
    /// Stores the file and always returns some usable download url.
    fn upload(
        &self,
        local_path: &Path,
        target_folder: &str,
        desired_name: &str,
    ) -> Result<StoredFile, FileStoreError>;

    fn delete(&self, path: &str) -> Result<(), FileStoreError>;
}

pub struct LocalFileStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileStore for LocalFileStore {
    fn upload(
        &self,
        local_path: &Path,
        target_folder: &str,
        desired_name: &str,
    ) -> Result<StoredFile, FileStoreError> {
        let upload_err = |source| FileStoreError::Upload {
            name: desired_name.to_string(),
            source,
        };

        // keep names unique inside a folder without losing the original name
        let stored_name = format!("{}-{}", utils::unique_suffix(), sanitize(desired_name));
        let path = format!("{}/{}", target_folder.trim_matches('/'), stored_name);
        let destination = self.resolve(&path);

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(upload_err)?;
        }
        let size = fs::copy(local_path, &destination).map_err(upload_err)?;

        Ok(StoredFile {
            download_url: format!("{}/{}", self.public_base_url, path),
            mime_type: mime_type(desired_name),
            path,
            size,
        })
    }

    fn delete(&self, path: &str) -> Result<(), FileStoreError> {
        fs::remove_file(self.resolve(path)).map_err(|source| FileStoreError::Delete {
            path: path.to_string(),
            source,
        })
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

fn mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn upload_then_delete() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("hoa-don.pdf");
        fs::write(&source, b"%PDF").unwrap();

        let store = LocalFileStore::new(dir.path().join("blobs"), "https://files.local/");
        let stored = store.upload(&source, "/payment/", "hóa đơn.pdf").unwrap();

        assert!(stored.path.starts_with("payment/"));
        assert!(stored.path.ends_with("hóa đơn.pdf"));
        assert_eq!(stored.download_url, format!("https://files.local/{}", stored.path));
        assert_eq!(stored.size, 4);
        assert_eq!(stored.mime_type, "application/pdf");

        store.delete(&stored.path).unwrap();
        assert!(store.delete(&stored.path).is_err());
    }

    #[test]
    fn missing_source_fails_upload() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path(), "http://x");
        let err = store
            .upload(&dir.path().join("nope.pdf"), "f", "nope.pdf")
            .unwrap_err();
        assert!(matches!(err, FileStoreError::Upload { .. }));
    }

    #[test]
    fn reduced_keeps_identity_only() {
        let meta = FileMetadata::from_stored(
            "a.pdf",
            StoredFile {
                path: "p/a.pdf".into(),
                download_url: "http://x/p/a.pdf".into(),
                size: 3,
                mime_type: "application/pdf".into(),
            },
        );
        let reduced = meta.reduced();
        assert_eq!(reduced.path, "p/a.pdf");
        assert_eq!(reduced.size, None);
        assert_eq!(reduced.uploaded_at, None);
    }

    #[test]
    fn mime_type_follows_the_extension() {
        assert_eq!(mime_type("bao-cao.xls"), "application/vnd.ms-excel");
        assert_eq!(mime_type("hop-dong.doc"), "application/msword");
        assert_eq!(mime_type("bang.csv"), "text/csv");
        assert_eq!(mime_type("anh.webp"), "image/webp");
        assert_eq!(mime_type("ho-so.zip"), "application/zip");
        assert_eq!(mime_type("HOA-DON.PDF"), "application/pdf");
        assert_eq!(mime_type("khong-duoi"), "application/octet-stream");
    }
}
