//! Per-record binary attachments kept in a capacity-bounded blob store.
//!
//! All attachments of one owner live in a single blob under
//! `<key_prefix><owner>` as a JSON array. Payloads are base64 encoded and
//! carry a SHA-256 checksum that is verified on every load; a blob that fails
//! to decode is discarded and reported as [`IntakeError::CorruptData`].

use std::{path::Path, sync::Arc};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::{IntakeError, Result},
    storage::{BlobBackend, StorageUsage, ensure_fits, entry_size},
};

pub const DEFAULT_KEY_PREFIX: &str = "patient_pdfs_";
pub const PDF_MIME_TYPE: &str = "application/pdf";
const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentPolicy {
    pub accepted_types: Vec<String>,
    pub max_file_bytes: u64,
    pub max_owner_files: usize,
    /// Ceiling on one owner's serialized blob, key included.
    pub max_owner_blob_bytes: u64,
    /// Global budget shared by every blob in the store.
    pub budget_bytes: u64,
    pub key_prefix: String,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        AttachmentPolicy {
            accepted_types: vec![PDF_MIME_TYPE.to_string()],
            max_file_bytes: 5 * MIB,
            max_owner_files: 3,
            max_owner_blob_bytes: 4 * MIB,
            budget_bytes: 5 * MIB,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl AttachmentPolicy {
    pub fn accepts(&self, mime_type: &str) -> bool {
        self.accepted_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(mime_type.trim()))
    }

    pub fn storage_key(&self, owner: &str) -> String {
        format!("{}{}", self.key_prefix, owner)
    }
}

/// A file offered for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

impl NewAttachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        NewAttachment {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
            last_modified: Utc::now(),
        }
    }

    /// Reads `path`, taking the MIME type from its extension and the
    /// modification time from the file system.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            IntakeError::StorageUnavailable(format!("reading attachment {path:?}: {err}"))
        })?;
        let last_modified = tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(NewAttachment {
            mime_type: mime_type_for(path).to_string(),
            file_name,
            bytes,
            last_modified,
        })
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => PDF_MIME_TYPE,
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
            "image/jpeg"
        }
        Some(ext) if ext.eq_ignore_ascii_case("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub owner_key: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Persisted form of one attachment inside an owner's blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAttachment {
    id: String,
    file_name: String,
    mime_type: String,
    base64_payload: String,
    uploaded_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
}

impl StoredAttachment {
    fn encode(attachment: &Attachment) -> Self {
        StoredAttachment {
            id: attachment.id.clone(),
            file_name: attachment.file_name.clone(),
            mime_type: attachment.mime_type.clone(),
            base64_payload: STANDARD.encode(&attachment.bytes),
            uploaded_at: attachment.uploaded_at,
            last_modified: attachment.last_modified,
            sha256: Some(checksum(&attachment.bytes)),
        }
    }

    fn decode(self, owner: &str) -> std::result::Result<Attachment, String> {
        let bytes = STANDARD
            .decode(self.base64_payload.as_bytes())
            .map_err(|err| format!("attachment {}: invalid base64 payload: {err}", self.id))?;
        if let Some(expected) = &self.sha256 {
            let actual = checksum(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(format!("attachment {}: checksum mismatch", self.id));
            }
        }
        Ok(Attachment {
            owner_key: owner.to_string(),
            size_bytes: bytes.len() as u64,
            id: self.id,
            file_name: self.file_name,
            mime_type: self.mime_type,
            bytes,
            uploaded_at: self.uploaded_at,
            last_modified: self.last_modified,
        })
    }
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug)]
pub struct RejectedFile {
    pub file_name: String,
    pub error: IntakeError,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub accepted: Vec<Attachment>,
    pub rejected: Vec<RejectedFile>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub struct AttachmentStore<B: BlobBackend> {
    backend: Arc<B>,
    policy: AttachmentPolicy,
}

impl<B: BlobBackend> AttachmentStore<B> {
    pub fn new(backend: Arc<B>, policy: AttachmentPolicy) -> Self {
        AttachmentStore { backend, policy }
    }

    pub fn policy(&self) -> &AttachmentPolicy {
        &self.policy
    }

    /// The effective budget: the policy budget, bounded by the backend's capacity.
    pub fn budget(&self) -> u64 {
        self.policy.budget_bytes.min(self.backend.capacity())
    }

    /// Checks each file in order and writes the accepted ones in a single
    /// update of the owner's blob. Rejections do not stop the batch.
    pub async fn upload(&self, owner: &str, files: Vec<NewAttachment>) -> Result<UploadReport> {
        let owner = validate_owner(owner)?;
        let key = self.policy.storage_key(owner);
        let mut kept = self.load(owner).await?;
        let others = self.bytes_outside(&key).await?;
        let budget = self.budget();

        let mut report = UploadReport::default();
        for file in files {
            let file_name = file.file_name.clone();
            match self.check(owner, &key, &kept, others, budget, file) {
                Ok(attachment) => {
                    debug!(
                        "Accepted '{file_name}' ({} bytes) for '{owner}'",
                        attachment.size_bytes
                    );
                    kept.push(attachment.clone());
                    report.accepted.push(attachment);
                }
                Err(error) => {
                    debug!("Rejected '{file_name}' for '{owner}': {error}");
                    report.rejected.push(RejectedFile { file_name, error });
                }
            }
        }

        if !report.accepted.is_empty() {
            self.backend.set(&key, serialize(&kept)?).await?;
        }
        info!(
            "Uploaded {} attachment(s) for '{owner}', rejected {}",
            report.accepted.len(),
            report.rejected.len()
        );
        Ok(report)
    }

    fn check(
        &self,
        owner: &str,
        key: &str,
        kept: &[Attachment],
        others: u64,
        budget: u64,
        file: NewAttachment,
    ) -> Result<Attachment> {
        if !self.policy.accepts(&file.mime_type) {
            return Err(IntakeError::validation(format!(
                "'{}' has type '{}'; accepted types are {}",
                file.file_name,
                file.mime_type,
                self.policy.accepted_types.join(", ")
            )));
        }
        let size_bytes = file.size_bytes();
        if size_bytes > self.policy.max_file_bytes {
            return Err(IntakeError::validation(format!(
                "'{}' is {size_bytes} bytes; the limit is {} bytes",
                file.file_name, self.policy.max_file_bytes
            )));
        }
        if kept.len() >= self.policy.max_owner_files {
            return Err(IntakeError::validation(format!(
                "'{owner}' already has the maximum of {} attachment(s)",
                self.policy.max_owner_files
            )));
        }
        if kept
            .iter()
            .any(|a| a.file_name == file.file_name && a.size_bytes == size_bytes)
        {
            return Err(IntakeError::DuplicateAttachment {
                owner: owner.to_string(),
                file_name: file.file_name,
            });
        }

        let attachment = Attachment {
            id: Uuid::new_v4().to_string(),
            owner_key: owner.to_string(),
            file_name: file.file_name,
            mime_type: file.mime_type,
            bytes: file.bytes,
            uploaded_at: Utc::now(),
            last_modified: file.last_modified,
            size_bytes,
        };
        let mut projected = kept.to_vec();
        projected.push(attachment.clone());
        let required = entry_size(key, &serialize(&projected)?);
        ensure_fits(0, required, self.policy.max_owner_blob_bytes)?;
        ensure_fits(others, required, budget)?;
        Ok(attachment)
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<Attachment>> {
        let owner = validate_owner(owner)?;
        self.load(owner).await
    }

    pub async fn remove(&self, owner: &str, id: &str) -> Result<()> {
        let owner = validate_owner(owner)?;
        let key = self.policy.storage_key(owner);
        let mut attachments = self.load(owner).await?;
        let before = attachments.len();
        attachments.retain(|a| a.id != id);
        if attachments.len() == before {
            return Err(IntakeError::not_found("attachment", id));
        }
        if attachments.is_empty() {
            self.backend.remove(&key).await?;
        } else {
            self.backend.set(&key, serialize(&attachments)?).await?;
        }
        info!("Removed attachment {id} from '{owner}'");
        Ok(())
    }

    /// Removes every attachment of `owner`, returning how many there were.
    pub async fn clear(&self, owner: &str) -> Result<usize> {
        let owner = validate_owner(owner)?;
        let key = self.policy.storage_key(owner);
        let removed = self.load(owner).await?.len();
        self.backend.remove(&key).await?;
        info!("Cleared {removed} attachment(s) from '{owner}'");
        Ok(removed)
    }

    pub async fn usage(&self) -> Result<StorageUsage> {
        let used = self.backend.usage().await?.used;
        Ok(StorageUsage::new(used, self.budget()))
    }

    async fn bytes_outside(&self, key: &str) -> Result<u64> {
        Ok(self
            .backend
            .entry_sizes()
            .await?
            .iter()
            .filter(|(existing, _)| existing != key)
            .map(|(_, size)| size)
            .sum())
    }

    async fn load(&self, owner: &str) -> Result<Vec<Attachment>> {
        let key = self.policy.storage_key(owner);
        let Some(raw) = self.backend.get(&key).await? else {
            return Ok(Vec::new());
        };
        match decode_all(&raw, owner) {
            Ok(attachments) => Ok(attachments),
            Err(reason) => {
                warn!("Discarding corrupt attachments under '{key}': {reason}");
                self.backend.remove(&key).await?;
                Err(IntakeError::CorruptData { key, reason })
            }
        }
    }
}

fn validate_owner(owner: &str) -> Result<&str> {
    let owner = owner.trim();
    if owner.is_empty() {
        return Err(IntakeError::validation("Attachment owner must not be empty"));
    }
    Ok(owner)
}

fn decode_all(raw: &str, owner: &str) -> std::result::Result<Vec<Attachment>, String> {
    let stored: Vec<StoredAttachment> =
        serde_json::from_str(raw).map_err(|err| format!("invalid JSON: {err}"))?;
    stored.into_iter().map(|s| s.decode(owner)).collect()
}

fn serialize(attachments: &[Attachment]) -> Result<String> {
    let stored = attachments
        .iter()
        .map(StoredAttachment::encode)
        .collect::<Vec<_>>();
    serde_json::to_string(&stored)
        .map_err(|err| IntakeError::StorageUnavailable(format!("serializing attachments: {err}")))
}
