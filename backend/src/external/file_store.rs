//! Attachment storage for receipt photos, query evidence and response files
//!
//! Files are written before any domain transaction starts; the returned
//! `StoredFile` is what gets recorded on transfers and queries. References
//! sent back by clients are checked against the store before they are
//! recorded.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use sha2::{Digest, Sha256};
use shared::{AttachmentCategory, DomainError, FieldViolation, StoredFile};
use uuid::Uuid;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{AppError, AppResult};

/// File store backed by a local directory or a remote object store
#[derive(Clone)]
pub enum FileStore {
    Local { root: PathBuf },
    Remote(RemoteFileStore),
}

/// What a backend knows about a stored path
#[derive(Debug, PartialEq, Eq)]
enum Presence {
    Missing,
    Present { size: Option<u64> },
}

/// HTTP object store accepting `PUT {endpoint}/{path}`
#[derive(Clone)]
pub struct RemoteFileStore {
    http_client: Client,
    endpoint: String,
    token: Option<String>,
}

impl FileStore {
    /// Build the configured backend
    pub fn from_config(config: &StorageConfig) -> AppResult<Self> {
        match config.backend {
            StorageBackend::Local => Ok(FileStore::Local {
                root: PathBuf::from(&config.local_root),
            }),
            StorageBackend::Remote => {
                let endpoint = config.remote_endpoint.clone().ok_or_else(|| {
                    AppError::Internal("storage.remote_endpoint is not configured".to_string())
                })?;
                let http_client = Client::builder()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()
                    .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
                Ok(FileStore::Remote(RemoteFileStore {
                    http_client,
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    token: config.remote_token.clone(),
                }))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            FileStore::Local { .. } => "local",
            FileStore::Remote(_) => "remote",
        }
    }

    /// Persist `bytes` and return its reference
    pub async fn store(
        &self,
        category: AttachmentCategory,
        original_name: &str,
        bytes: &[u8],
    ) -> AppResult<StoredFile> {
        let path = storage_path(category, original_name, bytes);

        match self {
            FileStore::Local { root } => {
                let full_path = root.join(&path);
                if let Some(parent) = full_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| AppError::StorageError(format!("create directory: {}", e)))?;
                }
                tokio::fs::write(&full_path, bytes)
                    .await
                    .map_err(|e| AppError::StorageError(format!("write file: {}", e)))?;
            }
            FileStore::Remote(remote) => remote.put(&path, bytes).await?,
        }

        tracing::info!(path = %path, size = bytes.len(), "attachment stored");

        Ok(StoredFile {
            path,
            original_name: original_name.to_string(),
            size: bytes.len() as u64,
            uploaded_at: Utc::now(),
        })
    }

    /// Check client-supplied references before they are recorded.
    ///
    /// Each file must have the path shape `store` produces, name the same
    /// file, and exist with the recorded size. Problems are reported as
    /// validation errors on `field[i]`.
    pub async fn verify(&self, field: &str, files: &[StoredFile]) -> AppResult<()> {
        let mut violations = Vec::new();

        for (idx, file) in files.iter().enumerate() {
            let field = format!("{}[{}]", field, idx);
            if let Some(problem) = reference_problem(file) {
                violations.push(FieldViolation::new(field, problem));
                continue;
            }
            match self.presence(&file.path).await? {
                Presence::Missing => violations.push(FieldViolation::new(
                    field,
                    format!("{} is not in file storage", file.path),
                )),
                Presence::Present { size: Some(size) } if size != file.size => {
                    violations.push(FieldViolation::new(
                        field,
                        "size does not match the stored file",
                    ))
                }
                Presence::Present { .. } => {}
            }
        }

        if !violations.is_empty() {
            tracing::warn!(field = %field, rejected = violations.len(), "unknown attachment references");
        }
        DomainError::check(violations)?;
        Ok(())
    }

    async fn presence(&self, path: &str) -> AppResult<Presence> {
        match self {
            FileStore::Local { root } => match tokio::fs::metadata(root.join(path)).await {
                Ok(meta) if meta.is_file() => Ok(Presence::Present {
                    size: Some(meta.len()),
                }),
                Ok(_) => Ok(Presence::Missing),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Presence::Missing),
                Err(e) => Err(AppError::StorageError(format!("stat file: {}", e))),
            },
            FileStore::Remote(remote) => remote.head(path).await,
        }
    }
}

impl RemoteFileStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> AppResult<()> {
        let url = format!("{}/{}", self.endpoint, path);
        let mut request = self.http_client.put(&url).body(bytes.to_vec());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::StorageError(format!(
                "Object store returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

impl RemoteFileStore {
    async fn head(&self, path: &str) -> AppResult<Presence> {
        let url = format!("{}/{}", self.endpoint, path);
        let mut request = self.http_client.head(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Presence::Missing);
        }
        if !response.status().is_success() {
            return Err(AppError::StorageError(format!(
                "Object store returned {} for HEAD {}",
                response.status(),
                path
            )));
        }

        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Ok(Presence::Present { size })
    }
}

/// Why `file` cannot be a reference produced by `storage_path`, if it cannot
fn reference_problem(file: &StoredFile) -> Option<&'static str> {
    let mut parts = file.path.split('/');
    let (Some(category), Some(prefix), Some(name), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Some("not a stored file reference");
    };

    if AttachmentCategory::from_str(category).is_none()
        || prefix.len() != 4
        || !prefix.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Some("not a stored file reference");
    }

    let (Some(id), Some(stored_name)) = (
        name.get(..36),
        name.get(36..).and_then(|rest| rest.strip_prefix('-')),
    ) else {
        return Some("not a stored file reference");
    };
    if Uuid::parse_str(id).is_err() {
        return Some("not a stored file reference");
    }
    if stored_name != sanitize_file_name(&file.original_name) {
        return Some("original name does not match the stored file");
    }
    None
}

/// `category/<hash prefix>/<uuid>-<name>`; the hash prefix spreads files
/// across directories
pub fn storage_path(category: AttachmentCategory, original_name: &str, bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let prefix: String = digest.iter().take(2).map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}/{}/{}-{}",
        category.as_str(),
        prefix,
        Uuid::new_v4(),
        sanitize_file_name(original_name)
    )
}

/// Keep only characters that are safe in paths and URLs
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
