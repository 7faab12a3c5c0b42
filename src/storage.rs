use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{config::UploadConfig, error::AppError};

const ALLOWED_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];
pub const URL_PREFIX: &str = "/uploads";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid file type. Only JPEG, PNG, and WebP are allowed")]
    InvalidType,
    #[error("file size too large. Maximum {}MB allowed", .0 / (1024 * 1024))]
    TooLarge(u64),
    #[error("invalid file name")]
    InvalidName,
    #[error("file not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidType | StorageError::TooLarge(_) | StorageError::InvalidName => {
                AppError::Validation(err.to_string())
            }
            StorageError::NotFound(_) => AppError::NotFound(err.to_string()),
            StorageError::Io(e) => AppError::Internal(anyhow::Error::new(e).context("file storage")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Avatar,
    Recipe,
    Image,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Image, Category::Recipe, Category::Avatar];

    /// Unknown labels fall back to the generic image directory.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "avatar" => Category::Avatar,
            "recipe" => Category::Recipe,
            _ => Category::Image,
        }
    }

    pub fn dir(self) -> &'static str {
        match self {
            Category::Avatar => "avatars",
            Category::Recipe => "recipes",
            Category::Image => "images",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub url: String,
    pub filename: String,
    pub size: u64,
}

/// Lowercased extension with its dot, if the name carries an accepted one.
pub fn image_extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))?;
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Checks type and size before anything touches the disk.
pub fn validate_image(original_name: &str, size: u64, max_bytes: u64) -> Result<String, StorageError> {
    let ext = image_extension(original_name).ok_or(StorageError::InvalidType)?;
    if size > max_bytes {
        return Err(StorageError::TooLarge(max_bytes));
    }
    Ok(ext)
}

fn stored_name(ext: &str) -> String {
    format!(
        "{}_{}{}",
        Uuid::new_v4(),
        OffsetDateTime::now_utc().unix_timestamp(),
        ext
    )
}

/// A bare file name: no separators, no parent references.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_image(
        &self,
        original_name: &str,
        category: Category,
        body: Bytes,
    ) -> Result<StoredFile, StorageError>;
    async fn delete_image(&self, filename: &str) -> Result<(), StorageError>;
    fn max_bytes(&self) -> u64;
}

/// Uploads on the local disk under `<root>/<category dir>/`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    max_bytes: u64,
}

impl LocalStorage {
    pub async fn new(cfg: &UploadConfig) -> anyhow::Result<Self> {
        for category in Category::ALL {
            let dir = cfg.dir.join(category.dir());
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("create upload dir {}", dir.display()))?;
        }
        Ok(Self {
            root: cfg.dir.clone(),
            max_bytes: cfg.max_bytes,
        })
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_image(
        &self,
        original_name: &str,
        category: Category,
        body: Bytes,
    ) -> Result<StoredFile, StorageError> {
        let ext = validate_image(original_name, body.len() as u64, self.max_bytes)?;
        let filename = stored_name(&ext);
        let path = self.root.join(category.dir()).join(&filename);
        tokio::fs::write(&path, &body).await?;
        debug!(path = %path.display(), size = body.len(), "image stored");

        Ok(StoredFile {
            url: format!("{URL_PREFIX}/{}/{filename}", category.dir()),
            filename,
            size: body.len() as u64,
        })
    }

    async fn delete_image(&self, filename: &str) -> Result<(), StorageError> {
        if !is_plain_name(filename) {
            return Err(StorageError::InvalidName);
        }
        for category in Category::ALL {
            let path = self.root.join(category.dir()).join(filename);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "image deleted");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::NotFound(filename.to_string()))
    }

    fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}
