//! Remote Archiver: durable storage for compiled artifacts.
//!
//! Optional capability: the worker holds `Option<Arc<dyn Archiver>>`, decided
//! once at startup from configuration. Absence means "skip upload", never an error.

pub mod s3;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::generation::DEFAULT_META_CODE;

pub use s3::S3Archiver;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("artifact not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("could not read artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload to {target} failed: {message}")]
    Upload { target: String, message: String },
}

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Stores `artifact` under the folder for `meta_code` and returns a
    /// durable reference. Uploading the same file name again replaces the
    /// stored copy and yields the same reference.
    async fn upload(&self, artifact: &Path, meta_code: &str) -> Result<String, ArchiveError>;
}

/// `<root>/<META_CODE>/<file name>`, the folder layout artifacts are filed under.
pub fn object_key(root_prefix: &str, meta_code: &str, file_name: &str) -> String {
    let code = meta_code.trim().to_uppercase();
    let code = if code.is_empty() {
        DEFAULT_META_CODE
    } else {
        code.as_str()
    };
    let root = root_prefix.trim_matches('/');
    if root.is_empty() {
        format!("{code}/{file_name}")
    } else {
        format!("{root}/{code}/{file_name}")
    }
}
