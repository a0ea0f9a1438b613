//! Typed resource descriptors.
//!
//! File requests travel as `"<op>:<path>"` strings at the channel boundary.
//! They are parsed into [`FileRequest`] before reaching the file adapter so
//! that writes can carry a payload.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::bundle::FileOperation;

/// Errors from parsing a resource string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The resource has no `<op>:` prefix.
    #[error("file resource must look like '<op>:<path>', got '{0}'")]
    MissingOperation(String),
    /// The `<op>` part is not read, write or append.
    #[error("unsupported file operation: {0}")]
    UnknownOperation(String),
    /// Nothing after the operation prefix.
    #[error("file resource has an empty path")]
    EmptyPath,
}

/// Parsed `file.handle` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    /// Requested operation.
    pub operation: FileOperation,
    /// Target path.
    pub path: PathBuf,
    /// Bytes to write or append. Reads ignore it.
    pub payload: Option<Vec<u8>>,
}

impl FileRequest {
    /// Parse `"<op>:<path>"`.
    ///
    /// # Errors
    ///
    /// Fails when the operation prefix is missing or unknown, or the path is empty.
    pub fn parse(resource: &str) -> Result<Self, ResourceError> {
        let (op, path) = resource
            .split_once(':')
            .ok_or_else(|| ResourceError::MissingOperation(resource.to_owned()))?;
        let operation = FileOperation::parse(op)
            .ok_or_else(|| ResourceError::UnknownOperation(op.to_owned()))?;
        if path.is_empty() {
            return Err(ResourceError::EmptyPath);
        }
        Ok(Self {
            operation,
            path: PathBuf::from(path),
            payload: None,
        })
    }

    /// Attach bytes to write.
    pub fn with_payload(mut self, payload: Option<Vec<u8>>) -> Self {
        self.payload = payload;
        self
    }
}

/// Path portion of a file resource used for allowlist matching.
///
/// Strips a recognized `read:` / `write:` / `append:` prefix. Anything else
/// is returned unchanged and matched as a whole.
pub fn file_path_of(resource: &str) -> &str {
    match resource.split_once(':') {
        Some((op, path)) if FileOperation::parse(op).is_some() => path,
        _ => resource,
    }
}

/// `true` when the path contains a `..` component.
pub fn has_parent_traversal(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}
