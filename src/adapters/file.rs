//! Filesystem adapter.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{AdapterError, FileAdapter};
use crate::bundle::FileOperation;
use crate::context::Context;
use crate::decision::Decision;
use crate::resource::FileRequest;

/// Reads, writes and appends through `tokio::fs`.
///
/// - `read` returns the file content as a JSON string.
/// - `write` creates or truncates, then writes the payload (nothing when
///   the request carried none).
/// - `append` creates if needed and appends the payload.
pub struct FsFileAdapter;

#[async_trait]
impl FileAdapter for FsFileAdapter {
    async fn handle(
        &self,
        request: &FileRequest,
        _context: &Context,
        _decision: &Decision,
    ) -> Result<serde_json::Value, AdapterError> {
        let path = &request.path;
        let io_err = |source: std::io::Error| AdapterError::Io {
            path: path.display().to_string(),
            source,
        };

        match request.operation {
            FileOperation::Read => {
                let content = tokio::fs::read_to_string(path).await.map_err(io_err)?;
                debug!(path = %path.display(), bytes = content.len(), "file read");
                Ok(serde_json::Value::String(content))
            }
            FileOperation::Write | FileOperation::Append => {
                let mut options = tokio::fs::OpenOptions::new();
                options.create(true);
                if request.operation == FileOperation::Append {
                    options.append(true);
                } else {
                    options.write(true).truncate(true);
                }
                let mut file = options.open(path).await.map_err(io_err)?;

                let payload = request.payload.as_deref().unwrap_or_default();
                file.write_all(payload).await.map_err(io_err)?;
                file.flush().await.map_err(io_err)?;

                debug!(path = %path.display(), bytes = payload.len(), op = ?request.operation, "file written");
                Ok(serde_json::json!({
                    "path": path.display().to_string(),
                    "bytesWritten": payload.len(),
                }))
            }
        }
    }
}
