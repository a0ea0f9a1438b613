//! Capability adapters: the only code that performs real side effects.
//!
//! Each adapter is invoked by the channel after an allow decision and
//! receives the decision it was authorized under.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::Context;
use crate::decision::Decision;
use crate::resource::{FileRequest, ResourceError};

pub mod file;
pub mod network;
pub mod sensor;

pub use file::FsFileAdapter;
pub use network::HttpNetworkAdapter;
pub use sensor::{StubCameraAdapter, StubLidarAdapter};

/// Failures raised by adapters. The channel turns every one of them into a
/// rollback decision.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The resource string could not be interpreted.
    #[error("invalid resource: {0}")]
    InvalidResource(#[from] ResourceError),
    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Upstream answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },
    /// Filesystem failure.
    #[error("file operation failed on {path}: {source}")]
    Io {
        /// Target path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Sensor hardware is unavailable or refused the request.
    #[error("sensor unavailable: {0}")]
    Sensor(String),
    /// No adapter handles the action.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

/// Outbound network calls.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// Call `url` and return the response body.
    async fn call(
        &self,
        url: &str,
        context: &Context,
        decision: &Decision,
    ) -> Result<serde_json::Value, AdapterError>;
}

/// Filesystem access.
#[async_trait]
pub trait FileAdapter: Send + Sync {
    /// Perform the parsed file request.
    async fn handle(
        &self,
        request: &FileRequest,
        context: &Context,
        decision: &Decision,
    ) -> Result<serde_json::Value, AdapterError>;
}

/// Camera capture.
#[async_trait]
pub trait CameraAdapter: Send + Sync {
    /// Capture with the given settings descriptor.
    async fn capture(
        &self,
        settings: &str,
        context: &Context,
        decision: &Decision,
    ) -> Result<serde_json::Value, AdapterError>;
}

/// LiDAR scanning.
#[async_trait]
pub trait LidarAdapter: Send + Sync {
    /// Scan at the given resolution descriptor.
    async fn scan(
        &self,
        resolution: &str,
        context: &Context,
        decision: &Decision,
    ) -> Result<serde_json::Value, AdapterError>;
}

/// One adapter per capability.
#[derive(Clone)]
pub struct Adapters {
    /// `net.call` handler.
    pub network: Arc<dyn NetworkAdapter>,
    /// `file.handle` handler.
    pub file: Arc<dyn FileAdapter>,
    /// `camera.capture` handler.
    pub camera: Arc<dyn CameraAdapter>,
    /// `lidar.scan` handler.
    pub lidar: Arc<dyn LidarAdapter>,
}

impl Adapters {
    /// Default adapters: reqwest networking, tokio filesystem, stub sensors.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_defaults(user_agent: &str, connect_timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            network: Arc::new(HttpNetworkAdapter::new(user_agent, connect_timeout)?),
            file: Arc::new(FsFileAdapter),
            camera: Arc::new(StubCameraAdapter),
            lidar: Arc::new(StubLidarAdapter),
        })
    }
}
