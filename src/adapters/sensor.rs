//! Placeholder sensor adapters.
//!
//! No hardware is attached; captures return synthetic identifiers so the
//! full authorization and audit path can run end to end.

use async_trait::async_trait;
use uuid::Uuid;

use super::{AdapterError, CameraAdapter, LidarAdapter};
use crate::context::Context;
use crate::decision::Decision;

/// Camera stub returning `camera-<uuid>` capture ids.
pub struct StubCameraAdapter;

#[async_trait]
impl CameraAdapter for StubCameraAdapter {
    async fn capture(
        &self,
        settings: &str,
        context: &Context,
        _decision: &Decision,
    ) -> Result<serde_json::Value, AdapterError> {
        Ok(serde_json::json!({
            "captureId": format!("camera-{}", Uuid::new_v4()),
            "settings": settings,
            "inspectionId": context.inspection_id,
        }))
    }
}

/// LiDAR stub returning `lidar-<uuid>` scan ids.
pub struct StubLidarAdapter;

#[async_trait]
impl LidarAdapter for StubLidarAdapter {
    async fn scan(
        &self,
        resolution: &str,
        context: &Context,
        _decision: &Decision,
    ) -> Result<serde_json::Value, AdapterError> {
        Ok(serde_json::json!({
            "scanId": format!("lidar-{}", Uuid::new_v4()),
            "resolution": resolution,
            "inspectionId": context.inspection_id,
        }))
    }
}
