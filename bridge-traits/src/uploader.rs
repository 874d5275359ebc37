//! Uploader Backend Abstraction
//!
//! Interchangeable services that accept raw asset bytes and return a
//! public URL. The upload orchestrator tries backends in priority order
//! until one succeeds.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::Result;
use crate::store::VideoId;

/// Which asset of a content item is being uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// The primary media asset (the video itself)
    Video,
    /// The secondary asset (thumbnail image)
    Thumbnail,
}

/// Raw asset data handed to an uploader backend.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub id: VideoId,
    pub data: Bytes,
    pub content_type: String,
}

/// URLs produced by a successful backend upload.
///
/// A video upload may also yield a thumbnail URL when the service
/// transcodes server-side; the orchestrator then skips the separate
/// thumbnail stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAssets {
    /// URL of the uploaded asset of the requested kind
    pub asset_url: String,
    /// Thumbnail URL, when a video upload produced one as a side effect
    pub thumbnail_url: Option<String>,
    /// URL to delete the uploaded asset, when the service supports it
    pub delete_url: Option<String>,
}

/// Progress callback, called with values in `0.0..=1.0`.
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Uploader backend trait
///
/// Returning `Ok(None)` means the backend declined or could not take
/// the asset; the orchestrator moves on to the next backend. `Err` is
/// treated the same way but logged as a failure.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Short name for logging ("govitra", "achminup", ...)
    fn name(&self) -> &str;

    /// Upload one asset, reporting progress as it goes
    async fn upload(
        &self,
        asset: &AssetUpload,
        kind: AssetKind,
        progress: ProgressFn,
    ) -> Result<Option<UploadedAssets>>;
}
