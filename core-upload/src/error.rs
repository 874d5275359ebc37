use bridge_traits::BridgeError;
use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    /// No backend produced a video URL. `source` is the last backend
    /// failure, absent when every backend merely declined.
    #[error("Failed to upload video")]
    FailedToUploadVideo {
        #[source]
        source: Option<BridgeError>,
    },

    /// The assets uploaded but the manifest could not be submitted or
    /// the canonical record could not be persisted.
    #[error("Failed to save uploaded video")]
    FailedToSaveVideo {
        #[source]
        source: SyncError,
    },
}

pub type Result<T> = std::result::Result<T, UploadError>;
