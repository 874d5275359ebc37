//! Wire types exchanged with the content backend.

use crate::error::{Result, SyncError};
use bridge_traits::{GroupRecord, LocalRecord, VideoId};
use serde::{Deserialize, Serialize};

/// One entry of the remote revision listing.
///
/// Ephemeral, produced once per sync pass; the decision function
/// compares it against the local record with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRevision {
    #[serde(rename = "uuid")]
    pub id: VideoId,
    pub revision: i64,
}

/// Body of `GET videos.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct RevisionListing {
    pub videos: Vec<ContentRevision>,
}

/// Body of `GET groups/own.json`. The user block is present on the wire
/// but not consumed here.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupListing {
    pub groups: Vec<GroupRecord>,
}

/// Builds a [`LocalRecord`] from a full video manifest as the backend
/// returns it.
///
/// The manifest is stored wholesale as the record payload; only `uuid`
/// and `revision` are lifted out. The modification flag is cleared: a
/// record built from a server manifest is by definition in sync.
pub fn record_from_manifest(manifest: serde_json::Value) -> Result<LocalRecord> {
    let id = manifest
        .get("uuid")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SyncError::UnexpectedResponse("manifest without uuid".to_string()))?;
    let id = VideoId::from_string(id)
        .map_err(|e| SyncError::UnexpectedResponse(format!("manifest uuid invalid: {}", e)))?;
    let revision = manifest
        .get("revision")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| SyncError::UnexpectedResponse("manifest without revision".to_string()))?;

    Ok(LocalRecord {
        id,
        revision,
        has_local_modifications: false,
        payload: manifest,
    })
}

/// Report handed back by a completed pass: one entry per failed branch.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error descriptions suitable for a completion event.
    pub fn error_descriptions(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}
