//! Local Store Abstraction
//!
//! A key-value store of user-owned content records, keyed by content id.
//! Persistence mechanics (database, files, platform storage) are the
//! host's concern; the core only reads and writes whole records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::Result;

/// Unique identifier for a video record.
///
/// Stable across local and remote representations: the server lists
/// revisions by this id, and the local store is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(Uuid);

impl VideoId {
    /// Create a new random video ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a video ID from a string
    pub fn from_string(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for VideoId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A locally persisted content record.
///
/// `has_local_modifications` is set whenever a local edit occurs and
/// cleared only after a successful upload whose canonical response has
/// been persisted. Reconciliation depends on this invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Content id, shared with the remote catalog
    pub id: VideoId,
    /// Server-assigned revision this record was last synced at
    pub revision: i64,
    /// Whether the record has been edited locally since the last sync
    pub has_local_modifications: bool,
    /// The full record payload (manifest), opaque to the store
    pub payload: serde_json::Value,
}

/// A group/membership listing entry fetched from the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ids of videos shared with this group
    #[serde(default)]
    pub videos: Vec<VideoId>,
}

/// Local store trait
///
/// Writes to different ids are independent and may be issued
/// concurrently; callers must not assume writes to the *same* id are
/// serialized by the store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Look up a record by id
    async fn lookup(&self, id: VideoId) -> Result<Option<LocalRecord>>;

    /// Insert or overwrite a record, keyed by its id
    async fn upsert(&self, record: LocalRecord) -> Result<()>;

    /// Remove a record; removing an absent id is not an error
    async fn remove(&self, id: VideoId) -> Result<()>;

    /// List every stored record
    async fn list_all(&self) -> Result<Vec<LocalRecord>>;

    /// Replace the persisted group listings wholesale
    async fn replace_groups(&self, groups: Vec<GroupRecord>) -> Result<()>;

    /// List the persisted group listings
    async fn list_groups(&self) -> Result<Vec<GroupRecord>>;
}
