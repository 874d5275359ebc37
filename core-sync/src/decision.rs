//! # Reconciliation Decision
//!
//! The pure function at the heart of a sync pass: given the local record
//! and the remote revision entry for one id, pick the action.
//!
//! | local exists | modified | remote newer | action   |
//! |--------------|----------|--------------|----------|
//! | no           | —        | —            | Download |
//! | yes          | yes      | —            | Upload   |
//! | yes          | no       | yes          | Download |
//! | yes          | no       | no           | None     |
//!
//! A modified record always uploads, even when the remote revision is
//! newer: the server merges and returns the canonical record, which then
//! overwrites local state. Last-writer-wins by revision happens on the
//! server side, not here.

use crate::types::ContentRevision;
use bridge_traits::LocalRecord;

/// Action chosen for one content id during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Local and remote agree; nothing to do.
    None,
    /// Fetch the remote manifest and overwrite the local record.
    Download,
    /// Push the local payload; persist the canonical merged response.
    Upload,
}

/// Decides the action for `remote` given the current local record.
pub fn decide(local: Option<&LocalRecord>, remote: &ContentRevision) -> SyncAction {
    match local {
        None => SyncAction::Download,
        Some(record) if record.has_local_modifications => SyncAction::Upload,
        Some(record) if remote.revision > record.revision => SyncAction::Download,
        Some(_) => SyncAction::None,
    }
}
