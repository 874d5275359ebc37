//! # Core Sync
//!
//! Revision-based reconciliation of local content against the backend
//! catalog.
//!
//! ## Overview
//!
//! - [`SyncReconciler`] runs full passes and single-item operations over
//!   a [`TaskGraph`](core_task::TaskGraph)
//! - [`RemoteCatalog`] is the wire client behind every node
//! - [`decide`](decision::decide) is the pure decision function the
//!   pass applies per id
//!
//! Reconciliation is last-writer-wins by revision: modified local
//! records are uploaded and the server's canonical merged manifest is
//! persisted back; unmodified records follow the server.

pub mod decision;
pub mod error;
pub mod reconciler;
pub mod remote;
pub mod types;

pub use decision::{decide, SyncAction};
pub use error::{Result, SyncError};
pub use reconciler::SyncReconciler;
pub use remote::RemoteCatalog;
pub use types::{record_from_manifest, ContentRevision, SyncReport};
