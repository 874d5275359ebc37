//! # Sync Reconciler
//!
//! Orchestrates reconciliation passes against the content backend.
//!
//! ## Overview
//!
//! A pass is a task-graph tree discovered while running:
//!
//! 1. The root spawns `ListVideos` and `ListGroups`, then signals done.
//! 2. `ListVideos` fetches the remote revision listing and applies the
//!    decision table per id, spawning a `DownloadItem` or `UploadItem`
//!    node for each id needing network work.
//! 3. Transfer nodes write the local store and advance the pass
//!    progress counter.
//! 4. The root finalizes only after every spawned node has committed its
//!    store write; its aggregated error list becomes the [`SyncReport`].
//!
//! Branches never cancel each other; a failing download leaves sibling
//! transfers untouched and surfaces as one entry in the report.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncReconciler;
//!
//! # async fn example(reconciler: &SyncReconciler) -> core_sync::Result<()> {
//! let report = reconciler.refresh_online().await?;
//! if !report.is_success() {
//!     eprintln!("{} branches failed", report.errors.len());
//! }
//! # Ok(())
//! # }
//! ```

use crate::decision::{decide, SyncAction};
use crate::error::{Result, SyncError};
use crate::remote::RemoteCatalog;
use crate::types::{record_from_manifest, SyncReport};
use bridge_traits::{LocalRecord, LocalStore, VideoId};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_task::{TaskGraph, TaskHandle};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

/// Counts transfer nodes spawned and completed during one pass,
/// broadcasting a progress event on every change.
struct ProgressCounter {
    done: AtomicUsize,
    total: AtomicUsize,
    event_bus: EventBus,
}

impl ProgressCounter {
    fn new(event_bus: EventBus) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            event_bus,
        }
    }

    fn begin(&self, count: usize) {
        self.total.fetch_add(count, Ordering::SeqCst);
        self.emit();
    }

    fn advance(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
        self.emit();
    }

    fn emit(&self) {
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Progress {
            done: self.done.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }));
    }
}

/// Everything a pass node needs, cloned into each work future.
#[derive(Clone)]
struct PassContext {
    catalog: Arc<RemoteCatalog>,
    store: Arc<dyn LocalStore>,
    progress: Arc<ProgressCounter>,
}

/// Entry point for reconciliation passes and single-item operations.
pub struct SyncReconciler {
    catalog: Arc<RemoteCatalog>,
    store: Arc<dyn LocalStore>,
    event_bus: EventBus,
    in_flight: AtomicBool,
}

impl SyncReconciler {
    pub fn new(
        catalog: Arc<RemoteCatalog>,
        store: Arc<dyn LocalStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            catalog,
            store,
            event_bus,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Runs a full reconciliation pass.
    ///
    /// At most one pass runs at a time; a second call while one is in
    /// flight returns [`SyncError::AlreadyRunning`]. The returned report
    /// lists every failed branch; an empty list means full success.
    #[instrument(skip(self))]
    pub async fn refresh_online(&self) -> Result<SyncReport> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyRunning);
        }
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Started));
        info!("sync pass started");

        let ctx = self.pass_context();
        let graph = TaskGraph::<SyncError>::new();
        let root = graph.add_task({
            let ctx = ctx.clone();
            move |handle| {
                async move {
                    handle.spawn_subtask(list_videos_node(ctx.clone()));
                    handle.spawn_subtask(list_groups_node(ctx));
                    handle.done();
                }
                .boxed()
            }
        });
        let (tx, rx) = oneshot::channel();
        graph.on_finished(root, move |errors| {
            tx.send(errors).ok();
        });
        graph.start(root);

        let outcome = rx.await;
        self.in_flight.store(false, Ordering::SeqCst);
        let errors = outcome
            .map_err(|_| SyncError::UnexpectedResponse("sync pass aborted".to_string()))?;

        let report = SyncReport { errors };
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Completed {
            errors: report.error_descriptions(),
        }));
        info!(failed_branches = report.errors.len(), "sync pass completed");
        Ok(report)
    }

    /// Refreshes one item outside a full pass.
    ///
    /// Modified locally: upload and persist the canonical response.
    /// Otherwise: conditional download; when the server has nothing
    /// newer the current local record is returned untouched.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn refresh_video(&self, id: VideoId) -> Result<LocalRecord> {
        let local = self.store.lookup(id).await.map_err(SyncError::store)?;
        match local {
            Some(record) if record.has_local_modifications => {
                debug!("local modifications present, uploading");
                let canonical = self.catalog.put_video(id, &record.payload).await?;
                self.persist_manifest(canonical).await
            }
            Some(record) => match self.catalog.get_video_if_newer(id, record.revision).await? {
                Some(manifest) => self.persist_manifest(manifest).await,
                None => Ok(record),
            },
            None => {
                let manifest = self.catalog.get_video(id).await?;
                self.persist_manifest(manifest).await
            }
        }
    }

    /// Returns the local record, fetching and persisting it first when
    /// it is not stored yet.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_or_fetch(&self, id: VideoId) -> Result<LocalRecord> {
        if let Some(record) = self.store.lookup(id).await.map_err(SyncError::store)? {
            return Ok(record);
        }
        let manifest = self.catalog.get_video(id).await?;
        self.persist_manifest(manifest).await
    }

    /// Deletes a batch of items remotely and locally, one node per item.
    ///
    /// Failures are aggregated per branch like a sync pass; one item
    /// failing to delete does not stop the rest.
    #[instrument(skip(self), fields(count = ids.len()))]
    pub async fn delete_videos(&self, ids: Vec<VideoId>) -> Result<SyncReport> {
        let ctx = self.pass_context();
        let graph = TaskGraph::<SyncError>::new();
        let root = graph.add_task(move |handle| {
            async move {
                for id in ids {
                    handle.spawn_subtask(delete_node(ctx.clone(), id));
                }
                handle.done();
            }
            .boxed()
        });
        let (tx, rx) = oneshot::channel();
        graph.on_finished(root, move |errors| {
            tx.send(errors).ok();
        });
        graph.start(root);

        let errors = rx
            .await
            .map_err(|_| SyncError::UnexpectedResponse("delete pass aborted".to_string()))?;
        Ok(SyncReport { errors })
    }

    async fn persist_manifest(&self, manifest: serde_json::Value) -> Result<LocalRecord> {
        let record = record_from_manifest(manifest)?;
        self.store
            .upsert(record.clone())
            .await
            .map_err(SyncError::store)?;
        Ok(record)
    }

    fn pass_context(&self) -> PassContext {
        PassContext {
            catalog: Arc::clone(&self.catalog),
            store: Arc::clone(&self.store),
            progress: Arc::new(ProgressCounter::new(self.event_bus.clone())),
        }
    }
}

// ============================================================================
// Pass nodes
// ============================================================================

type NodeWork = BoxFuture<'static, ()>;

fn list_videos_node(
    ctx: PassContext,
) -> impl FnOnce(TaskHandle<SyncError>) -> NodeWork + Send + 'static {
    move |handle| {
        async move {
            let revisions = match ctx.catalog.list_videos().await {
                Ok(revisions) => revisions,
                Err(err) => {
                    warn!(error = %err, "revision listing failed");
                    return handle.fail(err);
                }
            };
            for remote in revisions {
                let local = match ctx.store.lookup(remote.id).await {
                    Ok(local) => local,
                    Err(err) => return handle.fail(SyncError::store(err)),
                };
                match decide(local.as_ref(), &remote) {
                    SyncAction::None => {}
                    SyncAction::Download => {
                        debug!(id = %remote.id, "scheduling download");
                        ctx.progress.begin(1);
                        handle.spawn_subtask(download_node(ctx.clone(), remote.id));
                    }
                    SyncAction::Upload => {
                        debug!(id = %remote.id, "scheduling upload");
                        ctx.progress.begin(1);
                        handle.spawn_subtask(upload_node(ctx.clone(), remote.id));
                    }
                }
            }
            handle.done();
        }
        .boxed()
    }
}

fn list_groups_node(
    ctx: PassContext,
) -> impl FnOnce(TaskHandle<SyncError>) -> NodeWork + Send + 'static {
    move |handle| {
        async move {
            let result = async {
                let groups = ctx.catalog.get_groups().await?;
                debug!(count = groups.len(), "group listing fetched");
                ctx.store
                    .replace_groups(groups)
                    .await
                    .map_err(SyncError::store)
            }
            .await;
            match result {
                Ok(()) => handle.done(),
                Err(err) => {
                    warn!(error = %err, "group sync failed");
                    handle.fail(err)
                }
            }
        }
        .boxed()
    }
}

fn download_node(
    ctx: PassContext,
    id: VideoId,
) -> impl FnOnce(TaskHandle<SyncError>) -> NodeWork + Send + 'static {
    move |handle| {
        async move {
            let result = async {
                let manifest = ctx.catalog.get_video(id).await?;
                let record = record_from_manifest(manifest)?;
                ctx.store.upsert(record).await.map_err(SyncError::store)
            }
            .await;
            ctx.progress.advance();
            match result {
                Ok(()) => handle.done(),
                Err(err) => {
                    warn!(id = %id, error = %err, "download failed");
                    handle.fail(err)
                }
            }
        }
        .boxed()
    }
}

fn upload_node(
    ctx: PassContext,
    id: VideoId,
) -> impl FnOnce(TaskHandle<SyncError>) -> NodeWork + Send + 'static {
    move |handle| {
        async move {
            let result = async {
                let local = ctx
                    .store
                    .lookup(id)
                    .await
                    .map_err(SyncError::store)?
                    .ok_or(SyncError::MissingLocalRecord(id))?;
                let canonical = ctx.catalog.put_video(id, &local.payload).await?;
                let record = record_from_manifest(canonical)?;
                ctx.store.upsert(record).await.map_err(SyncError::store)
            }
            .await;
            ctx.progress.advance();
            match result {
                Ok(()) => handle.done(),
                Err(err) => {
                    warn!(id = %id, error = %err, "upload failed");
                    handle.fail(err)
                }
            }
        }
        .boxed()
    }
}

fn delete_node(
    ctx: PassContext,
    id: VideoId,
) -> impl FnOnce(TaskHandle<SyncError>) -> NodeWork + Send + 'static {
    move |handle| {
        async move {
            let result = async {
                ctx.catalog.delete_video(id).await?;
                ctx.store.remove(id).await.map_err(SyncError::store)
            }
            .await;
            match result {
                Ok(()) => handle.done(),
                Err(err) => {
                    warn!(id = %id, error = %err, "delete failed");
                    handle.fail(err)
                }
            }
        }
        .boxed()
    }
}

// ============================================================================
// Tests
// ============================================================================
