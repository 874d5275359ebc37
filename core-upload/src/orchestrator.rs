//! # Upload Orchestrator
//!
//! Failover chain over uploader backends with weighted progress.
//!
//! ## Overview
//!
//! An upload has three stages, reported as one progress scale:
//!
//! - `0.0..0.7` — video asset, first backend in priority order to
//!   return a URL wins; later backends are never consulted.
//! - `0.7..0.8` — thumbnail asset, skipped when the video backend
//!   already produced a thumbnail URL as a side effect.
//! - `0.8..0.9` — manifest submission; real progress is unknowable
//!   here, so synthetic ticks advance the bar while the PUT is in
//!   flight, purely as UI feedback.
//! - `1.0` — canonical record persisted.
//!
//! A backend returning `Ok(None)` declined; an `Err` is logged and kept
//! as the failure cause in case no later backend succeeds. Only the
//! video URL is load-bearing: no URL after the whole chain aborts the
//! upload, while thumbnail failures are not fatal and the manifest is
//! submitted without a thumbnail field.

use crate::error::{Result, UploadError};
use bridge_traits::uploader::{AssetKind, AssetUpload, MediaUploader, ProgressFn, UploadedAssets};
use bridge_traits::{BridgeError, LocalRecord, LocalStore, VideoId};
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use core_sync::{record_from_manifest, RemoteCatalog, SyncError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const VIDEO_STAGE_WEIGHT: f32 = 0.7;
const THUMBNAIL_STAGE_WEIGHT: f32 = 0.1;
const SUBMIT_BASE: f32 = 0.8;
const SUBMIT_CAP: f32 = 0.9;
const SUBMIT_TICK: f32 = 0.05;
const SUBMIT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Drives one content item's assets to a backend and its manifest to
/// the catalog.
pub struct UploadOrchestrator {
    video_uploaders: Vec<Arc<dyn MediaUploader>>,
    thumbnail_uploaders: Vec<Arc<dyn MediaUploader>>,
    catalog: Arc<RemoteCatalog>,
    store: Arc<dyn LocalStore>,
    event_bus: EventBus,
}

impl UploadOrchestrator {
    pub fn new(
        video_uploaders: Vec<Arc<dyn MediaUploader>>,
        thumbnail_uploaders: Vec<Arc<dyn MediaUploader>>,
        catalog: Arc<RemoteCatalog>,
        store: Arc<dyn LocalStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            video_uploaders,
            thumbnail_uploaders,
            catalog,
            store,
            event_bus,
        }
    }

    /// Uploads `video` (and optionally `thumbnail`), submits the updated
    /// manifest, and persists the server's canonical record.
    ///
    /// On success the returned record carries the authoritative revision
    /// and a cleared modification flag. Progress and the final outcome
    /// are also broadcast as [`UploadEvent`]s.
    #[instrument(skip(self, record, video, thumbnail), fields(id = %record.id))]
    pub async fn upload(
        &self,
        record: LocalRecord,
        video: AssetUpload,
        thumbnail: Option<AssetUpload>,
    ) -> Result<LocalRecord> {
        let id = record.id;
        self.emit_progress(id, 0.0, false);

        let (video_assets, last_err) = self
            .try_backends(&self.video_uploaders, &video, AssetKind::Video, 0.0)
            .await;
        let Some(video_assets) = video_assets else {
            return Err(self.finish_err(id, UploadError::FailedToUploadVideo { source: last_err }));
        };
        info!(url = %video_assets.asset_url, "video asset uploaded");

        let thumbnail_url = match (&video_assets.thumbnail_url, &thumbnail) {
            (Some(url), _) => {
                debug!("video backend produced a thumbnail, skipping thumbnail stage");
                Some(url.clone())
            }
            (None, Some(asset)) => {
                let (assets, _) = self
                    .try_backends(
                        &self.thumbnail_uploaders,
                        asset,
                        AssetKind::Thumbnail,
                        VIDEO_STAGE_WEIGHT,
                    )
                    .await;
                assets.map(|a| a.asset_url)
            }
            (None, None) => None,
        };

        let payload = match merged_payload(&record, &video_assets, thumbnail_url.as_deref()) {
            Ok(payload) => payload,
            Err(err) => return Err(self.finish_err(id, UploadError::FailedToSaveVideo { source: err })),
        };

        let canonical = match self.submit_with_ticks(id, &payload).await {
            Ok(canonical) => canonical,
            Err(err) => return Err(self.finish_err(id, UploadError::FailedToSaveVideo { source: err })),
        };
        let saved = match record_from_manifest(canonical) {
            Ok(saved) => saved,
            Err(err) => return Err(self.finish_err(id, UploadError::FailedToSaveVideo { source: err })),
        };
        if let Err(err) = self.store.upsert(saved.clone()).await {
            let err = SyncError::Store(err.to_string());
            return Err(self.finish_err(id, UploadError::FailedToSaveVideo { source: err }));
        }

        self.emit_progress(id, 1.0, true);
        let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::Finished {
            video_id: id.to_string(),
            record: Some(saved.clone()),
            error: None,
        }));
        info!(revision = saved.revision, "upload completed");
        Ok(saved)
    }

    /// Tries each backend in order; first URL wins. Returns the winning
    /// assets plus the last hard failure seen along the way.
    async fn try_backends(
        &self,
        uploaders: &[Arc<dyn MediaUploader>],
        asset: &AssetUpload,
        kind: AssetKind,
        progress_offset: f32,
    ) -> (Option<UploadedAssets>, Option<BridgeError>) {
        let weight = match kind {
            AssetKind::Video => VIDEO_STAGE_WEIGHT,
            AssetKind::Thumbnail => THUMBNAIL_STAGE_WEIGHT,
        };
        let mut last_err = None;
        for uploader in uploaders {
            debug!(backend = uploader.name(), ?kind, "trying uploader backend");
            let progress = self.scaled_progress(asset.id, progress_offset, weight);
            match uploader.upload(asset, kind, progress).await {
                Ok(Some(assets)) => return (Some(assets), last_err),
                Ok(None) => debug!(backend = uploader.name(), "backend declined"),
                Err(err) => {
                    warn!(backend = uploader.name(), error = %err, "backend failed");
                    last_err = Some(err);
                }
            }
        }
        (None, last_err)
    }

    /// Issues the manifest PUT while synthesizing progress ticks from
    /// [`SUBMIT_BASE`] up to [`SUBMIT_CAP`].
    async fn submit_with_ticks(
        &self,
        id: VideoId,
        payload: &Value,
    ) -> core_sync::Result<Value> {
        self.emit_progress(id, SUBMIT_BASE, false);

        let put = self.catalog.put_video(id, payload);
        tokio::pin!(put);
        let mut synthetic = SUBMIT_BASE;
        let mut ticks = tokio::time::interval_at(
            tokio::time::Instant::now() + SUBMIT_TICK_INTERVAL,
            SUBMIT_TICK_INTERVAL,
        );
        loop {
            tokio::select! {
                result = &mut put => return result,
                _ = ticks.tick() => {
                    synthetic = (synthetic + SUBMIT_TICK).min(SUBMIT_CAP);
                    self.emit_progress(id, synthetic, true);
                }
            }
        }
    }

    fn scaled_progress(&self, id: VideoId, offset: f32, weight: f32) -> ProgressFn {
        let event_bus = self.event_bus.clone();
        let video_id = id.to_string();
        Arc::new(move |value: f32| {
            let scaled = offset + value.clamp(0.0, 1.0) * weight;
            let _ = event_bus.emit(CoreEvent::Upload(UploadEvent::Progress {
                video_id: video_id.clone(),
                value: scaled,
                animated: false,
            }));
        })
    }

    fn emit_progress(&self, id: VideoId, value: f32, animated: bool) {
        let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::Progress {
            video_id: id.to_string(),
            value,
            animated,
        }));
    }

    fn finish_err(&self, id: VideoId, err: UploadError) -> UploadError {
        warn!(id = %id, error = %err, "upload failed");
        let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::Finished {
            video_id: id.to_string(),
            record: None,
            error: Some(err.to_string()),
        }));
        err
    }
}

/// Merges the uploaded asset URLs into the record payload.
fn merged_payload(
    record: &LocalRecord,
    assets: &UploadedAssets,
    thumbnail_url: Option<&str>,
) -> core_sync::Result<Value> {
    let mut payload = record.payload.clone();
    let Some(object) = payload.as_object_mut() else {
        return Err(SyncError::UnexpectedResponse(
            "record payload is not an object".to_string(),
        ));
    };
    object.insert("video_uri".to_string(), json!(assets.asset_url));
    if let Some(url) = thumbnail_url {
        object.insert("thumbnail_uri".to_string(), json!(url));
    }
    if let Some(url) = &assets.delete_url {
        object.insert("delete_uri".to_string(), json!(url));
    }
    Ok(payload)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
    use bridge_traits::{GroupRecord, TokenSet};
    use bytes::Bytes;
    use chrono::{Duration as ChronoDuration, Utc};
    use core_auth::AuthClient;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    enum Behavior {
        Fail,
        Decline,
        Succeed(UploadedAssets),
    }

    struct StubUploader {
        label: String,
        behavior: Behavior,
        called: AtomicBool,
        /// Raw progress values to report while "uploading".
        reports: Vec<f32>,
    }

    impl StubUploader {
        fn new(label: &str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                label: label.to_string(),
                behavior,
                called: AtomicBool::new(false),
                reports: vec![0.5, 1.0],
            })
        }

        fn was_called(&self) -> bool {
            self.called.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaUploader for StubUploader {
        fn name(&self) -> &str {
            &self.label
        }

        async fn upload(
            &self,
            _asset: &AssetUpload,
            _kind: AssetKind,
            progress: ProgressFn,
        ) -> BridgeResult<Option<UploadedAssets>> {
            self.called.store(true, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Fail => Err(BridgeError::Network("backend down".to_string())),
                Behavior::Decline => Ok(None),
                Behavior::Succeed(assets) => {
                    for value in &self.reports {
                        progress(*value);
                    }
                    Ok(Some(assets.clone()))
                }
            }
        }
    }

    fn plain_assets(url: &str) -> UploadedAssets {
        UploadedAssets {
            asset_url: url.to_string(),
            thumbnail_url: None,
            delete_url: None,
        }
    }

    /// Backend answering the manifest PUT with revision + 1, optionally
    /// after a delay.
    struct PutBackend {
        delay: Option<Duration>,
        puts: Mutex<Vec<Value>>,
    }

    impl PutBackend {
        fn new() -> Self {
            Self {
                delay: None,
                puts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for PutBackend {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            assert_eq!(request.method, HttpMethod::Put);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let body: Value = serde_json::from_slice(request.body.as_deref().unwrap_or(&[]))
                .map_err(|e| BridgeError::Network(e.to_string()))?;
            self.puts.lock().await.push(body.clone());
            let mut canonical = body;
            let revision = canonical["revision"].as_i64().unwrap_or(0);
            canonical["revision"] = json!(revision + 1);
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from(serde_json::to_vec(&canonical).unwrap()),
            })
        }
    }

    #[derive(Default)]
    struct MemStore {
        records: Mutex<HashMap<VideoId, LocalRecord>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl LocalStore for MemStore {
        async fn lookup(&self, id: VideoId) -> BridgeResult<Option<LocalRecord>> {
            Ok(self.records.lock().await.get(&id).cloned())
        }

        async fn upsert(&self, record: LocalRecord) -> BridgeResult<()> {
            if self.fail_writes {
                return Err(BridgeError::Store("disk full".to_string()));
            }
            self.records.lock().await.insert(record.id, record);
            Ok(())
        }

        async fn remove(&self, _id: VideoId) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_all(&self) -> BridgeResult<Vec<LocalRecord>> {
            Ok(self.records.lock().await.values().cloned().collect())
        }

        async fn replace_groups(&self, _groups: Vec<GroupRecord>) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_groups(&self) -> BridgeResult<Vec<GroupRecord>> {
            Ok(Vec::new())
        }
    }

    async fn catalog(backend: Arc<PutBackend>) -> Arc<RemoteCatalog> {
        let auth = AuthClient::new(backend, EventBus::new(64));
        auth.install_tokens(TokenSet::new(
            "token",
            Utc::now() + ChronoDuration::hours(1),
            None,
        ))
        .await;
        Arc::new(RemoteCatalog::new(Arc::new(auth), "https://rails.example"))
    }

    fn record() -> LocalRecord {
        let id = VideoId::new();
        LocalRecord {
            id,
            revision: 3,
            has_local_modifications: true,
            payload: json!({
                "uuid": id.to_string(),
                "revision": 3,
                "title": "local recording"
            }),
        }
    }

    fn asset(id: VideoId) -> AssetUpload {
        AssetUpload {
            id,
            data: Bytes::from_static(b"raw video"),
            content_type: "video/mp4".to_string(),
        }
    }

    fn progress_values(rx: &mut core_runtime::events::Receiver<CoreEvent>) -> Vec<(f32, bool)> {
        let mut values = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CoreEvent::Upload(UploadEvent::Progress { value, animated, .. }) = event {
                values.push((value, animated));
            }
        }
        values
    }

    #[tokio::test]
    async fn test_failover_stops_at_first_success() {
        let a = StubUploader::new("a", Behavior::Fail);
        let b = StubUploader::new("b", Behavior::Succeed(plain_assets("https://cdn/b.mp4")));
        let c = StubUploader::new("c", Behavior::Succeed(plain_assets("https://cdn/c.mp4")));

        let backend = Arc::new(PutBackend::new());
        let store = Arc::new(MemStore::default());
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let orchestrator = UploadOrchestrator::new(
            vec![a.clone(), b.clone(), c.clone()],
            vec![],
            catalog(backend.clone()).await,
            store.clone(),
            bus,
        );

        let record = record();
        let id = record.id;
        let saved = orchestrator.upload(record, asset(id), None).await.unwrap();

        assert!(a.was_called());
        assert!(b.was_called());
        assert!(!c.was_called(), "later backends must not be consulted");

        // B's URL made it into the submitted manifest.
        let puts = backend.puts.lock().await;
        assert_eq!(puts[0]["video_uri"], json!("https://cdn/b.mp4"));

        // Canonical record persisted with bumped revision.
        assert_eq!(saved.revision, 4);
        assert!(!saved.has_local_modifications);
        assert_eq!(store.lookup(id).await.unwrap().unwrap().revision, 4);

        // B's raw 0.5 scaled into the video stage.
        let values = progress_values(&mut rx);
        assert!(values.contains(&(0.35, false)));
        assert!(values
            .iter()
            .all(|(v, _)| (0.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn test_no_backend_url_fails_without_submitting() {
        let a = StubUploader::new("a", Behavior::Fail);
        let b = StubUploader::new("b", Behavior::Decline);

        let backend = Arc::new(PutBackend::new());
        let orchestrator = UploadOrchestrator::new(
            vec![a, b],
            vec![],
            catalog(backend.clone()).await,
            Arc::new(MemStore::default()),
            EventBus::new(64),
        );

        let record = record();
        let id = record.id;
        let err = orchestrator.upload(record, asset(id), None).await.unwrap_err();

        assert!(matches!(
            err,
            UploadError::FailedToUploadVideo { source: Some(_) }
        ));
        assert!(backend.puts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_thumbnail_stage_skipped_when_video_backend_provides_one() {
        let video_backend = StubUploader::new(
            "combo",
            Behavior::Succeed(UploadedAssets {
                asset_url: "https://cdn/v.mp4".to_string(),
                thumbnail_url: Some("https://cdn/v.jpg".to_string()),
                delete_url: None,
            }),
        );
        let thumb_backend = StubUploader::new("thumbs", Behavior::Succeed(plain_assets("x")));

        let backend = Arc::new(PutBackend::new());
        let orchestrator = UploadOrchestrator::new(
            vec![video_backend],
            vec![thumb_backend.clone()],
            catalog(backend.clone()).await,
            Arc::new(MemStore::default()),
            EventBus::new(64),
        );

        let record = record();
        let id = record.id;
        orchestrator
            .upload(record, asset(id), Some(asset(id)))
            .await
            .unwrap();

        assert!(!thumb_backend.was_called());
        let puts = backend.puts.lock().await;
        assert_eq!(puts[0]["thumbnail_uri"], json!("https://cdn/v.jpg"));
    }

    #[tokio::test]
    async fn test_thumbnail_progress_scales_into_its_band() {
        let video_backend =
            StubUploader::new("video", Behavior::Succeed(plain_assets("https://cdn/v.mp4")));
        let thumb_backend =
            StubUploader::new("thumbs", Behavior::Succeed(plain_assets("https://cdn/t.jpg")));

        let backend = Arc::new(PutBackend::new());
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let orchestrator = UploadOrchestrator::new(
            vec![video_backend],
            vec![thumb_backend],
            catalog(backend).await,
            Arc::new(MemStore::default()),
            bus,
        );

        let record = record();
        let id = record.id;
        orchestrator
            .upload(record, asset(id), Some(asset(id)))
            .await
            .unwrap();

        // Thumbnail's raw 0.5 lands at 0.7 + 0.05.
        let values = progress_values(&mut rx);
        assert!(values
            .iter()
            .any(|(v, animated)| !animated && (v - 0.75).abs() < 1e-6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_ticks_during_slow_submit() {
        let video_backend =
            StubUploader::new("video", Behavior::Succeed(plain_assets("https://cdn/v.mp4")));

        let mut backend = PutBackend::new();
        backend.delay = Some(Duration::from_millis(1600));
        let backend = Arc::new(backend);

        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let orchestrator = UploadOrchestrator::new(
            vec![video_backend],
            vec![],
            catalog(backend).await,
            Arc::new(MemStore::default()),
            bus,
        );

        let record = record();
        let id = record.id;
        orchestrator.upload(record, asset(id), None).await.unwrap();

        let values = progress_values(&mut rx);
        // Base emitted, then ticks cap at 0.9 while the PUT is pending.
        assert!(values.contains(&(0.8, false)));
        assert!(values
            .iter()
            .any(|(v, animated)| *animated && (v - 0.85).abs() < 1e-6));
        assert!(values
            .iter()
            .any(|(v, animated)| *animated && (v - 0.9).abs() < 1e-6));
        assert!(values.iter().all(|(v, _)| *v <= 1.0));
        assert_eq!(values.last(), Some(&(1.0, true)));
    }

    #[tokio::test]
    async fn test_store_failure_is_a_save_error() {
        let video_backend =
            StubUploader::new("video", Behavior::Succeed(plain_assets("https://cdn/v.mp4")));

        let backend = Arc::new(PutBackend::new());
        let store = Arc::new(MemStore {
            records: Mutex::new(HashMap::new()),
            fail_writes: true,
        });
        let orchestrator = UploadOrchestrator::new(
            vec![video_backend],
            vec![],
            catalog(backend).await,
            store,
            EventBus::new(64),
        );

        let record = record();
        let id = record.id;
        let err = orchestrator.upload(record, asset(id), None).await.unwrap_err();
        assert!(matches!(err, UploadError::FailedToSaveVideo { .. }));
    }
}
