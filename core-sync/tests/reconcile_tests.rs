//! End-to-end reconciliation passes against a scripted backend and an
//! in-memory store.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::{GroupRecord, LocalRecord, LocalStore, TokenSet, VideoId};
use bytes::Bytes;
use chrono::{Duration, Utc};
use core_auth::AuthClient;
use core_runtime::events::EventBus;
use core_sync::{RemoteCatalog, SyncError, SyncReconciler};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

// ============================================================================
// Fixtures
// ============================================================================

/// In-memory content backend: serves the revision listing, manifests and
/// groups, applies PUTs by bumping the revision, and records traffic.
struct FakeBackend {
    listing: Mutex<Vec<(VideoId, i64)>>,
    manifests: Mutex<HashMap<VideoId, Value>>,
    groups: Value,
    /// Ids whose manifest GET answers 422.
    broken: Vec<VideoId>,
    requests: Mutex<Vec<(HttpMethod, String)>>,
    /// When set, the revision listing parks until a permit is released.
    listing_gate: Option<Semaphore>,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            listing: Mutex::new(Vec::new()),
            manifests: Mutex::new(HashMap::new()),
            groups: json!({"groups": []}),
            broken: Vec::new(),
            requests: Mutex::new(Vec::new()),
            listing_gate: None,
        }
    }

    async fn serve_video(&self, id: VideoId, revision: i64) {
        self.listing.lock().await.push((id, revision));
        self.manifests
            .lock()
            .await
            .insert(id, manifest(id, revision));
    }

    async fn requests_to(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|(_, url)| url.contains(fragment))
            .count()
    }

    fn response(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        }
    }
}

#[async_trait]
impl HttpClient for FakeBackend {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests
            .lock()
            .await
            .push((request.method, request.url.clone()));
        let path = request
            .url
            .strip_prefix("https://rails.example/")
            .unwrap_or(&request.url);

        if path == "videos.json" && request.method == HttpMethod::Get {
            if let Some(gate) = &self.listing_gate {
                gate.acquire().await.map(|p| p.forget()).ok();
            }
            let videos: Vec<Value> = self
                .listing
                .lock()
                .await
                .iter()
                .map(|(id, rev)| json!({"uuid": id.to_string(), "revision": rev}))
                .collect();
            return Ok(Self::response(200, json!({ "videos": videos })));
        }

        if path == "groups/own.json" {
            return Ok(Self::response(200, self.groups.clone()));
        }

        if let Some(rest) = path.strip_prefix("videos/") {
            let uuid = rest.split('.').next().unwrap_or_default();
            let id = VideoId::from_string(uuid)
                .map_err(|e| BridgeError::Network(format!("bad test url: {}", e)))?;

            match request.method {
                HttpMethod::Get => {
                    if self.broken.contains(&id) {
                        return Ok(Self::response(422, json!({"error": "broken"})));
                    }
                    // Conditional get: serve 304 when nothing newer.
                    if let Some(query) = rest.split("newer_than_rev=").nth(1) {
                        let after: i64 = query.parse().unwrap_or(0);
                        let manifests = self.manifests.lock().await;
                        let current = manifests
                            .get(&id)
                            .and_then(|m| m.get("revision"))
                            .and_then(|r| r.as_i64())
                            .unwrap_or(0);
                        if current <= after {
                            return Ok(Self::response(304, json!({})));
                        }
                    }
                    let manifests = self.manifests.lock().await;
                    return match manifests.get(&id) {
                        Some(m) => Ok(Self::response(200, m.clone())),
                        None => Ok(Self::response(404, json!({"error": "not found"}))),
                    };
                }
                HttpMethod::Put => {
                    let body: Value =
                        serde_json::from_slice(request.body.as_deref().unwrap_or(&[]))
                            .map_err(|e| BridgeError::Network(e.to_string()))?;
                    let submitted = body.get("revision").and_then(|r| r.as_i64()).unwrap_or(0);
                    let mut canonical = body.clone();
                    canonical["revision"] = json!(submitted + 1);
                    self.manifests.lock().await.insert(id, canonical.clone());
                    return Ok(Self::response(200, canonical));
                }
                HttpMethod::Delete => {
                    self.manifests.lock().await.remove(&id);
                    self.listing.lock().await.retain(|(vid, _)| *vid != id);
                    return Ok(Self::response(200, json!({})));
                }
                _ => {}
            }
        }

        Ok(Self::response(404, json!({"error": "unrouted"})))
    }
}

fn manifest(id: VideoId, revision: i64) -> Value {
    json!({
        "uuid": id.to_string(),
        "revision": revision,
        "title": format!("video at rev {}", revision),
        "annotations": []
    })
}

#[derive(Default)]
struct MemoryStore {
    records: Mutex<HashMap<VideoId, LocalRecord>>,
    groups: Mutex<Vec<GroupRecord>>,
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn lookup(&self, id: VideoId) -> BridgeResult<Option<LocalRecord>> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn upsert(&self, record: LocalRecord) -> BridgeResult<()> {
        self.records.lock().await.insert(record.id, record);
        Ok(())
    }

    async fn remove(&self, id: VideoId) -> BridgeResult<()> {
        self.records.lock().await.remove(&id);
        Ok(())
    }

    async fn list_all(&self) -> BridgeResult<Vec<LocalRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn replace_groups(&self, groups: Vec<GroupRecord>) -> BridgeResult<()> {
        *self.groups.lock().await = groups;
        Ok(())
    }

    async fn list_groups(&self) -> BridgeResult<Vec<GroupRecord>> {
        Ok(self.groups.lock().await.clone())
    }
}

async fn reconciler(
    backend: Arc<FakeBackend>,
    store: Arc<MemoryStore>,
) -> SyncReconciler {
    let auth = AuthClient::new(backend, EventBus::new(64));
    auth.install_tokens(TokenSet::new("token", Utc::now() + Duration::hours(1), None))
        .await;
    let catalog = Arc::new(RemoteCatalog::new(Arc::new(auth), "https://rails.example"));
    SyncReconciler::new(catalog, store, EventBus::new(64))
}

fn stale_local(id: VideoId, revision: i64, modified: bool) -> LocalRecord {
    LocalRecord {
        id,
        revision,
        has_local_modifications: modified,
        payload: manifest(id, revision),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_remote_newer_triggers_exactly_one_download() {
    let x = VideoId::new();
    let backend = Arc::new(FakeBackend::new());
    backend.serve_video(x, 5).await;

    let store = Arc::new(MemoryStore::default());
    store.upsert(stale_local(x, 3, false)).await.unwrap();

    let reconciler = reconciler(backend.clone(), store.clone()).await;
    let report = reconciler.refresh_online().await.unwrap();
    assert!(report.is_success());

    let record = store.lookup(x).await.unwrap().unwrap();
    assert_eq!(record.revision, 5);
    assert!(!record.has_local_modifications);
    assert_eq!(backend.requests_to(&format!("videos/{}", x)).await, 1);
}

#[tokio::test]
async fn test_modified_local_uploads_and_never_downloads() {
    let y = VideoId::new();
    let backend = Arc::new(FakeBackend::new());
    backend.serve_video(y, 9).await;

    let store = Arc::new(MemoryStore::default());
    store.upsert(stale_local(y, 3, true)).await.unwrap();

    let reconciler = reconciler(backend.clone(), store.clone()).await;
    let report = reconciler.refresh_online().await.unwrap();
    assert!(report.is_success());

    // Canonical merged record persisted: server bumped our rev 3 to 4.
    let record = store.lookup(y).await.unwrap().unwrap();
    assert_eq!(record.revision, 4);
    assert!(!record.has_local_modifications);

    let traffic = backend.requests.lock().await.clone();
    let puts = traffic
        .iter()
        .filter(|(m, url)| *m == HttpMethod::Put && url.contains(&y.to_string()))
        .count();
    let gets = traffic
        .iter()
        .filter(|(m, url)| *m == HttpMethod::Get && url.contains(&y.to_string()))
        .count();
    assert_eq!(puts, 1);
    assert_eq!(gets, 0);
}

#[tokio::test]
async fn test_unknown_remote_item_is_downloaded() {
    let z = VideoId::new();
    let backend = Arc::new(FakeBackend::new());
    backend.serve_video(z, 1).await;

    let store = Arc::new(MemoryStore::default());
    let reconciler = reconciler(backend, store.clone()).await;
    reconciler.refresh_online().await.unwrap();

    assert_eq!(store.lookup(z).await.unwrap().unwrap().revision, 1);
}

#[tokio::test]
async fn test_in_sync_item_produces_no_traffic() {
    let x = VideoId::new();
    let backend = Arc::new(FakeBackend::new());
    backend.serve_video(x, 3).await;

    let store = Arc::new(MemoryStore::default());
    store.upsert(stale_local(x, 3, false)).await.unwrap();

    let reconciler = reconciler(backend.clone(), store).await;
    let report = reconciler.refresh_online().await.unwrap();
    assert!(report.is_success());
    assert_eq!(backend.requests_to(&format!("videos/{}", x)).await, 0);
}

#[tokio::test]
async fn test_failing_branch_does_not_stop_siblings() {
    let good = VideoId::new();
    let bad = VideoId::new();
    let mut backend = FakeBackend::new();
    backend.broken.push(bad);
    let backend = Arc::new(backend);
    backend.serve_video(good, 2).await;
    backend.serve_video(bad, 2).await;

    let store = Arc::new(MemoryStore::default());
    let reconciler = reconciler(backend, store.clone()).await;
    let report = reconciler.refresh_online().await.unwrap();

    // The broken branch is the only failure; the good one persisted.
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        report.errors[0],
        SyncError::Remote { status: 422, .. }
    ));
    assert!(store.lookup(good).await.unwrap().is_some());
    assert!(store.lookup(bad).await.unwrap().is_none());
}

#[tokio::test]
async fn test_groups_are_persisted_wholesale() {
    let mut backend = FakeBackend::new();
    backend.groups = json!({
        "groups": [
            {"id": "g1", "name": "Lab A", "videos": []},
            {"id": "g2", "name": "Lab B", "description": "second lab", "videos": []}
        ],
        "user": {"name": "tester"}
    });
    let backend = Arc::new(backend);

    let store = Arc::new(MemoryStore::default());
    let reconciler = reconciler(backend, store.clone()).await;
    reconciler.refresh_online().await.unwrap();

    let groups = store.list_groups().await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[1].description.as_deref(), Some("second lab"));
}

#[tokio::test]
async fn test_second_pass_while_running_is_rejected() {
    let mut backend = FakeBackend::new();
    backend.listing_gate = Some(Semaphore::new(0));
    let backend = Arc::new(backend);

    let store = Arc::new(MemoryStore::default());
    let reconciler = Arc::new(reconciler(backend.clone(), store).await);

    let first = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.refresh_online().await })
    };
    tokio::task::yield_now().await;

    let second = reconciler.refresh_online().await;
    assert!(matches!(second, Err(SyncError::AlreadyRunning)));

    backend.listing_gate.as_ref().unwrap().add_permits(1);
    assert!(first.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_refresh_video_conditional_download() {
    let x = VideoId::new();
    let backend = Arc::new(FakeBackend::new());
    backend.serve_video(x, 3).await;

    let store = Arc::new(MemoryStore::default());
    store.upsert(stale_local(x, 3, false)).await.unwrap();

    let reconciler = reconciler(backend.clone(), store.clone()).await;

    // Nothing newer: 304, record untouched.
    let record = reconciler.refresh_video(x).await.unwrap();
    assert_eq!(record.revision, 3);

    // Server advances; the next refresh picks it up.
    backend.manifests.lock().await.insert(x, manifest(x, 6));
    let record = reconciler.refresh_video(x).await.unwrap();
    assert_eq!(record.revision, 6);
    assert_eq!(store.lookup(x).await.unwrap().unwrap().revision, 6);
}

#[tokio::test]
async fn test_get_or_fetch_prefers_local() {
    let x = VideoId::new();
    let backend = Arc::new(FakeBackend::new());
    backend.serve_video(x, 8).await;

    let store = Arc::new(MemoryStore::default());
    store.upsert(stale_local(x, 2, false)).await.unwrap();

    let reconciler = reconciler(backend.clone(), store).await;
    let record = reconciler.get_or_fetch(x).await.unwrap();
    // Local wins even though the server is ahead; no traffic issued.
    assert_eq!(record.revision, 2);
    assert_eq!(backend.requests_to(&format!("videos/{}", x)).await, 0);
}

#[tokio::test]
async fn test_delete_pass_removes_remote_and_local() {
    let a = VideoId::new();
    let b = VideoId::new();
    let backend = Arc::new(FakeBackend::new());
    backend.serve_video(a, 1).await;
    backend.serve_video(b, 1).await;

    let store = Arc::new(MemoryStore::default());
    store.upsert(stale_local(a, 1, false)).await.unwrap();
    store.upsert(stale_local(b, 1, false)).await.unwrap();

    let reconciler = reconciler(backend.clone(), store.clone()).await;
    let report = reconciler.delete_videos(vec![a, b]).await.unwrap();
    assert!(report.is_success());

    assert!(store.lookup(a).await.unwrap().is_none());
    assert!(backend.manifests.lock().await.is_empty());
}
