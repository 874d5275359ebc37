//! # Remote Catalog
//!
//! Thin wire client for the content backend, issued through
//! [`AuthClient`] so every call carries credentials and the
//! refresh-and-retry policy.
//!
//! Paths follow the backend's JSON routes: `videos.json` for the
//! revision listing, `videos/{uuid}.json` for manifests, and
//! `groups/own.json` for the caller's group memberships.

use crate::error::{Result, SyncError};
use crate::types::{ContentRevision, GroupListing, RevisionListing};
use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::{GroupRecord, VideoId};
use core_auth::AuthClient;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct RemoteCatalog {
    auth: Arc<AuthClient>,
    base_url: String,
}

impl RemoteCatalog {
    pub fn new(auth: Arc<AuthClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { auth, base_url }
    }

    /// Revision listing for the authenticated user.
    #[instrument(skip(self))]
    pub async fn list_videos(&self) -> Result<Vec<ContentRevision>> {
        let request = HttpRequest::new(HttpMethod::Get, self.url("videos.json"));
        let response = self.auth.authorized_request(request).await?;
        let response = expect_success(response, "list videos")?;
        let listing: RevisionListing = parse_json(&response)?;
        debug!(count = listing.videos.len(), "remote revision listing fetched");
        Ok(listing.videos)
    }

    /// Full manifest for one id.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_video(&self, id: VideoId) -> Result<serde_json::Value> {
        let request = HttpRequest::new(HttpMethod::Get, self.url(&format!("videos/{}.json", id)));
        let response = self.auth.authorized_request(request).await?;
        let response = expect_success(response, "get video")?;
        parse_json(&response)
    }

    /// Manifest for `id` only if the server holds a revision newer than
    /// `revision`; `None` when the server answers 304.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_video_if_newer(
        &self,
        id: VideoId,
        revision: i64,
    ) -> Result<Option<serde_json::Value>> {
        let url = self.url(&format!("videos/{}.json?newer_than_rev={}", id, revision));
        let request = HttpRequest::new(HttpMethod::Get, url);
        let response = self.auth.authorized_request(request).await?;
        if response.status == 304 {
            debug!("no newer revision on server");
            return Ok(None);
        }
        let response = expect_success(response, "get video if newer")?;
        parse_json(&response).map(Some)
    }

    /// Pushes a manifest; the response is the server's canonical merged
    /// manifest, carrying the authoritative revision.
    #[instrument(skip(self, manifest), fields(id = %id))]
    pub async fn put_video(
        &self,
        id: VideoId,
        manifest: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request = HttpRequest::new(HttpMethod::Put, self.url(&format!("videos/{}.json", id)))
            .json(manifest)
            .map_err(|e| SyncError::UnexpectedResponse(e.to_string()))?;
        let response = self.auth.authorized_request(request).await?;
        let response = expect_success(response, "put video")?;
        parse_json(&response)
    }

    /// Deletes one id remotely.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_video(&self, id: VideoId) -> Result<()> {
        let request =
            HttpRequest::new(HttpMethod::Delete, self.url(&format!("videos/{}.json", id)));
        let response = self.auth.authorized_request(request).await?;
        expect_success(response, "delete video")?;
        Ok(())
    }

    /// Group/membership listing for the authenticated user.
    #[instrument(skip(self))]
    pub async fn get_groups(&self) -> Result<Vec<GroupRecord>> {
        let request = HttpRequest::new(HttpMethod::Get, self.url("groups/own.json"));
        let response = self.auth.authorized_request(request).await?;
        let response = expect_success(response, "list groups")?;
        let listing: GroupListing = parse_json(&response)?;
        Ok(listing.groups)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn expect_success(response: HttpResponse, context: &str) -> Result<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(SyncError::Remote {
            status: response.status,
            context: context.to_string(),
        })
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    response
        .json()
        .map_err(|e| SyncError::UnexpectedResponse(e.to_string()))
}
