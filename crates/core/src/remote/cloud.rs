//! reqwest-backed implementation of the remote library contract.
//!
//! Endpoint shape: `POST {base}/session/refresh` with account credentials,
//! `GET {base}/records/assets` for the joined content/master catalog,
//! `GET {base}/records/albums` for the album list. Download URLs come from
//! the content records and are fetched as-is.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::errors::RemoteError;

use super::{AlbumRecord, AssetContentRecord, AssetMasterRecord, RemoteLibrary};

/// Asynchronous client for the remote photo library API.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct AssetCatalogResponse {
    content: Vec<AssetContentRecord>,
    master: Vec<AssetMasterRecord>,
}

impl CloudClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("photosync/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .expect("failed to build reqwest client");
        info!(base_url = %base_url, "created CloudClient");
        Self {
            http,
            base_url,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Map a non-success status into the transport taxonomy.
    fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(RemoteError::from_status(status.as_u16()))
        }
    }
}

#[async_trait]
impl RemoteLibrary for CloudClient {
    #[instrument(skip(self))]
    async fn fetch_all_assets(
        &self,
    ) -> Result<(Vec<AssetContentRecord>, Vec<AssetMasterRecord>), RemoteError> {
        let url = format!("{}/records/assets", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(RemoteError::from_transport)?;
        let catalog: AssetCatalogResponse = Self::check_status(resp)?
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        debug!(
            content = catalog.content.len(),
            master = catalog.master.len(),
            "fetched asset catalog"
        );
        Ok((catalog.content, catalog.master))
    }

    #[instrument(skip(self))]
    async fn fetch_all_albums(&self) -> Result<Vec<AlbumRecord>, RemoteError> {
        let url = format!("{}/records/albums", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(RemoteError::from_transport)?;
        let records: Vec<AlbumRecord> = Self::check_status(resp)?
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        debug!(count = records.len(), "fetched album records");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn refresh_session(&self) -> Result<(), RemoteError> {
        let url = format!("{}/session/refresh", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await
            .map_err(RemoteError::from_transport)?;

        let status = resp.status().as_u16();
        if status == 401 || status == 403 {
            // Credentials were rejected outright; retrying cannot help.
            return Err(RemoteError::AuthenticationFailed(format!(
                "remote rejected credentials for {} (HTTP {status})",
                self.username
            )));
        }
        Self::check_status(resp)?;
        info!("remote session refreshed");
        Ok(())
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(RemoteError::from_transport)?;
        let bytes = Self::check_status(resp)?
            .bytes()
            .await
            .map_err(RemoteError::from_transport)?;
        Ok(bytes.to_vec())
    }
}
