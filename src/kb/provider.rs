// src/kb/provider.rs
// Document provider is an external collaborator (design doc §1): the sync
// job only needs to list remote documents under a root folder and fetch
// raw bytes for one. The concrete vendor (Google Drive, Notion, a plain
// file share, ...) is swappable behind this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

use super::types::MimeKind;

#[derive(Debug, Clone)]
pub struct RemoteDocumentMeta {
    pub external_id: String,
    pub title: String,
    pub folder_path: String,
    pub mime_kind: MimeKind,
    pub external_mtime: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Enumerate documents under `root_folder_id` (design doc §4.2 step 1).
    async fn list_documents(&self, root_folder_id: &str) -> CoreResult<Vec<RemoteDocumentMeta>>;

    /// Fetch raw bytes for one document (design doc §4.2 step 3).
    async fn fetch_content(&self, external_id: &str) -> CoreResult<Vec<u8>>;
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    id: String,
    name: String,
    folder_path: String,
    mime_kind: String,
    modified_at: i64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    documents: Vec<ListEntry>,
}

/// HTTP document provider speaking a generic JSON list+fetch protocol.
/// Stands in for whichever real document store (Drive, SharePoint, ...)
/// a deployment points `KB_ROOT_FOLDER_ID` at.
pub struct HttpDocumentProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl HttpDocumentProvider {
    pub fn new(api_base: String, api_key: String) -> Self {
        Self { client: reqwest::Client::new(), api_base, api_key }
    }
}

#[async_trait]
impl DocumentProvider for HttpDocumentProvider {
    async fn list_documents(&self, root_folder_id: &str) -> CoreResult<Vec<RemoteDocumentMeta>> {
        let url = format!("{}/folders/{}/documents", self.api_base, root_folder_id);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimited { retry_after_secs: 60 });
        }
        if !response.status().is_success() {
            return Err(CoreError::UpstreamPermanent(format!(
                "document provider responded {}",
                response.status()
            )));
        }

        let parsed: ListResponse = response.json().await?;
        Ok(parsed
            .documents
            .into_iter()
            .map(|e| RemoteDocumentMeta {
                external_id: e.id,
                title: e.name,
                folder_path: e.folder_path,
                mime_kind: MimeKind::from_str_loose(&e.mime_kind),
                external_mtime: DateTime::from_timestamp(e.modified_at, 0).unwrap_or_else(Utc::now),
            })
            .collect())
    }

    async fn fetch_content(&self, external_id: &str) -> CoreResult<Vec<u8>> {
        let url = format!("{}/documents/{}/content", self.api_base, external_id);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CoreError::NotFound(format!("document {external_id} not found")));
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimited { retry_after_secs: 60 });
        }
        if !response.status().is_success() {
            return Err(CoreError::UpstreamPermanent(format!(
                "document provider responded {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
