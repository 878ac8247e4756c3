//! [`DocumentSource`] over a WebDAV collection.

use tokio::sync::Mutex;
use tracing::{debug, info};

use timetable_core::BoxFuture;

use crate::error::{ProviderError, ProviderResult};
use crate::source::{DocumentSource, RemoteDocument};

use super::client::WebDavClient;
use super::config::WebDavConfig;
use super::xml::{DavEntry, PROPFIND_BODY, parse_multistatus};

/// Lists and downloads the files of one WebDAV collection.
pub struct WebDavSource {
    client: Mutex<WebDavClient>,
    config: WebDavConfig,
}

impl WebDavSource {
    pub fn new(config: WebDavConfig) -> ProviderResult<Self> {
        let client = WebDavClient::new(config.clone())?;
        Ok(Self {
            client: Mutex::new(client),
            config,
        })
    }

    async fn list_collection(&self) -> ProviderResult<Vec<RemoteDocument>> {
        let url = self.config.url_str();
        debug!(url = %url, "listing collection via PROPFIND");

        let body = {
            let mut client = self.client.lock().await;
            client.propfind(url, PROPFIND_BODY, 1).await?
        };

        let documents: Vec<RemoteDocument> = parse_multistatus(&body)?
            .into_iter()
            .filter(|entry| !entry.is_collection)
            .filter(|entry| !self.is_collection_itself(&entry.href))
            .filter_map(|entry| self.to_document(entry))
            .collect();

        info!(count = documents.len(), "retrieved files from WebDAV");
        Ok(documents)
    }

    fn is_collection_itself(&self, href: &str) -> bool {
        let own = self.config.url.path().trim_end_matches('/');
        let href_path = self
            .config
            .resolve(href)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| href.to_string());
        href_path.trim_end_matches('/') == own
    }

    fn to_document(&self, entry: DavEntry) -> Option<RemoteDocument> {
        let url = self.config.resolve(&entry.href)?;
        let segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())?;
        let name = entry
            .display_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| {
                urlencoding::decode(segment)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            });

        Some(RemoteDocument {
            id: url.to_string(),
            name,
            size: entry.content_length,
        })
    }

    async fn download(&self, document: &RemoteDocument) -> ProviderResult<Vec<u8>> {
        debug!(document = %document.name, url = %document.id, "downloading");
        let bytes = {
            let mut client = self.client.lock().await;
            client.get(&document.id).await?
        };
        if bytes.is_empty() {
            return Err(ProviderError::invalid_response(format!(
                "{} downloaded as an empty file",
                document.name
            ))
            .with_provider("webdav"));
        }
        info!(document = %document.name, bytes = bytes.len(), "downloaded");
        Ok(bytes)
    }
}

impl DocumentSource for WebDavSource {
    fn name(&self) -> &str {
        "webdav"
    }

    fn list(&self) -> BoxFuture<'_, ProviderResult<Vec<RemoteDocument>>> {
        Box::pin(self.list_collection())
    }

    fn fetch<'a>(&'a self, document: &'a RemoteDocument) -> BoxFuture<'a, ProviderResult<Vec<u8>>> {
        Box::pin(self.download(document))
    }
}
