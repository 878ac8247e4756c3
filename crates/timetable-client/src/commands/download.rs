//! Version detection and download.

use std::path::PathBuf;

use timetable_core::{AttemptOutcome, RetryPolicy, RetryState, VersionStamp, extract_version};
use timetable_providers::pdf::first_page_text;
use timetable_providers::webdav::WebDavSource;
use timetable_providers::{DocumentSource, ProviderResult, RemoteDocument, matching_documents};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::{AppConfig, TimetableSettings};
use crate::error::{ClientError, ClientResult};
use crate::store::VersionStore;

/// Reads the version stamp out of downloaded bytes.
pub type StampReader = fn(&[u8]) -> ProviderResult<Option<VersionStamp>>;

/// A document whose version stamp had not been seen before.
#[derive(Debug, Clone)]
pub struct FetchedVersion {
    pub key: String,
    pub document: String,
    pub stamp: VersionStamp,
    /// Where the PDF was staged; not written in dry-run mode.
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Stamp printed on the first page of a PDF.
pub fn pdf_version_stamp(bytes: &[u8]) -> ProviderResult<Option<VersionStamp>> {
    Ok(extract_version(&first_page_text(bytes)?))
}

/// Lists the source once and stages every new version of every enabled
/// timetable.
///
/// Staged versions still count as new until [`VersionStore::commit`] is
/// called for them.
///
/// Failing to list is fatal. Transient download failures are retried on the
/// default [`RetryPolicy`]; a document that still cannot be downloaded, or
/// cannot be read or stamped, is logged and skipped.
pub async fn fetch_new_versions(
    source: &dyn DocumentSource,
    config: &AppConfig,
    store: &VersionStore,
    read_stamp: StampReader,
) -> ClientResult<Vec<FetchedVersion>> {
    let listing = source.list().await?;
    info!(source = source.name(), files = listing.len(), "listed documents");

    let mut fetched = Vec::new();
    for (key, timetable) in config.enabled_timetables() {
        let span = info_span!("timetable", key = %key);
        let found = fetch_timetable(source, &listing, key, timetable, store, read_stamp)
            .instrument(span)
            .await?;
        fetched.extend(found);
    }
    Ok(fetched)
}

async fn fetch_timetable(
    source: &dyn DocumentSource,
    listing: &[RemoteDocument],
    key: &str,
    timetable: &TimetableSettings,
    store: &VersionStore,
    read_stamp: StampReader,
) -> ClientResult<Vec<FetchedVersion>> {
    let matches = matching_documents(listing, &timetable.keywords);
    if matches.is_empty() {
        warn!("no document matches the configured keywords");
    }

    let mut fetched = Vec::new();
    for document in matches {
        let bytes = match fetch_document(source, document).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(document = %document.name, error = %e, "download failed");
                continue;
            }
        };
        let stamp = match read_stamp(&bytes) {
            Ok(Some(stamp)) => stamp,
            Ok(None) => {
                warn!(document = %document.name, "no version stamp, skipping document");
                continue;
            }
            Err(e) => {
                warn!(document = %document.name, error = %e, "unreadable document");
                continue;
            }
        };
        if store.seen(key, &stamp) {
            info!(document = %document.name, version = %stamp, "version already processed");
            continue;
        }

        let path = store.stage(key, &stamp, &document.name, &bytes)?;
        info!(document = %document.name, version = %stamp, "new version");
        fetched.push(FetchedVersion {
            key: key.to_string(),
            document: document.name.clone(),
            stamp,
            path,
            bytes,
        });
    }
    Ok(fetched)
}

async fn fetch_document(
    source: &dyn DocumentSource,
    document: &RemoteDocument,
) -> ProviderResult<Vec<u8>> {
    let policy = RetryPolicy::default();
    let mut state = RetryState::Pending;
    loop {
        let err = match source.fetch(document).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };
        let outcome = if err.is_retryable() {
            AttemptOutcome::Transient
        } else {
            AttemptOutcome::Unusable
        };
        let (next, delay) = policy.advance(state, outcome);
        if next.is_terminal() {
            return Err(err);
        }
        debug!(document = %document.name, error = %err, ?delay, "download failed, retrying");
        tokio::time::sleep(delay).await;
        state = next;
    }
}

/// Builds the WebDAV source from `[webdav]`.
pub fn webdav_source(config: &AppConfig) -> ClientResult<WebDavSource> {
    let webdav = config.webdav_config().map_err(ClientError::Config)?;
    Ok(WebDavSource::new(webdav)?)
}

/// `timetable download`
pub async fn download(config: &AppConfig) -> ClientResult<()> {
    if config.timetables.is_empty() {
        return Err(ClientError::config("no [timetables.<key>] configured"));
    }
    let source = webdav_source(config)?;
    let store = VersionStore::new(&config.paths.download_dir, config.general.dry_run);

    let fetched = fetch_new_versions(&source, config, &store, pdf_version_stamp).await?;
    if fetched.is_empty() {
        println!("No new versions.");
    }
    for version in &fetched {
        let path = store.commit(&version.key, &version.stamp, &version.path)?;
        println!("{}: {} ({})", version.key, version.stamp, path.display());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use timetable_core::BoxFuture;
    use timetable_providers::ProviderError;

    /// Treats the bytes as first-page text; `%broken` marks an unreadable file.
    pub fn text_stamp(bytes: &[u8]) -> ProviderResult<Option<VersionStamp>> {
        let text = String::from_utf8_lossy(bytes);
        if text.starts_with("%broken") {
            return Err(ProviderError::invalid_response("not a readable PDF").with_provider("pdf"));
        }
        Ok(extract_version(&text))
    }

    /// In-memory source; ids listed in `broken` fail to download.
    pub struct MemorySource {
        pub files: BTreeMap<String, Vec<u8>>,
        pub broken: Vec<String>,
        pub fetches: AtomicUsize,
    }

    impl MemorySource {
        pub fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(name, text)| (name.to_string(), text.as_bytes().to_vec()))
                    .collect(),
                broken: Vec::new(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl DocumentSource for MemorySource {
        fn name(&self) -> &str {
            "memory"
        }

        fn list(&self) -> BoxFuture<'_, ProviderResult<Vec<RemoteDocument>>> {
            Box::pin(async move {
                Ok(self
                    .files
                    .keys()
                    .map(|name| RemoteDocument::new(name.clone(), name.clone()))
                    .collect())
            })
        }

        fn fetch<'a>(
            &'a self,
            document: &'a RemoteDocument,
        ) -> BoxFuture<'a, ProviderResult<Vec<u8>>> {
            Box::pin(async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                if self.broken.contains(&document.id) {
                    return Err(ProviderError::network("connection reset").with_provider("memory"));
                }
                self.files
                    .get(&document.id)
                    .cloned()
                    .ok_or_else(|| ProviderError::not_found(document.id.clone()))
            })
        }
    }

    /// One timetable per `(key, keyword)` pair.
    pub fn config_with(keys: &[(&str, &str)]) -> AppConfig {
        let mut config = AppConfig::default();
        for (key, keyword) in keys {
            config.timetables.insert(
                key.to_string(),
                TimetableSettings {
                    keywords: vec![keyword.to_string()],
                    calendar_id: None,
                    enabled: true,
                },
            );
        }
        config
    }

    #[tokio::test]
    async fn new_versions_stay_new_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path(), false);
        let source = MemorySource::new(&[
            ("Stundenplan ELM 3.pdf", "Version: 26.09.2024, 11:13 Uhr"),
            ("Stundenplan ET 1.pdf", "Version: 01.10.2024, 08:00 Uhr"),
            ("Aushang.pdf", "nothing here"),
        ]);
        let config = config_with(&[("elm3", "elm 3"), ("et1", "et 1")]);

        let fetched = fetch_new_versions(&source, &config, &store, text_stamp)
            .await
            .unwrap();
        let summary: Vec<_> = fetched
            .iter()
            .map(|f| (f.key.as_str(), f.stamp.identifier()))
            .collect();
        assert_eq!(
            summary,
            [
                ("elm3", "2024-09-26_11-13".to_string()),
                ("et1", "2024-10-01_08-00".to_string())
            ]
        );
        assert!(fetched[0].path.exists());

        let again = fetch_new_versions(&source, &config, &store, text_stamp)
            .await
            .unwrap();
        assert_eq!(again.len(), 2);

        for version in &again {
            store.commit(&version.key, &version.stamp, &version.path).unwrap();
        }
        let after_commit = fetch_new_versions(&source, &config, &store, text_stamp)
            .await
            .unwrap();
        assert!(after_commit.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn per_document_failures_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path(), false);
        let mut source = MemorySource::new(&[
            ("ELM 3 alt.pdf", "Version: 26.09.2024, 11:13 Uhr"),
            ("ELM 3 kaputt.pdf", "%broken"),
            ("ELM 3 ohne.pdf", "Stundenplan"),
            ("ELM 3 neu.pdf", "Version: 02.10.2024, 09:30 Uhr"),
        ]);
        source.broken.push("ELM 3 neu.pdf".to_string());
        let config = config_with(&[("elm3", "elm 3")]);

        let fetched = fetch_new_versions(&source, &config, &store, text_stamp)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].document, "ELM 3 alt.pdf");
        // The connection reset is retried twice, the others are fetched once.
        assert_eq!(source.fetches.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn missing_documents_are_not_retried() {
        let source = MemorySource::new(&[]);
        let ghost = RemoteDocument::new("ghost.pdf", "ghost.pdf");
        let err = fetch_document(&source, &ghost).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dry_run_does_not_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path(), true);
        let source = MemorySource::new(&[("ELM 3.pdf", "Version: 26.09.2024, 11:13 Uhr")]);
        let config = config_with(&[("elm3", "elm 3")]);

        let first = fetch_new_versions(&source, &config, &store, text_stamp)
            .await
            .unwrap();
        let second = fetch_new_versions(&source, &config, &store, text_stamp)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(!first[0].path.exists());
    }

    #[test]
    fn garbage_is_not_a_pdf() {
        assert!(pdf_version_stamp(b"plain text").is_err());
    }
}
