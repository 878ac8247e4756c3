//! The default batch: download, reconstruct, write, sync.
//!
//! A new version is only committed to the [`VersionStore`] once its events
//! reached every calendar they belong to. A run that aborts leaves its
//! versions staged, so the next run picks them up again.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use timetable_core::{Event, Pipeline, VersionStamp};
use timetable_providers::pdf::TableExtractor;
use timetable_providers::{
    CalendarSink, DocumentSource, ProviderErrorCode, SyncReport, read_events_json,
};
use tracing::{debug, error, info, warn};

use super::download::{FetchedVersion, StampReader, fetch_new_versions, pdf_version_stamp, webdav_source};
use super::{build_pipeline, document_stem, reconstruct, write_outputs};
use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};
use crate::store::{StoredVersion, VersionStore};

/// Calendar sinks by calendar id, and which timetables feed each one.
///
/// Every sync replaces a whole window of a calendar, so timetables sharing a
/// calendar are always synced together.
#[derive(Default)]
pub struct Calendars {
    sinks: BTreeMap<String, Box<dyn CalendarSink>>,
    routes: BTreeMap<String, String>,
}

impl Calendars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `keys` to calendar `id`, served by `sink`.
    pub fn add<K: Into<String>>(
        &mut self,
        id: impl Into<String>,
        keys: impl IntoIterator<Item = K>,
        sink: Box<dyn CalendarSink>,
    ) {
        let id = id.into();
        for key in keys {
            self.routes.insert(key.into(), id.clone());
        }
        self.sinks.insert(id, sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn calendar_of(&self, key: &str) -> Option<&str> {
        self.routes.get(key).map(String::as_str)
    }

    fn keys_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.routes
            .iter()
            .filter(move |(_, calendar)| calendar.as_str() == id)
            .map(|(key, _)| key.as_str())
    }
}

/// Counters for one batch run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub unusable: usize,
    pub events: usize,
    /// Events carrying the oracle failure marker.
    pub needs_review: usize,
    /// Sync reports by calendar id.
    pub synced: Vec<(String, SyncReport)>,
    pub sync_failures: usize,
}

/// One PDF to reconstruct.
#[derive(Debug)]
struct WorkItem {
    key: String,
    document: String,
    stamp: VersionStamp,
    pdf: PathBuf,
    /// Downloaded this run and waiting to be committed.
    staged: bool,
    /// Unchanged timetable whose events are only needed because it shares
    /// a calendar with one that changed.
    companion: bool,
}

impl WorkItem {
    fn stored(key: &str, stored: StoredVersion, companion: bool) -> Self {
        Self {
            key: key.to_string(),
            document: stored
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            stamp: stored.stamp,
            pdf: stored.path,
            staged: false,
            companion,
        }
    }
}

/// Events collected for one calendar.
#[derive(Debug, Default)]
struct Outgoing {
    events: Vec<Event>,
    /// At least one timetable of this calendar has something new.
    changed: bool,
    /// A timetable of this calendar could not contribute its events.
    incomplete: bool,
}

/// Everything a batch run talks to.
pub struct Batch<'a> {
    pub config: &'a AppConfig,
    pub store: &'a VersionStore,
    pub source: &'a dyn DocumentSource,
    pub read_stamp: StampReader,
    pub extractor: &'a dyn TableExtractor,
    pub pipeline: &'a Pipeline,
    pub calendars: &'a Calendars,
}

impl Batch<'_> {
    /// Processes every new version, or with `force` the latest stored one
    /// of timetables without news.
    ///
    /// Unusable documents and failed calendar syncs are counted and logged;
    /// their versions stay staged and are retried next run. The run fails,
    /// committing nothing, when no document at all could be processed or a
    /// calendar needs authentication.
    pub async fn run(&self, force: bool) -> ClientResult<RunSummary> {
        let fetched = fetch_new_versions(self.source, self.config, self.store, self.read_stamp).await?;
        let staging = tempfile::tempdir()?;
        let mut work = self.plan(&fetched, force, staging.path())?;

        let mut summary = RunSummary::default();
        if work.is_empty() {
            info!("nothing to process");
            return Ok(summary);
        }
        let companions = self.companions(&work)?;
        work.extend(companions);

        let mut outgoing: BTreeMap<&str, Outgoing> = BTreeMap::new();
        let mut processed = Vec::new();
        for item in &work {
            let calendar = self.calendars.calendar_of(&item.key);
            let result = if item.companion {
                self.previous_events(item).await
            } else {
                self.process(item).await
            };
            match result {
                Ok(events) => {
                    if !item.companion {
                        summary.processed += 1;
                        summary.events += events.len();
                        summary.needs_review += events.iter().filter(|e| e.is_failure()).count();
                        processed.push(item);
                    }
                    if let Some(id) = calendar {
                        let out = outgoing.entry(id).or_default();
                        out.changed |= !item.companion;
                        out.events.extend(events);
                    }
                }
                Err(e) if item.companion => {
                    error!(key = %item.key, document = %item.document, error = %e, "cannot reload events of shared calendar");
                    if let Some(id) = calendar {
                        outgoing.entry(id).or_default().incomplete = true;
                    }
                }
                Err(e) => {
                    error!(key = %item.key, document = %item.document, error = %e, "document unusable");
                    summary.unusable += 1;
                }
            }
        }
        if summary.processed == 0 {
            return Err(ClientError::NothingUsable(
                work.iter().filter(|item| !item.companion).count(),
            ));
        }

        let mut failed = BTreeSet::new();
        for (id, out) in outgoing.iter().filter(|(_, out)| out.changed) {
            let Some(sink) = self.calendars.sinks.get(*id) else {
                continue;
            };
            if out.incomplete {
                error!(calendar = id, "a timetable of this calendar is missing, leaving it untouched");
                summary.sync_failures += 1;
                failed.insert(*id);
                continue;
            }
            if out.events.is_empty() {
                warn!(calendar = id, sink = sink.name(), "no events, leaving calendar untouched");
                continue;
            }
            match sink.sync(&out.events).await {
                Ok(report) => summary.synced.push((id.to_string(), report)),
                Err(e) if e.code() == ProviderErrorCode::AuthenticationFailed => {
                    return Err(ClientError::AuthRequired(e.to_string()));
                }
                Err(e) => {
                    error!(calendar = id, sink = sink.name(), error = %e, "calendar sync failed");
                    summary.sync_failures += 1;
                    failed.insert(*id);
                }
            }
        }

        for item in processed.into_iter().filter(|item| item.staged) {
            if self
                .calendars
                .calendar_of(&item.key)
                .is_some_and(|id| failed.contains(id))
            {
                warn!(key = %item.key, version = %item.stamp, "calendar not updated, version stays new");
                continue;
            }
            self.store.commit(&item.key, &item.stamp, &item.pdf)?;
        }
        Ok(summary)
    }

    fn plan(
        &self,
        fetched: &[FetchedVersion],
        force: bool,
        staging: &Path,
    ) -> ClientResult<Vec<WorkItem>> {
        let mut work = Vec::new();
        for (key, _) in self.config.enabled_timetables() {
            let mut found = false;
            for version in fetched.iter().filter(|v| &v.key == key) {
                found = true;
                // Dry runs do not stage, so the bytes go to a scratch directory.
                let (pdf, staged) = if version.path.exists() {
                    (version.path.clone(), true)
                } else {
                    let dir = staging.join(key).join(version.stamp.identifier());
                    std::fs::create_dir_all(&dir)?;
                    let pdf = dir.join(version.path.file_name().unwrap_or("timetable.pdf".as_ref()));
                    std::fs::write(&pdf, &version.bytes)?;
                    (pdf, false)
                };
                work.push(WorkItem {
                    key: key.clone(),
                    document: version.document.clone(),
                    stamp: version.stamp,
                    pdf,
                    staged,
                    companion: false,
                });
            }

            if !found && force {
                match self.store.latest(key)? {
                    Some(stored) => {
                        info!(key = %key, version = %stored.stamp, "reprocessing latest stored version");
                        work.push(WorkItem::stored(key, stored, false));
                    }
                    None => warn!(key = %key, "nothing stored to reprocess"),
                }
            }
        }
        Ok(work)
    }

    /// Latest stored versions of unchanged timetables that share a calendar
    /// with one in `work`.
    fn companions(&self, work: &[WorkItem]) -> ClientResult<Vec<WorkItem>> {
        let touched: BTreeSet<&str> = work
            .iter()
            .filter_map(|item| self.calendars.calendar_of(&item.key))
            .collect();
        let mut companions = Vec::new();
        for id in touched {
            for key in self.calendars.keys_of(id) {
                if work.iter().any(|item| item.key == key) {
                    continue;
                }
                match self.store.latest(key)? {
                    Some(stored) => {
                        debug!(key, calendar = id, version = %stored.stamp, "shares the calendar, reloading");
                        companions.push(WorkItem::stored(key, stored, true));
                    }
                    None => warn!(key, calendar = id, "shares the calendar but has no stored version"),
                }
            }
        }
        Ok(companions)
    }

    /// Events written for an earlier version, reconstructed again when the
    /// JSON output is missing.
    async fn previous_events(&self, item: &WorkItem) -> ClientResult<Vec<Event>> {
        let json = self
            .output_dir(item)
            .join(format!("{}_events.json", document_stem(Path::new(&item.document))));
        if json.is_file() {
            return Ok(read_events_json(&json)?);
        }
        self.process(item).await
    }

    async fn process(&self, item: &WorkItem) -> ClientResult<Vec<Event>> {
        let (tables, events) =
            reconstruct(self.pipeline, self.extractor, &item.document, &item.pdf, &item.stamp).await?;
        let stem = document_stem(Path::new(&item.document));
        for path in write_outputs(&self.config.paths, &self.output_dir(item), &stem, &tables, &events)? {
            info!(path = %path.display(), "wrote output");
        }
        Ok(events)
    }

    fn output_dir(&self, item: &WorkItem) -> PathBuf {
        self.config
            .paths
            .output_dir
            .join(&item.key)
            .join(item.stamp.identifier())
    }
}

#[cfg(feature = "google")]
fn calendars(config: &AppConfig) -> ClientResult<Calendars> {
    use timetable_providers::google::GoogleCalendarSink;

    let mut calendars = Calendars::new();
    let Some(google) = config.google_calendar.as_ref().filter(|g| g.enabled) else {
        return Ok(calendars);
    };

    let mut routes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, timetable) in config.enabled_timetables() {
        let id = timetable
            .calendar_id
            .as_ref()
            .or(google.calendar_id.as_ref())
            .ok_or_else(|| ClientError::config("[google_calendar] calendar_id is required"))?;
        routes.entry(id.clone()).or_default().push(key.clone());
    }

    for (id, keys) in routes {
        let settings = google
            .to_provider_config(Some(&id))
            .map_err(ClientError::Config)?;
        let mut sink = GoogleCalendarSink::new(settings)?;
        if config.general.dry_run {
            sink = sink.with_dry_run(
                config
                    .paths
                    .output_dir
                    .join(keys.join("+"))
                    .join("dry_run_output.csv"),
            );
        }
        if keys.len() > 1 {
            info!(calendar = %id, timetables = %keys.join(", "), "timetables share a calendar and are synced together");
        }
        calendars.add(id, keys, Box::new(sink));
    }
    Ok(calendars)
}

#[cfg(not(feature = "google"))]
fn calendars(_config: &AppConfig) -> ClientResult<Calendars> {
    Ok(Calendars::new())
}

/// `timetable run`
pub async fn run(config: &AppConfig, force: bool) -> ClientResult<()> {
    if config.timetables.is_empty() {
        return Err(ClientError::config("no [timetables.<key>] configured"));
    }
    if config.general.dry_run {
        info!("dry run: no versions are stored and calendars are not touched");
    }

    let source = webdav_source(config)?;
    let store = VersionStore::new(&config.paths.download_dir, config.general.dry_run);
    let extractor = config.table_extractor();
    let pipeline = build_pipeline(config)?;
    let calendars = calendars(config)?;

    let batch = Batch {
        config,
        store: &store,
        source: &source,
        read_stamp: pdf_version_stamp,
        extractor: &extractor,
        pipeline: &pipeline,
        calendars: &calendars,
    };
    let summary = batch.run(force).await?;

    println!(
        "{} document(s) processed, {} unusable, {} event(s), {} to review",
        summary.processed, summary.unusable, summary.events, summary.needs_review
    );
    for (calendar, report) in &summary.synced {
        println!(
            "{calendar}: {} deleted, {} created, {} failed{}",
            report.deleted,
            report.created,
            report.failed,
            if report.dry_run { " (dry run)" } else { "" }
        );
    }
    if summary.sync_failures > 0 {
        println!("{} calendar sync(s) failed, see log", summary.sync_failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::commands::download::tests::{MemorySource, config_with, text_stamp};
    use crate::commands::testing::FixedTables;
    use timetable_core::{BoxFuture, PipelineConfig};
    use timetable_providers::{ProviderError, ProviderResult};

    const STAMP: &str = "Version: 26.09.2024, 11:13 Uhr";
    const NEWER: &str = "Version: 02.10.2024, 09:30 Uhr";

    type Calls = Arc<Mutex<Vec<usize>>>;

    /// Records the number of events of every sync.
    struct RecordingSink {
        calls: Calls,
        fail_with: Option<ProviderErrorCode>,
    }

    impl CalendarSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn sync<'a>(&'a self, events: &'a [Event]) -> BoxFuture<'a, ProviderResult<SyncReport>> {
            Box::pin(async move {
                if let Some(code) = self.fail_with {
                    return Err(ProviderError::new(code, "rejected"));
                }
                self.calls.lock().unwrap().push(events.len());
                Ok(SyncReport {
                    created: events.len(),
                    ..SyncReport::default()
                })
            })
        }
    }

    fn calendar(keys: &[&str], calls: &Calls) -> Calendars {
        let mut calendars = Calendars::new();
        calendars.add(
            "plans@group.calendar.google.com",
            keys.iter().copied(),
            Box::new(RecordingSink {
                calls: calls.clone(),
                fail_with: None,
            }),
        );
        calendars
    }

    fn failing_calendar(code: ProviderErrorCode) -> Calendars {
        let mut calendars = Calendars::new();
        calendars.add(
            "plans@group.calendar.google.com",
            ["elm3"],
            Box::new(RecordingSink {
                calls: Calls::default(),
                fail_with: Some(code),
            }),
        );
        calendars
    }

    fn stamp(id: &str) -> VersionStamp {
        VersionStamp::from_identifier(id).unwrap()
    }

    struct Fixture {
        dir: tempfile::TempDir,
        config: AppConfig,
        pipeline: Pipeline,
    }

    impl Fixture {
        fn new(dry_run: bool) -> Self {
            Self::with_timetables(&[("elm3", "elm 3")], dry_run)
        }

        fn with_timetables(keys: &[(&str, &str)], dry_run: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = config_with(keys);
            config.general.dry_run = dry_run;
            config.paths.download_dir = dir.path().join("downloads");
            config.paths.output_dir = dir.path().join("output");
            Self {
                dir,
                config,
                pipeline: Pipeline::new(PipelineConfig::default()),
            }
        }

        fn store(&self) -> VersionStore {
            VersionStore::new(&self.config.paths.download_dir, self.config.general.dry_run)
        }

        async fn run(
            &self,
            source: &MemorySource,
            extractor: &FixedTables,
            calendars: &Calendars,
            force: bool,
        ) -> ClientResult<RunSummary> {
            let store = self.store();
            Batch {
                config: &self.config,
                store: &store,
                source,
                read_stamp: text_stamp,
                extractor,
                pipeline: &self.pipeline,
                calendars,
            }
            .run(force)
            .await
        }
    }

    #[tokio::test]
    async fn new_version_is_processed_and_synced() {
        let fx = Fixture::new(false);
        let source = MemorySource::new(&[("ELM 3.pdf", STAMP)]);
        let calls = Calls::default();
        let calendars = calendar(&["elm3"], &calls);

        let summary = fx
            .run(&source, &FixedTables::timetable(), &calendars, false)
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.needs_review, 0);
        assert_eq!(summary.synced.len(), 1);
        assert_eq!(summary.synced[0].1.created, 2);

        let json = fx
            .config
            .paths
            .output_dir
            .join("elm3/2024-09-26_11-13/ELM 3_events.json");
        assert!(json.exists());
        assert!(fx.store().seen("elm3", &stamp("2024-09-26_11-13")));

        let again = fx
            .run(&source, &FixedTables::timetable(), &calendars, false)
            .await
            .unwrap();
        assert_eq!(again.processed, 0);
        assert!(again.synced.is_empty());
        assert_eq!(*calls.lock().unwrap(), [2]);
    }

    #[tokio::test]
    async fn force_reprocesses_latest_stored_version() {
        let fx = Fixture::new(false);
        let source = MemorySource::new(&[("ELM 3.pdf", STAMP)]);
        let calendars = Calendars::new();
        fx.run(&source, &FixedTables::timetable(), &calendars, false)
            .await
            .unwrap();

        let forced = fx
            .run(&source, &FixedTables::timetable(), &calendars, true)
            .await
            .unwrap();
        assert_eq!(forced.processed, 1);
        assert_eq!(forced.events, 2);
    }

    #[tokio::test]
    async fn dry_run_stages_without_storing() {
        let fx = Fixture::new(true);
        let source = MemorySource::new(&[("ELM 3.pdf", STAMP)]);
        let summary = fx
            .run(&source, &FixedTables::timetable(), &Calendars::new(), false)
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert!(!fx.config.paths.download_dir.exists());
        assert!(fx.dir.path().join("output/elm3/2024-09-26_11-13/ELM 3_events.json").exists());
    }

    #[tokio::test]
    async fn unusable_run_leaves_the_version_new() {
        let fx = Fixture::new(false);
        let source = MemorySource::new(&[("ELM 3.pdf", STAMP)]);
        let broken = FixedTables { tables: None };
        let err = fx
            .run(&source, &broken, &Calendars::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NothingUsable(1)));
        assert!(!fx.store().seen("elm3", &stamp("2024-09-26_11-13")));

        let retry = fx
            .run(&source, &FixedTables::timetable(), &Calendars::new(), false)
            .await
            .unwrap();
        assert_eq!(retry.processed, 1);
        assert!(fx.store().seen("elm3", &stamp("2024-09-26_11-13")));
    }

    #[tokio::test]
    async fn missing_authentication_leaves_the_version_new() {
        let fx = Fixture::new(false);
        let source = MemorySource::new(&[("ELM 3.pdf", STAMP)]);
        let err = fx
            .run(
                &source,
                &FixedTables::timetable(),
                &failing_calendar(ProviderErrorCode::AuthenticationFailed),
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthRequired(_)));
        assert!(!fx.store().seen("elm3", &stamp("2024-09-26_11-13")));

        let calls = Calls::default();
        let retry = fx
            .run(&source, &FixedTables::timetable(), &calendar(&["elm3"], &calls), false)
            .await
            .unwrap();
        assert_eq!(retry.processed, 1);
        assert_eq!(*calls.lock().unwrap(), [2]);
    }

    #[tokio::test]
    async fn failed_sync_is_counted_and_retried() {
        let fx = Fixture::new(false);
        let source = MemorySource::new(&[("ELM 3.pdf", STAMP)]);
        let summary = fx
            .run(
                &source,
                &FixedTables::timetable(),
                &failing_calendar(ProviderErrorCode::ServerError),
                false,
            )
            .await
            .unwrap();
        assert_eq!(summary.sync_failures, 1);
        assert!(!fx.store().seen("elm3", &stamp("2024-09-26_11-13")));

        let calls = Calls::default();
        let retry = fx
            .run(&source, &FixedTables::timetable(), &calendar(&["elm3"], &calls), false)
            .await
            .unwrap();
        assert_eq!(retry.sync_failures, 0);
        assert_eq!(*calls.lock().unwrap(), [2]);
    }

    #[tokio::test]
    async fn shared_calendar_gets_every_timetable() {
        let fx = Fixture::with_timetables(&[("elm3", "elm 3"), ("elm5", "elm 5")], false);
        let calls = Calls::default();
        let calendars = calendar(&["elm3", "elm5"], &calls);

        let both = MemorySource::new(&[("ELM 3.pdf", STAMP), ("ELM 5.pdf", STAMP)]);
        let summary = fx
            .run(&both, &FixedTables::timetable(), &calendars, false)
            .await
            .unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.synced.len(), 1);

        // Only ELM 3 changes; ELM 5's events are reloaded from its last output.
        let one_new = MemorySource::new(&[("ELM 3.pdf", NEWER), ("ELM 5.pdf", STAMP)]);
        let summary = fx
            .run(&one_new, &FixedTables::timetable(), &calendars, false)
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.events, 2);
        assert_eq!(*calls.lock().unwrap(), [4, 4]);
        assert!(fx.store().seen("elm3", &stamp("2024-10-02_09-30")));
    }

    #[tokio::test]
    async fn nothing_new_is_not_an_error() {
        let fx = Fixture::new(false);
        let source = MemorySource::new(&[("Aushang.pdf", STAMP)]);
        let summary = fx
            .run(&source, &FixedTables::timetable(), &Calendars::new(), false)
            .await
            .unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.unusable, 0);
    }
}
