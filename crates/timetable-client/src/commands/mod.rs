//! Command implementations and the helpers they share.

#[cfg(feature = "google")]
pub mod auth;
pub mod config;
pub mod download;
pub mod parse;
#[cfg(feature = "google")]
pub mod push;
pub mod run;
pub mod version;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use timetable_core::{CoreError, Event, Pipeline, RawTable, VersionStamp};
use timetable_providers::openai::OpenAiOracle;
use timetable_providers::pdf::{TableExtractor, save_raw_tables};
use timetable_providers::{ProviderResult, write_events_csv, write_events_json};
use tracing::{info, warn};

use crate::config::{AppConfig, PathSettings};
use crate::error::{ClientError, ClientResult};

/// Builds the pipeline, wiring in the OpenAI oracle when a key is configured.
pub fn build_pipeline(config: &AppConfig) -> ClientResult<Pipeline> {
    let pipeline = Pipeline::new(config.pipeline_config());
    match config.openai_config().map_err(ClientError::Config)? {
        Some(openai) => {
            info!(model = %openai.model, "using OpenAI for multi-event cells");
            Ok(pipeline.with_oracle(Arc::new(OpenAiOracle::new(openai)?)))
        }
        None => {
            warn!("no [openai] api_key configured, multi-event cells will be marked as failures");
            Ok(pipeline)
        }
    }
}

/// Extracts the tables of one PDF and reconstructs its events.
///
/// A PDF without tables is unusable and reported as
/// [`CoreError::EmptyTable`].
pub async fn reconstruct(
    pipeline: &Pipeline,
    extractor: &dyn TableExtractor,
    document: &str,
    pdf: &Path,
    stamp: &VersionStamp,
) -> ClientResult<(Vec<RawTable>, Vec<Event>)> {
    let tables = extractor.extract(pdf).await?;
    if tables.is_empty() {
        warn!(document, extractor = extractor.name(), "no tables found");
        return Err(CoreError::EmptyTable.into());
    }
    let events = pipeline.run(document, &tables, stamp).await?;
    Ok((tables, events))
}

/// Writes the outputs enabled in `[paths]` as `<dir>/<stem>_events.*`.
pub fn write_outputs(
    paths: &PathSettings,
    dir: &Path,
    stem: &str,
    tables: &[RawTable],
    events: &[Event],
) -> ProviderResult<Vec<PathBuf>> {
    let mut written = Vec::new();
    if paths.save_json {
        let path = dir.join(format!("{stem}_events.json"));
        write_events_json(events, &path)?;
        written.push(path);
    }
    if paths.save_csv && !events.is_empty() {
        let path = dir.join(format!("{stem}_events.csv"));
        write_events_csv(events, &path)?;
        written.push(path);
    }
    if paths.save_raw_tables {
        written.extend(save_raw_tables(tables, &dir.join(format!("{stem}_tables")))?);
    }
    Ok(written)
}

/// File stem used for output names, `timetable` when the path has none.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "timetable".to_string())
}
