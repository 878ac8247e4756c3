//! One document from raw tables to events.

use std::sync::Arc;

use chrono::Datelike;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::clean::clean_row;
use crate::detect::{DEFAULT_MULTI_EVENT_THRESHOLD, LineCountDetector, MultiEventDetector};
use crate::error::{CoreError, CoreResult};
use crate::grid::{GridOptions, normalize_tables};
use crate::model::{Event, NormalizedSlot, RawTable};
use crate::reconstruct::{EventReconstructor, Sleeper, TextOracle};
use crate::retry::RetryPolicy;
use crate::schema::SlotSchema;
use crate::version::{VersionStamp, extract_version};

/// Settings for a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub grid: GridOptions,
    pub schema: SlotSchema,
    /// Cells with more lines than this go to the oracle.
    pub multi_event_threshold: usize,
    pub retry: RetryPolicy,
    /// Inclusive year window; slots dated outside it are dropped.
    pub valid_years: Option<(i32, i32)>,
    pub known_lecturers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridOptions::default(),
            schema: SlotSchema::default(),
            multi_event_threshold: DEFAULT_MULTI_EVENT_THRESHOLD,
            retry: RetryPolicy::default(),
            valid_years: None,
            known_lecturers: Vec::new(),
        }
    }
}

/// Normalizes grid tables and reconstructs events, one document at a time.
pub struct Pipeline {
    config: PipelineConfig,
    detector: Box<dyn MultiEventDetector>,
    reconstructor: EventReconstructor,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let reconstructor = EventReconstructor::new(config.schema.clone())
            .with_policy(config.retry.clone())
            .with_known_lecturers(&config.known_lecturers);
        Self {
            detector: Box::new(LineCountDetector::new(config.multi_event_threshold)),
            config,
            reconstructor,
        }
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn TextOracle>) -> Self {
        self.reconstructor = self.reconstructor.with_oracle(oracle);
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.reconstructor = self.reconstructor.with_sleeper(sleeper);
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn MultiEventDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Flattens, cleans, filters and orders the cells of one document.
    ///
    /// Slots without a parseable date or outside `valid_years` are dropped;
    /// the rest are sorted by date and start time.
    pub fn normalize(&self, tables: &[RawTable], stamp: &VersionStamp) -> CoreResult<Vec<NormalizedSlot>> {
        let rows = normalize_tables(tables, &self.config.grid)?;
        let year = stamp.year();

        let mut slots: Vec<NormalizedSlot> = rows
            .iter()
            .map(|row| clean_row(row, year, self.detector.as_ref()))
            .filter(|slot| slot.date.is_some())
            .collect();

        if let Some((first, last)) = self.config.valid_years {
            let before = slots.len();
            slots.retain(|slot| {
                slot.date
                    .is_some_and(|d| (first..=last).contains(&d.year()))
            });
            if slots.len() < before {
                warn!(
                    dropped = before - slots.len(),
                    first, last, "dropped slots outside the valid year window"
                );
            }
        }

        slots.sort_by_key(|slot| (slot.date, slot.start_time));
        debug!(
            cells = rows.len(),
            slots = slots.len(),
            multi = slots.iter().filter(|s| s.is_multi).count(),
            "normalized document"
        );
        Ok(slots)
    }

    /// Runs the whole pipeline for tables whose version stamp is known.
    pub async fn run(
        &self,
        document: &str,
        tables: &[RawTable],
        stamp: &VersionStamp,
    ) -> CoreResult<Vec<Event>> {
        let span = info_span!("document", document = %document, version = %stamp);
        async {
            let slots = self.normalize(tables, stamp)?;
            let mut events = Vec::with_capacity(slots.len());
            for slot in &slots {
                events.extend(self.reconstructor.reconstruct(slot).await);
            }
            let failures = events.iter().filter(|e| e.is_failure()).count();
            if failures > 0 {
                warn!(failures, "some multi-event cells need manual review");
            }
            info!(slots = slots.len(), events = events.len(), "reconstructed events");
            Ok::<_, CoreError>(events)
        }
        .instrument(span)
        .await
    }

    /// Like [`run`](Self::run), reading the stamp from the first-page text.
    ///
    /// # Errors
    ///
    /// [`CoreError::MissingVersion`] when the text carries no stamp.
    pub async fn run_with_text(
        &self,
        document: &str,
        first_page_text: &str,
        tables: &[RawTable],
    ) -> CoreResult<(VersionStamp, Vec<Event>)> {
        let Some(stamp) = extract_version(first_page_text) else {
            warn!(document, "no version stamp, skipping document");
            return Err(CoreError::MissingVersion);
        };
        let events = self.run(document, tables, &stamp).await?;
        Ok((stamp, events))
    }
}
