//! Core types and the timetable reconstruction pipeline.
//!
//! The pipeline turns the raw grid tables extracted from a timetable PDF into
//! discrete calendar events:
//!
//! ```text
//! RawTable[] ──► grid::normalize_tables ──► GridRow[]
//!                                              │
//!                  clean::clean_row(year) ◄────┘
//!                          │
//!                          ▼
//!                   NormalizedSlot[] ──► detect::MultiEventDetector
//!                                              │
//!                                              ▼
//!                          reconstruct::EventReconstructor ──► Event[]
//! ```
//!
//! The document year comes from the [`VersionStamp`] printed on the first page.

pub mod clean;
pub mod detect;
pub mod error;
pub mod grid;
pub mod model;
pub mod pipeline;
pub mod reconstruct;
pub mod retry;
pub mod schema;
pub mod tracing;
pub mod version;

pub use clean::{clean_row, clean_text, parse_date, parse_time_slot, split_lines};
pub use detect::{DEFAULT_MULTI_EVENT_THRESHOLD, LineCountDetector, MultiEventDetector};
pub use error::{CoreError, CoreResult, OracleError};
pub use grid::{GridOptions, normalize_tables};
pub use model::{AI_FAILURE_COURSE, Event, GridRow, NormalizedSlot, RawTable};
pub use pipeline::{Pipeline, PipelineConfig};
pub use reconstruct::{
    BoxFuture, EventReconstructor, OracleRecord, STRUCTURING_INSTRUCTION, Sleeper, TextOracle,
    TokioSleeper, instruction_with_lecturers,
};
pub use retry::{AttemptOutcome, RetryPolicy, RetryState};
pub use schema::{EventField, FieldSpec, SlotSchema};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use version::{VersionStamp, extract_version};
