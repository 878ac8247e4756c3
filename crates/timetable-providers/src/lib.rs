//! Adapters between the reconstruction pipeline and the outside world.
//!
//! - [`DocumentSource`] - where timetable PDFs come from (WebDAV)
//! - [`pdf`] - first-page text and grid table extraction
//! - [`openai`] - the text oracle that splits multi-event cells
//! - [`CalendarSink`] - where events go (Google Calendar, local files)
//! - [`ProviderError`] - error type shared by all adapters
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  WebDAV share   │
//! └────────┬────────┘
//!          │ DocumentSource
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │  PDF bytes      │────▶│ TableExtractor  │
//! └────────┬────────┘     └────────┬────────┘
//!          │ first_page_text       │ RawTable
//!          ▼                       ▼
//!    ┌───────────────────────────────────┐     ┌──────────────┐
//!    │      timetable_core::Pipeline     │◀───▶│ OpenAiOracle │
//!    └─────────────────┬─────────────────┘     └──────────────┘
//!                      │ Event
//!                      ▼
//!            ┌───────────────────┐
//!            │   CalendarSink    │
//!            └───────────────────┘
//! ```

pub mod error;
#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod sink;
pub mod source;
#[cfg(feature = "webdav")]
pub mod webdav;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use sink::{CalendarSink, SyncReport, read_events_json, write_events_csv, write_events_json};
pub use source::{DocumentSource, RemoteDocument, matching_documents};
