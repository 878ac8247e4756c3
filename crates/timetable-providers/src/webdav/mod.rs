//! WebDAV document source.
//!
//! Lists a collection with PROPFIND (Depth 1) and downloads files with GET,
//! authenticating with Digest or Basic as the server asks.
//!
//! ```ignore
//! use timetable_providers::webdav::{WebDavConfig, WebDavSource};
//! use timetable_providers::{DocumentSource, matching_documents};
//!
//! let config = WebDavConfig::new("https://files.example.org/webdav.php/ref_155901")?
//!     .with_credentials("user", "password");
//! let source = WebDavSource::new(config)?;
//! let listing = source.list().await?;
//! for doc in matching_documents(&listing, &["stundenplan".into(), "et".into()]) {
//!     let bytes = source.fetch(doc).await?;
//! }
//! ```

mod auth;
mod client;
mod config;
mod source;
mod xml;

pub use client::WebDavClient;
pub use config::{Credentials, WebDavConfig};
pub use source::WebDavSource;
pub use xml::{DavEntry, parse_multistatus};
