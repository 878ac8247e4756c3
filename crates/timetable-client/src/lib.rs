//! The `timetable` binary's library half.
//!
//! [`commands::run`] drives a batch: new versions are downloaded into the
//! [`VersionStore`], reconstructed by the core pipeline and pushed to the
//! configured calendars. The other subcommands expose single steps.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
pub mod store;

pub use cli::Cli;
pub use config::AppConfig;
pub use error::{ClientError, ClientResult};
pub use store::{StoredVersion, VersionStore};
