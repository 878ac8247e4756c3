//! Configuration commands.

use std::path::Path;

use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the effective configuration to stdout.
///
/// Secret references are printed as written, never resolved.
pub fn dump(config: &AppConfig, path: Option<&Path>) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", config_path(path).display());
    println!("{}", toml_str);
    Ok(())
}

/// Validate the configuration without network access.
pub fn validate(config: &AppConfig) -> ClientResult<()> {
    config.validate().map_err(ClientError::Config)?;
    if config.timetables.is_empty() {
        println!("warning: no [timetables.<key>] configured, `run` has nothing to do");
    }
    if config.openai.as_ref().and_then(|o| o.api_key.as_ref()).is_none() {
        println!("warning: no [openai] api_key, multi-event cells will be marked for review");
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: Option<&Path>) -> ClientResult<()> {
    println!("config: {}", config_path(path).display());
    Ok(())
}

fn config_path(path: Option<&Path>) -> std::path::PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_path)
}
