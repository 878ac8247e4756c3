//! OpenAI text-structuring oracle.

mod client;
mod config;

pub use client::OpenAiOracle;
pub use config::OpenAiConfig;
