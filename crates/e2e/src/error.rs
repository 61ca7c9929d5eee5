//! Error types for scenario harnessing

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Emulator failed to start: {0}")]
    EmulatorStartup(String),

    #[error("Health check for {url} failed after {attempts} attempts")]
    HealthCheck { url: String, attempts: usize },

    #[error("fern-mockd binary not found at {0}. Build it with: cargo build -p fern-mock-web")]
    MockdNotFound(PathBuf),

    #[error("Emulator {0} has not been started in this scenario")]
    NotStarted(&'static str),

    #[error("GraphQL error (HTTP {status}): {messages:?}")]
    Graphql { status: u16, messages: Vec<String> },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Emulator error: {0}")]
    Emulator(#[from] fern_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
