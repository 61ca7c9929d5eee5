//! Standalone emulator server configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::graphql::GraphqlConfig;
use crate::jira::JiraConfig;
use crate::pm_tool::PmToolConfig;

/// Configuration for `fern-mockd`.
///
/// Every field has a default, so an empty (or absent) TOML file yields a
/// server running all three emulators on ephemeral loopback ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockServerConfig {
    /// Interface to bind
    pub host: String,

    pub jira: JiraConfig,

    pub graphql: GraphqlConfig,

    pub pm_tool: PmToolConfig,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            jira: JiraConfig::default(),
            graphql: GraphqlConfig::default(),
            pm_tool: PmToolConfig::default(),
        }
    }
}

impl MockServerConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
