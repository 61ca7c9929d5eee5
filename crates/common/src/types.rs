//! PM connector data model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Connector lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorStatus {
    #[default]
    Inactive,
    Active,
    Error,
}

/// Result of the last connection test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// A configured link from the platform to an external PM tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PmConnector {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub status: ConnectorStatus,
    pub health_status: HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    /// Minutes between scheduled syncs
    pub sync_interval: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub requirement_count: u32,
    pub has_credentials: bool,
    pub can_manage: bool,
}

impl PmConnector {
    pub fn new(id: String, input: ConnectorInput) -> Self {
        Self {
            id,
            name: input.name,
            kind: input.kind,
            base_url: input.base_url,
            status: ConnectorStatus::Inactive,
            health_status: HealthStatus::Unknown,
            last_health_check: None,
            sync_interval: input.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL_MINUTES),
            last_sync_at: None,
            next_sync_at: None,
            requirement_count: 0,
            has_credentials: false,
            can_manage: true,
        }
    }

    /// Record a completed sync at `at`.
    pub fn mark_synced(&mut self, at: DateTime<Utc>, requirement_count: u32) {
        self.last_sync_at = Some(at);
        self.next_sync_at = Some(at + Duration::minutes(i64::from(self.sync_interval)));
        self.requirement_count = requirement_count;
        self.status = ConnectorStatus::Active;
    }

    /// Re-evaluate the activation rule after the mapping set changed.
    ///
    /// ACTIVE requires credentials and a non-empty mapping set at the same
    /// time. A connector that no longer satisfies both drops to INACTIVE.
    pub fn apply_mapping_rule(&mut self, mapping_count: usize) {
        if self.has_credentials && mapping_count > 0 {
            self.status = ConnectorStatus::Active;
        } else if self.status == ConnectorStatus::Active {
            self.status = ConnectorStatus::Inactive;
        }
    }
}

pub const DEFAULT_SYNC_INTERVAL_MINUTES: u32 = 60;

/// Input accepted by the create operation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorInput {
    pub name: String,
    #[serde(rename = "type", default = "default_connector_kind")]
    pub kind: String,
    #[serde(alias = "baseURL", default)]
    pub base_url: String,
    #[serde(default)]
    pub sync_interval: Option<u32>,
}

fn default_connector_kind() -> String {
    "JIRA".to_string()
}

/// Rule translating an external PM field into a platform field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub id: String,
    pub source_path: String,
    pub target_field: String,
    pub transform_type: String,
    pub transform_config: Option<serde_json::Value>,
    pub is_active: bool,
    pub order: u32,
}

/// Mapping as submitted by a client; ids are assigned by the emulator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingInput {
    pub source_path: String,
    pub target_field: String,
    #[serde(default = "default_transform_type")]
    pub transform_type: String,
    #[serde(default)]
    pub transform_config: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub order: Option<u32>,
}

impl FieldMappingInput {
    pub fn into_mapping(self, connector_id: &str, index: usize) -> FieldMapping {
        FieldMapping {
            id: format!("{}-mapping-{}", connector_id, index + 1),
            source_path: self.source_path,
            target_field: self.target_field,
            transform_type: self.transform_type,
            transform_config: self.transform_config,
            is_active: self.is_active,
            order: self.order.unwrap_or(index as u32),
        }
    }
}

fn default_transform_type() -> String {
    "DIRECT".to_string()
}

fn default_true() -> bool {
    true
}

/// Summary returned by a sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub status: String,
    pub items_processed: u32,
    pub items_failed: u32,
}
