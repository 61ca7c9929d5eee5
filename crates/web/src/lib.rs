//! Fern PM Tool Emulators
//!
//! In-process HTTP test doubles for the external project-management tools
//! the Fern platform integrates with:
//!
//! - [`JiraEmulator`]: JIRA REST v2 auth and metadata endpoints
//! - [`GraphqlEmulator`]: the platform's connector-management GraphQL API
//! - [`PmToolEmulator`]: JIRA search/issue-create, Aha! features and
//!   arbitrary response, error and latency injection
//!
//! Each emulator keeps its state behind its own mutexes and records every
//! inbound request in a [`fern_common::RequestLedger`]. Start one with
//! [`EmulatorHandle::spawn`] to get an ephemeral loopback URL.

pub mod auth;
pub mod config;
pub mod graphql;
pub mod jira;
pub mod pm_tool;
pub mod server;

pub use config::MockServerConfig;
pub use graphql::{GraphqlConfig, GraphqlEmulator, GraphqlRequest, Operation};
pub use jira::{JiraConfig, JiraEmulator, ProjectSeed};
pub use pm_tool::{PmToolConfig, PmToolEmulator};
pub use server::{Emulator, EmulatorHandle, HEALTH_PATH};
