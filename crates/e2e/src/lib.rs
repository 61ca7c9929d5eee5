//! Fern E2E Scenario Harness
//!
//! Drives the PM tool emulators the way an acceptance scenario does:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ScenarioHarness (one per scenario)                         │
//! │    ├── start_jira / start_graphql / start_pm_tool           │
//! │    ├── sut_env() -> FERN_PM_BASE_URL, FERN_GRAPHQL_URL      │
//! │    ├── graphql_client() -> GraphqlClient                    │
//! │    ├── reset()                                              │
//! │    └── teardown()                                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MockdProcess (out-of-process fern-mockd)                   │
//! │    ├── spawn(MockdConfig) -> waits on /__health             │
//! │    └── stop()                                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Browser navigation and UI assertions live outside this crate; they only
//! consume the URLs the harness hands out.

pub mod client;
pub mod error;
pub mod harness;
pub mod server;

pub use client::GraphqlClient;
pub use error::{E2eError, E2eResult};
pub use harness::{ScenarioHarness, GRAPHQL_URL_ENV, PM_BASE_URL_ENV};
pub use server::{MockdConfig, MockdProcess};
