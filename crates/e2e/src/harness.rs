//! Per-scenario harness owning the emulators a scenario needs.
//!
//! A scenario constructs one `ScenarioHarness`, starts the emulators it
//! needs, hands [`ScenarioHarness::sut_env`] to the system under test, drives
//! its workflow, asserts against the emulators, and tears down. Nothing is
//! shared between harnesses: two scenarios never see each other's state.
//!
//! Each emulator assumes one driving client at a time (the browser under
//! test plus an assertion task). Its state is mutex-guarded, so concurrent
//! requests are memory-safe, but their interleaving is whatever order the
//! server happens to process them in.

use std::time::Duration;
use tracing::info;

use fern_mock_web::{
    Emulator, EmulatorHandle, GraphqlConfig, GraphqlEmulator, JiraConfig, JiraEmulator, PmToolConfig,
    PmToolEmulator,
};

use crate::client::GraphqlClient;
use crate::error::{E2eError, E2eResult};
use crate::server::wait_for_healthy;

/// Env var carrying the PM connector base URL for the system under test
pub const PM_BASE_URL_ENV: &str = "FERN_PM_BASE_URL";
/// Env var carrying the connector-management GraphQL endpoint
pub const GRAPHQL_URL_ENV: &str = "FERN_GRAPHQL_URL";

const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// An emulator together with its listener
pub struct Running<E> {
    pub emulator: E,
    pub handle: EmulatorHandle,
}

impl<E> Running<E> {
    pub fn base_url(&self) -> &str {
        self.handle.base_url()
    }
}

pub struct ScenarioHarness {
    http: reqwest::Client,
    jira: Option<Running<JiraEmulator>>,
    graphql: Option<Running<GraphqlEmulator>>,
    pm_tool: Option<Running<PmToolEmulator>>,
}

impl ScenarioHarness {
    pub fn new() -> E2eResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            jira: None,
            graphql: None,
            pm_tool: None,
        })
    }

    /// Shared HTTP client for driving emulators directly
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn start_jira(&mut self, config: JiraConfig) -> E2eResult<&JiraEmulator> {
        if self.jira.is_none() {
            self.jira = Some(self.launch(JiraEmulator::new(config)).await?);
        }
        self.jira()
    }

    pub async fn start_graphql(&mut self, config: GraphqlConfig) -> E2eResult<&GraphqlEmulator> {
        if self.graphql.is_none() {
            self.graphql = Some(self.launch(GraphqlEmulator::new(config)).await?);
        }
        self.graphql()
    }

    pub async fn start_pm_tool(&mut self, config: PmToolConfig) -> E2eResult<&PmToolEmulator> {
        if self.pm_tool.is_none() {
            self.pm_tool = Some(self.launch(PmToolEmulator::new(config)).await?);
        }
        self.pm_tool()
    }

    async fn launch<E: Emulator>(&self, emulator: E) -> E2eResult<Running<E>> {
        let handle = EmulatorHandle::spawn(&emulator)
            .await
            .map_err(|e| E2eError::EmulatorStartup(format!("{}: {}", emulator.name(), e)))?;
        wait_for_healthy(&self.http, handle.base_url(), READY_TIMEOUT).await?;
        Ok(Running { emulator, handle })
    }

    pub fn jira(&self) -> E2eResult<&JiraEmulator> {
        self.jira.as_ref().map(|r| &r.emulator).ok_or(E2eError::NotStarted("jira"))
    }

    pub fn graphql(&self) -> E2eResult<&GraphqlEmulator> {
        self.graphql
            .as_ref()
            .map(|r| &r.emulator)
            .ok_or(E2eError::NotStarted("graphql"))
    }

    pub fn pm_tool(&self) -> E2eResult<&PmToolEmulator> {
        self.pm_tool
            .as_ref()
            .map(|r| &r.emulator)
            .ok_or(E2eError::NotStarted("pm-tool"))
    }

    pub fn jira_url(&self) -> E2eResult<&str> {
        self.jira.as_ref().map(Running::base_url).ok_or(E2eError::NotStarted("jira"))
    }

    pub fn graphql_url(&self) -> E2eResult<&str> {
        self.graphql
            .as_ref()
            .map(Running::base_url)
            .ok_or(E2eError::NotStarted("graphql"))
    }

    pub fn pm_tool_url(&self) -> E2eResult<&str> {
        self.pm_tool
            .as_ref()
            .map(Running::base_url)
            .ok_or(E2eError::NotStarted("pm-tool"))
    }

    /// GraphQL client pointed at this scenario's connector emulator
    pub fn graphql_client(&self) -> E2eResult<GraphqlClient> {
        Ok(GraphqlClient::new(self.http.clone(), format!("{}/", self.graphql_url()?)))
    }

    /// Environment for the system under test.
    ///
    /// The PM base URL points at the JIRA emulator when one is running,
    /// otherwise at the generic PM tool emulator.
    pub fn sut_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        let pm_base = self
            .jira
            .as_ref()
            .map(Running::base_url)
            .or_else(|| self.pm_tool.as_ref().map(Running::base_url));
        if let Some(url) = pm_base {
            env.push((PM_BASE_URL_ENV.to_string(), url.to_string()));
        }
        if let Some(graphql) = &self.graphql {
            env.push((GRAPHQL_URL_ENV.to_string(), format!("{}/", graphql.base_url())));
        }
        env
    }

    /// Reset every running emulator to its freshly started state
    pub fn reset(&self) {
        if let Some(r) = &self.jira {
            r.emulator.reset();
        }
        if let Some(r) = &self.graphql {
            r.emulator.reset();
        }
        if let Some(r) = &self.pm_tool {
            r.emulator.reset();
        }
    }

    /// Stop every emulator and wait for its listener to close
    pub async fn teardown(mut self) -> E2eResult<()> {
        if let Some(r) = self.jira.take() {
            r.handle.shutdown().await?;
        }
        if let Some(r) = self.graphql.take() {
            r.handle.shutdown().await?;
        }
        if let Some(r) = self.pm_tool.take() {
            r.handle.shutdown().await?;
        }
        info!("scenario torn down");
        Ok(())
    }
}
