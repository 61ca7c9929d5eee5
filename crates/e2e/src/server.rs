//! Out-of-process emulators: spawning `fern-mockd` and health checking

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use fern_mock_web::HEALTH_PATH;

use crate::error::{E2eError, E2eResult};

/// Poll `{base_url}/__health` until it answers 2xx or `timeout` elapses
pub async fn wait_for_healthy(
    client: &reqwest::Client,
    base_url: &str,
    timeout_duration: Duration,
) -> E2eResult<()> {
    let health_url = format!("{}{}", base_url, HEALTH_PATH);
    let start = std::time::Instant::now();
    let mut attempts = 0;

    while start.elapsed() < timeout_duration {
        attempts += 1;

        match client.get(&health_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return Ok(());
            }
            Ok(resp) => {
                warn!("Health check returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for emulator at {}...", base_url);
                }
                // Connection refused is expected while the listener is starting
                if !e.is_connect() {
                    warn!("Health check error: {}", e);
                }
            }
        }

        sleep(Duration::from_millis(100)).await;
    }

    Err(E2eError::HealthCheck {
        url: health_url,
        attempts,
    })
}

/// Base URLs of the emulators served by a `fern-mockd` process
#[derive(Debug, Clone)]
pub struct MockdUrls {
    pub jira: String,
    pub graphql: String,
    pub pm_tool: String,
}

/// Handle to a running `fern-mockd` process
pub struct MockdProcess {
    child: Child,
    pub urls: MockdUrls,
}

impl MockdProcess {
    /// Spawn `fern-mockd` with all three emulators on free ports
    pub async fn spawn(config: MockdConfig) -> E2eResult<Self> {
        if !config.binary_path.exists() {
            return Err(E2eError::MockdNotFound(config.binary_path));
        }

        let jira_port = config.jira_port.map_or_else(find_free_port, Ok)?;
        let graphql_port = config.graphql_port.map_or_else(find_free_port, Ok)?;
        let pm_tool_port = config.pm_tool_port.map_or_else(find_free_port, Ok)?;

        info!(
            "Spawning fern-mockd (jira: {}, graphql: {}, pm-tool: {})",
            jira_port, graphql_port, pm_tool_port
        );

        let mut cmd = Command::new(&config.binary_path);
        cmd.env("FERN_MOCK_HOST", "127.0.0.1")
            .env("FERN_MOCK_JIRA_PORT", jira_port.to_string())
            .env("FERN_MOCK_GRAPHQL_PORT", graphql_port.to_string())
            .env("FERN_MOCK_PM_TOOL_PORT", pm_tool_port.to_string());

        if let Some(path) = &config.config_path {
            cmd.env("FERN_MOCK_CONFIG", path);
        }

        cmd.stdout(Stdio::null()).stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| {
            E2eError::EmulatorStartup(format!(
                "Failed to spawn {}: {}",
                config.binary_path.display(),
                e
            ))
        })?;

        let process = MockdProcess {
            child,
            urls: MockdUrls {
                jira: format!("http://127.0.0.1:{}", jira_port),
                graphql: format!("http://127.0.0.1:{}", graphql_port),
                pm_tool: format!("http://127.0.0.1:{}", pm_tool_port),
            },
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        for url in [&process.urls.jira, &process.urls.graphql, &process.urls.pm_tool] {
            wait_for_healthy(&client, url, config.startup_timeout).await?;
        }

        info!("fern-mockd is healthy");
        Ok(process)
    }

    /// Stop the process
    pub fn stop(&mut self) -> E2eResult<()> {
        info!("Stopping fern-mockd (pid: {})", self.child.id());

        // fern-mockd shuts down cleanly on Ctrl-C
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGINT).is_ok() {
                std::thread::sleep(Duration::from_millis(300));
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for MockdProcess {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning `fern-mockd`
#[derive(Debug, Clone)]
pub struct MockdConfig {
    /// Path to the fern-mockd binary
    pub binary_path: PathBuf,

    /// Optional TOML config passed through `FERN_MOCK_CONFIG`
    pub config_path: Option<PathBuf>,

    /// Fixed ports (None = find a free port)
    pub jira_port: Option<u16>,
    pub graphql_port: Option<u16>,
    pub pm_tool_port: Option<u16>,

    /// Timeout for each emulator to become healthy
    pub startup_timeout: Duration,
}

impl Default for MockdConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("target/debug/fern-mockd"),
            config_path: None,
            jira_port: None,
            graphql_port: None,
            pm_tool_port: None,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Find a free port to use
fn find_free_port() -> E2eResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
