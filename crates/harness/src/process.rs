//! Mock server subprocess supervision.
//!
//! `start` allocates an ephemeral port, optionally provisions TLS material,
//! launches the server binary and blocks until a health probe succeeds.
//! Startup flakiness is host-environment noise, not a logic error, so a
//! failed probe tears the subprocess down and retries from scratch, up to a
//! bounded number of attempts.

use crate::error::{HarnessError, HarnessResult};
use crate::tls::{TlsMaterial, TlsProvisioner};
use crate::util;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command};

/// How a supervisor decides the server is ready.
///
/// A seam so supervision logic is testable without the network: production
/// uses [`HttpProbe`], tests can script outcomes.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Resolve once the endpoint answers its health check, or fail after
    /// `budget` has elapsed.
    async fn wait_ready(&self, endpoint: &str, budget: Duration) -> HarnessResult<()>;
}

/// Polls `GET {endpoint}/health` until it answers or the budget runs out.
#[derive(Clone, Debug, Default)]
pub struct HttpProbe;

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn wait_ready(&self, endpoint: &str, budget: Duration) -> HarnessResult<()> {
        // Readiness only; certificate verification happens on real clients.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(2))
            .build()?;
        let url = format!("{endpoint}/health");
        let deadline = tokio::time::Instant::now() + budget;
        let mut last_error = format!("no probe response from {url}");

        while tokio::time::Instant::now() < deadline {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => last_error = format!("health returned {}", response.status()),
                Err(e) => last_error = e.to_string(),
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Err(HarnessError::Config(last_error))
    }
}

/// Configuration for one supervised mock server.
#[derive(Clone, Default)]
pub struct MockServerConfig {
    /// Server binary to launch; located next to the current executable (or
    /// via `SHOAL_SERVER_BIN`) when unset.
    pub binary: Option<PathBuf>,
    /// Host name clients use for the storage endpoint. Must route to the
    /// storage backend; the identity endpoint always uses the loopback
    /// address.
    pub storage_host: Option<String>,
    /// Serve TLS. Requires `tls_provisioner`.
    pub use_tls: bool,
    pub tls_provisioner: Option<Arc<dyn TlsProvisioner>>,
    /// Startup attempts before giving up (default 3).
    pub startup_attempts: Option<u32>,
    /// Health-probe budget per attempt (default 10s).
    pub probe_budget: Option<Duration>,
}

impl MockServerConfig {
    fn storage_host(&self) -> &str {
        self.storage_host.as_deref().unwrap_or("localhost")
    }

    fn startup_attempts(&self) -> u32 {
        self.startup_attempts.unwrap_or(3).max(1)
    }

    fn probe_budget(&self) -> Duration {
        self.probe_budget.unwrap_or(Duration::from_secs(10))
    }
}

/// A supervised mock server subprocess.
///
/// The child is spawned with kill-on-drop, so even an exit path that skips
/// [`MockServerProcess::stop`] does not leak the process; only the explicit
/// stop removes the working directory gracefully.
#[derive(Debug)]
pub struct MockServerProcess {
    child: Option<Child>,
    working_dir: Option<TempDir>,
    endpoint: String,
    iam_endpoint: String,
    host: String,
    port: u16,
    tls: Option<TlsMaterial>,
}

impl MockServerProcess {
    /// Launch and health-wait a mock server with the default HTTP probe.
    pub async fn start(config: &MockServerConfig) -> HarnessResult<Self> {
        Self::start_with_probe(config, &HttpProbe).await
    }

    /// Launch and health-wait a mock server, probing through `probe`.
    pub async fn start_with_probe(
        config: &MockServerConfig,
        probe: &dyn HealthProbe,
    ) -> HarnessResult<Self> {
        let binary = match &config.binary {
            Some(path) => path.clone(),
            None => util::server_binary()?,
        };
        let attempts = config.startup_attempts();
        let scheme = if config.use_tls { "https" } else { "http" };
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let port = util::ephemeral_port()?;
            let working_dir = tempfile::Builder::new().prefix("shoal-mock-").tempdir()?;
            let tls = match (config.use_tls, &config.tls_provisioner) {
                (false, _) => None,
                (true, Some(provisioner)) => Some(provisioner.provision(working_dir.path())?),
                (true, None) => {
                    return Err(HarnessError::Config(
                        "use_tls requires a TlsProvisioner".to_string(),
                    ))
                }
            };
            let endpoint = format!("{scheme}://{}:{port}", config.storage_host());
            let iam_endpoint = format!("{scheme}://127.0.0.1:{port}");

            let mut cmd = Command::new(&binary);
            cmd.arg("--port")
                .arg(port.to_string())
                .current_dir(working_dir.path())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);
            if let Some(tls) = &tls {
                cmd.arg("--tls-cert")
                    .arg(&tls.server_cert)
                    .arg("--tls-key")
                    .arg(&tls.server_key);
            }

            let mut child = cmd.spawn()?;
            match probe.wait_ready(&endpoint, config.probe_budget()).await {
                Ok(()) => {
                    tracing::info!(%endpoint, attempt, "mock server ready");
                    return Ok(Self {
                        child: Some(child),
                        working_dir: Some(working_dir),
                        endpoint,
                        iam_endpoint,
                        host: config.storage_host().to_string(),
                        port,
                        tls,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "mock server not ready, retrying fresh");
                    last_error = e.to_string();
                    terminate(&mut child).await;
                    // The attempt's working directory is removed on drop.
                }
            }
        }

        Err(HarnessError::ServerStartupFailed {
            attempts,
            last_error,
        })
    }

    /// Storage endpoint URL, e.g. `http://localhost:19123`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Identity endpoint URL on the loopback address.
    pub fn iam_endpoint(&self) -> &str {
        &self.iam_endpoint
    }

    /// Host name the storage endpoint uses.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// TLS material, when serving TLS.
    pub fn tls(&self) -> Option<&TlsMaterial> {
        self.tls.as_ref()
    }

    /// Whether the subprocess is still attached.
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Terminate the subprocess, wait for it to exit, then remove the
    /// working directory. Idempotent; never fails teardown.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            terminate(&mut child).await;
            tracing::info!(port = self.port, "mock server stopped");
        }
        if let Some(dir) = self.working_dir.take() {
            let path = dir.keep();
            util::remove_dir_with_retry(&path, 3).await;
        }
    }
}

/// Terminate a child and reap it. Tolerates children that already exited.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "child already gone");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, "failed to reap mock server child");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A probe whose outcomes are scripted per attempt.
    struct ScriptedProbe {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(failures_before_success: u32) -> Self {
            Self {
                failures_before_success,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn wait_ready(&self, _endpoint: &str, _budget: Duration) -> HarnessResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(HarnessError::Config("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Any spawnable command works for supervision tests; the scripted probe
    /// decides readiness, not the child.
    fn inert_config() -> MockServerConfig {
        MockServerConfig {
            binary: Some(PathBuf::from("sleep")),
            ..MockServerConfig::default()
        }
    }

    #[tokio::test]
    async fn start_succeeds_on_the_third_attempt() {
        let probe = ScriptedProbe::new(2);
        let mut server = MockServerProcess::start_with_probe(&inert_config(), &probe)
            .await
            .unwrap();
        // Exactly two terminate/retry cycles happened before success.
        assert_eq!(probe.calls(), 3);
        assert!(server.is_running());
        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn start_gives_up_after_the_retry_budget() {
        let probe = ScriptedProbe::new(u32::MAX);
        let err = MockServerProcess::start_with_probe(&inert_config(), &probe)
            .await
            .unwrap_err();
        assert_eq!(probe.calls(), 3);
        match err {
            HarnessError::ServerStartupFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let probe = ScriptedProbe::new(0);
        let mut server = MockServerProcess::start_with_probe(&inert_config(), &probe)
            .await
            .unwrap();
        server.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn tls_without_a_provisioner_is_a_config_error() {
        let config = MockServerConfig {
            use_tls: true,
            ..inert_config()
        };
        let err = MockServerProcess::start_with_probe(&config, &ScriptedProbe::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }
}
