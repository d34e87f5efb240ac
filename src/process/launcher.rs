//! Backend server launcher.
//!
//! # Responsibilities
//! - Build the child command from an explicit configuration record
//! - Spawn the child and forward its stdout/stderr verbatim
//! - Kill the child when the session ends (or the handle is dropped)
//!
//! On unix the child leads its own process group and the whole group is
//! signalled, so helpers it forks (a debug reloader holding the port) die
//! with it.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::{ReadinessConfig, ServerConfig};
use crate::process::readiness::wait_until_ready;
use crate::proxy::Upstream;

/// Error type for launching the backend.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of waiting for the backend to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Upstream accepted a connection after this long.
    Ready(Duration),
    /// The child exited before the upstream came up.
    Exited(ExitStatus),
    /// The probe gave up.
    TimedOut,
}

/// Starts the backend development server.
pub struct ServerLauncher {
    config: ServerConfig,
}

impl ServerLauncher {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the child command. Environment comes only from the explicit
    /// map, plus ours when `inherit_env` is set.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !self.config.inherit_env {
            command.env_clear();
        }
        command.envs(&self.config.env);

        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    /// Spawn the child and start forwarding its output.
    ///
    /// Returns as soon as the spawn request succeeds; the server is not
    /// necessarily accepting connections yet.
    pub fn spawn(&self) -> Result<ServerProcess, LaunchError> {
        let command_line = self.config.command_line();
        let mut child = self.command().spawn().map_err(|source| LaunchError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward(stdout, tokio::io::stdout(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward(stderr, tokio::io::stderr(), "stderr"));
        }

        tracing::info!(
            command = %command_line,
            pid = child.id(),
            working_dir = ?self.config.working_dir,
            env_vars = self.config.env.len(),
            "Backend server spawned"
        );

        Ok(ServerProcess {
            group: child.id(),
            child,
            command_line,
            working_dir: self.config.working_dir.clone(),
            forwarders,
        })
    }
}

/// Copy a child stream to our own console byte for byte.
fn forward<R, W>(mut from: R, mut to: W, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = tokio::io::copy(&mut from, &mut to).await {
            tracing::debug!(stream, error = %e, "Backend output forwarding stopped");
        }
    })
}

/// Handle to the running backend child.
pub struct ServerProcess {
    child: Child,
    /// Process group id (equal to the child pid), until the group is killed.
    group: Option<u32>,
    command_line: String,
    working_dir: Option<PathBuf>,
    forwarders: Vec<JoinHandle<()>>,
}

impl ServerProcess {
    /// OS process id, `None` once the child has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Exit status if the child has already exited.
    pub fn try_exited(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll backend server");
                None
            }
        }
    }

    /// Wait for the child to exit on its own.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Wait for the upstream to accept connections, or for the child to die.
    pub async fn wait_ready(&mut self, upstream: &Upstream, config: &ReadinessConfig) -> Readiness {
        tokio::select! {
            result = wait_until_ready(upstream, config) => match result {
                Ok(elapsed) => Readiness::Ready(elapsed),
                Err(e) => {
                    tracing::debug!(error = %e, "Readiness probe gave up");
                    Readiness::TimedOut
                }
            },
            status = self.child.wait() => match status {
                Ok(status) => Readiness::Exited(status),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to wait on backend server");
                    Readiness::TimedOut
                }
            },
        }
    }

    /// Kill the child and its process group, then reap the child.
    /// Harmless if it already exited.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        let exited = self.try_exited();
        // Descendants may outlive an exited child.
        self.kill_group();

        if let Some(status) = exited {
            tracing::info!(status = %status, "Backend server already exited");
        } else {
            self.child.kill().await?;
            tracing::info!(command = %self.command_line, "Backend server stopped");
        }

        // Let the forwarders flush whatever the child wrote before dying.
        for forwarder in self.forwarders.drain(..) {
            let _ = tokio::time::timeout(Duration::from_millis(500), forwarder).await;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn kill_group(&mut self) {
        let Some(pgid) = self.group.take() else {
            return;
        };
        let Ok(pgid) = libc::pid_t::try_from(pgid) else {
            return;
        };
        // SAFETY: killpg only sends a signal; a group that no longer exists
        // yields ESRCH, which is fine here.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(
                pgid,
                error = %std::io::Error::last_os_error(),
                "Backend process group already gone"
            );
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) {
        self.group = None;
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        // kill_on_drop covers the child itself, this covers its descendants.
        self.kill_group();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(command: &str, args: &[&str]) -> ServerConfig {
        ServerConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_command_uses_explicit_env() {
        let mut cfg = config("flask", &["run", "--port", "5000"]);
        cfg.env = BTreeMap::from([("FLASK_APP".to_string(), "main:app".to_string())]);
        cfg.inherit_env = false;

        let command = ServerLauncher::new(cfg).command();
        let std_command = command.as_std();

        assert_eq!(std_command.get_program(), "flask");
        let args: Vec<_> = std_command.get_args().collect();
        assert_eq!(args, ["run", "--port", "5000"]);
        let envs: Vec<_> = std_command.get_envs().collect();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].0, "FLASK_APP");
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let launcher = ServerLauncher::new(config("devsync-no-such-binary", &[]));
        let err = launcher.spawn().err().unwrap();
        assert!(err.to_string().contains("devsync-no-such-binary"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_stops_long_running_child() {
        let launcher = ServerLauncher::new(config("sleep", &["30"]));
        let mut process = launcher.spawn().unwrap();
        assert!(process.id().is_some());
        assert!(process.try_exited().is_none());

        process.kill().await.unwrap();

        assert!(process.id().is_none());
        // A second kill is a no-op.
        process.kill().await.unwrap();
    }

    /// Alive and not a zombie waiting to be reaped.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| {
                stat.rsplit(')')
                    .next()
                    .is_some_and(|rest| !rest.trim_start().starts_with('Z'))
            })
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_kill_takes_down_forked_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("sh", &["-c", "sleep 60 & echo $! > helper.pid; wait"]);
        cfg.working_dir = Some(dir.path().to_path_buf());
        let mut process = ServerLauncher::new(cfg).spawn().unwrap();

        let pid_file = dir.path().join("helper.pid");
        let mut helper = String::new();
        for _ in 0..100 {
            helper = std::fs::read_to_string(&pid_file).unwrap_or_default().trim().to_string();
            if !helper.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!helper.is_empty(), "helper never started");
        assert!(is_running(&helper));

        process.kill().await.unwrap();

        let mut gone = false;
        for _ in 0..100 {
            if !is_running(&helper) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "helper {helper} outlived the backend");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_ready_reports_early_exit() {
        let mut process = ServerLauncher::new(config("true", &[])).spawn().unwrap();
        let upstream = Upstream::parse("127.0.0.1:9").unwrap();
        let readiness = ReadinessConfig {
            enabled: true,
            timeout_secs: 5,
            interval_ms: 50,
        };

        match process.wait_ready(&upstream, &readiness).await {
            Readiness::Exited(status) => assert!(status.success()),
            other => panic!("unexpected readiness: {other:?}"),
        }
    }
}
