//! Task orchestration.
//!
//! # Responsibilities
//! - Define the named tasks and the composite `default` sequence
//! - Run steps strictly in order, each acknowledged before the next starts
//! - Hold the resulting handles for the life of the session
//!
//! # Design Decisions
//! - No rollback, no health check between stages, no retry
//! - A server that fails to spawn does not stop later steps
//! - Proxy bind failures are fatal

use std::sync::Arc;

use crate::config::DevConfig;
use crate::lifecycle::signals::shutdown_signal;
use crate::process::{Readiness, ServerLauncher, ServerProcess};
use crate::proxy::{ProxyError, ProxyHandle, ReloadHub, ReloadProxy, Upstream};
use crate::watch::{FileWatcher, WatchError, WatchHandle};

/// A named, independently invocable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Watch,
    ProxyInit,
    RunServer,
    /// `run-server → proxy-init → watch`
    Default,
}

/// A single unit of work inside a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RunServer,
    ProxyInit,
    Watch,
}

impl Task {
    pub fn name(self) -> &'static str {
        match self {
            Task::Watch => "watch",
            Task::ProxyInit => "proxy-init",
            Task::RunServer => "run-server",
            Task::Default => "default",
        }
    }

    /// Steps in execution order.
    pub fn steps(self) -> &'static [Step] {
        match self {
            Task::Watch => &[Step::Watch],
            Task::ProxyInit => &[Step::ProxyInit],
            Task::RunServer => &[Step::RunServer],
            Task::Default => &[Step::RunServer, Step::ProxyInit, Step::Watch],
        }
    }
}

impl Step {
    /// State reached once this step has completed.
    fn completed_state(self) -> TaskState {
        match self {
            Step::RunServer => TaskState::RunningServer,
            Step::ProxyInit => TaskState::ProxyActive,
            Step::Watch => TaskState::Watching,
        }
    }
}

/// Orchestrator progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    RunningServer,
    ProxyActive,
    Watching,
}

/// Error type for orchestration.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("proxy-init failed: {0}")]
    Proxy(#[from] ProxyError),
    #[error("watch failed: {0}")]
    Watch(#[from] WatchError),
}

/// Runs tasks against one configuration.
pub struct Orchestrator {
    config: DevConfig,
    hub: ReloadHub,
    state: TaskState,
}

impl Orchestrator {
    pub fn new(config: DevConfig) -> Self {
        Self {
            config,
            hub: ReloadHub::new(),
            state: TaskState::Idle,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn hub(&self) -> &ReloadHub {
        &self.hub
    }

    /// Run every step of `task` in order and return the live session.
    pub async fn start(&mut self, task: Task) -> Result<Session, OrchestratorError> {
        tracing::info!(task = task.name(), "Starting task");

        let mut session = Session {
            task,
            server: None,
            proxy: None,
            watcher: None,
            hub: self.hub.clone(),
        };

        for step in task.steps() {
            match step {
                Step::RunServer => session.server = self.run_server().await,
                Step::ProxyInit => session.proxy = Some(self.proxy_init().await?),
                Step::Watch => session.watcher = Some(self.watch()?),
            }
            self.transition(step.completed_state());
        }

        Ok(session)
    }

    fn transition(&mut self, next: TaskState) {
        tracing::debug!(from = ?self.state, to = ?next, "Task state changed");
        self.state = next;
    }

    /// Spawn the backend; completes on spawn, or on readiness when probing.
    async fn run_server(&mut self) -> Option<ServerProcess> {
        let launcher = ServerLauncher::new(self.config.server.clone());
        let mut process = match launcher.spawn() {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(error = %e, "Backend server did not start, continuing");
                return None;
            }
        };

        let readiness = &self.config.server.readiness;
        if !readiness.enabled {
            return Some(process);
        }

        let upstream = match Upstream::parse(&self.config.proxy.upstream) {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot probe upstream, skipping readiness check");
                return Some(process);
            }
        };

        match process.wait_ready(&upstream, readiness).await {
            Readiness::Ready(elapsed) => {
                tracing::info!(upstream = %upstream, elapsed = ?elapsed, "Backend server ready");
            }
            Readiness::Exited(status) => {
                tracing::warn!(status = %status, "Backend server exited before accepting connections");
            }
            Readiness::TimedOut => {
                tracing::warn!(
                    upstream = %upstream,
                    timeout_secs = readiness.timeout_secs,
                    "Backend server not reachable yet, continuing"
                );
            }
        }
        Some(process)
    }

    /// Bind the reload proxy; completes once the listener is bound.
    async fn proxy_init(&mut self) -> Result<ProxyHandle, ProxyError> {
        ReloadProxy::new(self.config.proxy.clone(), self.hub.clone())?
            .start()
            .await
    }

    /// Register the file watches; completes once they are in place.
    fn watch(&mut self) -> Result<WatchHandle, WatchError> {
        FileWatcher::new(self.config.watch.clone(), Arc::new(self.hub.clone())).start()
    }
}

/// Everything a task started. Dropping it kills the backend.
pub struct Session {
    task: Task,
    server: Option<ServerProcess>,
    proxy: Option<ProxyHandle>,
    watcher: Option<WatchHandle>,
    hub: ReloadHub,
}

impl Session {
    pub fn task(&self) -> Task {
        self.task
    }

    pub fn server(&self) -> Option<&ServerProcess> {
        self.server.as_ref()
    }

    pub fn server_mut(&mut self) -> Option<&mut ServerProcess> {
        self.server.as_mut()
    }

    pub fn proxy(&self) -> Option<&ProxyHandle> {
        self.proxy.as_ref()
    }

    pub fn watcher(&self) -> Option<&WatchHandle> {
        self.watcher.as_ref()
    }

    pub fn hub(&self) -> &ReloadHub {
        &self.hub
    }

    /// Block until SIGINT/SIGTERM, then tear everything down.
    ///
    /// A server-only session also ends when the backend exits on its own.
    pub async fn run_until_shutdown(mut self) {
        let server_only = self.proxy.is_none() && self.watcher.is_none();

        match self.server.as_mut() {
            Some(server) if server_only => {
                tokio::select! {
                    _ = shutdown_signal() => {}
                    status = server.wait() => match status {
                        Ok(status) => tracing::info!(status = %status, "Backend server exited"),
                        Err(e) => tracing::error!(error = %e, "Failed to wait on backend server"),
                    },
                }
            }
            None if server_only => {
                tracing::warn!(task = self.task.name(), "Nothing left running");
            }
            _ => shutdown_signal().await,
        }

        self.shutdown().await;
    }

    /// Stop the watcher, the proxy and the backend, in that order.
    pub async fn shutdown(mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
        }
        if let Some(proxy) = self.proxy.take() {
            proxy.stop().await;
        }
        if let Some(mut server) = self.server.take() {
            if let Err(e) = server.kill().await {
                tracing::error!(error = %e, "Failed to stop backend server");
            }
        }
        tracing::info!(task = self.task.name(), "Session ended");
    }
}
