//! File watcher that turns filesystem changes into reload broadcasts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::WatchConfig;
use crate::lifecycle::Shutdown;
use crate::proxy::ReloadSink;
use crate::watch::pattern::WatchPattern;

/// Error type for watcher setup.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("invalid watch pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// A directory registered with the OS watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub path: PathBuf,
    pub recursive: bool,
}

/// Watches the configured globs and calls the sink on every matching change.
pub struct FileWatcher {
    config: WatchConfig,
    sink: Arc<dyn ReloadSink>,
}

impl FileWatcher {
    pub fn new(config: WatchConfig, sink: Arc<dyn ReloadSink>) -> Self {
        Self { config, sink }
    }

    /// Parse the configured patterns against the watch root.
    pub fn patterns(&self) -> Result<Vec<WatchPattern>, WatchError> {
        self.config
            .patterns
            .iter()
            .map(|raw| {
                WatchPattern::new(&self.config.root, raw).map_err(|source| WatchError::Pattern {
                    pattern: raw.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Register the OS watches and start dispatching events.
    ///
    /// Returns once every registration is in place. Patterns whose base
    /// directory does not exist are skipped with a warning.
    pub fn start(self) -> Result<WatchHandle, WatchError> {
        let patterns = resolve(self.patterns()?)?;

        let mut bases: BTreeMap<PathBuf, bool> = BTreeMap::new();
        for pattern in &patterns {
            *bases.entry(pattern.base().to_path_buf()).or_default() |= pattern.is_recursive();
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = event_tx.send(event);
            }
            Err(e) => tracing::error!(error = %e, "Watch error"),
        })?;

        let mut registrations = Vec::with_capacity(bases.len());
        for (path, recursive) in bases {
            let mode = if recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(&path, mode)?;
            tracing::info!(path = %path.display(), recursive, "Watching for changes");
            registrations.push(Registration { path, recursive });
        }

        if registrations.is_empty() {
            tracing::warn!(root = %self.config.root.display(), "No watch pattern has an existing directory");
        }

        let shutdown = Shutdown::new();
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let task = tokio::spawn(dispatch(
            event_rx,
            patterns,
            self.sink,
            debounce,
            shutdown.subscribe(),
        ));

        Ok(WatchHandle {
            watcher,
            registrations,
            shutdown,
            task,
        })
    }
}

/// Anchor patterns at canonical base directories so they line up with the
/// paths the OS reports.
fn resolve(patterns: Vec<WatchPattern>) -> Result<Vec<WatchPattern>, WatchError> {
    let mut resolved = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let base = match std::fs::canonicalize(pattern.base()) {
            Ok(base) if base.is_dir() => base,
            Ok(_) | Err(_) => {
                tracing::warn!(
                    pattern = pattern.raw(),
                    base = %pattern.base().display(),
                    "Watch directory does not exist, skipping"
                );
                continue;
            }
        };
        let rebased = pattern.rebase(base).map_err(|source| WatchError::Pattern {
            pattern: pattern.raw().to_string(),
            source,
        })?;
        resolved.push(rebased);
    }
    Ok(resolved)
}

/// Event loop: one broadcast per matching event, or one per window when
/// coalescing is enabled.
async fn dispatch(
    mut events: mpsc::UnboundedReceiver<Event>,
    patterns: Vec<WatchPattern>,
    sink: Arc<dyn ReloadSink>,
    debounce: Duration,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = stop.recv() => break,
        };

        let Some(cause) = matching_path(&event, &patterns) else {
            continue;
        };
        tracing::debug!(path = %cause.display(), kind = ?event.kind, "Change detected");

        if debounce.is_zero() {
            sink.broadcast_reload(&cause);
            continue;
        }

        let deadline = Instant::now() + debounce;
        let mut coalesced: u32 = 0;
        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if matching_path(&event, &patterns).is_some() {
                            coalesced += 1;
                        }
                    }
                    None => break,
                },
                _ = stop.recv() => return,
            }
        }
        if coalesced > 0 {
            tracing::debug!(coalesced, "Coalesced change events");
        }
        sink.broadcast_reload(&cause);
    }
    tracing::debug!("File watcher stopped");
}

/// Create, modify and remove events count; access and unknown events do not.
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn matching_path(event: &Event, patterns: &[WatchPattern]) -> Option<PathBuf> {
    if !is_change(&event.kind) {
        return None;
    }
    event
        .paths
        .iter()
        .find(|path| patterns.iter().any(|p| p.matches(path)))
        .cloned()
}

/// A running watcher. Dropping it removes the OS registrations.
pub struct WatchHandle {
    watcher: RecommendedWatcher,
    registrations: Vec<Registration>,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Directories registered with the OS watcher.
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.registrations.iter().any(|r| r.path == path)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop dispatching and drop the OS registrations.
    pub async fn stop(self) {
        self.shutdown.trigger();
        drop(self.watcher);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "File watcher task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn patterns() -> Vec<WatchPattern> {
        ["templates/*.html", "static/**/*.*"]
            .iter()
            .map(|p| WatchPattern::new(Path::new("/srv/app"), p).unwrap())
            .collect()
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_matching_path_filters_kind_and_glob() {
        let patterns = patterns();

        let hit = event(EventKind::Modify(ModifyKind::Any), "/srv/app/templates/index.html");
        assert_eq!(
            matching_path(&hit, &patterns),
            Some(PathBuf::from("/srv/app/templates/index.html"))
        );

        let created = event(EventKind::Create(CreateKind::File), "/srv/app/static/css/site.css");
        assert!(matching_path(&created, &patterns).is_some());

        let access = event(EventKind::Access(AccessKind::Any), "/srv/app/templates/index.html");
        assert!(matching_path(&access, &patterns).is_none());

        let elsewhere = event(EventKind::Modify(ModifyKind::Any), "/srv/app/main.py");
        assert!(matching_path(&elsewhere, &patterns).is_none());
    }

    #[test]
    fn test_multi_path_event_yields_one_cause() {
        let rename = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/srv/app/templates/old.html"))
            .add_path(PathBuf::from("/srv/app/templates/new.html"));

        assert_eq!(
            matching_path(&rename, &patterns()),
            Some(PathBuf::from("/srv/app/templates/old.html"))
        );
    }
}
