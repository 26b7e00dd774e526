//! Passive stall detection for per-file tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::{DashMap, DashSet};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::WatchdogConfig;

#[derive(Clone, Debug)]
struct Progress {
    stage: &'static str,
    at: Instant,
}

/// Last-progress timestamps of every running file task.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    active: DashMap<PathBuf, Progress>,
    stalled: DashSet<PathBuf>,
}

impl ProgressTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a task; it counts as progressing from now on.
    pub fn start(self: &Arc<Self>, path: &Path) -> ProgressHandle {
        self.active.insert(
            path.to_path_buf(),
            Progress {
                stage: "queued",
                at: Instant::now(),
            },
        );
        ProgressHandle {
            path: path.to_path_buf(),
            tracker: Arc::clone(self),
        }
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Flags every active task whose last report is older than
    /// `stall_timeout`. A task is flagged at most once.
    pub fn check(&self, now: Instant, config: &WatchdogConfig) -> Vec<PathBuf> {
        let timeout = config.stall_timeout();
        let mut flagged = Vec::new();
        for entry in self.active.iter() {
            let age = now.saturating_duration_since(entry.at);
            if age > timeout && self.stalled.insert(entry.key().clone()) {
                warn!(
                    path = %entry.key().display(),
                    stage = entry.stage,
                    age_ms = age.as_millis() as u64,
                    "file conversion appears stalled"
                );
                flagged.push(entry.key().clone());
            }
        }
        flagged
    }

    pub fn stalled(&self) -> Vec<PathBuf> {
        let mut stalled: Vec<PathBuf> = self.stalled.iter().map(|path| path.clone()).collect();
        stalled.sort();
        stalled
    }
}

/// Progress reporter owned by one file task. Dropping it marks the task
/// finished.
#[derive(Debug)]
pub struct ProgressHandle {
    path: PathBuf,
    tracker: Arc<ProgressTracker>,
}

impl ProgressHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn report(&self, stage: &'static str) {
        debug!(path = %self.path.display(), stage, "progress");
        self.tracker.active.insert(
            self.path.clone(),
            Progress {
                stage,
                at: Instant::now(),
            },
        );
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.tracker.active.remove(&self.path);
    }
}

/// Background ticker over a [`ProgressTracker`]. It never cancels anything.
pub struct Watchdog {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
    tracker: Arc<ProgressTracker>,
}

impl Watchdog {
    /// Starts ticking. Must be called from within a tokio runtime.
    pub fn arm(tracker: Arc<ProgressTracker>, config: WatchdogConfig) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let observed = Arc::clone(&tracker);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.check_interval());
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        observed.check(Instant::now(), &config);
                    }
                }
            }
        });
        debug!(
            stall_timeout_ms = config.stall_timeout_ms,
            check_interval_ms = config.check_interval_ms,
            "watchdog armed"
        );
        Self {
            stop,
            task,
            tracker,
        }
    }

    /// Stops ticking and returns every task that was flagged.
    pub async fn disarm(self) -> Vec<PathBuf> {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "watchdog task ended abnormally");
        }
        debug!("watchdog disarmed");
        self.tracker.stalled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(stall_timeout_ms: u64) -> WatchdogConfig {
        WatchdogConfig {
            stall_timeout_ms,
            check_interval_ms: 5,
        }
    }

    #[test]
    fn flags_once_and_forgets_finished_tasks() {
        let tracker = ProgressTracker::new();
        let slow = tracker.start(Path::new("Slow.aspx"));
        let fast = tracker.start(Path::new("Fast.aspx"));
        drop(fast);
        assert_eq!(tracker.active(), 1);

        let later = Instant::now() + Duration::from_secs(5);
        assert_eq!(tracker.check(later, &config(1_000)), vec![PathBuf::from("Slow.aspx")]);
        assert!(tracker.check(later, &config(1_000)).is_empty());

        slow.report("converting");
        drop(slow);
        assert_eq!(tracker.active(), 0);
        assert_eq!(tracker.stalled(), vec![PathBuf::from("Slow.aspx")]);
    }

    #[test]
    fn recent_progress_is_not_a_stall() {
        let tracker = ProgressTracker::new();
        let handle = tracker.start(Path::new("A.aspx"));
        handle.report("parsing");
        assert!(tracker.check(Instant::now(), &config(60_000)).is_empty());
    }

    #[tokio::test]
    async fn armed_watchdog_flags_without_cancelling() {
        let tracker = ProgressTracker::new();
        let watchdog = Watchdog::arm(Arc::clone(&tracker), config(10));
        let handle = tracker.start(Path::new("Busy.aspx"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.report("still here");
        drop(handle);

        assert_eq!(watchdog.disarm().await, vec![PathBuf::from("Busy.aspx")]);
    }
}
