use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

struct ArmedTimer {
    id: Uuid,
    handle: JoinHandle<()>,
}

/// One cancellable delayed task per session.
///
/// A firing timer removes its own handle before running its action, so an
/// `abort` issued from inside that action (or racing with it) finds nothing to
/// cancel and returns harmlessly.
pub struct AutoStopScheduler {
    timeout: Duration,
    timers: Arc<DashMap<String, ArmedTimer>>,
}

impl AutoStopScheduler {
    pub fn new(timeout: Duration) -> Self {
        AutoStopScheduler {
            timeout,
            timers: Arc::new(DashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Schedules `action` to run once the timeout elapses for `session_id`.
    ///
    /// Returns `false` and leaves the pending timer in place when the session
    /// already has one.
    pub fn arm<F, Fut>(&self, session_id: &str, action: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match self.timers.entry(session_id.to_string()) {
            Entry::Occupied(_) => {
                debug!("Auto-stop already armed for session {}", session_id);
                false
            }
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                let timers = self.timers.clone();
                let key = session_id.to_string();
                let timeout = self.timeout;
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    timers.remove_if(&key, |_, timer| timer.id == id);
                    info!(
                        "Auto-stop timeout of {}s elapsed for session {}",
                        timeout.as_secs(),
                        key
                    );
                    action().await;
                });
                slot.insert(ArmedTimer { id, handle });
                info!(
                    "Auto-stop armed for session {} ({}s)",
                    session_id,
                    timeout.as_secs()
                );
                true
            }
        }
    }

    /// Cancels the pending timer of `session_id`.
    ///
    /// Always returns `true`: once this returns no timer is pending for the
    /// session, whether or not one was armed. A timer whose action is already
    /// running is not interrupted.
    pub fn abort(&self, session_id: &str) -> bool {
        if let Some((_, timer)) = self.timers.remove(session_id) {
            timer.handle.abort();
            info!("Auto-stop disarmed for session {}", session_id);
        }
        true
    }

    pub fn is_armed(&self, session_id: &str) -> bool {
        self.timers.contains_key(session_id)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    /// Cancels every pending timer.
    pub fn shutdown(&self) {
        let sessions: Vec<String> = self.timers.iter().map(|t| t.key().clone()).collect();
        for session_id in sessions {
            self.abort(&session_id);
        }
    }
}

impl Drop for AutoStopScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
