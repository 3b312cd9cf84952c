//! Live session set with admission caps and timeouts.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::CloseReason;
use super::{SessionId, SessionState, Terminal};
use crate::error::ConsoleError;
use crate::Result;

/// Limits enforced by a [`SessionManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Sessions open at once, across all users.
    pub max_sessions: usize,
    pub max_sessions_per_user: usize,
    /// Close sessions with no input for this long. Sessions that are
    /// running a command are not idle.
    pub idle_timeout: Option<Duration>,
    /// Close sessions older than this regardless of activity.
    pub max_duration: Option<Duration>,
    /// How often the monitor sweeps the live set.
    pub monitor_tick: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            max_sessions_per_user: 8,
            idle_timeout: Some(Duration::from_secs(15 * 60)),
            max_duration: None,
            monitor_tick: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    last_activity: Instant,
    terminal: Option<Terminal>,
    env: HashMap<String, String>,
    close_reason: Option<CloseReason>,
    commands: u64,
}

/// One console session.
///
/// Shared between its driver, the monitor and the management API. The
/// cancellation token is a child of the manager's shutdown token; cancelling
/// it tears the session down.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    user: String,
    remote: Option<SocketAddr>,
    created_at: Instant,
    cancel: CancellationToken,
    inner: Mutex<SessionInner>,
}

impl Session {
    fn new(user: &str, remote: Option<SocketAddr>, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            id: SessionId::new(),
            user: user.to_string(),
            remote,
            created_at: now,
            cancel,
            inner: Mutex::new(SessionInner {
                state: SessionState::default(),
                last_activity: now,
                terminal: None,
                env: HashMap::new(),
                close_reason: None,
                commands: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn transition(&self, target: SessionState) -> Result<()> {
        self.lock().state.transition_to(target)
    }

    /// Record input activity.
    pub fn touch(&self) {
        self.lock().last_activity = Instant::now();
    }

    pub fn idle(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.lock().terminal.clone()
    }

    pub fn set_terminal(&self, terminal: Terminal) {
        self.lock().terminal = Some(terminal);
    }

    /// Apply a window change. Returns whether a terminal exists and its
    /// size changed.
    pub fn resize(&self, cols: u16, rows: u16) -> bool {
        self.lock()
            .terminal
            .as_mut()
            .is_some_and(|terminal| terminal.resize(cols, rows))
    }

    pub fn env(&self) -> HashMap<String, String> {
        self.lock().env.clone()
    }

    pub fn set_env(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock().env.insert(name.into(), value.into());
    }

    pub fn record_command(&self) {
        self.lock().commands += 1;
    }

    /// Mark the session for teardown. The first reason recorded wins and is
    /// returned.
    pub fn close(&self, reason: CloseReason) -> CloseReason {
        let reason = *self.lock().close_reason.get_or_insert(reason);
        self.cancel.cancel();
        reason
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock().close_reason
    }

    pub fn info(&self) -> SessionInfo {
        let inner = self.lock();
        SessionInfo {
            id: self.id,
            user: self.user.clone(),
            remote: self.remote.map(|addr| addr.to_string()),
            state: inner.state,
            terminal: inner.terminal.clone(),
            commands: inner.commands,
            idle_secs: inner.last_activity.elapsed().as_secs(),
            age_secs: self.created_at.elapsed().as_secs(),
        }
    }
}

/// Snapshot of a session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal: Option<Terminal>,
    pub commands: u64,
    pub idle_secs: u64,
    pub age_secs: u64,
}

#[derive(Debug, Default)]
struct LiveSet {
    sessions: HashMap<SessionId, Arc<Session>>,
    per_user: HashMap<String, usize>,
}

/// Owns the live session set.
///
/// Admission, removal and counting happen under one lock so the caps can't
/// be raced past.
#[derive(Debug)]
pub struct SessionManager {
    config: ManagerConfig,
    live: Mutex<LiveSet>,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            live: Mutex::new(LiveSet::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Admit a new session for `user`.
    ///
    /// The session stays in the live set until the returned guard drops.
    pub fn open(self: &Arc<Self>, user: &str, remote: Option<SocketAddr>) -> Result<SessionGuard> {
        let mut live = self.live.lock().map_err(|_| ConsoleError::LockPoisoned)?;

        if live.sessions.len() >= self.config.max_sessions {
            return Err(ConsoleError::CapacityExceeded(format!(
                "global limit of {} sessions",
                self.config.max_sessions
            )));
        }
        let for_user = live.per_user.get(user).copied().unwrap_or(0);
        if for_user >= self.config.max_sessions_per_user {
            return Err(ConsoleError::CapacityExceeded(format!(
                "limit of {} sessions for user {user}",
                self.config.max_sessions_per_user
            )));
        }

        let session = Arc::new(Session::new(user, remote, self.shutdown.child_token()));
        live.sessions.insert(session.id(), Arc::clone(&session));
        *live.per_user.entry(user.to_string()).or_default() += 1;
        drop(live);

        info!(session = %session.id(), user, remote = ?remote, "session opened");
        Ok(SessionGuard {
            manager: Arc::clone(self),
            session,
        })
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.snapshot_lock().sessions.get(&id).cloned()
    }

    /// All live sessions, ordered by id.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions().iter().map(|s| s.info()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Close a session from outside its driver.
    pub fn kill(&self, id: SessionId) -> Result<()> {
        let session = self
            .get(id)
            .ok_or_else(|| ConsoleError::SessionNotFound(id.to_string()))?;
        session.close(CloseReason::Killed);
        info!(session = %id, "session killed");
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.snapshot_lock().sessions.len()
    }

    pub fn count_for(&self, user: &str) -> usize {
        self.snapshot_lock().per_user.get(user).copied().unwrap_or(0)
    }

    /// Close every session past its idle timeout or maximum duration.
    /// Returns the ids closed by this sweep.
    pub fn sweep(&self) -> Vec<SessionId> {
        let mut closed = Vec::new();
        for session in self.sessions() {
            if session.cancel().is_cancelled() {
                continue;
            }
            let reason = if self.config.max_duration.is_some_and(|max| session.age() >= max) {
                Some(CloseReason::MaxDuration)
            } else if self.config.idle_timeout.is_some_and(|max| session.idle() >= max) {
                Some(CloseReason::IdleTimeout)
            } else {
                None
            };
            if let Some(reason) = reason {
                info!(session = %session.id(), %reason, "closing session");
                session.close(reason);
                closed.push(session.id());
            }
        }
        closed
    }

    /// Run [`sweep`](Self::sweep) every `monitor_tick` until shutdown.
    pub fn spawn_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.monitor_tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let closed = manager.sweep();
                        if !closed.is_empty() {
                            debug!(count = closed.len(), "monitor closed sessions");
                        }
                    }
                }
            }
            debug!("session monitor stopped");
        })
    }

    /// Close every session and stop the monitor.
    pub fn shutdown(&self) {
        for session in self.sessions() {
            session.close(CloseReason::Shutdown);
        }
        self.shutdown.cancel();
    }

    /// Cancelled once [`shutdown`](Self::shutdown) runs.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn sessions(&self) -> Vec<Arc<Session>> {
        self.snapshot_lock().sessions.values().cloned().collect()
    }

    fn snapshot_lock(&self) -> MutexGuard<'_, LiveSet> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, session: &Session) {
        let mut live = self.snapshot_lock();
        if live.sessions.remove(&session.id()).is_none() {
            warn!(session = %session.id(), "released session was not live");
            return;
        }
        if let Some(count) = live.per_user.get_mut(session.user()) {
            *count -= 1;
            if *count == 0 {
                live.per_user.remove(session.user());
            }
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

/// Membership of a session in the live set.
///
/// Dropping the guard closes the session and frees its slot, whichever way
/// the driver exits.
#[derive(Debug)]
pub struct SessionGuard {
    manager: Arc<SessionManager>,
    session: Arc<Session>,
}

impl SessionGuard {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let reason = self.session.close(CloseReason::ClientClosed);
        // Already closed is fine.
        let _ = self.session.transition(SessionState::Closed);
        self.manager.release(&self.session);
        info!(session = %self.session.id(), user = self.session.user(), %reason, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max: usize, per_user: usize) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(ManagerConfig {
            max_sessions: max,
            max_sessions_per_user: per_user,
            ..ManagerConfig::default()
        }))
    }

    #[test]
    fn test_global_cap_rejects_extra_session() {
        let manager = manager(2, 10);
        let _a = manager.open("alice", None).unwrap();
        let _b = manager.open("bob", None).unwrap();

        let err = manager.open("carol", None).unwrap_err();
        assert!(matches!(err, ConsoleError::CapacityExceeded(_)));
        assert_eq!(manager.count(), 2);
    }

    #[test]
    fn test_per_user_cap() {
        let manager = manager(10, 1);
        let _a = manager.open("alice", None).unwrap();
        tokio_test::assert_err!(manager.open("alice", None));
        tokio_test::assert_ok!(manager.open("bob", None));
    }

    #[test]
    fn test_guard_drop_frees_slot() {
        let manager = manager(1, 1);
        let guard = manager.open("alice", None).unwrap();
        let cancel = guard.cancel().clone();
        assert_eq!(manager.count_for("alice"), 1);

        drop(guard);
        assert!(cancel.is_cancelled());
        assert_eq!(manager.count(), 0);
        assert_eq!(manager.count_for("alice"), 0);
        assert!(manager.open("alice", None).is_ok());
    }

    #[test]
    fn test_drop_marks_closed() {
        let manager = manager(4, 4);
        let guard = manager.open("alice", None).unwrap();
        let session = Arc::clone(guard.session());
        guard.transition(SessionState::Interactive).unwrap();
        drop(guard);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.close_reason(), Some(CloseReason::ClientClosed));
    }

    #[test]
    fn test_kill_records_reason() {
        let manager = manager(4, 4);
        let guard = manager.open("alice", None).unwrap();
        manager.kill(guard.id()).unwrap();
        assert!(guard.cancel().is_cancelled());
        assert_eq!(guard.close_reason(), Some(CloseReason::Killed));
        // First reason wins.
        assert_eq!(guard.close(CloseReason::ClientClosed), CloseReason::Killed);
    }

    #[test]
    fn test_kill_unknown_session() {
        let manager = manager(4, 4);
        let err = manager.kill(SessionId::from_raw(u64::MAX)).unwrap_err();
        assert!(matches!(err, ConsoleError::SessionNotFound(_)));
    }

    #[test]
    fn test_sweep_closes_idle_session() {
        let manager = Arc::new(SessionManager::new(ManagerConfig {
            idle_timeout: Some(Duration::from_millis(20)),
            ..ManagerConfig::default()
        }));
        let idle = manager.open("alice", None).unwrap();
        idle.transition(SessionState::Interactive).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        let busy = manager.open("bob", None).unwrap();

        let closed = manager.sweep();
        assert_eq!(closed, vec![idle.id()]);
        assert!(idle.cancel().is_cancelled());
        assert_eq!(idle.close_reason(), Some(CloseReason::IdleTimeout));
        assert!(!busy.cancel().is_cancelled());
    }

    #[test]
    fn test_sweep_closes_idle_executing_session() {
        let manager = Arc::new(SessionManager::new(ManagerConfig {
            idle_timeout: Some(Duration::from_millis(10)),
            ..ManagerConfig::default()
        }));
        let guard = manager.open("alice", None).unwrap();
        guard.transition(SessionState::Executing).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(manager.sweep(), vec![guard.id()]);
        assert_eq!(guard.close_reason(), Some(CloseReason::IdleTimeout));
    }

    #[test]
    fn test_sweep_enforces_max_duration() {
        let manager = Arc::new(SessionManager::new(ManagerConfig {
            idle_timeout: None,
            max_duration: Some(Duration::from_millis(10)),
            ..ManagerConfig::default()
        }));
        let guard = manager.open("alice", None).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        guard.touch();
        assert_eq!(manager.sweep(), vec![guard.id()]);
        assert_eq!(guard.close_reason(), Some(CloseReason::MaxDuration));
    }

    #[test]
    fn test_shutdown_cancels_all_sessions() {
        let manager = manager(4, 4);
        let a = manager.open("alice", None).unwrap();
        let b = manager.open("bob", None).unwrap();
        manager.shutdown();
        assert!(a.cancel().is_cancelled());
        assert!(b.cancel().is_cancelled());
        assert_eq!(a.close_reason(), Some(CloseReason::Shutdown));
    }

    #[test]
    fn test_list_is_ordered() {
        let manager = manager(4, 4);
        let a = manager.open("alice", None).unwrap();
        let b = manager.open("bob", None).unwrap();
        let ids: Vec<SessionId> = manager.list().into_iter().map(|info| info.id).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn test_concurrent_admission_respects_cap() {
        use std::thread;

        let manager = manager(10, 100);
        let handles: Vec<_> = (0..40)
            .map(|i| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || manager.open(&format!("user{i}"), None).ok())
            })
            .collect();
        let guards: Vec<SessionGuard> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(guards.len(), 10);
        assert_eq!(manager.count(), 10);
    }

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let manager = Arc::new(SessionManager::new(ManagerConfig {
            monitor_tick: Duration::from_millis(5),
            idle_timeout: Some(Duration::from_millis(10)),
            ..ManagerConfig::default()
        }));
        let guard = manager.open("alice", None).unwrap();
        let monitor = manager.spawn_monitor();

        tokio::time::timeout(Duration::from_secs(2), guard.cancel().cancelled())
            .await
            .unwrap();
        assert_eq!(guard.close_reason(), Some(CloseReason::IdleTimeout));

        manager.shutdown();
        monitor.await.unwrap();
    }
}
