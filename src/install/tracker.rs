//! Per-session bookkeeping behind the coordinator.
//!
//! The tracker is the only place that mutates session state. Every incoming
//! [`StatusEvent`] is applied atomically under the coordinator's lock and
//! either becomes an [`InstallUpdate`] or is dropped.

use crate::install::{ConfirmationHandle, InstallUpdate, SessionId, StatusEvent};
use crate::{InstallError, InstallStatus, ModuleName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};

/// Point-in-time view of an in-flight session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Service-assigned session id.
    pub id: SessionId,
    /// Modules the session covers.
    pub modules: Vec<ModuleName>,
    /// Last observed status; `None` until the first event arrives.
    pub status: Option<InstallStatus>,
    /// Bytes transferred so far.
    pub bytes_downloaded: u64,
    /// Total bytes to transfer, `0` when unknown.
    pub total_bytes: u64,
}

#[derive(Debug)]
struct TrackedSession {
    modules: Vec<ModuleName>,
    status: Option<InstallStatus>,
    bytes_downloaded: u64,
    total_bytes: u64,
    confirmation: Option<ConfirmationHandle>,
}

impl TrackedSession {
    fn new(modules: Vec<ModuleName>) -> Self {
        Self {
            modules,
            status: None,
            bytes_downloaded: 0,
            total_bytes: 0,
            confirmation: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct SessionTracker {
    sessions: HashMap<SessionId, TrackedSession>,
    /// Modules submitted to the service whose session id is not known yet.
    reserved: BTreeSet<ModuleName>,
    finished: VecDeque<SessionId>,
    finished_history: usize,
    /// Bumped on every `clear`; reservations from an older epoch are stale.
    epoch: u64,
}

impl SessionTracker {
    pub(crate) fn new(finished_history: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            reserved: BTreeSet::new(),
            finished: VecDeque::new(),
            finished_history,
            epoch: 0,
        }
    }

    /// Claim `modules` for a new request.
    ///
    /// Fails with `AlreadyPending` when any of them belongs to an in-flight
    /// session or to another request still waiting for its id. Returns the
    /// epoch the reservation belongs to.
    pub(crate) fn reserve(&mut self, modules: &[ModuleName]) -> Result<u64, InstallError> {
        let overlap: Vec<ModuleName> = modules
            .iter()
            .filter(|m| self.reserved.contains(*m) || self.is_in_flight(m))
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(InstallError::already_pending(overlap));
        }
        self.reserved.extend(modules.iter().cloned());
        Ok(self.epoch)
    }

    /// Drop a reservation made in `epoch`. Stale epochs are ignored.
    pub(crate) fn release(&mut self, modules: &[ModuleName], epoch: u64) {
        if epoch != self.epoch {
            return;
        }
        for module in modules {
            self.reserved.remove(module);
        }
    }

    /// Bind reserved modules to the id the service assigned.
    ///
    /// A reservation from an earlier epoch belongs to a subscription that has
    /// since ended, so its session is not tracked.
    pub(crate) fn register(&mut self, id: SessionId, modules: Vec<ModuleName>, epoch: u64) {
        if epoch != self.epoch {
            debug!(session = %id, "not tracking session reserved by an earlier subscription");
            return;
        }
        self.release(&modules, epoch);
        if self.finished.contains(&id) {
            // Terminal event beat the id back to us.
            return;
        }
        self.sessions
            .entry(id)
            .and_modify(|session| session.modules = modules.clone())
            .or_insert_with(|| TrackedSession::new(modules));
    }

    /// Apply one event. Returns the update to deliver, if any.
    pub(crate) fn apply(&mut self, event: StatusEvent) -> Option<InstallUpdate> {
        let id = event.session;

        if event.modules.is_empty() {
            warn!(session = %id, status = %event.status, "dropping event without modules");
            return None;
        }
        if self.finished.contains(&id) {
            debug!(session = %id, status = %event.status, "dropping event for finished session");
            return None;
        }

        if !self.sessions.contains_key(&id) {
            // Events can overtake the start_install response; adopt the
            // session if it covers a module we are waiting on.
            if !event.modules.iter().any(|m| self.reserved.contains(m)) {
                debug!(session = %id, "ignoring event for untracked session");
                return None;
            }
            self.sessions
                .insert(id, TrackedSession::new(event.modules.clone()));
        }
        let session = self.sessions.get_mut(&id)?;

        if let Some(stray) = event.modules.iter().find(|m| !session.modules.contains(m)) {
            warn!(session = %id, module = %stray, "dropping event naming a module outside the session");
            return None;
        }

        if let Some(previous) = session.status {
            let regular = previous.can_transition_to(event.status);
            if !regular && event.status == InstallStatus::Failed {
                // A failure ends the session whatever it interrupted.
                warn!(
                    session = %id,
                    from = %previous,
                    "accepting failure outside the regular status path"
                );
            } else if !regular {
                warn!(
                    session = %id,
                    from = %previous,
                    to = %event.status,
                    "dropping out-of-order status event"
                );
                return None;
            }
            if previous == event.status && event.bytes_downloaded == session.bytes_downloaded {
                debug!(session = %id, status = %event.status, "dropping duplicate status event");
                return None;
            }
        }

        session.status = Some(event.status);
        session.bytes_downloaded = event.bytes_downloaded;
        session.total_bytes = event.total_bytes;
        session.confirmation = event.confirmation.clone();
        let modules = session.modules.clone();

        if event.status.is_terminal() {
            self.sessions.remove(&id);
            self.finished.push_back(id);
            while self.finished.len() > self.finished_history {
                self.finished.pop_front();
            }
        }

        Some(InstallUpdate::from_event(event, modules))
    }

    /// The confirmation handle of a session waiting on the user.
    pub(crate) fn confirmation(&self, id: SessionId) -> Result<ConfirmationHandle, InstallError> {
        let session = self
            .sessions
            .get(&id)
            .ok_or_else(|| InstallError::session_not_found(id))?;
        match (&session.status, &session.confirmation) {
            (Some(InstallStatus::RequiresUserConfirmation), Some(handle)) => Ok(handle.clone()),
            (status, _) => Err(InstallError::confirmation_not_required(id, *status)),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|(id, session)| SessionSnapshot {
                id: *id,
                modules: session.modules.clone(),
                status: session.status,
                bytes_downloaded: session.bytes_downloaded,
                total_bytes: session.total_bytes,
            })
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Forget everything; used when the subscription starts or ends.
    pub(crate) fn clear(&mut self) {
        self.epoch += 1;
        self.sessions.clear();
        self.reserved.clear();
        self.finished.clear();
    }

    fn is_in_flight(&self, module: &ModuleName) -> bool {
        self.sessions.values().any(|s| s.modules.contains(module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InstallStatus::*;

    fn module(name: &str) -> ModuleName {
        ModuleName::new(name).unwrap()
    }

    fn event(id: u64, status: InstallStatus, modules: &[&str]) -> StatusEvent {
        StatusEvent::new(
            SessionId::new(id),
            status,
            modules.iter().map(|m| module(m)).collect(),
        )
    }

    fn tracker_with_session(id: u64, modules: &[&str]) -> SessionTracker {
        let mut tracker = SessionTracker::new(8);
        let modules: Vec<_> = modules.iter().map(|m| module(m)).collect();
        let epoch = tracker.reserve(&modules).unwrap();
        tracker.register(SessionId::new(id), modules, epoch);
        tracker
    }

    #[test]
    fn test_valid_path_is_delivered() {
        let mut tracker = tracker_with_session(1, &["assets"]);
        let statuses: Vec<_> = [Pending, Downloading, Installing, Installed]
            .into_iter()
            .filter_map(|s| tracker.apply(event(1, s, &["assets"])))
            .map(|u| u.status)
            .collect();
        assert_eq!(statuses, vec![Pending, Downloading, Installing, Installed]);
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn test_installed_before_download_is_dropped() {
        let mut tracker = tracker_with_session(1, &["assets"]);
        assert!(tracker.apply(event(1, Pending, &["assets"])).is_some());
        assert!(tracker.apply(event(1, Installed, &["assets"])).is_none());
        assert_eq!(tracker.snapshot()[0].status, Some(Pending));
    }

    #[test]
    fn test_nothing_after_terminal() {
        let mut tracker = tracker_with_session(1, &["assets"]);
        tracker.apply(event(1, Pending, &["assets"]));
        tracker.apply(event(1, Canceled, &["assets"]));
        assert!(tracker.apply(event(1, Downloading, &["assets"])).is_none());
    }

    #[test]
    fn test_progress_updates_need_new_bytes() {
        let mut tracker = tracker_with_session(1, &["assets"]);
        tracker.apply(event(1, Pending, &["assets"]));
        assert!(tracker
            .apply(event(1, Downloading, &["assets"]).with_progress(10, 100))
            .is_some());
        assert!(tracker
            .apply(event(1, Downloading, &["assets"]).with_progress(10, 100))
            .is_none());
        let update = tracker
            .apply(event(1, Downloading, &["assets"]).with_progress(60, 100))
            .unwrap();
        assert_eq!(update.percent(), Some(60));
    }

    #[test]
    fn test_foreign_session_ignored() {
        let mut tracker = tracker_with_session(1, &["assets"]);
        assert!(tracker.apply(event(2, Pending, &["java"])).is_none());
    }

    #[test]
    fn test_event_before_register_is_adopted() {
        let mut tracker = SessionTracker::new(8);
        let modules = vec![module("kotlin"), module("java")];
        tracker.reserve(&modules).unwrap();

        let early = tracker.apply(event(5, Pending, &["kotlin", "java"])).unwrap();
        assert_eq!(early.modules, modules);

        tracker.register(SessionId::new(5), modules.clone(), 0);
        let next = tracker.apply(event(5, Downloading, &["kotlin", "java"])).unwrap();
        assert_eq!(next.modules, modules);
        assert!(next.is_multi_module());
    }

    #[test]
    fn test_terminal_before_register_is_not_resurrected() {
        let mut tracker = SessionTracker::new(8);
        let modules = vec![module("assets")];
        tracker.reserve(&modules).unwrap();
        tracker.apply(event(3, Pending, &["assets"]));
        tracker.apply(event(3, Downloading, &["assets"]).with_progress(1, 2));
        tracker.apply(event(3, Installing, &["assets"]));
        tracker.apply(event(3, Installed, &["assets"]));
        tracker.register(SessionId::new(3), modules.clone(), 0);
        assert!(tracker.snapshot().is_empty());
        assert!(tracker.reserve(&modules).is_ok());
    }

    #[test]
    fn test_stray_module_dropped() {
        let mut tracker = tracker_with_session(1, &["assets"]);
        assert!(tracker.apply(event(1, Pending, &["assets", "java"])).is_none());
    }

    #[test]
    fn test_reserve_detects_overlap() {
        let mut tracker = tracker_with_session(1, &["assets", "java"]);
        let err = tracker.reserve(&[module("java"), module("kotlin")]).unwrap_err();
        match err {
            InstallError::AlreadyPending { modules, .. } => assert_eq!(modules, vec![module("java")]),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(tracker.reserve(&[module("kotlin")]).is_ok());
        assert!(tracker.reserve(&[module("kotlin")]).is_err());
        tracker.release(&[module("kotlin")], 0);
        assert!(tracker.reserve(&[module("kotlin")]).is_ok());
    }

    #[test]
    fn test_confirmation_lookup() {
        let mut tracker = tracker_with_session(1, &["native"]);
        let id = SessionId::new(1);
        assert!(matches!(
            tracker.confirmation(id),
            Err(InstallError::ConfirmationNotRequired { .. })
        ));

        tracker.apply(event(1, Pending, &["native"]));
        let handle = ConfirmationHandle::new(id, "token");
        tracker.apply(event(1, RequiresUserConfirmation, &["native"]).with_confirmation(handle.clone()));
        assert_eq!(tracker.confirmation(id).unwrap(), handle);

        assert!(matches!(
            tracker.confirmation(SessionId::new(9)),
            Err(InstallError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_finished_history_is_bounded() {
        let mut tracker = SessionTracker::new(2);
        for id in 1..=3 {
            let epoch = tracker.reserve(&[module("assets")]).unwrap();
            tracker.register(SessionId::new(id), vec![module("assets")], epoch);
            tracker.apply(event(id, Pending, &["assets"]));
            tracker.apply(event(id, Canceled, &["assets"]));
        }
        assert_eq!(tracker.finished.len(), 2);
        assert!(!tracker.finished.contains(&SessionId::new(1)));
    }

    #[test]
    fn test_failure_from_pending_retires_session() {
        let mut tracker = tracker_with_session(1, &["assets"]);
        tracker.apply(event(1, Pending, &["assets"]));

        let failed = tracker
            .apply(event(1, Failed, &["assets"]).with_error_code(403))
            .unwrap();
        assert_eq!(failed.status, Failed);
        assert_eq!(failed.error_code, Some(403));
        assert!(tracker.snapshot().is_empty());
        assert!(tracker.reserve(&[module("assets")]).is_ok());
    }

    #[test]
    fn test_failure_from_confirmation_is_delivered() {
        let mut tracker = tracker_with_session(1, &["native"]);
        tracker.apply(event(1, Pending, &["native"]));
        tracker.apply(event(1, RequiresUserConfirmation, &["native"]));
        assert!(tracker.apply(event(1, Failed, &["native"])).is_some());
        assert!(tracker.apply(event(1, Downloading, &["native"])).is_none());
    }

    #[test]
    fn test_stale_reservation_is_not_registered() {
        let mut tracker = SessionTracker::new(8);
        let old = tracker.reserve(&[module("assets")]).unwrap();
        tracker.clear();

        let current = tracker.reserve(&[module("java")]).unwrap();
        assert_ne!(old, current);

        tracker.register(SessionId::new(1), vec![module("assets")], old);
        assert!(tracker.snapshot().is_empty());
        assert!(tracker.apply(event(1, Pending, &["assets"])).is_none());

        tracker.release(&[module("java")], old);
        assert!(tracker.reserve(&[module("java")]).is_err());
        tracker.release(&[module("java")], current);
        assert!(tracker.reserve(&[module("java")]).is_ok());
    }
}
