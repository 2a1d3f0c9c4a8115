//! Boundary to the platform module-install service.
//!
//! The coordinator talks to the backend exclusively through
//! [`ModuleInstallService`]. Status events are pushed into a channel the
//! coordinator hands over with [`ModuleInstallService::register_listener`].

mod memory;

pub use memory::{InMemoryInstallService, InstallPlan};

use crate::install::{ConfirmationHandle, InstallRequest, SessionId, StatusEvent};
use crate::{InstallError, ModuleName};
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::mpsc;

/// Sending half of a listener's event channel.
pub type EventSink = mpsc::UnboundedSender<StatusEvent>;

/// Identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wrap a raw listener id. Only services construct these.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// The external module-install service.
///
/// Implementations own the actual download, verification and storage work.
/// They must deliver the events of one session to every registered sink in
/// state-machine order and must not send to a sink after
/// [`unregister_listener`](Self::unregister_listener) returns for it.
pub trait ModuleInstallService: Send + Sync + 'static {
    /// Snapshot of the modules currently installed.
    fn installed_modules(&self) -> BTreeSet<ModuleName>;

    /// Submit a request. Resolves once the service accepted (or rejected)
    /// the session, not when the install finishes.
    fn start_install(&self, request: InstallRequest)
        -> BoxFuture<'static, Result<SessionId, InstallError>>;

    /// Ask the service to abort a session. The session ends with a
    /// `Canceled` event.
    fn cancel_install(&self, session: SessionId) -> BoxFuture<'static, Result<(), InstallError>>;

    /// Start pushing status events into `sink`.
    fn register_listener(&self, sink: EventSink) -> ListenerId;

    /// Stop pushing status events to a listener.
    fn unregister_listener(&self, listener: ListenerId);

    /// Show the platform confirmation flow for a session waiting on the user.
    fn start_confirmation(&self, handle: &ConfirmationHandle) -> Result<(), InstallError>;
}
