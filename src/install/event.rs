//! Status events and the caller-facing updates derived from them.
//!
//! The service pushes [`StatusEvent`]s; the coordinator validates them
//! against the session state machine and hands [`InstallUpdate`]s to the
//! subscriber. Each update maps to exactly one [`Outcome`].

use crate::install::errors::ERROR_CODE_UNKNOWN;
use crate::install::SessionId;
use crate::{InstallError, InstallStatus, ModuleName};
use serde::{Deserialize, Serialize};

/// Opaque token the service hands out with `RequiresUserConfirmation`.
///
/// Pass it back through
/// [`InstallCoordinator::resolve_user_confirmation`](crate::InstallCoordinator::resolve_user_confirmation)
/// to start the service's confirmation flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmationHandle {
    session: SessionId,
    token: String,
}

impl ConfirmationHandle {
    /// Create a handle for `session`. Only services construct these.
    pub fn new(session: SessionId, token: impl Into<String>) -> Self {
        Self {
            session,
            token: token.into(),
        }
    }

    /// Session awaiting confirmation.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Service-defined token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// A raw status notification pushed by the install service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Session the event belongs to.
    pub session: SessionId,

    /// New status of the session.
    pub status: InstallStatus,

    /// Modules the session covers.
    pub modules: Vec<ModuleName>,

    /// Bytes transferred so far.
    pub bytes_downloaded: u64,

    /// Total bytes to transfer, `0` when unknown.
    pub total_bytes: u64,

    /// Service error code, only meaningful for `Failed`.
    pub error_code: Option<i32>,

    /// Confirmation token, only present for `RequiresUserConfirmation`.
    pub confirmation: Option<ConfirmationHandle>,
}

impl StatusEvent {
    /// Event with no progress, error or confirmation attached.
    pub fn new(session: SessionId, status: InstallStatus, modules: Vec<ModuleName>) -> Self {
        Self {
            session,
            status,
            modules,
            bytes_downloaded: 0,
            total_bytes: 0,
            error_code: None,
            confirmation: None,
        }
    }

    /// Attach byte counters.
    pub fn with_progress(mut self, bytes_downloaded: u64, total_bytes: u64) -> Self {
        self.bytes_downloaded = bytes_downloaded;
        self.total_bytes = total_bytes;
        self
    }

    /// Attach a service error code.
    pub fn with_error_code(mut self, code: i32) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Attach a confirmation handle.
    pub fn with_confirmation(mut self, handle: ConfirmationHandle) -> Self {
        self.confirmation = Some(handle);
        self
    }
}

/// What the caller should do in response to an update or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Outcome {
    /// Work is progressing; keep waiting for events.
    Wait,
    /// Show the service's confirmation flow to the user.
    PromptUser,
    /// The modules are installed and can be used.
    Proceed,
    /// Transient failure; the caller may re-issue the request later.
    RetryLater,
    /// The session failed; report the error.
    Fail,
    /// The session was canceled.
    Canceled,
}

/// A validated status change delivered to the subscriber.
///
/// # Example
///
/// ```rust
/// use feature_delivery::{InstallUpdate, Outcome};
///
/// fn on_update(update: InstallUpdate) {
///     match update.outcome() {
///         Outcome::Wait => {
///             if let Some(percent) = update.percent() {
///                 println!("{}: {}%", update.status.description(), percent);
///             }
///         }
///         Outcome::PromptUser => println!("Needs confirmation"),
///         Outcome::Proceed => println!("Ready: {:?}", update.modules),
///         Outcome::Fail => {
///             if let Some(error) = update.failure() {
///                 eprintln!("{}", error);
///             }
///         }
///         Outcome::Canceled | Outcome::RetryLater => {}
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallUpdate {
    /// Session the update belongs to.
    pub session: SessionId,

    /// New status of the session.
    pub status: InstallStatus,

    /// Every module the session covers. Never empty.
    pub modules: Vec<ModuleName>,

    /// Bytes transferred so far.
    pub bytes_downloaded: u64,

    /// Total bytes to transfer, `0` when unknown.
    pub total_bytes: u64,

    /// Service error code for `Failed`.
    pub error_code: Option<i32>,

    /// Confirmation token for `RequiresUserConfirmation`.
    pub confirmation: Option<ConfirmationHandle>,
}

impl InstallUpdate {
    pub(crate) fn from_event(event: StatusEvent, modules: Vec<ModuleName>) -> Self {
        Self {
            session: event.session,
            status: event.status,
            modules,
            bytes_downloaded: event.bytes_downloaded,
            total_bytes: event.total_bytes,
            error_code: event.error_code,
            confirmation: event.confirmation,
        }
    }

    /// The caller action for this update.
    pub fn outcome(&self) -> Outcome {
        match self.status {
            InstallStatus::Pending | InstallStatus::Downloading | InstallStatus::Installing => {
                Outcome::Wait
            }
            InstallStatus::RequiresUserConfirmation => Outcome::PromptUser,
            InstallStatus::Installed => Outcome::Proceed,
            InstallStatus::Failed => Outcome::Fail,
            InstallStatus::Canceled => Outcome::Canceled,
        }
    }

    /// The error for a `Failed` update, carrying the service code verbatim.
    pub fn failure(&self) -> Option<InstallError> {
        (self.status == InstallStatus::Failed).then(|| {
            InstallError::install_failed(
                self.error_code.unwrap_or(ERROR_CODE_UNKNOWN),
                self.modules.clone(),
            )
        })
    }

    /// Download progress in whole percent, when the total is known.
    pub fn percent(&self) -> Option<u8> {
        if self.total_bytes == 0 {
            return None;
        }
        let clamped = u128::from(self.bytes_downloaded.min(self.total_bytes));
        Some((clamped * 100 / u128::from(self.total_bytes)) as u8)
    }

    /// Whether the session covers more than one module.
    pub fn is_multi_module(&self) -> bool {
        self.modules.len() > 1
    }

    /// Whether this is the session's last update.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
