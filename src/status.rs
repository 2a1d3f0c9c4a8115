//! Install status and the per-session state machine.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Lifecycle stage of an install session.
///
/// Sessions move through the following graph:
///
/// ```text
/// Pending -> Downloading -> Installing -> Installed
/// Pending -> RequiresUserConfirmation -> Downloading
/// Downloading | Installing -> Failed
/// any non-terminal -> Canceled
/// ```
///
/// # Example
///
/// ```rust
/// use feature_delivery::InstallStatus;
///
/// assert!(InstallStatus::Pending.can_transition_to(InstallStatus::Downloading));
/// assert!(!InstallStatus::Pending.can_transition_to(InstallStatus::Installed));
/// assert!(InstallStatus::Installed.is_terminal());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter, strum::Display,
)]
pub enum InstallStatus {
    /// Accepted by the service, not yet started.
    Pending,
    /// Module payload is being transferred.
    Downloading,
    /// Payload downloaded, being unpacked and verified.
    Installing,
    /// The service needs the user to approve the download before it proceeds.
    RequiresUserConfirmation,
    /// All modules in the session are installed.
    Installed,
    /// The session failed; the event carries the service error code.
    Failed,
    /// The session was aborted by the caller or the service.
    Canceled,
}

impl InstallStatus {
    /// Whether the session ends at this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Installed | Self::Failed | Self::Canceled)
    }

    /// Whether the session is still doing work (or waiting to).
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Repeated `Downloading` is legal so the service can report byte
    /// progress; every other self-transition is rejected.
    pub fn can_transition_to(&self, next: InstallStatus) -> bool {
        use InstallStatus::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Canceled) => true,
            (Pending, Downloading | RequiresUserConfirmation) => true,
            (RequiresUserConfirmation, Downloading) => true,
            (Downloading, Downloading | Installing | Failed) => true,
            (Installing, Installed | Failed) => true,
            _ => false,
        }
    }

    /// Human-readable description of the status.
    ///
    /// # Example
    ///
    /// ```rust
    /// use feature_delivery::InstallStatus;
    ///
    /// assert_eq!(InstallStatus::Downloading.description(), "Downloading");
    /// ```
    pub fn description(&self) -> &'static str {
        match self {
            Self::Pending => "Waiting to start",
            Self::Downloading => "Downloading",
            Self::Installing => "Installing",
            Self::RequiresUserConfirmation => "Waiting for user confirmation",
            Self::Installed => "Installed",
            Self::Failed => "Installation failed",
            Self::Canceled => "Installation canceled",
        }
    }

    /// Iterator over every status.
    pub fn all() -> impl Iterator<Item = Self> {
        <Self as IntoEnumIterator>::iter()
    }
}
