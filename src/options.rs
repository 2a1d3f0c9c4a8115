//! Coordinator options configuration.
//!
//! This module provides the [`CoordinatorOptions`] struct for configuring
//! how the [`InstallCoordinator`](crate::InstallCoordinator) talks to the
//! install service.

use std::time::Duration;

/// Configuration options for the install coordinator.
///
/// # Example
///
/// ```rust
/// use feature_delivery::CoordinatorOptions;
/// use std::time::Duration;
///
/// // Defaults: 30 second request timeout, 64 finished sessions remembered
/// let opts = CoordinatorOptions::default();
///
/// let opts = CoordinatorOptions {
///     request_timeout: Duration::from_secs(5),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// How long `request_install` waits for the service to accept a session.
    ///
    /// This bounds only the submission, not the install itself. On expiry
    /// the request fails with `InstallError::Timeout`.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// How many finished session ids to remember.
    ///
    /// Late events for a remembered session are dropped instead of being
    /// mistaken for a new session.
    ///
    /// Default: 64
    pub finished_history: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            finished_history: 64,
        }
    }
}
