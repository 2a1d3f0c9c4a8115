//! Error types for install coordination.
//!
//! Every variant carries a `fix` field with an actionable suggestion, and
//! [`InstallError::outcome`] tells the caller what to do next. The
//! coordinator never retries on its own.

use crate::install::{Outcome, SessionId};
use crate::{Feature, InstallStatus, ModuleName};
use std::time::Duration;
use thiserror::Error;

/// Service-reported code used when a `Failed` event carries no code.
pub const ERROR_CODE_UNKNOWN: i32 = -100;

/// Errors that can occur while requesting, tracking or launching modules.
///
/// # Example
///
/// ```rust
/// use feature_delivery::{InstallError, Outcome};
///
/// fn handle_error(error: &InstallError) {
///     eprintln!("Install request failed: {}", error);
///     eprintln!("To fix: {}", error.fix_suggestion());
///     if error.outcome() == Outcome::RetryLater {
///         eprintln!("This is transient; try again later");
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InstallError {
    /// A module name failed local validation.
    #[error("Invalid module name: {name:?}")]
    InvalidModuleName {
        /// The rejected name.
        name: String,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// An install request was built from no modules.
    #[error("Install request contains no modules")]
    EmptyRequest {
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// The service does not recognize a module.
    ///
    /// Not retryable without correcting the name.
    #[error("Unknown module: {module}")]
    InvalidModule {
        /// The unrecognized module.
        module: ModuleName,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// A session covering these modules is already in flight.
    #[error("Install already pending for {}", join_modules(.modules))]
    AlreadyPending {
        /// Modules that overlap the in-flight session.
        modules: Vec<ModuleName>,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// The service could not reach its backend.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// The install service itself is unavailable.
    #[error("Install service unavailable: {message}")]
    ServiceUnavailable {
        /// Description of why the service is unavailable.
        message: String,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// The service did not accept the request in time.
    #[error("Install request timed out after {duration:?}")]
    Timeout {
        /// How long the request was allowed to take.
        duration: Duration,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// A session ended with `Failed`.
    ///
    /// The code is the service's own and is never reinterpreted.
    #[error("Installation of {} failed with code {code}", join_modules(.modules))]
    InstallFailed {
        /// Service-defined error code.
        code: i32,
        /// Every module covered by the failed session.
        modules: Vec<ModuleName>,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// `subscribe` was called while a registration is still active.
    #[error("Coordinator already has an active subscription")]
    AlreadySubscribed {
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// `subscribe` was called outside a Tokio runtime.
    #[error("No Tokio runtime available to deliver install events")]
    NoRuntime {
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// The session is not tracked by this coordinator.
    #[error("Unknown install session {session}")]
    SessionNotFound {
        /// The session that was looked up.
        session: SessionId,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// `resolve_user_confirmation` was called for a session that is not
    /// waiting for the user.
    #[error("Session {session} does not require confirmation (status: {status})")]
    ConfirmationNotRequired {
        /// The session that was looked up.
        session: SessionId,
        /// Its last observed status, if any event has arrived.
        status: String,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// A feature was launched before its module was installed.
    #[error("Module {module} is not installed")]
    ModuleNotInstalled {
        /// The missing module.
        module: ModuleName,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// A feature has no launcher in the registry.
    #[error("No launcher registered for {feature:?}")]
    LauncherNotRegistered {
        /// The feature that could not be launched.
        feature: Feature,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },
}

fn join_modules(modules: &[ModuleName]) -> String {
    modules
        .iter()
        .map(ModuleName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl InstallError {
    /// Get an actionable suggestion for fixing this error.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::InvalidModuleName { fix, .. } => fix,
            Self::EmptyRequest { fix } => fix,
            Self::InvalidModule { fix, .. } => fix,
            Self::AlreadyPending { fix, .. } => fix,
            Self::Network { fix, .. } => fix,
            Self::ServiceUnavailable { fix, .. } => fix,
            Self::Timeout { fix, .. } => fix,
            Self::InstallFailed { fix, .. } => fix,
            Self::AlreadySubscribed { fix } => fix,
            Self::NoRuntime { fix } => fix,
            Self::SessionNotFound { fix, .. } => fix,
            Self::ConfirmationNotRequired { fix, .. } => fix,
            Self::ModuleNotInstalled { fix, .. } => fix,
            Self::LauncherNotRegistered { fix, .. } => fix,
        }
    }

    /// Whether re-issuing the same request may succeed without changes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use feature_delivery::InstallError;
    ///
    /// let error = InstallError::Network {
    ///     message: "connection reset".to_string(),
    ///     fix: "Check connectivity".to_string(),
    /// };
    /// assert!(error.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::ServiceUnavailable { .. } | Self::Timeout { .. }
        )
    }

    /// The caller action this error maps to.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Network { .. } | Self::ServiceUnavailable { .. } | Self::Timeout { .. } => {
                Outcome::RetryLater
            }
            Self::AlreadyPending { .. } => Outcome::Wait,
            _ => Outcome::Fail,
        }
    }

    /// Modules this error is about, if it names any.
    pub fn modules(&self) -> Vec<ModuleName> {
        match self {
            Self::InvalidModule { module, .. } | Self::ModuleNotInstalled { module, .. } => {
                vec![module.clone()]
            }
            Self::AlreadyPending { modules, .. } | Self::InstallFailed { modules, .. } => {
                modules.clone()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn empty_request() -> Self {
        Self::EmptyRequest {
            fix: "Add at least one module to the request".to_string(),
        }
    }

    pub(crate) fn already_pending(modules: Vec<ModuleName>) -> Self {
        Self::AlreadyPending {
            modules,
            fix: "Wait for the in-flight session to finish instead of re-requesting".to_string(),
        }
    }

    pub(crate) fn install_failed(code: i32, modules: Vec<ModuleName>) -> Self {
        Self::InstallFailed {
            code,
            modules,
            fix: format!(
                "The install service reported error code {}; re-request the modules once the cause is resolved",
                code
            ),
        }
    }

    pub(crate) fn session_not_found(session: SessionId) -> Self {
        Self::SessionNotFound {
            session,
            fix: "Only sessions started or observed by this coordinator can be addressed".to_string(),
        }
    }

    pub(crate) fn confirmation_not_required(session: SessionId, status: Option<InstallStatus>) -> Self {
        Self::ConfirmationNotRequired {
            session,
            status: status.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
            fix: "Only prompt the user after a RequiresUserConfirmation event".to_string(),
        }
    }
}
