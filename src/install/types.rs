//! Request and session identity types.

use crate::{InstallError, ModuleName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the service assigns to an install session.
///
/// Ids are allocated monotonically by the service; this crate only compares
/// them for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw service session id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An ordered, duplicate-free set of modules submitted as one session.
///
/// Duplicates are dropped while keeping the position of the first
/// occurrence.
///
/// # Example
///
/// ```rust
/// use feature_delivery::{InstallRequest, ModuleName};
///
/// let request = InstallRequest::new([
///     ModuleName::new("kotlin").unwrap(),
///     ModuleName::new("assets").unwrap(),
///     ModuleName::new("kotlin").unwrap(),
/// ]).unwrap();
///
/// assert_eq!(request.len(), 2);
/// assert_eq!(request.modules()[0].as_str(), "kotlin");
/// assert!(request.is_multi_module());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    modules: Vec<ModuleName>,
}

impl InstallRequest {
    /// Build a request from one or more modules.
    pub fn new(modules: impl IntoIterator<Item = ModuleName>) -> Result<Self, InstallError> {
        let mut unique: Vec<ModuleName> = Vec::new();
        for module in modules {
            if !unique.contains(&module) {
                unique.push(module);
            }
        }
        if unique.is_empty() {
            return Err(InstallError::empty_request());
        }
        Ok(Self { modules: unique })
    }

    /// Build a request for a single module.
    pub fn single(module: ModuleName) -> Self {
        Self {
            modules: vec![module],
        }
    }

    /// Parse and build a request from raw names.
    pub fn from_names<I, S>(names: I) -> Result<Self, InstallError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let modules = names
            .into_iter()
            .map(|name| ModuleName::new(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(modules)
    }

    /// The requested modules in submission order.
    pub fn modules(&self) -> &[ModuleName] {
        &self.modules
    }

    /// Whether `module` is part of this request.
    pub fn contains(&self, module: &ModuleName) -> bool {
        self.modules.contains(module)
    }

    /// Number of modules in the request. Never zero.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Whether the request covers more than one module.
    pub fn is_multi_module(&self) -> bool {
        self.modules.len() > 1
    }

    /// Consume the request and return its modules.
    pub fn into_modules(self) -> Vec<ModuleName> {
        self.modules
    }
}

/// A session accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Service-assigned session id.
    pub id: SessionId,

    /// Modules the session installs. Excludes modules that were already
    /// installed when the request was made.
    pub modules: Vec<ModuleName>,
}

/// Result of [`InstallCoordinator::request_install`](crate::InstallCoordinator::request_install).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Every requested module was already installed; nothing was submitted.
    AlreadyInstalled(Vec<ModuleName>),

    /// A session was started for the modules that were missing.
    Started(SessionHandle),
}

impl RequestOutcome {
    /// Whether the modules can be used right away.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::AlreadyInstalled(_))
    }

    /// The started session, if one was needed.
    pub fn session(&self) -> Option<&SessionHandle> {
        match self {
            Self::Started(handle) => Some(handle),
            Self::AlreadyInstalled(_) => None,
        }
    }
}
