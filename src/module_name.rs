//! Module name newtype with validation.

use crate::InstallError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Pattern every module name must match: at least one character, none of
/// them whitespace or control characters.
const MODULE_NAME_PATTERN: &str = r"^[^\s\p{Cc}]+$";

fn module_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MODULE_NAME_PATTERN).expect("Invalid module name regex"))
}

/// Name of an installable feature module.
///
/// Module names are opaque to this crate: the only local checks are that the
/// name is non-empty and free of whitespace and control characters. Whether
/// the service actually knows the module is decided remotely and reported as
/// [`InstallError::InvalidModule`].
///
/// # Example
///
/// ```rust
/// use feature_delivery::ModuleName;
///
/// let name: ModuleName = "assets".parse().unwrap();
/// assert_eq!(name.as_str(), "assets");
///
/// assert!(ModuleName::new("").is_err());
/// assert!(ModuleName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    /// Validate and wrap a module name.
    pub fn new(name: impl Into<String>) -> Result<Self, InstallError> {
        let name = name.into();
        if !module_name_regex().is_match(&name) {
            let fix = if name.is_empty() {
                "Provide a non-empty module name".to_string()
            } else {
                format!(
                    "Module names may not contain whitespace or control characters (got {:?})",
                    name
                )
            };
            return Err(InstallError::InvalidModuleName { name, fix });
        }
        Ok(Self(name))
    }

    /// Built-in names that are known to match the pattern.
    pub(crate) fn from_static(name: &'static str) -> Self {
        debug_assert!(module_name_regex().is_match(name));
        Self(name.to_string())
    }

    /// The module name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ModuleName {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ModuleName {
    type Error = InstallError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ModuleName {
    type Error = InstallError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModuleName> for String {
    fn from(name: ModuleName) -> Self {
        name.0
    }
}
