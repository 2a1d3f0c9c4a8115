//! Launchable feature enum.

use crate::ModuleName;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// A separately packaged, launchable feature.
///
/// Each variant is backed by exactly one installable module. Launch targets
/// are resolved through this closed set rather than by looking components up
/// by name at runtime.
///
/// # Example
///
/// ```rust
/// use feature_delivery::Feature;
///
/// for feature in Feature::all() {
///     println!("{} lives in module {}", feature.display_name(), feature.module_name());
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter)]
pub enum Feature {
    /// Feature screen written in Kotlin.
    Kotlin,
    /// Feature screen written in Java.
    Java,
    /// Feature backed by a native library.
    Native,
    /// Viewer for resources bundled in the assets module.
    Assets,
}

impl Feature {
    /// Name of the module that carries this feature.
    ///
    /// # Example
    ///
    /// ```rust
    /// use feature_delivery::Feature;
    ///
    /// assert_eq!(Feature::Assets.module_name().as_str(), "assets");
    /// ```
    pub fn module_name(&self) -> ModuleName {
        let name = match self {
            Self::Kotlin => "kotlin",
            Self::Java => "java",
            Self::Native => "native",
            Self::Assets => "assets",
        };
        ModuleName::from_static(name)
    }

    /// Entry point the launcher starts once the module is installed.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Self::Kotlin => "kotlin/main",
            Self::Java => "java/main",
            Self::Native => "native/main",
            Self::Assets => "assets/viewer",
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Kotlin => "Kotlin feature",
            Self::Java => "Java feature",
            Self::Native => "Native feature",
            Self::Assets => "Asset viewer",
        }
    }

    /// The feature carried by `module`, if any.
    pub fn from_module(module: &ModuleName) -> Option<Self> {
        Self::all().find(|feature| &feature.module_name() == module)
    }

    /// Iterator over all known features.
    pub fn all() -> impl Iterator<Item = Self> {
        <Self as IntoEnumIterator>::iter()
    }
}
