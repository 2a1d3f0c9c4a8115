//! Launch registry for installed features.
//!
//! The registry maps every [`Feature`] the caller can start to a launcher
//! closure. Launching checks the install service first, so a feature is
//! never started before its module is present.

use crate::install::InstallUpdate;
use crate::service::ModuleInstallService;
use crate::{Feature, InstallCoordinator, InstallError, InstallStatus};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

type Launcher = Box<dyn Fn(Feature) + Send + Sync>;

/// Explicit table of feature launchers.
///
/// # Example
///
/// ```rust
/// use feature_delivery::{Feature, LaunchRegistry};
///
/// let mut registry = LaunchRegistry::new();
/// registry
///     .register(Feature::Kotlin, |f| println!("starting {}", f.entry_point()))
///     .register(Feature::Assets, |f| println!("starting {}", f.entry_point()));
///
/// assert!(registry.is_registered(Feature::Kotlin));
/// assert!(!registry.is_registered(Feature::Native));
/// ```
#[derive(Default)]
pub struct LaunchRegistry {
    launchers: HashMap<Feature, Launcher>,
}

impl LaunchRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the launcher for `feature`, replacing any previous one.
    pub fn register<F>(&mut self, feature: Feature, launcher: F) -> &mut Self
    where
        F: Fn(Feature) + Send + Sync + 'static,
    {
        self.launchers.insert(feature, Box::new(launcher));
        self
    }

    /// Whether `feature` has a launcher.
    pub fn is_registered(&self, feature: Feature) -> bool {
        self.launchers.contains_key(&feature)
    }

    /// Start `feature` if its module is installed.
    ///
    /// # Errors
    ///
    /// - `ModuleNotInstalled` if the service does not report the module
    /// - `LauncherNotRegistered` if the registry has no launcher for it
    pub fn launch<S>(
        &self,
        coordinator: &InstallCoordinator<S>,
        feature: Feature,
    ) -> Result<(), InstallError>
    where
        S: ModuleInstallService + ?Sized,
    {
        let module = feature.module_name();
        if !coordinator.is_installed(&module) {
            return Err(InstallError::ModuleNotInstalled {
                fix: format!("Request installation of {} before launching it", module),
                module,
            });
        }
        let launcher = self
            .launchers
            .get(&feature)
            .ok_or_else(|| InstallError::LauncherNotRegistered {
                feature,
                fix: format!("Register a launcher for {}", feature.display_name()),
            })?;

        info!(feature = ?feature, entry = feature.entry_point(), "launching feature");
        launcher(feature);
        Ok(())
    }

    /// Registered features an `Installed` update made launchable.
    pub fn ready_features(&self, update: &InstallUpdate) -> Vec<Feature> {
        if update.status != InstallStatus::Installed {
            return Vec::new();
        }
        update
            .modules
            .iter()
            .filter_map(Feature::from_module)
            .filter(|feature| self.is_registered(*feature))
            .collect()
    }
}

impl fmt::Debug for LaunchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut features: Vec<_> = self.launchers.keys().collect();
        features.sort_by_key(|feature| feature.entry_point());
        f.debug_struct("LaunchRegistry")
            .field("features", &features)
            .finish()
    }
}
