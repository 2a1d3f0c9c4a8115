//! # feature-delivery
//!
//! On-demand installation of application feature modules.
//!
//! This crate sits between an application and a platform module-install
//! service. It submits install requests, listens to the service's status
//! events, checks them against the session state machine and turns them into
//! a small set of caller actions (wait, prompt the user, proceed, retry
//! later, fail). Transfer, verification and storage stay with the service.
//!
//! ## Features
//!
//! - `InstallCoordinator` with `request_install`, `subscribe`/`unsubscribe`
//!   and `resolve_user_confirmation`
//! - `ModuleInstallService` trait for the platform boundary
//! - `InMemoryInstallService` simulated backend for development and tests
//! - `LaunchRegistry` for starting features once their module is installed
//!
//! ## Example
//!
//! ```rust,no_run
//! use feature_delivery::{
//!     Feature, InMemoryInstallService, InstallCoordinator, InstallPlan, InstallRequest,
//!     LaunchRegistry, Outcome,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let service = InMemoryInstallService::new()
//!         .with_module(Feature::Assets.module_name(), InstallPlan::Succeed);
//!     let coordinator = InstallCoordinator::new(Arc::new(service));
//!
//!     let registration = coordinator
//!         .subscribe(|update| {
//!             println!("{}: {}", update.session, update.status.description());
//!             if update.outcome() == Outcome::Proceed {
//!                 println!("ready: {:?}", update.modules);
//!             }
//!         })
//!         .unwrap();
//!
//!     let request = InstallRequest::single(Feature::Assets.module_name());
//!     if let Err(e) = coordinator.request_install(request).await {
//!         eprintln!("{} ({})", e, e.fix_suggestion());
//!     }
//!
//!     let mut registry = LaunchRegistry::new();
//!     registry.register(Feature::Assets, |f| println!("opening {}", f.entry_point()));
//!     let _ = registry.launch(&coordinator, Feature::Assets);
//!
//!     coordinator.unsubscribe(registration);
//! }
//! ```

mod feature;
mod install;
mod launch;
mod module_name;
mod options;
mod service;
mod status;

pub use feature::Feature;
pub use install::{
    ConfirmationHandle, InstallCoordinator, InstallError, InstallRequest, InstallUpdate,
    ListenerRegistration, Outcome, RequestOutcome, SessionHandle, SessionId, SessionSnapshot,
    StatusEvent, ERROR_CODE_UNKNOWN,
};
pub use launch::LaunchRegistry;
pub use module_name::ModuleName;
pub use options::CoordinatorOptions;
pub use service::{EventSink, InMemoryInstallService, InstallPlan, ListenerId, ModuleInstallService};
pub use status::InstallStatus;
