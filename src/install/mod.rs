//! Install requests, session tracking and the coordinator.
//!
//! # Example
//!
//! ```rust,no_run
//! use feature_delivery::{InstallCoordinator, InMemoryInstallService, InstallRequest, Outcome};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), feature_delivery::InstallError> {
//! let coordinator = InstallCoordinator::new(Arc::new(InMemoryInstallService::new()));
//! let registration = coordinator.subscribe(|update| match update.outcome() {
//!     Outcome::PromptUser => println!("session {} needs confirmation", update.session),
//!     Outcome::Fail => eprintln!("{:?}", update.failure()),
//!     _ => {}
//! })?;
//!
//! coordinator
//!     .request_install(InstallRequest::from_names(["kotlin", "java"])?)
//!     .await?;
//!
//! coordinator.unsubscribe(registration);
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod errors;
mod event;
mod tracker;
mod types;

pub use coordinator::{InstallCoordinator, ListenerRegistration};
pub use errors::{InstallError, ERROR_CODE_UNKNOWN};
pub use event::{ConfirmationHandle, InstallUpdate, Outcome, StatusEvent};
pub use tracker::SessionSnapshot;
pub use types::{InstallRequest, RequestOutcome, SessionHandle, SessionId};
