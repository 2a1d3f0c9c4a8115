//! The install coordinator.
//!
//! [`InstallCoordinator`] bridges "make module M available" to the install
//! service's asynchronous event stream. Requests go out through
//! [`ModuleInstallService::start_install`]; status events come back over a
//! channel, are validated by the session tracker, and reach the caller as
//! [`InstallUpdate`]s on a background task.

use crate::install::tracker::{SessionSnapshot, SessionTracker};
use crate::install::{InstallRequest, InstallUpdate, RequestOutcome, SessionHandle, SessionId};
use crate::service::{ListenerId, ModuleInstallService};
use crate::{CoordinatorOptions, InstallError, ModuleName};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

fn lock(tracker: &Mutex<SessionTracker>) -> MutexGuard<'_, SessionTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinates module installs against a [`ModuleInstallService`].
///
/// # Lifecycle
///
/// Subscribe when the owning context becomes active and unsubscribe when it
/// becomes inactive. Only one subscription may be active at a time. Sessions
/// are tracked only while subscribed; without a subscription requests are
/// still forwarded but nobody observes their progress.
///
/// # Example
///
/// ```rust,no_run
/// use feature_delivery::{
///     InMemoryInstallService, InstallCoordinator, InstallPlan, InstallRequest, ModuleName,
///     Outcome, RequestOutcome,
/// };
/// use std::sync::Arc;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let assets = ModuleName::new("assets").unwrap();
///     let service = InMemoryInstallService::new().with_module(assets.clone(), InstallPlan::Succeed);
///     let coordinator = InstallCoordinator::new(Arc::new(service));
///
///     let registration = coordinator
///         .subscribe(|update| {
///             if update.outcome() == Outcome::Proceed {
///                 println!("{:?} ready", update.modules);
///             }
///         })
///         .unwrap();
///
///     match coordinator.request_install(InstallRequest::single(assets)).await {
///         Ok(RequestOutcome::AlreadyInstalled(_)) => println!("nothing to do"),
///         Ok(RequestOutcome::Started(session)) => println!("session {}", session.id),
///         Err(e) => println!("Failed: {}. Fix: {}", e, e.fix_suggestion()),
///     }
///
///     coordinator.unsubscribe(registration);
/// }
/// ```
pub struct InstallCoordinator<S: ModuleInstallService + ?Sized> {
    service: Arc<S>,
    options: CoordinatorOptions,
    tracker: Arc<Mutex<SessionTracker>>,
    subscribed: Arc<AtomicBool>,
}

impl<S: ModuleInstallService + ?Sized> InstallCoordinator<S> {
    /// Create a coordinator with default options.
    pub fn new(service: Arc<S>) -> Self {
        Self::with_options(service, CoordinatorOptions::default())
    }

    /// Create a coordinator with custom options.
    pub fn with_options(service: Arc<S>, options: CoordinatorOptions) -> Self {
        let tracker = SessionTracker::new(options.finished_history);
        Self {
            service,
            options,
            tracker: Arc::new(Mutex::new(tracker)),
            subscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The underlying service.
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Whether a subscription is currently active.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    /// Whether the service currently reports `module` as installed.
    ///
    /// The answer may be stale by the time it is used if an install
    /// completes concurrently.
    pub fn is_installed(&self, module: &ModuleName) -> bool {
        self.service.installed_modules().contains(module)
    }

    /// Snapshot of every installed module.
    pub fn installed_modules(&self) -> BTreeSet<ModuleName> {
        self.service.installed_modules()
    }

    /// Request installation of the modules in `request`.
    ///
    /// Modules that are already installed are left out of the submitted
    /// session; if none remain, nothing is submitted and
    /// [`RequestOutcome::AlreadyInstalled`] is returned right away. The call
    /// resolves once the service accepted the session. Progress arrives
    /// through the subscription, possibly before this call returns.
    ///
    /// # Errors
    ///
    /// - `AlreadyPending` if a tracked session already covers one of the
    ///   modules, or the service reports so
    /// - `InvalidModule` if the service does not know a module
    /// - `Network` / `ServiceUnavailable` / `Timeout` for transient failures
    pub async fn request_install(
        &self,
        request: InstallRequest,
    ) -> Result<RequestOutcome, InstallError> {
        let installed = self.service.installed_modules();
        let (present, missing): (Vec<ModuleName>, Vec<ModuleName>) = request
            .modules()
            .iter()
            .cloned()
            .partition(|m| installed.contains(m));

        if missing.is_empty() {
            info!(modules = ?present, "modules already installed, nothing to request");
            return Ok(RequestOutcome::AlreadyInstalled(request.into_modules()));
        }
        if !present.is_empty() {
            debug!(skipped = ?present, "leaving installed modules out of the request");
        }

        let epoch = if self.is_subscribed() {
            Some(lock(&self.tracker).reserve(&missing)?)
        } else {
            warn!(modules = ?missing, "no active subscription, session progress will not be observed");
            None
        };

        let submitted = InstallRequest::new(missing.clone())?;
        let started = timeout(self.options.request_timeout, self.service.start_install(submitted)).await;

        let id = match started {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                if let Some(epoch) = epoch {
                    lock(&self.tracker).release(&missing, epoch);
                }
                warn!(modules = ?missing, error = %e, "install request rejected");
                return Err(e);
            }
            Err(_) => {
                if let Some(epoch) = epoch {
                    lock(&self.tracker).release(&missing, epoch);
                }
                warn!(modules = ?missing, "install request timed out");
                return Err(InstallError::Timeout {
                    duration: self.options.request_timeout,
                    fix: format!(
                        "The install service did not respond within {:?}; try again later",
                        self.options.request_timeout
                    ),
                });
            }
        };

        if let Some(epoch) = epoch {
            lock(&self.tracker).register(id, missing.clone(), epoch);
        }
        info!(session = %id, modules = ?missing, "install session started");

        Ok(RequestOutcome::Started(SessionHandle { id, modules: missing }))
    }

    /// Start receiving install updates.
    ///
    /// `on_event` runs on a Tokio task, once per accepted status change of
    /// any session that covers a module requested through this coordinator.
    /// Events that break the session state machine, repeat a status without
    /// new progress, or arrive after a terminal status are dropped.
    ///
    /// # Errors
    ///
    /// - `AlreadySubscribed` if a registration is still active
    /// - `NoRuntime` if called outside a Tokio runtime
    pub fn subscribe<F>(&self, on_event: F) -> Result<ListenerRegistration, InstallError>
    where
        F: Fn(InstallUpdate) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| InstallError::NoRuntime {
            fix: "Subscribe from within a Tokio runtime".to_string(),
        })?;

        if self
            .subscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(InstallError::AlreadySubscribed {
                fix: "Unsubscribe the existing registration before subscribing again".to_string(),
            });
        }
        lock(&self.tracker).clear();

        let (sink, mut events) = mpsc::unbounded_channel();
        let listener = self.service.register_listener(sink);
        let active = Arc::new(AtomicBool::new(true));

        let task_tracker = Arc::clone(&self.tracker);
        let task_active = Arc::clone(&active);
        let task = runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                if !task_active.load(Ordering::Acquire) {
                    break;
                }
                let update = lock(&task_tracker).apply(event);
                if let Some(update) = update {
                    if !task_active.load(Ordering::Acquire) {
                        break;
                    }
                    on_event(update);
                }
            }
            debug!(listener = %listener, "event dispatch finished");
        });

        let service = Arc::clone(&self.service);
        let tracker = Arc::clone(&self.tracker);
        let subscribed = Arc::clone(&self.subscribed);
        let release = move || {
            service.unregister_listener(listener);
            active.store(false, Ordering::Release);
            task.abort();
            lock(&tracker).clear();
            subscribed.store(false, Ordering::Release);
            info!(listener = %listener, "unsubscribed from install events");
        };

        info!(listener = %listener, "subscribed to install events");
        Ok(ListenerRegistration {
            listener,
            release: Some(Box::new(release)),
        })
    }

    /// Release a registration obtained from [`subscribe`](Self::subscribe).
    ///
    /// No update is delivered for events the service emits after this
    /// returns. Safe to call even if no event ever fired.
    pub fn unsubscribe(&self, mut registration: ListenerRegistration) {
        registration.release();
    }

    /// Show the service's confirmation flow for a session that reported
    /// `RequiresUserConfirmation`.
    ///
    /// If the user declines, the session stays where it is; call this again
    /// to re-prompt or [`cancel_install`](Self::cancel_install) to abandon it.
    pub fn resolve_user_confirmation(&self, session: SessionId) -> Result<(), InstallError> {
        let handle = lock(&self.tracker).confirmation(session)?;
        info!(session = %session, "prompting user to confirm install");
        self.service.start_confirmation(&handle)
    }

    /// Ask the service to abort a session.
    pub async fn cancel_install(&self, session: SessionId) -> Result<(), InstallError> {
        info!(session = %session, "canceling install session");
        match timeout(self.options.request_timeout, self.service.cancel_install(session)).await {
            Ok(result) => result,
            Err(_) => Err(InstallError::Timeout {
                duration: self.options.request_timeout,
                fix: "The install service did not acknowledge the cancel; try again later"
                    .to_string(),
            }),
        }
    }

    /// In-flight sessions observed by the current subscription, by id.
    pub fn session_states(&self) -> Vec<SessionSnapshot> {
        lock(&self.tracker).snapshot()
    }
}

/// An active subscription to install events.
///
/// Hand it back to [`InstallCoordinator::unsubscribe`] when the owning
/// context goes inactive. Dropping it without unsubscribing also releases
/// the subscription, but logs a warning.
pub struct ListenerRegistration {
    listener: ListenerId,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    /// The service-side listener id.
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("listener", &self.listener)
            .field("active", &self.release.is_some())
            .finish()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if self.release.is_some() {
            warn!(listener = %self.listener, "listener registration dropped without unsubscribe");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::ConfirmationHandle;
    use crate::service::EventSink;
    use crate::{InMemoryInstallService, InstallPlan, InstallStatus, Outcome};
    use futures::future::{BoxFuture, FutureExt};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Holds every `start_install` until `open` is notified.
    struct GatedService {
        inner: InMemoryInstallService,
        entered: Notify,
        open: Arc<Notify>,
    }

    impl GatedService {
        fn new(inner: InMemoryInstallService) -> Arc<Self> {
            Arc::new(Self {
                inner,
                entered: Notify::new(),
                open: Arc::new(Notify::new()),
            })
        }
    }

    impl ModuleInstallService for GatedService {
        fn installed_modules(&self) -> BTreeSet<ModuleName> {
            self.inner.installed_modules()
        }

        fn start_install(
            &self,
            request: InstallRequest,
        ) -> BoxFuture<'static, Result<SessionId, InstallError>> {
            self.entered.notify_one();
            let open = Arc::clone(&self.open);
            let started = self.inner.start_install(request);
            async move {
                open.notified().await;
                started.await
            }
            .boxed()
        }

        fn cancel_install(&self, session: SessionId) -> BoxFuture<'static, Result<(), InstallError>> {
            self.inner.cancel_install(session)
        }

        fn register_listener(&self, sink: EventSink) -> ListenerId {
            self.inner.register_listener(sink)
        }

        fn unregister_listener(&self, listener: ListenerId) {
            self.inner.unregister_listener(listener)
        }

        fn start_confirmation(&self, handle: &ConfirmationHandle) -> Result<(), InstallError> {
            self.inner.start_confirmation(handle)
        }
    }

    fn module(name: &str) -> ModuleName {
        ModuleName::new(name).unwrap()
    }

    fn coordinator(service: InMemoryInstallService) -> InstallCoordinator<InMemoryInstallService> {
        InstallCoordinator::new(Arc::new(service))
    }

    #[tokio::test]
    async fn test_double_subscribe_rejected() {
        let coordinator = coordinator(InMemoryInstallService::new());
        let first = coordinator.subscribe(|_| {}).unwrap();
        let second = coordinator.subscribe(|_| {});
        assert!(matches!(second, Err(InstallError::AlreadySubscribed { .. })));

        coordinator.unsubscribe(first);
        assert!(!coordinator.is_subscribed());
        let third = coordinator.subscribe(|_| {}).unwrap();
        coordinator.unsubscribe(third);
    }

    #[test]
    fn test_subscribe_outside_runtime() {
        let coordinator = coordinator(InMemoryInstallService::new());
        let result = coordinator.subscribe(|_| {});
        assert!(matches!(result, Err(InstallError::NoRuntime { .. })));
        assert!(!coordinator.is_subscribed());
    }

    #[tokio::test]
    async fn test_unsubscribe_without_events() {
        let service = InMemoryInstallService::new();
        let coordinator = coordinator(service.clone());
        let registration = coordinator.subscribe(|_| {}).unwrap();
        assert_eq!(service.listener_count(), 1);
        coordinator.unsubscribe(registration);
        assert_eq!(service.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_registration_releases_listener() {
        let service = InMemoryInstallService::new();
        let coordinator = coordinator(service.clone());
        {
            let _registration = coordinator.subscribe(|_| {}).unwrap();
            assert!(coordinator.is_subscribed());
        }
        assert!(!coordinator.is_subscribed());
        assert_eq!(service.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_already_installed_short_circuits() {
        let service = InMemoryInstallService::new().with_installed(module("assets"));
        let coordinator = coordinator(service.clone());
        let outcome = coordinator
            .request_install(InstallRequest::single(module("assets")))
            .await
            .unwrap();
        assert_eq!(outcome, RequestOutcome::AlreadyInstalled(vec![module("assets")]));
        assert!(service.install_requests().is_empty());
    }

    #[tokio::test]
    async fn test_installed_modules_left_out_of_session() {
        let service = InMemoryInstallService::new()
            .with_installed(module("assets"))
            .with_module(module("kotlin"), InstallPlan::RequireConfirmation);
        let coordinator = coordinator(service.clone());
        let registration = coordinator.subscribe(|_| {}).unwrap();

        let request = InstallRequest::from_names(["assets", "kotlin"]).unwrap();
        let outcome = coordinator.request_install(request).await.unwrap();
        let session = outcome.session().unwrap();
        assert_eq!(session.modules, vec![module("kotlin")]);
        assert_eq!(service.install_requests()[0].modules(), &[module("kotlin")]);

        coordinator.unsubscribe(registration);
    }

    #[tokio::test]
    async fn test_local_already_pending() {
        let service =
            InMemoryInstallService::new().with_module(module("native"), InstallPlan::RequireConfirmation);
        let coordinator = coordinator(service.clone());
        let registration = coordinator.subscribe(|_| {}).unwrap();

        coordinator
            .request_install(InstallRequest::single(module("native")))
            .await
            .unwrap();
        let second = coordinator
            .request_install(InstallRequest::single(module("native")))
            .await;
        let err = second.unwrap_err();
        assert_eq!(err.outcome(), Outcome::Wait);
        assert_eq!(service.install_requests().len(), 1);

        coordinator.unsubscribe(registration);
    }

    #[tokio::test]
    async fn test_rejected_request_releases_reservation() {
        let service = InMemoryInstallService::new().with_module(module("java"), InstallPlan::Succeed);
        service.set_available(false);
        let coordinator = coordinator(service.clone());
        let registration = coordinator.subscribe(|_| {}).unwrap();

        let first = coordinator
            .request_install(InstallRequest::single(module("java")))
            .await;
        assert!(first.unwrap_err().is_retryable());

        service.set_available(true);
        let second = coordinator
            .request_install(InstallRequest::single(module("java")))
            .await;
        assert!(second.is_ok());

        coordinator.unsubscribe(registration);
    }

    #[tokio::test]
    async fn test_resolve_confirmation_for_unknown_session() {
        let coordinator = coordinator(InMemoryInstallService::new());
        let result = coordinator.resolve_user_confirmation(SessionId::new(1));
        assert!(matches!(result, Err(InstallError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_session_states_tracks_in_flight() {
        let service = InMemoryInstallService::new()
            .with_module(module("native"), InstallPlan::RequireConfirmation);
        let coordinator = coordinator(service);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = coordinator
            .subscribe(move |update| {
                let _ = tx.send(update.status);
            })
            .unwrap();

        let outcome = coordinator
            .request_install(InstallRequest::single(module("native")))
            .await
            .unwrap();
        loop {
            let status = timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if status == InstallStatus::RequiresUserConfirmation {
                break;
            }
        }

        let states = coordinator.session_states();
        assert_eq!(states.len(), 1);
        assert_eq!(Some(&states[0].id), outcome.session().map(|s| &s.id));
        assert_eq!(states[0].status, Some(InstallStatus::RequiresUserConfirmation));

        coordinator.unsubscribe(registration);
        assert!(coordinator.session_states().is_empty());
    }

    #[tokio::test]
    async fn test_resubscribe_during_request_does_not_adopt_session() {
        let service = GatedService::new(
            InMemoryInstallService::new().with_module(module("native"), InstallPlan::RequireConfirmation),
        );
        let coordinator = Arc::new(InstallCoordinator::new(Arc::clone(&service)));
        let first = coordinator.subscribe(|_| {}).unwrap();

        let request = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move {
                coordinator
                    .request_install(InstallRequest::single(module("native")))
                    .await
            }
        });
        service.entered.notified().await;

        coordinator.unsubscribe(first);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let second = coordinator
            .subscribe(move |update| {
                let _ = tx.send(update.status);
            })
            .unwrap();

        service.open.notify_one();
        let outcome = request.await.unwrap().unwrap();
        assert!(outcome.session().is_some());
        assert!(coordinator.session_states().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        assert!(coordinator.session_states().is_empty());

        coordinator.unsubscribe(second);
    }
}
