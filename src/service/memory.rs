//! In-process simulation of the module-install service.
//!
//! Useful for local development and tests: every session runs on its own
//! Tokio task and walks the status graph according to the [`InstallPlan`]
//! configured for its modules.

use crate::install::{ConfirmationHandle, InstallRequest, SessionId, StatusEvent};
use crate::service::{EventSink, ListenerId, ModuleInstallService};
use crate::{InstallError, InstallStatus, ModuleName};
use futures::future::{BoxFuture, FutureExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Number of `Downloading` progress events per session.
const DOWNLOAD_STEPS: u64 = 3;

/// Simulated payload size per module.
const MODULE_SIZE: u64 = 4 * 1024 * 1024;

/// How a simulated module behaves when installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPlan {
    /// Download, install and succeed.
    Succeed,
    /// Stop at `RequiresUserConfirmation` until the user accepts.
    RequireConfirmation,
    /// Fail during download with the given service code.
    Fail(i32),
}

/// A scripted [`ModuleInstallService`] backed by memory.
///
/// # Example
///
/// ```rust
/// use feature_delivery::{InMemoryInstallService, InstallPlan, ModuleName};
///
/// let service = InMemoryInstallService::new()
///     .with_module(ModuleName::new("assets").unwrap(), InstallPlan::Succeed)
///     .with_installed(ModuleName::new("base").unwrap());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryInstallService {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    next_session: AtomicU64,
    next_listener: AtomicU64,
    step_delay: Duration,
}

struct State {
    catalog: BTreeMap<ModuleName, InstallPlan>,
    installed: BTreeSet<ModuleName>,
    listeners: HashMap<ListenerId, EventSink>,
    sessions: HashMap<SessionId, Arc<SessionControl>>,
    requests: Vec<InstallRequest>,
    emitted: Vec<StatusEvent>,
    confirmation_prompts: usize,
    available: bool,
    user_accepts: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            catalog: BTreeMap::new(),
            installed: BTreeSet::new(),
            listeners: HashMap::new(),
            sessions: HashMap::new(),
            requests: Vec::new(),
            emitted: Vec::new(),
            confirmation_prompts: 0,
            available: true,
            user_accepts: true,
        }
    }
}

struct SessionControl {
    modules: Vec<ModuleName>,
    wake: Notify,
    confirmed: AtomicBool,
    canceled: AtomicBool,
}

impl SessionControl {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryInstallService {
    /// An empty service: no known modules, nothing installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an installable module to the catalog.
    pub fn with_module(self, module: ModuleName, plan: InstallPlan) -> Self {
        lock(&self.inner.state).catalog.insert(module, plan);
        self
    }

    /// Mark a module as installed up front. It is also added to the catalog.
    pub fn with_installed(self, module: ModuleName) -> Self {
        {
            let mut state = lock(&self.inner.state);
            state.catalog.entry(module.clone()).or_insert(InstallPlan::Succeed);
            state.installed.insert(module);
        }
        self
    }

    /// Pause between simulated steps. Defaults to zero (yield only).
    ///
    /// Must be called before the service is cloned or shared.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.step_delay = delay,
            None => debug!("step delay ignored: service already shared"),
        }
        self
    }

    /// Change the plan of a catalog module.
    pub fn set_plan(&self, module: ModuleName, plan: InstallPlan) {
        lock(&self.inner.state).catalog.insert(module, plan);
    }

    /// Make every `start_install` fail with `ServiceUnavailable`.
    pub fn set_available(&self, available: bool) {
        lock(&self.inner.state).available = available;
    }

    /// Whether the simulated user accepts confirmation prompts.
    pub fn set_user_accepts(&self, accepts: bool) {
        lock(&self.inner.state).user_accepts = accepts;
    }

    /// Every request the service accepted, in order.
    pub fn install_requests(&self) -> Vec<InstallRequest> {
        lock(&self.inner.state).requests.clone()
    }

    /// Every event the service emitted, in order.
    pub fn emitted_events(&self) -> Vec<StatusEvent> {
        lock(&self.inner.state).emitted.clone()
    }

    /// How many times the confirmation flow was shown.
    pub fn confirmation_prompts(&self) -> usize {
        lock(&self.inner.state).confirmation_prompts
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.state).listeners.len()
    }
}

impl Inner {
    fn start(self: &Arc<Self>, request: InstallRequest) -> Result<SessionId, InstallError> {
        let mut state = lock(&self.state);

        if !state.available {
            return Err(InstallError::ServiceUnavailable {
                message: "install service is not bound".to_string(),
                fix: "Try again once the install service is available".to_string(),
            });
        }

        let mut fail_code = None;
        let mut needs_confirmation = false;
        for module in request.modules() {
            match state.catalog.get(module) {
                None => {
                    return Err(InstallError::InvalidModule {
                        module: module.clone(),
                        fix: format!("Check that {} is declared as an installable module", module),
                    })
                }
                Some(InstallPlan::Fail(code)) => fail_code = fail_code.or(Some(*code)),
                Some(InstallPlan::RequireConfirmation) => needs_confirmation = true,
                Some(InstallPlan::Succeed) => {}
            }
        }

        let overlap: Vec<ModuleName> = request
            .modules()
            .iter()
            .filter(|m| state.sessions.values().any(|s| s.modules.contains(m)))
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(InstallError::already_pending(overlap));
        }

        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed) + 1);
        let control = Arc::new(SessionControl {
            modules: request.modules().to_vec(),
            wake: Notify::new(),
            confirmed: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
        });
        state.sessions.insert(id, Arc::clone(&control));
        state.requests.push(request);
        drop(state);

        debug!(session = %id, "simulated session started");
        tokio::spawn(Arc::clone(self).run_session(id, control, fail_code, needs_confirmation));
        Ok(id)
    }

    async fn run_session(
        self: Arc<Self>,
        id: SessionId,
        control: Arc<SessionControl>,
        fail_code: Option<i32>,
        needs_confirmation: bool,
    ) {
        let modules = control.modules.clone();
        let total = MODULE_SIZE * modules.len() as u64;
        let event = |status| StatusEvent::new(id, status, modules.clone());

        self.emit(event(InstallStatus::Pending));
        self.pause().await;

        if needs_confirmation {
            let handle = ConfirmationHandle::new(id, format!("confirm-{}", id.get()));
            self.emit(event(InstallStatus::RequiresUserConfirmation).with_confirmation(handle));
            loop {
                if control.is_canceled() || control.confirmed.load(Ordering::Acquire) {
                    break;
                }
                control.wake.notified().await;
            }
        }

        for step in 1..=DOWNLOAD_STEPS {
            if control.is_canceled() {
                return self.finish(id, event(InstallStatus::Canceled));
            }
            let downloaded = total * step / DOWNLOAD_STEPS;
            self.emit(event(InstallStatus::Downloading).with_progress(downloaded, total));
            self.pause().await;
        }

        if let Some(code) = fail_code {
            return self.finish(id, event(InstallStatus::Failed).with_error_code(code));
        }
        if control.is_canceled() {
            return self.finish(id, event(InstallStatus::Canceled));
        }

        self.emit(event(InstallStatus::Installing).with_progress(total, total));
        self.pause().await;
        if control.is_canceled() {
            return self.finish(id, event(InstallStatus::Canceled));
        }

        lock(&self.state).installed.extend(modules.iter().cloned());
        self.finish(id, event(InstallStatus::Installed).with_progress(total, total));
    }

    async fn pause(&self) {
        if self.step_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.step_delay).await;
        }
    }

    fn finish(&self, id: SessionId, last: StatusEvent) {
        lock(&self.state).sessions.remove(&id);
        self.emit(last);
    }

    fn emit(&self, event: StatusEvent) {
        let mut state = lock(&self.state);
        state.emitted.push(event.clone());
        state
            .listeners
            .retain(|_, sink| sink.send(event.clone()).is_ok());
    }
}

impl ModuleInstallService for InMemoryInstallService {
    fn installed_modules(&self) -> BTreeSet<ModuleName> {
        lock(&self.inner.state).installed.clone()
    }

    fn start_install(
        &self,
        request: InstallRequest,
    ) -> BoxFuture<'static, Result<SessionId, InstallError>> {
        let inner = Arc::clone(&self.inner);
        async move { inner.start(request) }.boxed()
    }

    fn cancel_install(&self, session: SessionId) -> BoxFuture<'static, Result<(), InstallError>> {
        let inner = Arc::clone(&self.inner);
        async move {
            let state = lock(&inner.state);
            let control = state
                .sessions
                .get(&session)
                .ok_or_else(|| InstallError::session_not_found(session))?;
            control.canceled.store(true, Ordering::Release);
            control.wake.notify_one();
            Ok(())
        }
        .boxed()
    }

    fn register_listener(&self, sink: EventSink) -> ListenerId {
        let id = ListenerId::new(self.inner.next_listener.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.inner.state).listeners.insert(id, sink);
        id
    }

    fn unregister_listener(&self, listener: ListenerId) {
        lock(&self.inner.state).listeners.remove(&listener);
    }

    fn start_confirmation(&self, handle: &ConfirmationHandle) -> Result<(), InstallError> {
        let mut state = lock(&self.inner.state);
        state.confirmation_prompts += 1;
        let accepts = state.user_accepts;
        let control = state
            .sessions
            .get(&handle.session())
            .ok_or_else(|| InstallError::session_not_found(handle.session()))?;
        if accepts {
            control.confirmed.store(true, Ordering::Release);
            control.wake.notify_one();
        } else {
            debug!(session = %handle.session(), "user declined confirmation");
        }
        Ok(())
    }
}
