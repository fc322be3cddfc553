use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use photobooth_ops::retry_with_backoff;
use photobooth_types::{
    config::PhotoboothConfig, lifecycle::LifecycleState, PhotoboothError, Result,
};
use tracing::{error, info, warn};

use crate::{orchestrator_error, CameraCaptureSystem, HardwareProvider};

/// Open the hardware and build the capture system, retrying with a fixed
/// backoff, then run the ready pulse.
pub fn boot(
    config: &PhotoboothConfig,
    provider: &dyn HardwareProvider,
) -> Result<CameraCaptureSystem> {
    let backoff = Duration::from_millis(config.startup.retry_backoff_ms);
    let system = retry_with_backoff(
        "Camera system initialization",
        config.startup.max_attempts,
        backoff,
        |attempt| {
            info!("Initializing camera system (attempt {attempt})");
            let parts = provider
                .open_all(&config.camera, &config.leds, &config.upload)
                .map_err(|err| {
                    if matches!(err, PhotoboothError::Initialization(_)) {
                        err
                    } else {
                        PhotoboothError::Initialization(err.to_string())
                    }
                })?;
            CameraCaptureSystem::new(config, parts)
        },
    )?;
    if let Err(err) = system.announce_ready() {
        warn!("Ready pulse failed: {err}");
    }
    Ok(system)
}

enum Slot {
    Uninitialized,
    Ready(Arc<CameraCaptureSystem>),
    ShuttingDown,
    Failed(String),
}

impl Slot {
    fn state(&self) -> LifecycleState {
        match self {
            Slot::Uninitialized => LifecycleState::Uninitialized,
            Slot::Ready(_) => LifecycleState::Ready,
            Slot::ShuttingDown => LifecycleState::ShuttingDown,
            Slot::Failed(_) => LifecycleState::Failed,
        }
    }
}

/// Shared owner of the capture system's lifecycle. Cheap to clone; request
/// handlers get the system through [`SystemHandle::system`], which fails
/// fast instead of blocking while the system is not ready.
#[derive(Clone)]
pub struct SystemHandle {
    inner: Arc<Shared>,
}

struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl Default for SystemHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                slot: Mutex::new(Slot::Uninitialized),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lock().state()
    }

    /// Why initialization failed, if it did.
    pub fn failure(&self) -> Option<String> {
        match &*self.lock() {
            Slot::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn system(&self) -> Result<Arc<CameraCaptureSystem>> {
        match &*self.lock() {
            Slot::Ready(system) => Ok(Arc::clone(system)),
            other => Err(PhotoboothError::NotReady(other.state())),
        }
    }

    /// Publish a built system. If shutdown already began, the system is
    /// shut down right away instead.
    pub fn install(&self, system: CameraCaptureSystem) -> Result<()> {
        let mut slot = self.lock();
        match slot.state() {
            LifecycleState::ShuttingDown => {
                drop(slot);
                warn!("Initialization finished after shutdown began; releasing hardware");
                system.shutdown();
                Err(PhotoboothError::NotReady(LifecycleState::ShuttingDown))
            }
            LifecycleState::Ready => Err(orchestrator_error("camera system already installed")),
            LifecycleState::Uninitialized | LifecycleState::Failed => {
                *slot = Slot::Ready(Arc::new(system));
                drop(slot);
                self.inner.changed.notify_all();
                Ok(())
            }
        }
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Uninitialized) {
            *slot = Slot::Failed(reason.into());
            drop(slot);
            self.inner.changed.notify_all();
        }
    }

    /// Boot on the calling thread and publish the outcome.
    pub fn initialize(&self, config: &PhotoboothConfig, provider: &dyn HardwareProvider) -> Result<()> {
        match boot(config, provider) {
            Ok(system) => self.install(system),
            Err(err) => {
                error!("Camera system failed to initialize: {err}");
                self.mark_failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Boot on a background thread; observe the outcome with
    /// [`SystemHandle::wait_ready`] or [`SystemHandle::state`].
    pub fn spawn_initialization(
        &self,
        config: PhotoboothConfig,
        provider: Arc<dyn HardwareProvider>,
    ) -> Result<thread::JoinHandle<()>> {
        let handle = self.clone();
        thread::Builder::new()
            .name("camera-init".into())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    handle.initialize(&config, provider.as_ref())
                }));
                match outcome {
                    Ok(Ok(())) => info!("Camera system initialized"),
                    Ok(Err(_)) => {}
                    Err(_) => {
                        error!("Camera system initialization panicked");
                        handle.mark_failed("initialization panicked");
                    }
                }
            })
            .map_err(|err| orchestrator_error(format!("failed to spawn initializer: {err}")))
    }

    /// Block until initialization settles or `timeout` passes. Returns the
    /// state observed at that point.
    pub fn wait_ready(&self, timeout: Duration) -> LifecycleState {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        while matches!(*slot, Slot::Uninitialized) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            slot = self
                .inner
                .changed
                .wait_timeout(slot, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        slot.state()
    }

    /// Move to `ShuttingDown` and release the system. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let previous = {
            let mut slot = self.lock();
            std::mem::replace(&mut *slot, Slot::ShuttingDown)
        };
        self.inner.changed.notify_all();
        if let Slot::Ready(system) = previous {
            system.shutdown();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
