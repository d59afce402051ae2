//! [`Connection`] – Connection Handle Manager.
//!
//! Owns the single native handle of one domain.  The handle slot sits behind
//! one mutex that doubles as the command lock: `connect`, `disconnect` and
//! every command issued through [`Connection::with_handle`] hold it for their
//! whole duration, so teardown can never race an in-flight command and two
//! commands never interleave on the same handle.
//!
//! Connect sequence: `create(interface)` → `init` → `set_timeout`.  A null
//! handle fails with [`BridgeError::HandleCreationFailed`]; a nonzero `init`
//! fails with [`BridgeError::InitializationFailed`].  Any partially created
//! handle is destroyed before the error is returned.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use g1bridge_types::{BridgeError, Domain, codes};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::native::{NativeSession, RawHandle};

/// Default command timeout of the locomotion service.
pub const LOCO_DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default command timeout of the arm gesture service.
pub const ARM_DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default network interface the SDK binds to.
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Lifecycle owner of one domain's native handle.
pub struct Connection<D: ?Sized + NativeSession> {
    driver: Arc<D>,
    interface: String,
    timeout: Duration,
    handle: Mutex<Option<RawHandle>>,
}

impl<D: ?Sized + NativeSession> Connection<D> {
    /// Create a disconnected manager.  `timeout` is applied once at connect
    /// time and governs every later call.
    pub fn new(driver: Arc<D>, interface: impl Into<String>, timeout: Duration) -> Self {
        Self {
            driver,
            interface: interface.into(),
            timeout,
            handle: Mutex::new(None),
        }
    }

    pub fn domain(&self) -> Domain {
        self.driver.domain()
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open the native session.
    ///
    /// Calling this while already connected is a no-op that succeeds.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::HandleCreationFailed`] – `create` returned null.
    /// - [`BridgeError::InitializationFailed`] – `init` returned nonzero.
    pub fn connect(&self) -> Result<(), BridgeError> {
        let domain = self.domain();
        let mut slot = self.handle.lock();
        if slot.is_some() {
            warn!(%domain, interface = %self.interface, "already connected");
            return Ok(());
        }

        info!(%domain, interface = %self.interface, "connecting");
        let handle = self.driver.create(&self.interface).ok_or_else(|| {
            BridgeError::HandleCreationFailed {
                domain,
                interface: self.interface.clone(),
            }
        })?;
        let pending = PendingHandle::new(&*self.driver, handle);

        let code = self.driver.init(handle);
        if code != 0 {
            return Err(BridgeError::InitializationFailed {
                domain,
                code,
                category: codes::translate(domain, code),
            });
        }

        let code = self.driver.set_timeout(handle, self.timeout.as_secs_f32());
        if code != 0 {
            warn!(%domain, code, "set_timeout rejected; keeping SDK default");
        }

        *slot = Some(pending.commit());
        info!(%domain, interface = %self.interface, timeout_s = self.timeout.as_secs_f32(), "connected");
        Ok(())
    }

    /// Destroy the native session.  A no-op when nothing is connected.
    ///
    /// Waits for any in-flight command to finish first.
    pub fn disconnect(&self) {
        let domain = self.domain();
        let mut slot = self.handle.lock();
        match slot.take() {
            Some(handle) => {
                self.driver.destroy(handle);
                info!(%domain, "disconnected");
            }
            None => debug!(%domain, "disconnect with no live handle"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Run `call` against the live handle while holding the command lock.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotConnected`] when no handle is live; `call` is not
    /// invoked in that case.
    pub fn with_handle<T>(&self, call: impl FnOnce(&D, RawHandle) -> T) -> Result<T, BridgeError> {
        let slot = self.handle.lock();
        let handle = (*slot).ok_or(BridgeError::NotConnected(self.domain()))?;
        Ok(call(&*self.driver, handle))
    }
}

impl<D: ?Sized + NativeSession> Drop for Connection<D> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.get_mut().take() else {
            return;
        };
        let domain = self.driver.domain();
        let driver = &self.driver;
        if panic::catch_unwind(AssertUnwindSafe(|| driver.destroy(handle))).is_err() {
            error!(%domain, "native destroy panicked during teardown");
        } else {
            debug!(%domain, "handle released on teardown");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rollback guard
// ─────────────────────────────────────────────────────────────────────────────

/// Destroys a freshly created handle unless [`commit`][Self::commit]ted, so
/// both early returns and unwinding out of `init` release it.
struct PendingHandle<'a, D: ?Sized + NativeSession> {
    driver: &'a D,
    handle: RawHandle,
    armed: bool,
}

impl<'a, D: ?Sized + NativeSession> PendingHandle<'a, D> {
    fn new(driver: &'a D, handle: RawHandle) -> Self {
        Self {
            driver,
            handle,
            armed: true,
        }
    }

    fn commit(mut self) -> RawHandle {
        self.armed = false;
        self.handle
    }
}

impl<D: ?Sized + NativeSession> Drop for PendingHandle<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            warn!(domain = %self.driver.domain(), "rolling back partially created handle");
            self.driver.destroy(self.handle);
        }
    }
}
