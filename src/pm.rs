//! Power-management collaborators.
//!
//! The host may offer an early-suspend/late-resume subscription and a wake
//! source. Both are optional; the core works without them.

use alloc::sync::{Arc, Weak};
use core::time::Duration;

use crate::engine::DispatchEngine;

/// Early-suspend level at which the display is blanked.
pub const EARLY_SUSPEND_LEVEL_BLANK_SCREEN: u32 = 50;

/// Level the sensor core registers at: just after the screen goes dark.
pub const SENSOR_EARLY_SUSPEND_LEVEL: u32 = EARLY_SUSPEND_LEVEL_BLANK_SCREEN + 1;

/// Keeps the system out of suspend for a bounded time.
pub trait WakeSource: Send + Sync {
    /// Holds the wake source for `timeout`, restarting any hold in progress.
    fn hold_for(&self, timeout: Duration);
}

/// Hooks fired around system sleep.
pub trait EarlySuspend: Send + Sync {
    /// Fired before the system starts to suspend.
    fn early_suspend(&self);
    /// Fired after the system has resumed.
    fn late_resume(&self);
}

/// Host power-management framework.
pub trait PowerManager: Send + Sync {
    /// Subscribes `hooks` at `level`; returns a handle for unregistration.
    fn register_early_suspend(&self, level: u32, hooks: Arc<dyn EarlySuspend>) -> usize;

    /// Drops a subscription made by [`PowerManager::register_early_suspend`].
    fn unregister_early_suspend(&self, handle: usize);

    /// Returns `true` if the system is already eligible to suspend, i.e. no
    /// suspend-blocking wake source is held and the system is running.
    fn suspend_pending(&self) -> bool {
        false
    }
}

/// Early-suspend hooks forwarding into a dispatch engine.
///
/// Holds the engine weakly, so hooks that outlive teardown do nothing.
pub(crate) struct EngineHooks {
    engine: Weak<dyn DispatchEngine>,
}

impl EngineHooks {
    pub(crate) fn new(engine: &Arc<dyn DispatchEngine>) -> Self {
        Self {
            engine: Arc::downgrade(engine),
        }
    }
}

impl EarlySuspend for EngineHooks {
    fn early_suspend(&self) {
        if let Some(engine) = self.engine.upgrade() {
            debug!("{}: early suspend", engine.device().name());
            engine.suspend();
        }
    }

    fn late_resume(&self) {
        if let Some(engine) = self.engine.upgrade() {
            debug!("{}: late resume", engine.device().name());
            engine.resume();
        }
    }
}
