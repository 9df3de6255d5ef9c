//! Test doubles for the host collaborators.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;

use axerrno::{ax_err, AxResult};
use spin::Mutex;
use timer_list::TimeValue;

use crate::device::{SensorDevice, SensorOps};
use crate::irq::{IrqChip, IrqFlags, IrqKind, IrqRequest, IrqReturn};
use crate::pm::{EarlySuspend, PowerManager, WakeSource};
use crate::workqueue::Clock;

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeValue {
        TimeValue::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Sensor returning a settable status value.
pub struct ScriptedOps {
    status: AtomicU32,
    refreshes: AtomicUsize,
    startup_checks: AtomicUsize,
}

impl ScriptedOps {
    pub fn new(status: u32) -> Self {
        Self {
            status: AtomicU32::new(status),
            refreshes: AtomicUsize::new(0),
            startup_checks: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, status: u32) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn startup_checks(&self) -> usize {
        self.startup_checks.load(Ordering::SeqCst)
    }
}

impl SensorOps for ScriptedOps {
    fn refresh_status(&self, _dev: &SensorDevice) -> u32 {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.status.load(Ordering::SeqCst)
    }

    fn startup_touch_check(&self, _dev: &SensorDevice) {
        self.startup_checks.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wake source recording every hold.
#[derive(Default)]
pub struct WakeRecorder {
    holds: Mutex<Vec<Duration>>,
}

impl WakeRecorder {
    pub fn holds(&self) -> Vec<Duration> {
        self.holds.lock().clone()
    }
}

impl WakeSource for WakeRecorder {
    fn hold_for(&self, timeout: Duration) {
        self.holds.lock().push(timeout);
    }
}

/// Interrupt controller that keeps requests and fires them on demand.
#[derive(Default)]
pub struct MockIrqChip {
    lines: Mutex<BTreeMap<u32, IrqRequest>>,
    fail: AtomicBool,
    freed: Mutex<Vec<u32>>,
}

impl MockIrqChip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_requests(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn is_registered(&self, irq: u32) -> bool {
        self.lines.lock().contains_key(&irq)
    }

    pub fn kind(&self, irq: u32) -> Option<IrqKind> {
        self.lines.lock().get(&irq).map(|req| req.kind)
    }

    pub fn flags(&self, irq: u32) -> Option<IrqFlags> {
        self.lines.lock().get(&irq).map(|req| req.flags)
    }

    pub fn name(&self, irq: u32) -> Option<String> {
        self.lines.lock().get(&irq).map(|req| req.name.clone())
    }

    pub fn freed(&self) -> Vec<u32> {
        self.freed.lock().clone()
    }

    /// Delivers one interrupt the way the host would.
    pub fn fire(&self, irq: u32) -> IrqReturn {
        let (handler, kind) = match self.lines.lock().get(&irq) {
            Some(req) => (Arc::clone(&req.handler), req.kind),
            None => return IrqReturn::None,
        };
        let ret = handler.handle(irq);
        if kind == IrqKind::Threaded && ret == IrqReturn::WakeThread {
            handler.handle_threaded(irq)
        } else {
            ret
        }
    }
}

impl IrqChip for MockIrqChip {
    fn request_irq(&self, request: IrqRequest) -> AxResult {
        if self.fail.load(Ordering::SeqCst) {
            return ax_err!(ResourceBusy, "line busy");
        }
        let mut lines = self.lines.lock();
        if lines.contains_key(&request.irq) {
            return ax_err!(ResourceBusy, "line busy");
        }
        lines.insert(request.irq, request);
        Ok(())
    }

    fn free_irq(&self, irq: u32) {
        self.lines.lock().remove(&irq);
        self.freed.lock().push(irq);
    }
}

/// Power manager keeping its subscribers in a map.
#[derive(Default)]
pub struct MockPowerManager {
    hooks: Mutex<BTreeMap<usize, (u32, Arc<dyn EarlySuspend>)>>,
    next: AtomicUsize,
    suspend_pending: AtomicBool,
}

impl MockPowerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_suspend_pending(&self, pending: bool) {
        self.suspend_pending.store(pending, Ordering::SeqCst);
    }

    pub fn levels(&self) -> Vec<u32> {
        self.hooks.lock().values().map(|(level, _)| *level).collect()
    }

    pub fn suspend_all(&self) {
        let hooks: Vec<_> = self.hooks.lock().values().map(|(_, h)| Arc::clone(h)).collect();
        hooks.iter().for_each(|h| h.early_suspend());
    }

    pub fn resume_all(&self) {
        let hooks: Vec<_> = self.hooks.lock().values().map(|(_, h)| Arc::clone(h)).collect();
        hooks.iter().for_each(|h| h.late_resume());
    }
}

impl PowerManager for MockPowerManager {
    fn register_early_suspend(&self, level: u32, hooks: Arc<dyn EarlySuspend>) -> usize {
        let handle = self.next.fetch_add(1, Ordering::SeqCst);
        self.hooks.lock().insert(handle, (level, hooks));
        handle
    }

    fn unregister_early_suspend(&self, handle: usize) {
        self.hooks.lock().remove(&handle);
    }

    fn suspend_pending(&self) -> bool {
        self.suspend_pending.load(Ordering::SeqCst)
    }
}
