use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use super::{dispatch_pass, DispatchEngine, Trigger};
use crate::config::DispatchMode;
use crate::device::{SensorDevice, SensorOps};
use crate::irq::{IrqHandler, IrqKind, IrqReturn};
use crate::status::{COMPDONE_IRQ, FAR_IRQ};
use crate::workqueue::{DelayedWork, WorkQueue};

/// Engine processing interrupts in the interrupt thread.
///
/// Every processing run (interrupt thread, re-poll, resume) holds `lock`,
/// so at most one pass runs at a time per device. Shutdown takes the same
/// lock, so it waits for the pass in flight and no pass starts afterwards.
pub struct ThreadedEngine {
    dev: Arc<SensorDevice>,
    ops: Arc<dyn SensorOps>,
    lock: Mutex<()>,
    shut_down: AtomicBool,
    work: DelayedWork,
}

impl ThreadedEngine {
    /// Creates the engine; its delayed work runs the pen-up re-poll.
    pub fn new(dev: Arc<SensorDevice>, ops: Arc<dyn SensorOps>, queue: Arc<WorkQueue>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            Self {
                dev,
                ops,
                lock: Mutex::new(()),
                shut_down: AtomicBool::new(false),
                work: DelayedWork::new(queue, move || {
                    if let Some(engine) = weak.upgrade() {
                        engine.repoll();
                    }
                }),
            }
        })
    }

    /// Processing body. The caller holds `lock`.
    fn process(&self, trigger: Trigger) {
        let dev = &*self.dev;
        if self.shut_down.load(Ordering::Acquire) {
            debug!("{}: shut down, {:?} pass dropped", dev.name(), trigger);
            return;
        }

        let status = self.ops.refresh_status(dev);
        debug!("{}: status {:#04x} ({:?})", dev.name(), status, trigger);

        dev.hold_wake();

        if dev.in_startup_touch_check() {
            if status & (COMPDONE_IRQ | FAR_IRQ) != 0 {
                self.ops.startup_touch_check(dev);
            }
            info!("{}: ignore interrupt, startup touch check in progress", dev.name());
            dev.stats().record_suppressed();
            return;
        }

        dispatch_pass(dev, status);

        if trigger == Trigger::Hardware && dev.use_irq_timer() {
            // The chip may not interrupt again on release; poll for it.
            if self.work.schedule(dev.irq_timeout()) {
                dev.stats().record_repoll();
                info!("{}: schedule irq timer", dev.name());
            }
        }
    }

    /// Delayed work body: processes once the line has gone back up.
    fn repoll(&self) {
        let _guard = self.lock.lock();
        if self.dev.line_released() {
            self.process(Trigger::Repoll);
        } else {
            trace!("{}: line still asserted, re-poll skipped", self.dev.name());
        }
    }
}

impl IrqHandler for ThreadedEngine {
    fn handle(&self, _irq: u32) -> IrqReturn {
        IrqReturn::WakeThread
    }

    fn handle_threaded(&self, irq: u32) -> IrqReturn {
        let _guard = self.lock.lock();
        debug!("{}: irq {}", self.dev.name(), irq);
        self.dev.stats().record_interrupt();

        if self.dev.line_asserted() {
            self.process(Trigger::Hardware);
        } else {
            error!("{}: irq {} - nirq read high", self.dev.name(), irq);
            self.dev.stats().record_spurious();
        }
        IrqReturn::Handled
    }
}

impl DispatchEngine for ThreadedEngine {
    fn mode(&self) -> DispatchMode {
        DispatchMode::Threaded
    }

    fn irq_kind(&self) -> IrqKind {
        IrqKind::Threaded
    }

    fn device(&self) -> &Arc<SensorDevice> {
        &self.dev
    }

    fn work(&self) -> &DelayedWork {
        &self.work
    }

    fn resume(&self) {
        let _guard = self.lock.lock();
        self.process(Trigger::Resume);
    }

    fn shutdown(&self) {
        {
            let _guard = self.lock.lock();
            self.shut_down.store(true, Ordering::Release);
        }
        // The re-poll body takes `lock`; wait for it with the lock released.
        self.work.disable_sync();
    }

    fn into_irq_handler(self: Arc<Self>) -> Arc<dyn IrqHandler> {
        self
    }
}
