use alloc::sync::{Arc, Weak};
use core::time::Duration;

use super::{dispatch_pass, DispatchEngine};
use crate::config::DispatchMode;
use crate::device::{SensorDevice, SensorOps};
use crate::irq::{IrqHandler, IrqKind, IrqReturn};
use crate::workqueue::{DelayedWork, WorkQueue};

/// Engine moving all processing into the delayed work item.
///
/// The top half never blocks and never reads the status register: it only
/// [kicks](DelayedWork::kick) the work item, which takes no lock. The work
/// body is not serialized against a new top-half request: the work item is
/// single-instance, but a fresh schedule may queue the next run while the
/// current one is still executing. Status handlers must cope with that.
///
/// Startup suppression is not applied in this mode.
pub struct DeferredEngine {
    dev: Arc<SensorDevice>,
    ops: Arc<dyn SensorOps>,
    work: DelayedWork,
}

impl DeferredEngine {
    /// Creates the engine; its delayed work runs the whole processing body.
    pub fn new(dev: Arc<SensorDevice>, ops: Arc<dyn SensorOps>, queue: Arc<WorkQueue>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            Self {
                dev,
                ops,
                work: DelayedWork::new(queue, move || {
                    if let Some(engine) = weak.upgrade() {
                        engine.worker();
                    }
                }),
            }
        })
    }

    fn schedule(&self, delay: Duration) -> bool {
        debug!("{}: schedule work in {:?}", self.dev.name(), delay);
        self.work.schedule(delay)
    }

    /// Delayed work body.
    fn worker(&self) {
        let dev = &*self.dev;

        // Sample the line before the refresh; it may change during the bus read.
        let nirq_low = dev.use_irq_timer() && dev.line_asserted();

        let status = self.ops.refresh_status(dev);
        debug!("{}: worker - refresh status {:#04x}", dev.name(), status);

        dispatch_pass(dev, status);

        if dev.use_irq_timer() && nirq_low {
            // Early chip revisions need a pen-up timer.
            if self.schedule(dev.irq_timeout()) {
                dev.stats().record_repoll();
            }
        }
    }
}

impl IrqHandler for DeferredEngine {
    fn handle(&self, irq: u32) -> IrqReturn {
        self.dev.stats().record_interrupt();
        if self.dev.line_asserted() {
            self.work.kick();
        } else {
            error!("{}: irq {} - nirq read high", self.dev.name(), irq);
            self.dev.stats().record_spurious();
        }
        IrqReturn::Handled
    }
}

impl DispatchEngine for DeferredEngine {
    fn mode(&self) -> DispatchMode {
        DispatchMode::Deferred
    }

    fn irq_kind(&self) -> IrqKind {
        IrqKind::Hard
    }

    fn device(&self) -> &Arc<SensorDevice> {
        &self.dev
    }

    fn work(&self) -> &DelayedWork {
        &self.work
    }

    fn resume(&self) {
        self.schedule(Duration::ZERO);
    }

    fn shutdown(&self) {
        self.work.disable_sync();
    }

    fn into_irq_handler(self: Arc<Self>) -> Arc<dyn IrqHandler> {
        self
    }
}
