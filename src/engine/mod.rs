//! Interrupt dispatch engines.
//!
//! Two interchangeable strategies turn a line interrupt into a dispatch pass
//! over the device's status table:
//!
//! - [`ThreadedEngine`]: the line is registered with a threaded handler;
//!   processing runs inline in the interrupt thread under a mutex. The
//!   delayed work item only implements the pen-up re-poll.
//! - [`DeferredEngine`]: the top half only checks the line and schedules the
//!   delayed work with zero delay; processing runs in the worker context,
//!   which re-schedules itself for the pen-up re-poll.
//!
//! Both share the status table and the [`DelayedWork`] scheduler.

mod deferred;
mod threaded;

use alloc::sync::Arc;

use crate::config::DispatchMode;
use crate::device::{SensorDevice, SensorOps};
use crate::irq::{IrqHandler, IrqKind};
use crate::workqueue::{DelayedWork, WorkQueue};

pub use deferred::DeferredEngine;
pub use threaded::ThreadedEngine;

/// What started a processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A hardware interrupt.
    Hardware,
    /// The recheck issued on resume.
    Resume,
    /// The pen-up re-poll timer.
    Repoll,
}

/// Common interface of the engine variants.
pub trait DispatchEngine: IrqHandler {
    /// The variant.
    fn mode(&self) -> DispatchMode;

    /// How the line must be registered.
    fn irq_kind(&self) -> IrqKind;

    /// The device being serviced.
    fn device(&self) -> &Arc<SensorDevice>;

    /// The delayed work item owned by the engine.
    fn work(&self) -> &DelayedWork;

    /// Power-state hook before sleep. The host disables the line itself, so
    /// there is nothing to do here.
    fn suspend(&self) {
        debug!("{}: suspend", self.device().name());
    }

    /// Power-state hook after wake-up: rechecks for an interrupt that may
    /// have been missed while asleep.
    fn resume(&self);

    /// Stops the engine for teardown: waits for a processing run in flight
    /// and makes every later run (resume, re-poll, late interrupt) a no-op.
    /// Called after the line has been released.
    fn shutdown(&self);

    /// Converts the engine into the handler registered on the line.
    fn into_irq_handler(self: Arc<Self>) -> Arc<dyn IrqHandler>;
}

/// Builds the engine matching the device's configured mode.
pub(crate) fn build(
    dev: Arc<SensorDevice>,
    ops: Arc<dyn SensorOps>,
    queue: Arc<WorkQueue>,
) -> Arc<dyn DispatchEngine> {
    match dev.mode() {
        DispatchMode::Threaded => ThreadedEngine::new(dev, ops, queue) as Arc<dyn DispatchEngine>,
        DispatchMode::Deferred => DeferredEngine::new(dev, ops, queue) as Arc<dyn DispatchEngine>,
    }
}

/// Runs one dispatch pass over `status` and counts it.
fn dispatch_pass(dev: &SensorDevice, status: u32) {
    let invoked = dev.status_table().dispatch(status, dev);
    dev.stats().record_pass(invoked);
}
