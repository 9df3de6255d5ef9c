//! Setup and teardown of a sensor's interrupt servicing.
//!
//! [`SensorCore`] binds one [`SensorDevice`] to the host: it builds the
//! engine, arms the interrupt line, subscribes to early-suspend, runs the
//! device's register bring-up, and undoes all of it on teardown.
//!
//! # Teardown order
//!
//! ```text
//! unregister PM hooks ─> free_irq (waits for handlers) ─> engine shutdown ─> drop
//! ```
//!
//! The line is released before the engine shuts down, so no interrupt can
//! queue new work once cancellation has started. Shutdown waits for a pass
//! in flight (a resume, for instance) and disables the delayed work.

use alloc::sync::Arc;

use axerrno::{ax_err, AxResult};
use spin::Mutex;

use crate::device::SensorDevice;
use crate::engine::{self, DispatchEngine};
use crate::irq::{IrqChip, IrqFlags, IrqKind, IrqRequest};
use crate::pm::{EarlySuspend, EngineHooks, PowerManager, SENSOR_EARLY_SUSPEND_LEVEL};
use crate::workqueue::WorkQueue;

struct Binding {
    engine: Arc<dyn DispatchEngine>,
    pm_handle: Option<usize>,
}

/// Lifecycle manager and suspend/resume adapter for one sensor.
pub struct SensorCore {
    irq_chip: Arc<dyn IrqChip>,
    queue: Arc<WorkQueue>,
    pm: Option<Arc<dyn PowerManager>>,
    binding: Mutex<Option<Binding>>,
}

impl SensorCore {
    /// Creates an unbound core using `irq_chip` for the line and `queue` for
    /// delayed work.
    pub fn new(irq_chip: Arc<dyn IrqChip>, queue: Arc<WorkQueue>) -> Self {
        Self {
            irq_chip,
            queue,
            pm: None,
            binding: Mutex::new(None),
        }
    }

    /// Subscribes to early-suspend/late-resume on `pm` during setup.
    pub fn with_power_manager(mut self, pm: Arc<dyn PowerManager>) -> Self {
        self.pm = Some(pm);
        self
    }

    /// Binds `dev` and arms its interrupt line.
    ///
    /// Returns the result of the device's `init` operation.
    ///
    /// # Errors
    ///
    /// - `NoMemory` if the device has no extension ([`crate::SensorOps`]).
    /// - `AlreadyExists` if a device is already bound.
    /// - The interrupt controller's error if the line cannot be requested;
    ///   nothing is left bound in that case.
    /// - `NoMemory` if the device has no `init` operation. The line stays
    ///   armed; call [`SensorCore::teardown`].
    /// - Whatever `init` returns, with the same caveat.
    pub fn setup(&self, dev: Arc<SensorDevice>) -> AxResult {
        let Some(ops) = dev.ops().cloned() else {
            error!("{}: no device extension", dev.name());
            return ax_err!(NoMemory, "sensor device without extension");
        };

        let mut binding = self.binding.lock();
        if binding.is_some() {
            return ax_err!(AlreadyExists, "sensor core already bound");
        }

        let engine = engine::build(Arc::clone(&dev), ops, Arc::clone(&self.queue));
        let kind = engine.irq_kind();

        dev.set_irq_disabled(false);
        let flags = match kind {
            // Keep the line masked until the thread half has run.
            IrqKind::Threaded => IrqFlags::TRIGGER_FALLING | IrqFlags::ONESHOT,
            IrqKind::Hard => IrqFlags::TRIGGER_FALLING,
        };
        let request = IrqRequest {
            irq: dev.irq(),
            flags,
            kind,
            name: dev.name().into(),
            handler: Arc::clone(&engine).into_irq_handler(),
        };
        if let Err(err) = self.irq_chip.request_irq(request) {
            error!("{}: irq {} busy?", dev.name(), dev.irq());
            dev.set_irq_disabled(true);
            return Err(err);
        }

        match kind {
            IrqKind::Threaded => info!("{}: registered with threaded irq ({})", dev.name(), dev.irq()),
            IrqKind::Hard => info!("{}: registered with irq ({})", dev.name(), dev.irq()),
        }

        let pm_handle = self.pm.as_ref().map(|pm| {
            let hooks: Arc<dyn EarlySuspend> = Arc::new(EngineHooks::new(&engine));
            let handle = pm.register_early_suspend(SENSOR_EARLY_SUSPEND_LEVEL, Arc::clone(&hooks));
            if pm.suspend_pending() {
                hooks.early_suspend();
            }
            handle
        });

        *binding = Some(Binding { engine, pm_handle });
        drop(binding);

        match dev.init_fn() {
            Some(init) => init(&dev),
            None => {
                error!("{}: no init function", dev.name());
                ax_err!(NoMemory, "sensor device without init")
            }
        }
    }

    /// Unbinds the device: releases the line, then shuts the engine down,
    /// waiting for a processing pass in flight.
    ///
    /// No handler, processing pass or delayed work for the device runs after
    /// this returns, even through an engine reference obtained earlier.
    ///
    /// # Errors
    ///
    /// `NoMemory` if no device is bound.
    pub fn teardown(&self) -> AxResult {
        let Some(binding) = self.binding.lock().take() else {
            return ax_err!(NoMemory, "no sensor device bound");
        };
        let dev = Arc::clone(binding.engine.device());

        if let (Some(pm), Some(handle)) = (&self.pm, binding.pm_handle) {
            pm.unregister_early_suspend(handle);
        }

        dev.set_irq_disabled(true);
        self.irq_chip.free_irq(dev.irq());

        binding.engine.shutdown();

        info!("{}: removed", dev.name());
        Ok(())
    }

    /// Forwards a suspend transition to the bound engine.
    pub fn suspend(&self) {
        if let Some(engine) = self.engine() {
            engine.suspend();
        }
    }

    /// Forwards a resume transition to the bound engine.
    pub fn resume(&self) {
        if let Some(engine) = self.engine() {
            engine.resume();
        }
    }

    /// The bound engine, if any.
    pub fn engine(&self) -> Option<Arc<dyn DispatchEngine>> {
        self.binding
            .lock()
            .as_ref()
            .map(|binding| Arc::clone(&binding.engine))
    }

    /// The bound device, if any.
    pub fn device(&self) -> Option<Arc<SensorDevice>> {
        self.engine().map(|engine| Arc::clone(engine.device()))
    }

    /// Returns `true` while a device is bound.
    pub fn is_bound(&self) -> bool {
        self.binding.lock().is_some()
    }
}
