#![no_std]

//! # AxSensor Interrupt Core
//!
//! This crate provides the interrupt-servicing core shared by a family of
//! capacitive/proximity sensor chips. It is designed for `no_std`
//! environments and uses the `alloc` crate for dynamic memory allocation.
//!
//! ## Architecture
//!
//! ### Device Context
//! - [`SensorDevice`]: Per-sensor context: status callback table, flags,
//!   device extension ([`SensorOps`]), line-level predicate and `init` hook
//! - [`StatusTable`]: Fixed-size map from status bit to handler, with the
//!   dispatcher
//!
//! ### Scheduling
//! - [`WorkQueue`]: Deadline-ordered delayed work, polled by the host worker
//! - [`DelayedWork`]: Single-instance, cancel-then-schedule work item
//!
//! ### Dispatch Engines
//! - [`ThreadedEngine`]: Processing in the interrupt thread under a mutex
//! - [`DeferredEngine`]: Top half schedules work; processing in the worker
//!
//! ### Lifecycle
//! - [`SensorCore`]: Setup/teardown and suspend/resume for one sensor
//!
//! ## Host Contracts
//!
//! | Trait            | Provided by          | Purpose                              |
//! |------------------|----------------------|--------------------------------------|
//! | [`IrqChip`]      | host                 | Request / free the interrupt line    |
//! | [`Clock`]        | host                 | Time base for delayed work           |
//! | [`PowerManager`] | host (optional)      | Early-suspend / late-resume          |
//! | [`WakeSource`]   | host (optional)      | Stay awake while events are consumed |
//! | [`SensorOps`]    | device driver        | Status register, startup check       |
//!
//! ## Example
//!
//! ```rust,ignore
//! use axsensor::{SensorConfig, SensorCore, SensorDevice, WorkQueue, FAR_IRQ};
//!
//! let queue = Arc::new(WorkQueue::new(clock));
//! let core = SensorCore::new(irq_chip, queue.clone()).with_power_manager(pm);
//!
//! let dev = SensorDevice::builder(
//!     SensorConfig::new("sx9500", 42).with_irq_timer(Duration::from_millis(100)),
//! )
//! .ops(Arc::new(Sx9500Regs::new(bus)))
//! .line_level(move || nirq_gpio.is_low())
//! .init(|dev| sx9500_init_registers(dev))
//! .on_status(5, |dev| report_far(dev))?
//! .on_status(4, |dev| report_compdone(dev))?
//! .build();
//!
//! core.setup(Arc::new(dev))?;
//!
//! // Host worker loop
//! loop {
//!     queue.run_expired();
//!     sleep_until(queue.next_deadline());
//! }
//!
//! // Driver removal
//! core.teardown()?;
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod config;
mod device;
mod engine;
mod irq;
mod lifecycle;
mod pm;
mod status;
mod workqueue;

#[cfg(test)]
mod mock;

pub use config::{DispatchMode, SensorConfig, DEFAULT_IRQ_TIMEOUT, DEFAULT_WAKE_HOLD};
pub use device::{DispatchStats, InitFn, LineLevelFn, SensorDevice, SensorDeviceBuilder, SensorOps};
pub use engine::{DeferredEngine, DispatchEngine, ThreadedEngine, Trigger};
pub use irq::{IrqChip, IrqFlags, IrqHandler, IrqKind, IrqRequest, IrqReturn};
pub use lifecycle::SensorCore;
pub use pm::{
    EarlySuspend,
    PowerManager,
    WakeSource,
    EARLY_SUSPEND_LEVEL_BLANK_SCREEN,
    SENSOR_EARLY_SUSPEND_LEVEL,
};
pub use status::{StatusHandler, StatusTable, COMPDONE_IRQ, FAR_IRQ, MAX_NUM_STATUS_BITS};
pub use workqueue::{Clock, DelayedWork, GateState, WorkQueue};

// Re-export the time type used by `Clock`.
pub use timer_list::TimeValue;
