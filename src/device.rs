//! The per-device context shared by the dispatch engines.

use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::time::Duration;

use axerrno::AxResult;

use crate::config::{DispatchMode, SensorConfig};
use crate::pm::WakeSource;
use crate::status::{StatusHandler, StatusTable};

/// Device-specific collaborator: register access and sensor personality.
///
/// This is the device extension of the context. [`crate::SensorCore::setup`]
/// refuses a device that does not carry one.
pub trait SensorOps: Send + Sync {
    /// Reads the status register and returns the event bitmask.
    ///
    /// May perform a blocking bus transaction.
    fn refresh_status(&self, dev: &SensorDevice) -> u32;

    /// Startup compensation check, run instead of the normal dispatch while
    /// the device is inside its startup calibration window.
    fn startup_touch_check(&self, _dev: &SensorDevice) {}
}

/// Returns `true` while the (active-low) interrupt line is asserted.
pub type LineLevelFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Device-specific register bring-up.
pub type InitFn = Arc<dyn Fn(&SensorDevice) -> AxResult + Send + Sync>;

/// Counters for interrupt servicing.
#[derive(Debug, Default)]
pub struct DispatchStats {
    interrupts: AtomicU64,
    spurious: AtomicU64,
    passes: AtomicU64,
    handlers: AtomicU64,
    suppressed: AtomicU64,
    repolls: AtomicU64,
}

impl DispatchStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_spurious(&self) {
        self.spurious.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_pass(&self, handlers: usize) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.handlers.fetch_add(handlers as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_repoll(&self) {
        self.repolls.fetch_add(1, Ordering::Relaxed);
    }

    /// Interrupts delivered to the engine.
    pub fn interrupts(&self) -> u64 {
        self.interrupts.load(Ordering::Relaxed)
    }

    /// Interrupts dropped because the line already read released.
    pub fn spurious(&self) -> u64 {
        self.spurious.load(Ordering::Relaxed)
    }

    /// Completed dispatch passes.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Handlers invoked over all passes.
    pub fn handlers_invoked(&self) -> u64 {
        self.handlers.load(Ordering::Relaxed)
    }

    /// Passes replaced by the startup compensation check.
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Pen-up re-polls scheduled.
    pub fn repolls(&self) -> u64 {
        self.repolls.load(Ordering::Relaxed)
    }
}

/// Context of one physical sensor.
///
/// The status table and collaborators are fixed when the device is built, so
/// nothing that drives dispatch can change once the interrupt line is armed.
/// Only the flags below are mutable at run time; handlers flip them through
/// `&SensorDevice`.
pub struct SensorDevice {
    name: String,
    irq: u32,
    mode: DispatchMode,
    irq_timeout: Duration,
    wake_hold: Option<Duration>,
    irq_disabled: AtomicBool,
    use_irq_timer: AtomicBool,
    in_startup_touch_check: AtomicBool,
    status_table: StatusTable,
    ops: Option<Arc<dyn SensorOps>>,
    line_level: Option<LineLevelFn>,
    init: Option<InitFn>,
    wake_source: Option<Arc<dyn WakeSource>>,
    stats: DispatchStats,
}

impl SensorDevice {
    /// Starts building a device from its configuration.
    pub fn builder(config: SensorConfig) -> SensorDeviceBuilder {
        SensorDeviceBuilder {
            config,
            status_table: StatusTable::new(),
            ops: None,
            line_level: None,
            init: None,
            wake_source: None,
        }
    }

    /// Driver name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interrupt line number.
    #[inline]
    pub fn irq(&self) -> u32 {
        self.irq
    }

    /// Engine variant this device was configured for.
    #[inline]
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Pen-up re-poll delay.
    #[inline]
    pub fn irq_timeout(&self) -> Duration {
        self.irq_timeout
    }

    /// Whether the interrupt line is currently released by this driver.
    pub fn irq_disabled(&self) -> bool {
        self.irq_disabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_irq_disabled(&self, disabled: bool) {
        self.irq_disabled.store(disabled, Ordering::Release);
    }

    /// Whether a pen-up re-poll follows hardware interrupts.
    pub fn use_irq_timer(&self) -> bool {
        self.use_irq_timer.load(Ordering::Acquire)
    }

    /// Enables or disables the pen-up re-poll.
    pub fn set_use_irq_timer(&self, enable: bool) {
        self.use_irq_timer.store(enable, Ordering::Release);
    }

    /// Whether normal dispatch is suppressed for startup calibration.
    pub fn in_startup_touch_check(&self) -> bool {
        self.in_startup_touch_check.load(Ordering::Acquire)
    }

    /// Enters or leaves the startup calibration window.
    pub fn set_in_startup_touch_check(&self, enable: bool) {
        self.in_startup_touch_check.store(enable, Ordering::Release);
    }

    /// The callback table.
    #[inline]
    pub fn status_table(&self) -> &StatusTable {
        &self.status_table
    }

    /// The device extension, if any.
    #[inline]
    pub fn ops(&self) -> Option<&Arc<dyn SensorOps>> {
        self.ops.as_ref()
    }

    /// Whether a line-level predicate is wired.
    pub fn has_line_level(&self) -> bool {
        self.line_level.is_some()
    }

    /// Reads the line; a missing predicate counts as asserted.
    pub fn line_asserted(&self) -> bool {
        self.line_level.as_ref().map_or(true, |level| level())
    }

    /// Reads the line; a missing predicate counts as released.
    pub fn line_released(&self) -> bool {
        self.line_level.as_ref().map_or(true, |level| !level())
    }

    pub(crate) fn init_fn(&self) -> Option<&InitFn> {
        self.init.as_ref()
    }

    /// Keeps the system awake for the configured hold time.
    pub(crate) fn hold_wake(&self) {
        if let (Some(source), Some(hold)) = (&self.wake_source, self.wake_hold) {
            debug!("{}: holding wake source for {:?}", self.name, hold);
            source.hold_for(hold);
        }
    }

    /// Servicing counters.
    #[inline]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

impl core::fmt::Debug for SensorDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SensorDevice")
            .field("name", &self.name)
            .field("irq", &self.irq)
            .field("mode", &self.mode)
            .field("irq_disabled", &self.irq_disabled())
            .field("use_irq_timer", &self.use_irq_timer())
            .field("in_startup_touch_check", &self.in_startup_touch_check())
            .field("status_table", &self.status_table)
            .finish()
    }
}

/// Builder populated by the device-specific driver before setup.
pub struct SensorDeviceBuilder {
    config: SensorConfig,
    status_table: StatusTable,
    ops: Option<Arc<dyn SensorOps>>,
    line_level: Option<LineLevelFn>,
    init: Option<InitFn>,
    wake_source: Option<Arc<dyn WakeSource>>,
}

impl SensorDeviceBuilder {
    /// Sets the device extension.
    pub fn ops(mut self, ops: Arc<dyn SensorOps>) -> Self {
        self.ops = Some(ops);
        self
    }

    /// Wires the interrupt line level predicate.
    pub fn line_level<F>(mut self, level: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.line_level = Some(Arc::new(level));
        self
    }

    /// Sets the register bring-up operation.
    pub fn init<F>(mut self, init: F) -> Self
    where
        F: Fn(&SensorDevice) -> AxResult + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Sets the wake source held after each threaded status refresh.
    pub fn wake_source(mut self, source: Arc<dyn WakeSource>) -> Self {
        self.wake_source = Some(source);
        self
    }

    /// Registers a handler for status bit `bit`.
    ///
    /// # Errors
    ///
    /// See [`StatusTable::register`].
    pub fn on_status<F>(mut self, bit: usize, handler: F) -> AxResult<Self>
    where
        F: Fn(&SensorDevice) + Send + Sync + 'static,
    {
        let handler: StatusHandler = Arc::new(handler);
        self.status_table.register(bit, handler)?;
        Ok(self)
    }

    /// Finishes the device.
    pub fn build(self) -> SensorDevice {
        let SensorConfig {
            name,
            irq,
            mode,
            use_irq_timer,
            irq_timeout,
            wake_hold,
        } = self.config;

        SensorDevice {
            name,
            irq,
            mode,
            irq_timeout,
            wake_hold,
            irq_disabled: AtomicBool::new(true),
            use_irq_timer: AtomicBool::new(use_irq_timer),
            in_startup_touch_check: AtomicBool::new(false),
            status_table: self.status_table,
            ops: self.ops,
            line_level: self.line_level,
            init: self.init,
            wake_source: self.wake_source,
            stats: DispatchStats::new(),
        }
    }
}
