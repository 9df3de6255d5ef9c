use alloc::string::String;
use core::time::Duration;

/// Default pen-up re-poll delay.
pub const DEFAULT_IRQ_TIMEOUT: Duration = Duration::from_millis(100);

/// Default time the wake source is held after a status refresh.
pub const DEFAULT_WAKE_HOLD: Duration = Duration::from_millis(1500);

/// Where status processing runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Processing runs in the interrupt thread, serialized by a mutex.
    Threaded,
    /// The top half only schedules delayed work; processing runs in the worker.
    Deferred,
}

/// Static configuration of one sensor device.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Driver name, used as the interrupt line name.
    pub name: String,
    /// Interrupt line number.
    pub irq: u32,
    /// Engine variant.
    pub mode: DispatchMode,
    /// Whether a pen-up re-poll is scheduled after each hardware interrupt.
    pub use_irq_timer: bool,
    /// Re-poll delay.
    pub irq_timeout: Duration,
    /// Wake source hold after a status refresh (threaded mode only).
    pub wake_hold: Option<Duration>,
}

impl SensorConfig {
    /// Creates a threaded configuration with no pen-up timer.
    pub fn new(name: &str, irq: u32) -> Self {
        Self {
            name: String::from(name),
            irq,
            mode: DispatchMode::Threaded,
            use_irq_timer: false,
            irq_timeout: DEFAULT_IRQ_TIMEOUT,
            wake_hold: Some(DEFAULT_WAKE_HOLD),
        }
    }

    /// Selects the engine variant.
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables the pen-up re-poll timer with the given delay.
    pub fn with_irq_timer(mut self, timeout: Duration) -> Self {
        self.use_irq_timer = true;
        self.irq_timeout = timeout;
        self
    }

    /// Overrides the wake source hold; `None` disables it.
    pub fn with_wake_hold(mut self, hold: Option<Duration>) -> Self {
        self.wake_hold = hold;
        self
    }
}
