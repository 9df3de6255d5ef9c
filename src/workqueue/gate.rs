//! Execution gate for a work item.
//!
//! Tracks whether the item may be scheduled and run, and how many instances
//! are running right now, so cancellation can wait for them to finish.
//!
//! # Design
//!
//! A single `AtomicU32` stores both state and running count, so "is the item
//! enabled" and "count one more runner" happen in one CAS.
//!
//! Layout: `[state(8 bits) | running(24 bits)]`

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Work item states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateState {
    /// The item may be scheduled and run.
    Enabled = 0,
    /// Cancellation in progress: new schedules and runs are refused.
    Draining = 1,
    /// The item is permanently off.
    Disabled = 2,
}

#[derive(Default)]
struct StateAndCount(AtomicU32);

impl StateAndCount {
    const STATE_SHIFT: u32 = 24;
    const COUNT_MASK: u32 = (1 << Self::STATE_SHIFT) - 1;
    const STATE_ENABLED: u32 = 0;
    const STATE_DRAINING: u32 = 1;
    const STATE_DISABLED: u32 = 2;

    fn new() -> Self {
        Self(AtomicU32::new(Self::STATE_ENABLED << Self::STATE_SHIFT))
    }

    fn decode(raw: u32) -> GateState {
        match raw >> Self::STATE_SHIFT {
            Self::STATE_ENABLED => GateState::Enabled,
            Self::STATE_DRAINING => GateState::Draining,
            _ => GateState::Disabled,
        }
    }

    #[inline]
    fn state(&self) -> GateState {
        Self::decode(self.0.load(Ordering::Acquire))
    }

    #[inline]
    fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire) & Self::COUNT_MASK
    }

    /// Counts one more runner if the gate is enabled.
    fn try_acquire(&self) -> Result<(), GateState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = current >> Self::STATE_SHIFT;
            if state != Self::STATE_ENABLED {
                return Err(Self::decode(current));
            }

            let count = current & Self::COUNT_MASK;
            if count == Self::COUNT_MASK {
                return Err(GateState::Enabled);
            }

            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    fn release(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }

    /// Moves `from -> to`, keeping the count. Fails if the state is not `from`.
    fn transition(&self, from: u32, to: u32) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current >> Self::STATE_SHIFT != from {
                return false;
            }
            let next = (to << Self::STATE_SHIFT) | (current & Self::COUNT_MASK);
            match self.0.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Moves any live state to Disabled, keeping the count.
    fn disable(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current >> Self::STATE_SHIFT == Self::STATE_DISABLED {
                return false;
            }
            let next = (Self::STATE_DISABLED << Self::STATE_SHIFT) | (current & Self::COUNT_MASK);
            match self.0.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Wait queue used while draining, so waiters back off instead of hammering
/// the state word.
struct WaitQueue {
    waiters: AtomicUsize,
    notified: AtomicBool,
}

impl WaitQueue {
    const fn new() -> Self {
        Self {
            waiters: AtomicUsize::new(0),
            notified: AtomicBool::new(false),
        }
    }

    fn wait_until<F>(&self, mut condition: F)
    where
        F: FnMut() -> bool,
    {
        if condition() {
            return;
        }

        self.waiters.fetch_add(1, Ordering::AcqRel);
        while !condition() {
            if self.notified.swap(false, Ordering::AcqRel) {
                continue;
            }
            for _ in 0..100 {
                core::hint::spin_loop();
            }
        }
        self.waiters.fetch_sub(1, Ordering::AcqRel);
    }

    fn notify_all(&self) {
        if self.waiters.load(Ordering::Acquire) > 0 {
            self.notified.store(true, Ordering::Release);
        }
    }
}

/// Gate deciding whether a work item may run, with drain support.
///
/// ```text
///            begin_drain()              disable()
/// ┌─────────┐ ──────────> ┌──────────┐ ─────────────> ┌──────────┐
/// │ Enabled │             │ Draining │                │ Disabled │
/// └─────────┘ <────────── └──────────┘                └──────────┘
///      │      reenable()                                   ^
///      └───────────────────────────────────────────────────┘
///                              disable()
/// ```
pub(crate) struct ExecGate {
    state_count: StateAndCount,
    idle_waiters: WaitQueue,
}

impl ExecGate {
    pub(crate) fn new() -> Self {
        Self {
            state_count: StateAndCount::new(),
            idle_waiters: WaitQueue::new(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> GateState {
        self.state_count.state()
    }

    #[inline]
    pub(crate) fn running(&self) -> usize {
        self.state_count.count() as usize
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.state() == GateState::Enabled
    }

    /// Registers a runner. Returns `false` if the gate is not enabled.
    #[inline]
    pub(crate) fn try_enter(&self) -> bool {
        self.state_count.try_acquire().is_ok()
    }

    /// Unregisters a runner, waking drainers when the last one leaves.
    #[inline]
    pub(crate) fn exit(&self) {
        self.state_count.release();
        if self.state_count.count() == 0 {
            self.idle_waiters.notify_all();
        }
    }

    /// Enabled -> Draining. Returns `false` if the gate was not enabled.
    pub(crate) fn begin_drain(&self) -> bool {
        self.state_count.transition(
            StateAndCount::STATE_ENABLED,
            StateAndCount::STATE_DRAINING,
        )
    }

    /// Blocks until no runner is inside the gate.
    pub(crate) fn wait_idle(&self) {
        self.idle_waiters
            .wait_until(|| self.state_count.count() == 0);
    }

    /// Draining -> Enabled.
    pub(crate) fn reenable(&self) -> bool {
        self.state_count.transition(
            StateAndCount::STATE_DRAINING,
            StateAndCount::STATE_ENABLED,
        )
    }

    /// Enabled or Draining -> Disabled, keeping runners already inside.
    ///
    /// Returns `false` if the gate was already disabled.
    pub(crate) fn disable(&self) -> bool {
        self.state_count.disable()
    }
}

impl core::fmt::Debug for ExecGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecGate")
            .field("state", &self.state())
            .field("running", &self.running())
            .finish()
    }
}
