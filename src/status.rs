//! Status bit callback table and dispatcher.
//!
//! The sensor reports independent event conditions as bits of a status
//! register. Each bit position may carry one handler; a dispatch pass invokes
//! every handler whose bit is set in the refreshed status value.

use alloc::sync::Arc;

use axerrno::{ax_err, AxResult};

use crate::device::SensorDevice;

/// Width of the status register, i.e. the number of callback slots.
pub const MAX_NUM_STATUS_BITS: usize = 8;

/// Compensation (calibration) done.
pub const COMPDONE_IRQ: u32 = 0x10;

/// Object moved away from the sensor.
pub const FAR_IRQ: u32 = 0x20;

/// Handler invoked when its status bit is set.
///
/// Handlers may run with the engine's processing lock held (threaded mode)
/// or with no lock at all (deferred mode), so they must tolerate both.
pub type StatusHandler = Arc<dyn Fn(&SensorDevice) + Send + Sync>;

/// Fixed-size mapping from status bit index to handler.
#[derive(Clone)]
pub struct StatusTable {
    handlers: [Option<StatusHandler>; MAX_NUM_STATUS_BITS],
}

impl StatusTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            handlers: core::array::from_fn(|_| None),
        }
    }

    /// Registers `handler` at bit position `bit`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `bit` is outside the status register width.
    /// - `AlreadyExists` if the slot is already taken.
    pub fn register(&mut self, bit: usize, handler: StatusHandler) -> AxResult {
        let Some(slot) = self.handlers.get_mut(bit) else {
            return ax_err!(InvalidInput, "status bit out of range");
        };
        if slot.is_some() {
            return ax_err!(AlreadyExists, "status bit already has a handler");
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Returns the handler registered at `bit`, if any.
    pub fn get(&self, bit: usize) -> Option<&StatusHandler> {
        self.handlers.get(bit).and_then(Option::as_ref)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bitmask of the positions that carry a handler.
    pub fn registered_mask(&self) -> u32 {
        self.handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_some())
            .fold(0, |mask, (bit, _)| mask | (1 << bit))
    }

    /// Runs one dispatch pass over `status`.
    ///
    /// Bits are visited in ascending order; callers must not depend on it.
    /// Bits above the register width are ignored. Returns the number of
    /// handlers invoked.
    pub fn dispatch(&self, status: u32, dev: &SensorDevice) -> usize {
        let mut invoked = 0;
        for (bit, slot) in self.handlers.iter().enumerate() {
            trace!("status bit {} set={}", bit, (status >> bit) & 1 != 0);
            if (status >> bit) & 0x01 == 0 {
                continue;
            }
            if let Some(handler) = slot {
                trace!("calling handler for status bit {}", bit);
                handler(dev);
                invoked += 1;
            }
        }
        invoked
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for StatusTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StatusTable")
            .field("registered", &format_args!("{:#04x}", self.registered_mask()))
            .finish()
    }
}
