//! Interrupt line contract between the core and the host.
//!
//! The host owns the interrupt controller. The core asks it to attach a
//! handler to a line and later to release the line again.

use alloc::string::String;
use alloc::sync::Arc;

use axerrno::AxResult;

/// What a handler did with an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not from this device or was not handled.
    None,
    /// The interrupt was handled.
    Handled,
    /// The top half is done; run the threaded handler.
    WakeThread,
}

/// Trigger and behaviour flags for a line request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrqFlags(u32);

impl IrqFlags {
    /// Trigger on the falling edge.
    pub const TRIGGER_FALLING: Self = Self(0x0000_0002);
    /// Keep the line masked until the threaded handler returns.
    pub const ONESHOT: Self = Self(0x0000_2000);

    /// Raw flag bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for IrqFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// How the host must invoke the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqKind {
    /// Only [`IrqHandler::handle`] runs, in interrupt context.
    Hard,
    /// [`IrqHandler::handle`] runs first; on [`IrqReturn::WakeThread`] the
    /// host runs [`IrqHandler::handle_threaded`] in a sleepable thread.
    Threaded,
}

/// Callbacks attached to an interrupt line.
pub trait IrqHandler: Send + Sync {
    /// The top half. Must not block.
    fn handle(&self, irq: u32) -> IrqReturn;

    /// The threaded handler.
    fn handle_threaded(&self, _irq: u32) -> IrqReturn {
        IrqReturn::None
    }
}

/// A request to attach a handler to a line.
pub struct IrqRequest {
    /// Line number.
    pub irq: u32,
    /// Trigger flags.
    pub flags: IrqFlags,
    /// Invocation style.
    pub kind: IrqKind,
    /// Human-readable owner name.
    pub name: String,
    /// Callback target.
    pub handler: Arc<dyn IrqHandler>,
}

impl core::fmt::Debug for IrqRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IrqRequest")
            .field("irq", &self.irq)
            .field("flags", &format_args!("{:#x}", self.flags.bits()))
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

/// The host interrupt controller.
pub trait IrqChip: Send + Sync {
    /// Attaches `request.handler` to `request.irq` and arms the line.
    ///
    /// On failure nothing is left attached.
    fn request_irq(&self, request: IrqRequest) -> AxResult;

    /// Detaches the handler from `irq`.
    ///
    /// Must not return while a handler for `irq` is still running, and no
    /// handler for `irq` may start afterwards.
    fn free_irq(&self, irq: u32);
}
