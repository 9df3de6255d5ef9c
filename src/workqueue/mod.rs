//! Deferred work scheduling.
//!
//! A [`WorkQueue`] keeps delayed work instances ordered by deadline and runs
//! them when the host's worker context polls it. A [`DelayedWork`] is one
//! cancelable, reschedulable work item bound to a body.
//!
//! Both locks are `kspin::SpinNoIrq`, and interrupt handlers use the
//! lock-free [`DelayedWork::kick`] instead of [`DelayedWork::schedule`].
//!
//! ```text
//!  schedule(delay)    kick()               host worker
//!       │               │ (atomics)             │
//!       ▼               ▼                       ▼
//! ┌─────────────┐  cancel + set   ┌───────────────────────┐
//! │ DelayedWork │ ──────────────> │ WorkQueue (TimerList) │
//! │ (spinlock)  │                 └───────────┬───────────┘
//! └─────────────┘                             │ run_expired()
//!       ▲                                     ▼
//!       └──────────── ExecGate ◄──────── body runs
//! ```

mod gate;
mod queue;
mod work;

pub use gate::GateState;
pub use queue::{Clock, WorkQueue};
pub use work::DelayedWork;
