//! Turn scheduling state machine
//!
//! Backend callbacks and user requests arrive as `Event`s. `transition`
//! updates the `Session` in place (transcript, cursors, pending output) and
//! returns the `Effect`s for the runtime to carry out: backend commands and
//! client notifications. It performs no IO, so it runs the same in unit
//! tests, property tests and the runtime.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, Notification};
pub use event::Event;
pub use state::{ConvState, Session};
pub use transition::{transition, TransitionError, TransitionResult};
