//! Records the engine publishes: per-window results and status changes.
//!
//! Results go to stdout as JSON lines through [`emitter::ResultEmitter`];
//! status events are for in-process subscribers and the stderr log.

pub mod emitter;
pub mod events;
