//! Network Module Implementation
//!
//! This module owns everything between the socket and an emitted message:
//! reading raw bytes, accumulating them, and deciding when a run of bytes is
//! a complete frame.
//!
//! # Framing policy
//!
//! There is no delimiter and no length prefix. A frame ends when no new bytes
//! arrive for the configured idle threshold. Sends closer together than the
//! threshold coalesce into one frame; a run longer than the configured
//! maximum is discarded whole.
//!
//! # Components
//!
//! - `FrameAccumulator`: buffer, last receive time and size guard, no I/O
//! - `ConnectionReader`: socket read loop feeding the accumulator
//! - `IdleTimer`: periodic check that takes and publishes idle frames
//!
//! The reader and the timer run as separate tasks and share the accumulator
//! behind a single mutex.

pub use connection::{ConnectionReader, DisconnectReason};
pub use frame::{AppendOutcome, Frame, FrameAccumulator};
pub use idle_timer::IdleTimer;
mod connection;
mod frame;
mod idle_timer;
