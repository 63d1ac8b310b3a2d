//! # Host Bridge Traits
//!
//! Contracts between the playback core and the host platform.
//!
//! ## Traits
//!
//! ### Audio output
//! - [`AudioOutput`](playback::AudioOutput) - Opens a device stream driven by a pull callback
//! - [`OutputStream`](playback::OutputStream) - Play/pause control over an open stream
//!
//! ### Logging
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Output |
//! |----------|----------------------|--------|
//! | Desktop  | `bridge-desktop`     | `TimerOutput`, `CpalOutput` |
//! | Mobile   | host application     | injected via `PlayerBuilder::output` |
//!
//! The core fails fast with `CapabilityMissing` when no output is available.
//!
//! ## Thread Safety
//!
//! [`AudioOutput`](playback::AudioOutput) and
//! [`LoggerSink`](time::LoggerSink) implementations must be `Send + Sync`.
//! Render callbacks run on the device thread and must never block.

pub mod error;
pub mod platform;
pub mod playback;
pub mod time;

pub use error::BridgeError;

pub use playback::{AudioOutput, OutputSpec, OutputStream, RenderCallback};
pub use time::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
