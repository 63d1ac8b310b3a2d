//! # Desktop Bridge Implementations
//!
//! Audio output implementations of the render boundary for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - [`TimerOutput`]: a software device that pulls from the render callback on
//!   a dedicated thread paced by the wall clock. It needs no audio hardware and
//!   is the default output for headless hosts and tests.
//! - `CpalOutput`: the system's default output device through `cpal`.
//!
//! ## Feature Flags
//!
//! - `cpal-output`: Enable the hardware output backed by `cpal`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TimerOutput;
//! use bridge_traits::{AudioOutput, OutputSpec};
//!
//! let output = TimerOutput::default();
//! let stream = output.open(OutputSpec::new(48_000, 2), Box::new(|buf| buf.fill(0.0)))?;
//! stream.play()?;
//! ```

mod timer;

#[cfg(feature = "cpal-output")]
mod cpal_output;

pub use timer::{TimerOutput, TimerOutputConfig};

#[cfg(feature = "cpal-output")]
pub use cpal_output::CpalOutput;
