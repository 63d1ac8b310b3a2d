//! # Core Runtime Module
//!
//! Process-level infrastructure shared by the OpusKit crates:
//! - Logging and tracing initialisation ([`logging::init_logging`])
//! - Forwarding of log events to a host [`LoggerSink`](bridge_traits::LoggerSink)
//! - Path redaction helpers for log fields
//!
//! Libraries only emit `tracing` events; the host application decides how
//! they are rendered by calling [`logging::init_logging`] once at startup.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
