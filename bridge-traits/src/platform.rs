//! Marker traits that keep bridge trait bounds in one place.
//!
//! Render callbacks and output streams move between the control context and
//! the device thread, so bridge implementations must be shareable across
//! threads.

/// Marker trait for values shared freely across threads.
pub trait PlatformSendSync: Send + Sync {}

impl<T> PlatformSendSync for T where T: Send + Sync {}

/// Marker trait for values moved to another thread but not shared.
pub trait PlatformSend: Send {}

impl<T> PlatformSend for T where T: Send {}
