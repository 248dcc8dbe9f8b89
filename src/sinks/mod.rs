//! Downstream protocol emulators
//!
//! Each sink drains the shared [`SampleHub`](crate::hub::SampleHub) at its own
//! pace and re-encodes samples for one kind of third-party consumer. Exactly
//! one sink runs per bridge process.

#[cfg(unix)]
pub mod dongle;
pub mod outlet;
pub mod wifi;

/// How long a sink parks on an empty hub before re-checking its stop flag
pub const DRAIN_WAIT: std::time::Duration = std::time::Duration::from_millis(100);
