//! Frame Source - the scheduling capability the run loop is built on
//!
//! A frame source hands out one-shot callbacks that fire on the next display
//! refresh (or whatever the host treats as "the next frame"). The loop
//! controller never talks to a clock or a timer directly; everything goes
//! through this trait so that hosts and tests can inject their own.
//!
//! Two implementations ship with the crate:
//!
//! 1. [`manual::ManualFrameSource`] - caller-driven clock, used by tests and by
//!    embedders that already own a refresh signal
//! 2. [`interval::IntervalFrameSource`] - emulated display refresh on a tokio
//!    `LocalSet`, the default host binding
//!
//! ```text
//! LoopController ──request_frame(cb)──► FrameSource ──cb(timestamp_ms)──► LoopController
//!                ◄──────RequestHandle──
//! ```

pub mod interval;
pub mod manual;

pub use interval::IntervalFrameSource;
pub use manual::ManualFrameSource;

use std::fmt;

/// Nominal display refresh period in milliseconds (60 Hz).
pub const NOMINAL_FRAME_MS: f64 = 1000.0 / 60.0;

/// One-shot callback receiving the host timestamp in milliseconds.
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Opaque handle for a scheduled frame callback
///
/// Handles are only meaningful to the source that issued them. "No pending
/// request" is expressed as `Option<RequestHandle>::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(u64);

impl RequestHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Host capability for scheduling one-shot frame callbacks
///
/// Implementations must never invoke a callback synchronously from inside
/// [`FrameSource::request_frame`], and must dispatch at most one callback at a
/// time. Cancellation is best effort: a callback that was already on its way
/// may still be delivered, and consumers are expected to guard against that.
pub trait FrameSource {
    /// Schedules `callback` to run once on the next frame.
    fn request_frame(&self, callback: FrameCallback) -> RequestHandle;

    /// Cancels a pending callback. No-op for fired, cancelled or unknown handles.
    fn cancel_frame(&self, handle: RequestHandle);

    /// Current host clock in milliseconds.
    fn now(&self) -> f64;
}
