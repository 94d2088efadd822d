//! Run-loop controller
//!
//! Turns a frame source's "call me on the next frame" primitive into a
//! managed, pausable loop:
//!
//! 1. [`state`] - `Idle`/`Running`/`Paused` transition table
//! 2. [`steps`] - ordered update and render step registry
//! 3. [`controller`] - lifecycle, tick algorithm and dead-frame policy
//!
//! # Per-frame flow
//!
//! ```text
//! FrameSource ──tick(ts)──► LoopController ──elapsed──► update steps ──► render steps
//!      ▲                          │
//!      └──────request_frame───────┘
//! ```

pub mod controller;
pub mod error;
pub mod state;
pub mod steps;

pub use controller::{LoopController, LoopHandle, LoopStats};
pub use error::LoopError;
pub use state::{LoopEvent, LoopState};
pub use steps::StepToken;
