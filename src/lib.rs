//! Pausable, time-accounting run-loop scheduler
//!
//! A [`LoopController`] drives two ordered phases, update then render, once
//! per frame on top of an injected [`FrameSource`]. Frames arriving after an
//! abnormally long gap are discarded instead of feeding a huge time delta into
//! the update phase.

pub mod config;
pub mod frame_source;
pub mod loop_controller;

pub use config::{AppConfig, ConfigError, LoopSettings};
pub use frame_source::{FrameSource, RequestHandle};
pub use loop_controller::{LoopController, LoopError, LoopHandle, LoopState, LoopStats, StepToken};
