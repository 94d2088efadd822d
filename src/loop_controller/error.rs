//! Error types for the loop controller

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// Configuration rejected at construction time
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
