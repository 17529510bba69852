// SYNOID Flow Errors
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use thiserror::Error;

/// Result type alias for temporal-loss operations
pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Error, Debug)]
pub enum FlowError {
    /// Decoding or encoding failure from the `image` crate
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The two frames (or a frame and its mask) disagree in size
    #[error("Dimension mismatch: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FlowError {
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        FlowError::InvalidParams(msg.into())
    }

    /// Fail unless both sizes agree and are non-empty.
    pub fn check_dimensions(left: (u32, u32), right: (u32, u32)) -> Result<()> {
        if left != right {
            return Err(FlowError::DimensionMismatch {
                left_width: left.0,
                left_height: left.1,
                right_width: right.0,
                right_height: right.1,
            });
        }
        if left.0 == 0 || left.1 == 0 {
            return Err(FlowError::EmptyFrame);
        }
        Ok(())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::Config(e.to_string())
    }
}
