// SYNOID Temporal Loss Library
// Copyright (c) 2026 Xing_The_Creator | SYNOID

//! Temporal loss between consecutive frames.
//!
//! Dense Farneback optical flow is rendered to an HSV image, thresholded into a
//! motion mask, and the mask weights a mean squared pixel difference.

pub mod config;
pub mod error;
pub mod vision;

pub use error::{FlowError, Result};
pub use vision::{
    compute_temporal_loss, compute_temporal_loss_with, farneback, load_frame,
    masked_squared_error, optical_flow, optical_flow_with, FarnebackParams, FlowField, FlowMask,
};
