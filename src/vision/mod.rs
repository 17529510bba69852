// SYNOID Vision Modules
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod color;
pub mod farneback;
pub mod plane;
pub mod temporal;

pub use farneback::{farneback, FarnebackParams, FlowField};
pub use temporal::{
    compute_temporal_loss, compute_temporal_loss_with, load_frame, masked_squared_error,
    optical_flow, optical_flow_with, FlowMask,
};
