// SYNOID Flow Configuration
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use crate::error::Result;
use crate::vision::FarnebackParams;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the parameters file.
pub const PARAMS_ENV: &str = "SYNOID_FLOW_PARAMS";
pub const DEFAULT_PARAMS_FILE: &str = "farneback_params.json";

impl FarnebackParams {
    /// Read parameters from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&content)?;
        params.validate()?;
        Ok(params)
    }

    /// Parameters from `$SYNOID_FLOW_PARAMS` (or `farneback_params.json`), else defaults.
    pub fn load() -> Self {
        let path = std::env::var(PARAMS_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PARAMS_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("[FLOW] Using default Farneback parameters");
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(params) => {
                info!("[FLOW] Loaded Farneback parameters from {:?}", path);
                params
            }
            Err(e) => {
                warn!("[FLOW] Ignoring {:?} ({}); using defaults", path, e);
                Self::default()
            }
        }
    }
}
