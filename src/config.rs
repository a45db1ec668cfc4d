//! Tracking configuration
//!
//! All values are fixed for the duration of one run and validated before the
//! first frame is processed.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TrackingError};

/// Thresholds of the IOU tracker
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IouParameters {
    /// Detections below this confidence are ignored entirely
    pub sigma_l: f32,
    /// A track must reach this confidence at least once to be finished
    pub sigma_h: f32,
    /// Minimum overlap for extending a track with a detection
    pub sigma_iou: f32,
    /// Minimum span (last frame - first frame) of a finished track
    pub t_min: u32,
    /// Frames a track may go unmatched before it is terminated
    pub t_miss_max: u32,
}

impl Default for IouParameters {
    fn default() -> Self {
        Self {
            sigma_l: 0.27,
            sigma_h: 0.42,
            sigma_iou: 0.38,
            t_min: 5,
            t_miss_max: 51,
        }
    }
}

impl IouParameters {
    pub fn new(sigma_l: f32, sigma_h: f32, sigma_iou: f32, t_min: u32, t_miss_max: u32) -> Self {
        Self {
            sigma_l,
            sigma_h,
            sigma_iou,
            t_min,
            t_miss_max,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_unit_interval("sigma_l", self.sigma_l)?;
        check_unit_interval("sigma_h", self.sigma_h)?;
        check_unit_interval("sigma_iou", self.sigma_iou)?;
        Ok(())
    }
}

fn check_unit_interval(name: &'static str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TrackingError::invalid_parameter(
            name,
            value,
            "must lie within [0, 1]",
        ))
    }
}

/// Configuration of a finalizing tracking run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub iou: IouParameters,
    /// Keep detections of discarded tracks (flagged) instead of dropping them
    pub keep_discarded: bool,
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        self.iou.validate()
    }

    /// Parse and validate a JSON configuration; missing keys take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TrackingError::config(format!("cannot parse tracking config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading tracking config from {}", path.as_ref().display());
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
