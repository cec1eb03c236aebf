use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::{HmdError, HmdResult};

pub const DEFAULT_CAMERA: &str = "Camera.VR";
pub const DEFAULT_LOGIC_TICK_RATE: u32 = 75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backend selection string, e.g. `oculus` or `oculus_legacy`.
    pub backend: String,
    /// Start with the desktop mirror enabled.
    pub mirror: bool,
    /// Size of the mirror quads relative to their screen half.
    pub mirror_scale: f32,
    /// Log full error traces.
    pub verbose: bool,
    /// Scene object the eye captures render from.
    pub camera: String,
    pub logic_tick_rate: u32,
    /// World units per tracker meter.
    pub unit_scale: Option<f32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Oculus.name().to_string(),
            mirror: false,
            mirror_scale: 1.0,
            verbose: false,
            camera: DEFAULT_CAMERA.to_string(),
            logic_tick_rate: DEFAULT_LOGIC_TICK_RATE,
            unit_scale: None,
        }
    }
}

impl SessionConfig {
    /// Checks numeric ranges. The backend name is resolved at session start.
    pub fn validate(&self) -> HmdResult<()> {
        if self.logic_tick_rate == 0 {
            return Err(HmdError::Config("logic_tick_rate must be positive".to_string()));
        }
        if !(self.mirror_scale > 0.0 && self.mirror_scale <= 1.0) {
            return Err(HmdError::Config(format!(
                "mirror_scale must be in (0, 1], got {}",
                self.mirror_scale
            )));
        }
        if let Some(scale) = self.unit_scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(HmdError::Config(format!(
                    "unit_scale must be a positive number, got {scale}"
                )));
            }
        }
        if self.camera.trim().is_empty() {
            return Err(HmdError::Config("camera name must not be empty".to_string()));
        }
        Ok(())
    }
}
