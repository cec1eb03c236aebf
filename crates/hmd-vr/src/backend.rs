use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use glam::Mat4;
use tracing::{debug, info, warn};

use crate::adapter::{DeviceCore, ErrorReporter, HmdDevice, Severity};
use crate::driver::{DriverBinding, DriverRegistry, HmdDriver};
use crate::engine::Engine;
use crate::math;
use crate::types::EyeIndex;
use crate::{HmdError, HmdResult};

/// Backends selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Oculus,
    OculusLegacy,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Oculus, Backend::OculusLegacy];

    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Oculus => "oculus",
            Self::OculusLegacy => "oculus_legacy",
        }
    }

    /// Name used in logs and error messages.
    pub fn device_name(self) -> &'static str {
        match self {
            Self::Oculus => "Oculus",
            Self::OculusLegacy => "BridgeOculus Legacy",
        }
    }

    pub fn binding(self) -> DriverBinding {
        match self {
            Self::Oculus => DriverBinding::Oculus,
            Self::OculusLegacy => DriverBinding::OculusLegacy,
        }
    }

    /// Direct mode renders straight to the headset; the legacy runtime runs
    /// the headset as an extended desktop display.
    pub fn is_direct_mode(self) -> bool {
        match self {
            Self::Oculus => true,
            Self::OculusLegacy => false,
        }
    }
}

impl FromStr for Backend {
    type Err = HmdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|backend| backend.name() == s)
            .ok_or_else(|| HmdError::UnsupportedBackend(s.to_string()))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device adapter over an SDK bridge driver. Both the direct-mode and the
/// legacy backend use this type; they differ only in driver binding and mode.
pub struct BridgeDevice<E: Engine> {
    core: DeviceCore<E>,
    backend: Backend,
    registry: Arc<DriverRegistry>,
    driver: Option<Box<dyn HmdDriver>>,
    projection_fresh: [bool; 2],
}

impl<E: Engine> BridgeDevice<E> {
    pub fn new(
        backend: Backend,
        registry: Arc<DriverRegistry>,
        camera: impl Into<String>,
        reporter: Arc<dyn ErrorReporter>,
        engine: &E,
    ) -> Self {
        Self {
            core: DeviceCore::new(
                backend.device_name(),
                backend.is_direct_mode(),
                camera,
                reporter,
                engine,
            ),
            backend,
            registry,
            driver: None,
            projection_fresh: [false; 2],
        }
    }

    pub fn with_scale(mut self, scale: Option<f32>) -> Self {
        self.core = self.core.with_scale(scale);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.core = self.core.with_verbose(verbose);
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    fn driver_mut(&mut self) -> HmdResult<&mut Box<dyn HmdDriver>> {
        self.driver.as_mut().ok_or_else(|| {
            HmdError::DriverUnavailable(format!("{} device is not initialized", self.core.name()))
        })
    }

    fn try_init(&mut self, engine: &mut E) -> HmdResult<()> {
        let mut driver = self.registry.construct(self.backend.binding())?;

        for eye in EyeIndex::BOTH {
            let (width, height) = driver.eye_size(eye);
            debug!("{:?} eye native size {}x{}", eye, width, height);
            self.core.set_eye(eye);
            self.core.set_width(width);
            self.core.set_height(height);
        }
        self.core.set_eye(EyeIndex::Left);

        self.core.allocate_targets(engine)?;

        let [left, right] = self.core.color_textures();
        let accepted = match driver.setup(left, right) {
            Ok(accepted) => accepted,
            Err(err) => {
                self.core.release_targets(engine);
                return Err(err);
            }
        };
        if !accepted {
            self.core.release_targets(engine);
            return Err(HmdError::DeviceSetup(format!(
                "driver rejected eye textures for {}",
                self.core.name()
            )));
        }

        self.driver = Some(driver);
        self.projection_fresh = [false; 2];
        Ok(())
    }

    fn fetch_projection(&mut self, eye: EyeIndex) -> HmdResult<Mat4> {
        let clip = self.core.clip();
        let driver = self.driver_mut()?;
        let values = match eye {
            EyeIndex::Left => driver.projection_left(clip.near, clip.far)?,
            EyeIndex::Right => driver.projection_right(clip.near, clip.far)?,
        };
        math::relayout_row_major(&values)
    }
}

impl<E: Engine + 'static> HmdDevice<E> for BridgeDevice<E> {
    fn core(&self) -> &DeviceCore<E> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore<E> {
        &mut self.core
    }

    /// A second init on a live device fails with `InvalidState` and leaves
    /// the driver and targets untouched.
    fn init(&mut self, engine: &mut E) -> HmdResult<()> {
        if self.driver.is_some() || self.core.is_initialized() {
            return Err(HmdError::InvalidState(format!(
                "{} device is already initialized",
                self.core.name()
            )));
        }
        match self.try_init(engine) {
            Ok(()) => {
                info!(
                    "{} initialized ({} mode)",
                    self.core.name(),
                    if self.core.is_direct_mode() {
                        "direct"
                    } else {
                        "extended"
                    }
                );
                Ok(())
            }
            Err(err) => {
                self.core.error("init", &err, Severity::Fatal);
                self.driver = None;
                Err(err)
            }
        }
    }

    fn update(&mut self, engine: &E) -> HmdResult<()> {
        let poses = match self.driver_mut().and_then(|driver| driver.update()) {
            Ok(poses) => poses,
            Err(err) => {
                self.core.error("loop", &err, Severity::NonFatal);
                return Err(err);
            }
        };

        self.core.set_raw_poses(poses);
        self.core.update(engine);
        self.projection_fresh = [false; 2];
        Ok(())
    }

    /// Queried from the driver once per eye per tick, then served from cache.
    /// A failed query keeps the previous projection.
    fn projection_matrix(&mut self) -> Mat4 {
        let eye = self.core.current_eye();
        if !self.projection_fresh[eye.index()] {
            match self.fetch_projection(eye) {
                Ok(projection) => {
                    self.core.set_projection_matrix(projection);
                    self.projection_fresh[eye.index()] = true;
                }
                Err(err) => {
                    let err = match err {
                        HmdError::InvalidInput(msg) => HmdError::Projection(msg),
                        other => other,
                    };
                    self.core.error("projection_matrix", &err, Severity::NonFatal);
                }
            }
        }
        self.core.projection_matrix()
    }

    fn frame_ready(&mut self) -> HmdResult<()> {
        let result = self.driver_mut().and_then(|driver| driver.frame_ready());
        if let Err(err) = &result {
            self.core.error("frameReady", err, Severity::NonFatal);
        }
        result
    }

    fn re_center(&mut self) -> HmdResult<bool> {
        let result = self.driver_mut().and_then(|driver| driver.re_center());
        if let Err(err) = &result {
            self.core.error("reCenter", err, Severity::NonFatal);
        }
        result
    }

    fn quit(&mut self, engine: &mut E) {
        if self.driver.take().is_none() {
            warn!("{} quit without a live driver", self.core.name());
        }
        self.projection_fresh = [false; 2];
        self.core.quit(engine);
    }
}
