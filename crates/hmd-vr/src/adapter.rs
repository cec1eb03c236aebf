use std::error::Error as _;
use std::fmt;
use std::sync::Arc;

use glam::Mat4;
use tracing::{debug, error, info, warn};

use crate::driver::RawEyePoses;
use crate::engine::{Engine, RenderTarget, TargetFlags};
use crate::math;
use crate::types::{ClipPlanes, ColorHandle, EyeIndex, EyeState, RawPose};
use crate::{HmdError, HmdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The session cannot continue.
    Fatal,
    /// A single tick failed; the next tick is attempted normally.
    NonFatal,
}

impl Severity {
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Fatal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub operation: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(): {}", self.operation, self.message)
    }
}

/// Receives every error a device reports. Decides how errors surface.
pub trait ErrorReporter: Send + Sync {
    fn on_error(&self, report: &ErrorReport);
}

/// State and behavior shared by every device backend: both eyes' render
/// targets, raw poses and matrices, the cached clip planes and the error path.
pub struct DeviceCore<E: Engine> {
    name: String,
    is_direct_mode: bool,
    camera: String,
    current_eye: EyeIndex,
    eyes: [EyeState<E::Target, E::Capture>; 2],
    clip: ClipPlanes,
    scale: Option<f32>,
    verbose: bool,
    reporter: Arc<dyn ErrorReporter>,
}

impl<E: Engine> DeviceCore<E> {
    pub fn new(
        name: impl Into<String>,
        is_direct_mode: bool,
        camera: impl Into<String>,
        reporter: Arc<dyn ErrorReporter>,
        engine: &E,
    ) -> Self {
        Self {
            name: name.into(),
            is_direct_mode,
            camera: camera.into(),
            current_eye: EyeIndex::Left,
            eyes: [EyeState::default(), EyeState::default()],
            clip: engine.active_camera().clip,
            scale: None,
            verbose: false,
            reporter,
        }
    }

    /// World units per tracker meter. `None` means the engine works in meters.
    pub fn with_scale(mut self, scale: Option<f32>) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_direct_mode(&self) -> bool {
        self.is_direct_mode
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn clip(&self) -> ClipPlanes {
        self.clip
    }

    pub fn scale(&self) -> Option<f32> {
        self.scale
    }

    pub fn current_eye(&self) -> EyeIndex {
        self.current_eye
    }

    pub fn set_eye<I: Into<EyeIndex>>(&mut self, eye: I) {
        self.current_eye = eye.into();
    }

    pub fn eye(&self, eye: EyeIndex) -> &EyeState<E::Target, E::Capture> {
        &self.eyes[eye.index()]
    }

    fn active(&self) -> &EyeState<E::Target, E::Capture> {
        &self.eyes[self.current_eye.index()]
    }

    fn active_mut(&mut self) -> &mut EyeState<E::Target, E::Capture> {
        &mut self.eyes[self.current_eye.index()]
    }

    pub fn width(&self) -> u32 {
        self.active().width
    }

    pub fn set_width(&mut self, width: u32) {
        self.active_mut().width = width;
    }

    pub fn height(&self) -> u32 {
        self.active().height
    }

    pub fn set_height(&mut self, height: u32) {
        self.active_mut().height = height;
    }

    pub fn target(&self) -> Option<&E::Target> {
        self.active().target.as_ref()
    }

    pub fn capture(&self) -> Option<&E::Capture> {
        self.active().capture.as_ref()
    }

    pub fn color_texture(&self) -> ColorHandle {
        self.active().color
    }

    pub fn color_textures(&self) -> [ColorHandle; 2] {
        [self.eyes[0].color, self.eyes[1].color]
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.active().projection
    }

    pub fn set_projection_matrix(&mut self, projection: Mat4) {
        self.active_mut().projection = projection;
    }

    pub fn modelview_matrix(&self) -> Mat4 {
        self.active().modelview
    }

    pub fn raw_pose(&self) -> RawPose {
        self.active().pose
    }

    pub fn set_raw_poses(&mut self, poses: RawEyePoses) {
        let (left_orientation, left_position, right_orientation, right_position) = poses;
        self.eyes[0].pose = RawPose::from_raw(left_orientation, left_position);
        self.eyes[1].pose = RawPose::from_raw(right_orientation, right_position);
    }

    pub fn is_initialized(&self) -> bool {
        self.eyes.iter().all(EyeState::is_allocated)
    }

    fn ensure_unallocated(&self) -> HmdResult<()> {
        if self.eyes.iter().any(EyeState::is_allocated) {
            return Err(HmdError::InvalidState(format!(
                "{} render targets are already allocated",
                self.name
            )));
        }
        Ok(())
    }

    /// Allocates both eyes' render targets and scene captures using the
    /// per-eye sizes set beforehand. Reports failures as fatal.
    /// Fails with `InvalidState`, unreported, if targets are already live.
    pub fn init(&mut self, engine: &mut E) -> HmdResult<()> {
        self.ensure_unallocated()?;
        if let Err(err) = self.allocate_targets(engine) {
            self.error("init", &err, Severity::Fatal);
            return Err(err);
        }
        Ok(())
    }

    /// Allocation half of [`DeviceCore::init`] without reporting. Either both
    /// eyes end up allocated or neither does.
    pub fn allocate_targets(&mut self, engine: &mut E) -> HmdResult<()> {
        self.ensure_unallocated()?;
        if !engine.has_object(&self.camera) {
            return Err(HmdError::MissingSceneObject(self.camera.clone()));
        }

        for eye in EyeIndex::BOTH {
            if let Err(err) = self.allocate_eye(engine, eye) {
                self.release_targets(engine);
                return Err(err);
            }
        }
        Ok(())
    }

    fn allocate_eye(&mut self, engine: &mut E, eye: EyeIndex) -> HmdResult<()> {
        let (width, height) = {
            let state = &self.eyes[eye.index()];
            (state.width, state.height)
        };
        if width == 0 || height == 0 {
            return Err(HmdError::TargetAllocation(format!(
                "{eye:?} eye has no size ({width}x{height})"
            )));
        }

        let target = engine.create_render_target(width, height, TargetFlags::EYE)?;
        let capture = match engine.create_capture(&self.camera, &target) {
            Ok(capture) => capture,
            Err(err) => {
                if let Err(release_err) = engine.release_render_target(target) {
                    warn!("release after failed capture: {}", release_err);
                }
                return Err(err);
            }
        };

        let state = &mut self.eyes[eye.index()];
        state.color = target.color();
        debug!(
            "{:?} eye target {}x{} color={}",
            eye,
            target.width(),
            target.height(),
            state.color.0
        );
        state.target = Some(target);
        state.capture = Some(capture);
        Ok(())
    }

    /// Releases both eyes' targets. Never fails; problems are logged.
    pub fn release_targets(&mut self, engine: &mut E) {
        for state in self.eyes.iter_mut() {
            state.capture = None;
            state.color = ColorHandle::NONE;
            if let Some(target) = state.target.take() {
                if let Err(err) = engine.release_render_target(target) {
                    warn!("render target release failed: {}", err);
                }
            }
        }
    }

    /// Samples the engine camera's clip planes and recomputes both modelviews
    /// from the stored raw poses. Does not talk to the driver.
    pub fn update(&mut self, engine: &E) {
        let camera = engine.active_camera();
        self.clip = camera.clip;
        self.update_matrices(camera.view_matrix());
    }

    pub fn update_matrices(&mut self, view: Mat4) {
        let scale = self.scale;
        for state in self.eyes.iter_mut() {
            state.modelview =
                math::compose_modelview(state.pose.orientation, state.pose.position, scale, view);
        }
    }

    /// Renders the active eye through its scene capture.
    pub fn render_eye(&mut self, engine: &mut E) -> HmdResult<()> {
        let eye = self.current_eye;
        let capture = self.eyes[eye.index()]
            .capture
            .as_mut()
            .ok_or_else(|| HmdError::InvalidState(format!("{eye:?} eye has no scene capture")))?;
        engine.refresh_capture(capture)
    }

    pub fn quit(&mut self, engine: &mut E) {
        self.release_targets(engine);
        info!("{} device released", self.name);
    }

    /// Uniform error path: optional verbose trace, then the reporter.
    pub fn error(&self, operation: &'static str, err: &HmdError, severity: Severity) {
        if self.verbose {
            error!("{} :: {}() : {:?}", self.name, operation, err);
            let mut source = err.source();
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
        }

        self.reporter.on_error(&ErrorReport {
            operation,
            message: err.to_string(),
            severity,
        });
    }

    pub fn not_implemented(&self, op: &'static str) -> HmdError {
        error!("{}() called on the \"{}\" device which does not provide it", op, self.name);
        HmdError::NotImplemented {
            op,
            device: self.name.clone(),
        }
    }
}

impl<E: Engine> fmt::Debug for DeviceCore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCore")
            .field("name", &self.name)
            .field("is_direct_mode", &self.is_direct_mode)
            .field("current_eye", &self.current_eye)
            .field("clip", &self.clip)
            .field("scale", &self.scale)
            .field("color_textures", &self.color_textures())
            .finish()
    }
}

/// Uniform device lifecycle driven by the session controller.
///
/// Backends embed a [`DeviceCore`] and override the operations their driver
/// provides. `frame_ready` and `re_center` have no generic behavior.
pub trait HmdDevice<E: Engine + 'static> {
    fn core(&self) -> &DeviceCore<E>;
    fn core_mut(&mut self) -> &mut DeviceCore<E>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn is_direct_mode(&self) -> bool {
        self.core().is_direct_mode()
    }

    fn init(&mut self, engine: &mut E) -> HmdResult<()> {
        self.core_mut().init(engine)
    }

    fn set_eye(&mut self, eye: EyeIndex) {
        self.core_mut().set_eye(eye);
    }

    fn update(&mut self, engine: &E) -> HmdResult<()> {
        self.core_mut().update(engine);
        Ok(())
    }

    fn projection_matrix(&mut self) -> Mat4 {
        self.core().projection_matrix()
    }

    fn modelview_matrix(&self) -> Mat4 {
        self.core().modelview_matrix()
    }

    fn color_textures(&self) -> [ColorHandle; 2] {
        self.core().color_textures()
    }

    fn render_eye(&mut self, engine: &mut E) -> HmdResult<()> {
        self.core_mut().render_eye(engine)
    }

    fn frame_ready(&mut self) -> HmdResult<()> {
        Err(self.core().not_implemented("frameReady"))
    }

    fn re_center(&mut self) -> HmdResult<bool> {
        Err(self.core().not_implemented("reCenter"))
    }

    fn quit(&mut self, engine: &mut E) {
        self.core_mut().quit(engine);
    }
}
