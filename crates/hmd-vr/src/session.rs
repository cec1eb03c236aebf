//! Frame loop orchestration for one device.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use glam::Mat4;
use tracing::{debug, error, info, warn};

use crate::adapter::{ErrorReport, ErrorReporter, HmdDevice, Severity};
use crate::backend::{Backend, BridgeDevice};
use crate::config::SessionConfig;
use crate::driver::DriverRegistry;
use crate::engine::{Engine, EngineSettings};
use crate::math;
use crate::mirror::MirrorCompositor;
use crate::types::EyeIndex;
use crate::{HmdError, HmdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Running,
    Stopped,
}

/// Error sink owned by a session. Logs every report and latches the first
/// fatal one so the caller knows to stop ticking.
#[derive(Debug, Default)]
pub struct SessionLog {
    fatal: AtomicBool,
    non_fatal: AtomicU64,
    last: Mutex<Option<ErrorReport>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fatal_seen(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    pub fn non_fatal_count(&self) -> u64 {
        self.non_fatal.load(Ordering::Relaxed)
    }

    pub fn last_report(&self) -> Option<ErrorReport> {
        match self.last.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ErrorReporter for SessionLog {
    fn on_error(&self, report: &ErrorReport) {
        match report.severity {
            Severity::Fatal => {
                error!("fatal: {}", report);
                self.fatal.store(true, Ordering::Release);
            }
            Severity::NonFatal => {
                warn!("{}", report);
                self.non_fatal.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = Some(report.clone());
    }
}

/// What happened during one [`SessionController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOutcome {
    /// Fresh poses were sampled; otherwise last tick's matrices were reused.
    pub pose_updated: bool,
    pub eyes_rendered: u8,
    /// The compositor accepted the frame.
    pub submitted: bool,
}

/// Owns the engine and one device for a session's lifetime.
pub struct SessionController<E: Engine + 'static> {
    engine: E,
    config: SessionConfig,
    registry: Arc<DriverRegistry>,
    log: Arc<SessionLog>,
    device: Option<Box<dyn HmdDevice<E>>>,
    state: SessionState,
    mirror: bool,
    frames: u64,
}

impl<E: Engine + 'static> SessionController<E> {
    pub fn new(engine: E, config: SessionConfig, registry: Arc<DriverRegistry>) -> Self {
        let mirror = config.mirror;
        Self {
            engine,
            config,
            registry,
            log: Arc::new(SessionLog::new()),
            device: None,
            state: SessionState::Uninitialized,
            mirror,
            frames: 0,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn device(&self) -> Option<&dyn HmdDevice<E>> {
        self.device.as_deref()
    }

    /// Ticks completed since start.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// A fatal error was reported; the caller should stop the session.
    pub fn should_exit(&self) -> bool {
        self.log.fatal_seen()
    }

    /// Mirroring is requested and the device renders direct-to-headset.
    pub fn use_mirror(&self) -> bool {
        self.mirror
            && self
                .device
                .as_ref()
                .map_or(false, |device| device.is_direct_mode())
    }

    fn report(&self, operation: &'static str, err: &HmdError, severity: Severity) {
        self.log.on_error(&ErrorReport {
            operation,
            message: err.to_string(),
            severity,
        });
    }

    /// Resolves the backend, initializes the device and prepares the engine.
    /// On failure the session stays `Uninitialized` and a fatal error has
    /// been reported.
    pub fn start(&mut self) -> HmdResult<()> {
        if self.state != SessionState::Uninitialized {
            return Err(HmdError::InvalidState(format!(
                "start() called while {:?}",
                self.state
            )));
        }

        if let Err(err) = self.config.validate() {
            self.report("start", &err, Severity::Fatal);
            return Err(err);
        }
        let backend: Backend = match self.config.backend.parse() {
            Ok(backend) => backend,
            Err(err) => {
                self.report("start", &err, Severity::Fatal);
                return Err(err);
            }
        };

        self.state = SessionState::Starting;
        info!("starting {} session on camera {}", backend, self.config.camera);

        let mut device = BridgeDevice::new(
            backend,
            self.registry.clone(),
            self.config.camera.as_str(),
            self.log.clone(),
            &self.engine,
        )
        .with_scale(self.config.unit_scale)
        .with_verbose(self.config.verbose);

        if let Err(err) = device.init(&mut self.engine) {
            self.state = SessionState::Uninitialized;
            return Err(err);
        }

        self.engine
            .apply_settings(EngineSettings::hmd_paced(self.config.logic_tick_rate));
        self.device = Some(Box::new(device));
        self.frames = 0;
        self.setup_mirror();
        self.state = SessionState::Running;
        info!("session running (mirror {})", self.use_mirror());
        Ok(())
    }

    /// One frame: sample poses, render both eyes through the anchor camera,
    /// submit. Per-tick failures are reported and do not stop the session.
    pub fn tick(&mut self) -> HmdResult<FrameOutcome> {
        if self.state != SessionState::Running {
            return Err(HmdError::InvalidState(format!(
                "tick() called while {:?}",
                self.state
            )));
        }
        let device = self.device.as_mut().ok_or_else(|| {
            HmdError::InvalidState("running session without a device".to_string())
        })?;

        let mut outcome = FrameOutcome {
            pose_updated: device.update(&self.engine).is_ok(),
            ..Default::default()
        };

        for eye in EyeIndex::BOTH {
            device.set_eye(eye);
            let projection = device.projection_matrix();
            let modelview = device.modelview_matrix();

            if let Err(err) =
                apply_matrices(&mut self.engine, &self.config.camera, projection, modelview)
            {
                self.log.on_error(&ErrorReport {
                    operation: "tick",
                    message: err.to_string(),
                    severity: Severity::NonFatal,
                });
                continue;
            }

            match device.render_eye(&mut self.engine) {
                Ok(()) => outcome.eyes_rendered += 1,
                Err(err) => self.log.on_error(&ErrorReport {
                    operation: "render_eye",
                    message: err.to_string(),
                    severity: Severity::NonFatal,
                }),
            }
        }

        outcome.submitted = device.frame_ready().is_ok();
        self.frames += 1;
        debug!("frame {} {:?}", self.frames, outcome);
        Ok(outcome)
    }

    pub fn re_center(&mut self) -> HmdResult<bool> {
        match self.device.as_mut() {
            Some(device) if self.state == SessionState::Running => device.re_center(),
            _ => Err(HmdError::InvalidState(format!(
                "re_center() called while {:?}",
                self.state
            ))),
        }
    }

    /// Flips the mirror request and returns whether the mirror is now drawn.
    pub fn toggle_mirror(&mut self) -> bool {
        self.mirror = !self.mirror;
        if self.device.is_some() {
            self.setup_mirror();
        }
        info!("mirror requested={} active={}", self.mirror, self.use_mirror());
        self.use_mirror()
    }

    fn setup_mirror(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };

        if self.use_mirror() {
            if !self.engine.has_post_draw() {
                let compositor =
                    MirrorCompositor::new(device.color_textures(), self.config.mirror_scale);
                self.engine.register_post_draw(compositor);
            }
            self.engine.set_present_to_window(true);
        } else {
            if self.engine.has_post_draw() {
                self.engine.unregister_post_draw();
            }
            self.engine.set_present_to_window(false);
        }
    }

    /// Releases the device. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        if let Some(mut device) = self.device.take() {
            device.quit(&mut self.engine);
        }
        if self.engine.has_post_draw() {
            self.engine.unregister_post_draw();
        }
        self.engine.set_present_to_window(false);
        self.state = SessionState::Stopped;
        info!("session stopped after {} frames", self.frames);
    }
}

fn apply_matrices<E: Engine>(
    engine: &mut E,
    camera: &str,
    projection: Mat4,
    modelview: Mat4,
) -> HmdResult<()> {
    engine.set_camera_projection(camera, projection)?;
    let (position, orientation) = math::decompose_world(modelview.inverse());
    engine.set_camera_world(camera, position, orientation)
}
