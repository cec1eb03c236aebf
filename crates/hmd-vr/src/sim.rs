//! Simulated HMD driver and headless engine.
//!
//! Used by the `hmd` CLI to run sessions without hardware and by tests to
//! force failures at any step of the frame.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use glam::{Mat4, Quat, Vec3, Vec4};
use tracing::{debug, info};

use crate::driver::{HmdDriver, RawEyePoses};
use crate::engine::{CameraState, Engine, EngineSettings, RenderTarget, TargetFlags};
use crate::mirror::{BlitContext, MirrorCompositor};
use crate::types::{ClipPlanes, ColorHandle, EyeIndex};
use crate::{HmdError, HmdResult};

/// Half-angle tangents of one eye's field of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub up: f32,
    pub down: f32,
    pub left: f32,
    pub right: f32,
}

impl FieldOfView {
    pub fn from_degrees(up: f32, down: f32, left: f32, right: f32) -> Self {
        Self {
            up: up.to_radians().tan(),
            down: down.to_radians().tan(),
            left: left.to_radians().tan(),
            right: right.to_radians().tan(),
        }
    }

    /// Off-axis OpenGL frustum for this field of view.
    pub fn projection(&self, near: f32, far: f32) -> Mat4 {
        let x_scale = 2.0 / (self.left + self.right);
        let y_scale = 2.0 / (self.up + self.down);
        let x_offset = (self.right - self.left) / (self.left + self.right);
        let y_offset = (self.up - self.down) / (self.up + self.down);
        let depth = far - near;
        Mat4::from_cols(
            Vec4::new(x_scale, 0.0, 0.0, 0.0),
            Vec4::new(0.0, y_scale, 0.0, 0.0),
            Vec4::new(x_offset, y_offset, -(far + near) / depth, -1.0),
            Vec4::new(0.0, 0.0, -2.0 * far * near / depth, 0.0),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// `update()` fails with a tracking error.
    pub fail_update: bool,
    /// `setup()` returns `Ok(false)`.
    pub setup_rejects: bool,
    /// `setup()` returns an error.
    pub fail_setup: bool,
    /// `frame_ready()` fails with a submission error.
    pub fail_frame_ready: bool,
    /// Projection queries return 12 floats.
    pub short_projection: bool,
    /// `re_center()` fails.
    pub fail_re_center: bool,
}

/// Shared state of a [`SimulatedDriver`], readable and writable from tests
/// while the driver is owned by a device.
#[derive(Debug, Clone)]
pub struct SimDriverState {
    pub eye_sizes: [(u32, u32); 2],
    pub fov: [FieldOfView; 2],
    /// Interpupillary distance in meters.
    pub ipd: f32,
    pub eye_height: f32,
    /// Sway the head on a slow yaw/bob cycle.
    pub animate: bool,
    pub faults: SimFaults,

    pub ticks: u64,
    pub frames_submitted: u64,
    pub projection_queries: u64,
    pub recenters: u64,
    pub setup_textures: Option<[ColorHandle; 2]>,
    pub last_clip: Option<(f32, f32)>,
    origin_yaw: f32,
    origin_position: Vec3,
}

impl Default for SimDriverState {
    fn default() -> Self {
        Self {
            eye_sizes: [(1182, 1464), (1182, 1464)],
            fov: [
                FieldOfView::from_degrees(41.65, 41.65, 43.97, 35.57),
                FieldOfView::from_degrees(41.65, 41.65, 35.57, 43.97),
            ],
            ipd: 0.064,
            eye_height: 0.0,
            animate: true,
            faults: SimFaults::default(),
            ticks: 0,
            frames_submitted: 0,
            projection_queries: 0,
            recenters: 0,
            setup_textures: None,
            last_clip: None,
            origin_yaw: 0.0,
            origin_position: Vec3::ZERO,
        }
    }
}

impl SimDriverState {
    fn head_yaw(&self) -> f32 {
        if self.animate {
            (self.ticks as f32 * 0.02).sin() * 0.35
        } else {
            0.0
        }
    }

    fn head_position(&self) -> Vec3 {
        let bob = if self.animate {
            (self.ticks as f32 * 0.05).sin() * 0.01
        } else {
            0.0
        };
        Vec3::new(0.0, self.eye_height + bob, 0.0)
    }

    fn eye_poses(&self) -> RawEyePoses {
        let head = Quat::from_rotation_y(self.head_yaw() - self.origin_yaw);
        let center = head * (self.head_position() - self.origin_position);
        let half_ipd = head * Vec3::new(self.ipd * 0.5, 0.0, 0.0);
        let wxyz = [head.w, head.x, head.y, head.z];
        (
            wxyz,
            (center - half_ipd).to_array(),
            wxyz,
            (center + half_ipd).to_array(),
        )
    }
}

fn lock(state: &Mutex<SimDriverState>) -> MutexGuard<'_, SimDriverState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Deterministic stand-in for a vendor SDK bridge. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDriver {
    state: Arc<Mutex<SimDriverState>>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SimDriverState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state_handle(&self) -> Arc<Mutex<SimDriverState>> {
        self.state.clone()
    }

    fn projection(&mut self, eye: EyeIndex, near: f32, far: f32) -> HmdResult<Vec<f32>> {
        let mut state = lock(&self.state);
        state.projection_queries += 1;
        state.last_clip = Some((near, far));
        let mut values = state.fov[eye.index()]
            .projection(near, far)
            .to_cols_array()
            .to_vec();
        if state.faults.short_projection {
            values.truncate(12);
        }
        Ok(values)
    }
}

impl HmdDriver for SimulatedDriver {
    fn eye_size(&self, eye: EyeIndex) -> (u32, u32) {
        lock(&self.state).eye_sizes[eye.index()]
    }

    fn update(&mut self) -> HmdResult<RawEyePoses> {
        let mut state = lock(&self.state);
        if state.faults.fail_update {
            return Err(HmdError::Tracking("simulated sensor dropout".to_string()));
        }
        state.ticks += 1;
        Ok(state.eye_poses())
    }

    fn projection_left(&mut self, near: f32, far: f32) -> HmdResult<Vec<f32>> {
        self.projection(EyeIndex::Left, near, far)
    }

    fn projection_right(&mut self, near: f32, far: f32) -> HmdResult<Vec<f32>> {
        self.projection(EyeIndex::Right, near, far)
    }

    fn setup(&mut self, left: ColorHandle, right: ColorHandle) -> HmdResult<bool> {
        let mut state = lock(&self.state);
        if state.faults.fail_setup {
            return Err(HmdError::DeviceSetup("simulated swap chain failure".to_string()));
        }
        if state.faults.setup_rejects {
            return Ok(false);
        }
        state.setup_textures = Some([left, right]);
        Ok(true)
    }

    fn frame_ready(&mut self) -> HmdResult<()> {
        let mut state = lock(&self.state);
        if state.faults.fail_frame_ready {
            return Err(HmdError::FrameSubmit("simulated compositor drop".to_string()));
        }
        state.frames_submitted += 1;
        Ok(())
    }

    fn re_center(&mut self) -> HmdResult<bool> {
        let mut state = lock(&self.state);
        if state.faults.fail_re_center {
            return Err(HmdError::ReCenter("simulated tracker busy".to_string()));
        }
        state.origin_yaw = state.head_yaw();
        state.origin_position = state.head_position();
        state.recenters += 1;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineFaults {
    /// Zero-based index of the render target allocation that fails.
    pub fail_target_at: Option<usize>,
    pub fail_capture: bool,
    pub fail_release: bool,
    pub fail_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTarget {
    width: u32,
    height: u32,
    color: ColorHandle,
}

impl RenderTarget for SimTarget {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn color(&self) -> ColorHandle {
        self.color
    }
}

#[derive(Debug)]
pub struct SimCapture {
    camera: String,
    color: ColorHandle,
    refreshes: u64,
}

impl SimCapture {
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }
}

/// Camera object as last written by the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRecord {
    pub projection: Mat4,
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for CameraRecord {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// Captures kept by [`HeadlessEngine::rendered`]: one stereo frame.
const RECENT_CAPTURES: usize = 2;

/// Engine without a GPU: targets are texture names, captures are counters.
#[derive(Debug)]
pub struct HeadlessEngine {
    objects: HashSet<String>,
    cameras: HashMap<String, CameraRecord>,
    active_camera: CameraState,
    next_texture: u32,
    allocations: usize,
    live: HashSet<ColorHandle>,
    refreshes: usize,
    rendered: VecDeque<(String, ColorHandle)>,
    settings: Option<EngineSettings>,
    present_to_window: bool,
    post_draw: Option<MirrorCompositor>,
    faults: EngineFaults,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessEngine {
    /// Scene with a `Camera.VR` object and an identity active camera.
    pub fn new() -> Self {
        let mut engine = Self {
            objects: HashSet::new(),
            cameras: HashMap::new(),
            active_camera: CameraState {
                world_transform: Mat4::IDENTITY,
                clip: ClipPlanes::default(),
            },
            next_texture: 1,
            allocations: 0,
            live: HashSet::new(),
            refreshes: 0,
            rendered: VecDeque::with_capacity(RECENT_CAPTURES),
            settings: None,
            present_to_window: true,
            post_draw: None,
            faults: EngineFaults::default(),
        };
        engine.add_camera("Camera.VR");
        engine
    }

    pub fn with_faults(mut self, faults: EngineFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn without_object(mut self, name: &str) -> Self {
        self.objects.remove(name);
        self.cameras.remove(name);
        self
    }

    pub fn add_camera(&mut self, name: &str) {
        self.objects.insert(name.to_string());
        self.cameras.insert(name.to_string(), CameraRecord::default());
    }

    pub fn faults_mut(&mut self) -> &mut EngineFaults {
        &mut self.faults
    }

    pub fn set_active_camera(&mut self, camera: CameraState) {
        self.active_camera = camera;
    }

    pub fn camera(&self, name: &str) -> Option<&CameraRecord> {
        self.cameras.get(name)
    }

    pub fn live_targets(&self) -> usize {
        self.live.len()
    }

    /// Total scene captures rendered since creation.
    pub fn capture_refreshes(&self) -> usize {
        self.refreshes
    }

    /// `(camera, color target)` of the most recent captures, oldest first.
    pub fn rendered(&self) -> &VecDeque<(String, ColorHandle)> {
        &self.rendered
    }

    pub fn settings(&self) -> Option<EngineSettings> {
        self.settings
    }

    pub fn presents_to_window(&self) -> bool {
        self.present_to_window
    }

    pub fn post_draw(&self) -> Option<&MirrorCompositor> {
        self.post_draw.as_ref()
    }

    /// Runs the registered post-draw hook, if any. Returns whether it ran.
    pub fn draw_post(&self, ctx: &mut dyn BlitContext) -> bool {
        match &self.post_draw {
            Some(mirror) => {
                mirror.draw(ctx);
                true
            }
            None => false,
        }
    }
}

impl Engine for HeadlessEngine {
    type Target = SimTarget;
    type Capture = SimCapture;

    fn has_object(&self, name: &str) -> bool {
        self.objects.contains(name)
    }

    fn active_camera(&self) -> CameraState {
        self.active_camera
    }

    fn set_camera_projection(&mut self, camera: &str, projection: Mat4) -> HmdResult<()> {
        let record = self
            .cameras
            .get_mut(camera)
            .ok_or_else(|| HmdError::MissingSceneObject(camera.to_string()))?;
        record.projection = projection;
        Ok(())
    }

    fn set_camera_world(
        &mut self,
        camera: &str,
        position: Vec3,
        orientation: Quat,
    ) -> HmdResult<()> {
        let record = self
            .cameras
            .get_mut(camera)
            .ok_or_else(|| HmdError::MissingSceneObject(camera.to_string()))?;
        record.position = position;
        record.orientation = orientation;
        Ok(())
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        flags: TargetFlags,
    ) -> HmdResult<SimTarget> {
        let index = self.allocations;
        self.allocations += 1;
        if self.faults.fail_target_at == Some(index) {
            return Err(HmdError::TargetAllocation(format!(
                "simulated out of memory on target #{index}"
            )));
        }

        let color = ColorHandle(self.next_texture);
        self.next_texture += 1;
        self.live.insert(color);
        debug!("offscreen {}x{} {:?} -> texture {}", width, height, flags, color.0);
        Ok(SimTarget {
            width,
            height,
            color,
        })
    }

    fn release_render_target(&mut self, target: SimTarget) -> HmdResult<()> {
        if self.faults.fail_release {
            return Err(HmdError::Teardown(format!(
                "texture {} already invalid",
                target.color.0
            )));
        }
        self.live.remove(&target.color);
        Ok(())
    }

    fn create_capture(&mut self, camera: &str, target: &SimTarget) -> HmdResult<SimCapture> {
        if self.faults.fail_capture {
            return Err(HmdError::TargetAllocation(
                "simulated capture creation failure".to_string(),
            ));
        }
        if !self.objects.contains(camera) {
            return Err(HmdError::MissingSceneObject(camera.to_string()));
        }
        Ok(SimCapture {
            camera: camera.to_string(),
            color: target.color,
            refreshes: 0,
        })
    }

    fn refresh_capture(&mut self, capture: &mut SimCapture) -> HmdResult<()> {
        if self.faults.fail_refresh {
            return Err(HmdError::CaptureRefresh(format!(
                "simulated render failure into texture {}",
                capture.color.0
            )));
        }
        capture.refreshes += 1;
        self.refreshes += 1;
        if self.rendered.len() == RECENT_CAPTURES {
            self.rendered.pop_front();
        }
        self.rendered.push_back((capture.camera.clone(), capture.color));
        Ok(())
    }

    fn apply_settings(&mut self, settings: EngineSettings) {
        info!(
            "engine settings: max_logic_frames={} tick_rate={} vsync={}",
            settings.max_logic_frames, settings.logic_tick_rate, settings.vsync
        );
        self.settings = Some(settings);
    }

    fn set_present_to_window(&mut self, enabled: bool) {
        self.present_to_window = enabled;
    }

    fn register_post_draw(&mut self, compositor: MirrorCompositor) {
        self.post_draw = Some(compositor);
    }

    fn unregister_post_draw(&mut self) {
        self.post_draw = None;
    }

    fn has_post_draw(&self) -> bool {
        self.post_draw.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math;

    #[test]
    fn test_frustum_maps_fov_edges_to_clip_edges() {
        let fov = FieldOfView::from_degrees(40.0, 35.0, 45.0, 30.0);
        let proj = fov.projection(0.1, 100.0);
        let near = 0.1;

        let right_edge = proj * Vec4::new(fov.right * near, 0.0, -near, 1.0);
        assert!((right_edge.x / right_edge.w - 1.0).abs() < 1e-4);
        let left_edge = proj * Vec4::new(-fov.left * near, 0.0, -near, 1.0);
        assert!((left_edge.x / left_edge.w + 1.0).abs() < 1e-4);
        let top_edge = proj * Vec4::new(0.0, fov.up * near, -near, 1.0);
        assert!((top_edge.y / top_edge.w - 1.0).abs() < 1e-4);
        assert!((top_edge.z / top_edge.w + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_projection_round_trips_through_relayout() {
        let mut driver = SimulatedDriver::new();
        let values = driver.projection_left(0.1, 50.0).unwrap();
        let expected = lock(&driver.state).fov[0].projection(0.1, 50.0);
        assert_eq!(math::relayout_row_major(&values).unwrap(), expected);
    }

    #[test]
    fn test_eyes_are_separated_by_ipd() {
        let mut driver = SimulatedDriver::new();
        lock(&driver.state).animate = false;
        let (_, left, _, right) = driver.update().unwrap();
        let gap = Vec3::from_array(right) - Vec3::from_array(left);
        assert!((gap.length() - 0.064).abs() < 1e-6);
    }

    #[test]
    fn test_re_center_zeroes_current_pose() {
        let mut driver = SimulatedDriver::new();
        for _ in 0..40 {
            driver.update().unwrap();
        }
        driver.re_center().unwrap();
        lock(&driver.state).ipd = 0.0;
        let (orientation, position, _, _) = driver.update().unwrap();
        // One tick of motion after re-centering stays close to the origin.
        assert!(orientation[0] > 0.999);
        assert!(Vec3::from_array(position).length() < 0.01);
    }

    #[test]
    fn test_engine_tracks_live_targets() {
        let mut engine = HeadlessEngine::new();
        let a = engine.create_render_target(8, 8, TargetFlags::EYE).unwrap();
        let b = engine.create_render_target(8, 8, TargetFlags::EYE).unwrap();
        assert_ne!(a.color(), b.color());
        assert_eq!(engine.live_targets(), 2);
        engine.release_render_target(a).unwrap();
        assert_eq!(engine.live_targets(), 1);
    }

    #[test]
    fn test_capture_history_stays_bounded() {
        let mut engine = HeadlessEngine::new();
        let target = engine.create_render_target(8, 8, TargetFlags::EYE).unwrap();
        let mut capture = engine.create_capture("Camera.VR", &target).unwrap();
        for _ in 0..10_000 {
            engine.refresh_capture(&mut capture).unwrap();
        }
        assert_eq!(engine.capture_refreshes(), 10_000);
        assert_eq!(engine.rendered().len(), RECENT_CAPTURES);
        assert_eq!(capture.refreshes(), 10_000);
    }

    #[test]
    fn test_engine_camera_writes_need_object() {
        let mut engine = HeadlessEngine::new().without_object("Camera.VR");
        assert!(engine
            .set_camera_projection("Camera.VR", Mat4::IDENTITY)
            .is_err());
        engine.add_camera("Camera.VR");
        assert!(engine
            .set_camera_world("Camera.VR", Vec3::ONE, Quat::IDENTITY)
            .is_ok());
        assert_eq!(engine.camera("Camera.VR").unwrap().position, Vec3::ONE);
    }
}
