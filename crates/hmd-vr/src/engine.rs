use glam::{Mat4, Quat, Vec3};

use crate::mirror::MirrorCompositor;
use crate::types::{ClipPlanes, ColorHandle};
use crate::HmdResult;

/// Render target flags passed through to the engine's allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetFlags {
    /// Back the target with a sampleable texture instead of a renderbuffer.
    pub render_texture: bool,
    /// Keep the alpha channel in the captured image.
    pub alpha: bool,
}

impl TargetFlags {
    pub const EYE: TargetFlags = TargetFlags {
        render_texture: true,
        alpha: true,
    };
}

/// An offscreen render target allocated by the engine.
pub trait RenderTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn color(&self) -> ColorHandle;
}

/// Snapshot of the scene's active camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub world_transform: Mat4,
    pub clip: ClipPlanes,
}

impl CameraState {
    /// View matrix of the camera (inverse of its world transform).
    pub fn view_matrix(&self) -> Mat4 {
        self.world_transform.inverse()
    }
}

/// Global rendering settings applied once when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_logic_frames: u32,
    pub logic_tick_rate: u32,
    pub vsync: bool,
}

impl EngineSettings {
    /// Frame pacing is left to the HMD driver's own vsync.
    pub fn hmd_paced(logic_tick_rate: u32) -> Self {
        Self {
            max_logic_frames: 1,
            logic_tick_rate,
            vsync: false,
        }
    }
}

/// Host engine surface consumed by the device adapter and the session.
///
/// Every call is synchronous and happens on the engine's frame thread.
pub trait Engine {
    type Target: RenderTarget;
    type Capture;

    fn has_object(&self, name: &str) -> bool;
    fn active_camera(&self) -> CameraState;

    fn set_camera_projection(&mut self, camera: &str, projection: Mat4) -> HmdResult<()>;
    fn set_camera_world(&mut self, camera: &str, position: Vec3, orientation: Quat)
        -> HmdResult<()>;

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        flags: TargetFlags,
    ) -> HmdResult<Self::Target>;
    fn release_render_target(&mut self, target: Self::Target) -> HmdResult<()>;

    /// Binds a scene capture that renders `camera` into `target`.
    fn create_capture(&mut self, camera: &str, target: &Self::Target)
        -> HmdResult<Self::Capture>;
    /// Renders one eye into the capture's target.
    fn refresh_capture(&mut self, capture: &mut Self::Capture) -> HmdResult<()>;

    fn apply_settings(&mut self, settings: EngineSettings);
    fn set_present_to_window(&mut self, enabled: bool);

    fn register_post_draw(&mut self, compositor: MirrorCompositor);
    fn unregister_post_draw(&mut self);
    fn has_post_draw(&self) -> bool;
}
