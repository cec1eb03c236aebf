#![forbid(unsafe_code)]

pub mod adapter;
pub mod backend;
pub mod config;
pub mod driver;
pub mod engine;
pub mod math;
pub mod mirror;
pub mod session;
pub mod sim;
pub mod types;

pub use adapter::{DeviceCore, ErrorReport, ErrorReporter, HmdDevice, Severity};
pub use backend::{Backend, BridgeDevice};
pub use config::SessionConfig;
pub use driver::{DriverBinding, DriverRegistry, HmdDriver, RawEyePoses};
pub use engine::{CameraState, Engine, EngineSettings, RenderTarget, TargetFlags};
pub use mirror::{BlitContext, MirrorCompositor, Quad};
pub use session::{FrameOutcome, SessionController, SessionLog, SessionState};
pub use types::{ClipPlanes, ColorHandle, EyeIndex, EyeState, RawPose};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HmdError {
    #[error("backend \"{0}\" not supported")]
    UnsupportedBackend(String),
    #[error("{0} not found in scene")]
    MissingSceneObject(String),
    #[error("render target allocation failed: {0}")]
    TargetAllocation(String),
    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),
    #[error("device setup failed: {0}")]
    DeviceSetup(String),
    #[error("tracking update failed: {0}")]
    Tracking(String),
    #[error("projection query failed: {0}")]
    Projection(String),
    #[error("frame submission failed: {0}")]
    FrameSubmit(String),
    #[error("re-center failed: {0}")]
    ReCenter(String),
    #[error("scene capture refresh failed: {0}")]
    CaptureRefresh(String),
    #[error("teardown failed: {0}")]
    Teardown(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{op}() not implemented for the \"{device}\" device")]
    NotImplemented { op: &'static str, device: String },
    #[error("invalid session state: {0}")]
    InvalidState(String),
}

pub type HmdResult<T> = Result<T, HmdError>;
