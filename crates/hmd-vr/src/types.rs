use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::math;

/// Which eye a piece of per-eye state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EyeIndex {
    #[default]
    Left = 0,
    Right = 1,
}

impl EyeIndex {
    /// Fixed render order.
    pub const BOTH: [EyeIndex; 2] = [EyeIndex::Left, EyeIndex::Right];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    fn from_truthy(truthy: bool) -> Self {
        if truthy {
            Self::Right
        } else {
            Self::Left
        }
    }
}

impl From<bool> for EyeIndex {
    fn from(value: bool) -> Self {
        Self::from_truthy(value)
    }
}

macro_rules! eye_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for EyeIndex {
                fn from(value: $ty) -> Self {
                    Self::from_truthy(value != 0)
                }
            }
        )*
    };
}

eye_from_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl From<f32> for EyeIndex {
    fn from(value: f32) -> Self {
        Self::from_truthy(value != 0.0)
    }
}

impl From<f64> for EyeIndex {
    fn from(value: f64) -> Self {
        Self::from_truthy(value != 0.0)
    }
}

impl<T: Into<EyeIndex>> From<Option<T>> for EyeIndex {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Left)
    }
}

/// Texture name of a render target's color attachment. Zero means "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorHandle(pub u32);

impl ColorHandle {
    pub const NONE: ColorHandle = ColorHandle(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlanes {
    pub near: f32,
    pub far: f32,
}

impl Default for ClipPlanes {
    fn default() -> Self {
        Self {
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Raw tracker sample for one eye, in device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl RawPose {
    /// Builds a pose from the driver's `(w, x, y, z)` and `(x, y, z)` arrays.
    pub fn from_raw(orientation_wxyz: [f32; 4], position: [f32; 3]) -> Self {
        Self {
            orientation: math::quat_from_wxyz(orientation_wxyz),
            position: Vec3::from_array(position),
        }
    }
}

impl Default for RawPose {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

/// Per-eye bookkeeping owned by the device adapter.
///
/// `target` and `capture` are allocated together in `DeviceCore::init` and
/// released together in `DeviceCore::quit`.
#[derive(Debug)]
pub struct EyeState<T, C> {
    pub width: u32,
    pub height: u32,
    pub pose: RawPose,
    pub projection: Mat4,
    pub modelview: Mat4,
    pub target: Option<T>,
    pub capture: Option<C>,
    pub color: ColorHandle,
}

impl<T, C> Default for EyeState<T, C> {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            pose: RawPose::default(),
            projection: Mat4::IDENTITY,
            modelview: Mat4::IDENTITY,
            target: None,
            capture: None,
            color: ColorHandle::NONE,
        }
    }
}

impl<T, C> EyeState<T, C> {
    pub fn is_allocated(&self) -> bool {
        self.target.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_from_truthy_values() {
        assert_eq!(EyeIndex::from(0u32), EyeIndex::Left);
        assert_eq!(EyeIndex::from(1u32), EyeIndex::Right);
        assert_eq!(EyeIndex::from(7i64), EyeIndex::Right);
        assert_eq!(EyeIndex::from(-1i32), EyeIndex::Right);
        assert_eq!(EyeIndex::from(true), EyeIndex::Right);
        assert_eq!(EyeIndex::from(false), EyeIndex::Left);
        assert_eq!(EyeIndex::from(0.0f32), EyeIndex::Left);
        assert_eq!(EyeIndex::from(0.5f64), EyeIndex::Right);
        assert_eq!(EyeIndex::from(None::<u8>), EyeIndex::Left);
        assert_eq!(EyeIndex::from(Some(3u8)), EyeIndex::Right);
    }

    #[test]
    fn test_eye_index_is_zero_or_one() {
        for eye in EyeIndex::BOTH {
            assert!(eye.index() <= 1);
        }
        assert_eq!(EyeIndex::Left.other(), EyeIndex::Right);
        assert_eq!(EyeIndex::Right.other().index(), 0);
    }

    #[test]
    fn test_raw_pose_reads_wxyz() {
        let pose = RawPose::from_raw([1.0, 0.0, 0.0, 0.0], [0.5, 1.5, -2.0]);
        assert_eq!(pose.orientation, Quat::IDENTITY);
        assert_eq!(pose.position, Vec3::new(0.5, 1.5, -2.0));
    }

    #[test]
    fn test_eye_state_starts_unallocated() {
        let eye: EyeState<(), ()> = EyeState::default();
        assert!(!eye.is_allocated());
        assert!(eye.color.is_none());
        assert_eq!(eye.modelview, Mat4::IDENTITY);
    }
}
