//! Pose and matrix conversions between tracker space and engine space.
//!
//! Matrices follow glam's column-vector convention. Driver matrices arrive as
//! flat arrays of 16 floats and pass through [`relayout_row_major`].

use glam::{Mat4, Quat, Vec3};

use crate::{HmdError, HmdResult};

/// Builds a quaternion from a `(w, x, y, z)` array as handed out by drivers.
pub fn quat_from_wxyz(wxyz: [f32; 4]) -> Quat {
    Quat::from_xyzw(wxyz[1], wxyz[2], wxyz[3], wxyz[0])
}

/// Rotation matrix of a unit quaternion. The quaternion must be normalized.
pub fn quaternion_to_matrix(q: Quat) -> Mat4 {
    Mat4::from_quat(q)
}

/// Converts a tracker position into world units.
pub fn apply_scale(position: Vec3, scale: Option<f32>) -> Vec3 {
    match scale {
        Some(scale) => position * scale,
        None => position,
    }
}

/// Head transform (translation then rotation) of a raw eye pose.
pub fn head_transform(orientation: Quat, position: Vec3, scale: Option<f32>) -> Mat4 {
    Mat4::from_translation(apply_scale(position, scale)) * quaternion_to_matrix(orientation)
}

/// Per-eye modelview: inverse of the eye's head transform, followed by the
/// engine's current view matrix so the HMD rides along with the scene camera.
pub fn compose_modelview(
    orientation: Quat,
    position: Vec3,
    scale: Option<f32>,
    engine_view: Mat4,
) -> Mat4 {
    head_transform(orientation, position, scale).inverse() * engine_view
}

/// Converts a driver's flat 16-float matrix into an engine matrix.
///
/// The driver lists the matrix four values at a time in its own row order,
/// which is the transpose of the engine convention; each group of four becomes
/// one engine column.
pub fn relayout_row_major(values: &[f32]) -> HmdResult<Mat4> {
    let values: &[f32; 16] = values.try_into().map_err(|_| {
        HmdError::InvalidInput(format!(
            "expected 16 matrix elements, got {}",
            values.len()
        ))
    })?;
    Ok(Mat4::from_cols_array(values))
}

/// Inverse of [`relayout_row_major`].
pub fn flatten_row_major(matrix: &Mat4) -> [f32; 16] {
    matrix.to_cols_array()
}

/// Splits a world transform into the position and orientation an engine
/// camera object accepts. Scale is discarded.
pub fn decompose_world(world: Mat4) -> (Vec3, Quat) {
    let (_scale, rotation, translation) = world.to_scale_rotation_translation();
    (translation, rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_3;

    const EPS: f32 = 1e-5;

    fn sample_quats() -> Vec<Quat> {
        vec![
            Quat::IDENTITY,
            Quat::from_rotation_y(FRAC_PI_3),
            Quat::from_rotation_x(-0.7),
            Quat::from_axis_angle(Vec3::new(1.0, 2.0, -0.5).normalize(), 2.4),
            quat_from_wxyz([0.5, 0.5, 0.5, 0.5]),
        ]
    }

    #[test]
    fn test_identity_quaternion_is_identity_matrix() {
        assert_eq!(quaternion_to_matrix(Quat::IDENTITY), Mat4::IDENTITY);
        assert_eq!(
            quaternion_to_matrix(quat_from_wxyz([1.0, 0.0, 0.0, 0.0])),
            Mat4::IDENTITY
        );
    }

    #[test]
    fn test_quaternion_matrix_is_orthonormal() {
        for q in sample_quats() {
            let m = quaternion_to_matrix(q);
            let cols = [m.x_axis.truncate(), m.y_axis.truncate(), m.z_axis.truncate()];
            for (i, a) in cols.iter().enumerate() {
                assert!((a.length() - 1.0).abs() < EPS, "column {i} not unit for {q:?}");
                for b in cols.iter().skip(i + 1) {
                    assert!(a.dot(*b).abs() < EPS, "columns not orthogonal for {q:?}");
                }
            }
            assert_eq!(m.w_axis, glam::Vec4::W);
        }
    }

    #[test]
    fn test_apply_scale() {
        let p = Vec3::new(1.0, -2.0, 3.0);
        assert_eq!(apply_scale(p, None), p);
        assert_eq!(apply_scale(p, Some(2.0)), Vec3::new(2.0, -4.0, 6.0));
    }

    #[test]
    fn test_no_scale_matches_unit_scale() {
        let view = Mat4::from_translation(Vec3::new(0.0, 1.7, 4.0))
            * Mat4::from_rotation_y(0.3);
        for q in sample_quats() {
            let p = Vec3::new(0.03, 1.6, -0.2);
            let none = compose_modelview(q, p, None, view);
            let unit = compose_modelview(q, p, Some(1.0), view);
            assert!(none.abs_diff_eq(unit, EPS));
        }
    }

    #[test]
    fn test_origin_pose_with_identity_view_is_identity() {
        let mv = compose_modelview(
            quat_from_wxyz([1.0, 0.0, 0.0, 0.0]),
            Vec3::ZERO,
            None,
            Mat4::IDENTITY,
        );
        assert!(mv.abs_diff_eq(Mat4::IDENTITY, EPS));
    }

    #[test]
    fn test_modelview_inverts_combined_head_transform() {
        let q = Quat::from_rotation_y(0.5);
        let p = Vec3::new(0.1, 0.2, 0.3);
        let view = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let mv = compose_modelview(q, p, None, view);
        let head = Mat4::from_translation(p) * Mat4::from_quat(q);
        assert!((head * mv).abs_diff_eq(view, EPS));
    }

    #[test]
    fn test_scale_moves_translation_only() {
        let q = Quat::from_rotation_z(0.25);
        let head = head_transform(q, Vec3::new(1.0, 0.0, 0.0), Some(10.0));
        let (pos, rot) = decompose_world(head);
        assert!(pos.abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), EPS));
        assert!(rot.abs_diff_eq(q, EPS) || rot.abs_diff_eq(-q, EPS));
    }

    #[test]
    fn test_relayout_transposes_driver_rows() {
        let values: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let m = relayout_row_major(&values).unwrap();
        assert_eq!(m.x_axis.to_array(), [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(m.w_axis.to_array(), [12.0, 13.0, 14.0, 15.0]);
        assert_eq!(m.row(0).to_array(), [0.0, 4.0, 8.0, 12.0]);
    }

    #[test]
    fn test_relayout_is_a_bijection() {
        let values: Vec<f32> = (0..16).map(|v| (v as f32) * 0.5 - 3.0).collect();
        let m = relayout_row_major(&values).unwrap();
        assert_eq!(flatten_row_major(&m).to_vec(), values);
        assert_eq!(flatten_row_major(&m.transpose().transpose()).to_vec(), values);
    }

    #[test]
    fn test_relayout_rejects_wrong_length() {
        let short = [0.0f32; 15];
        assert!(matches!(
            relayout_row_major(&short),
            Err(HmdError::InvalidInput(_))
        ));
        assert!(matches!(
            relayout_row_major(&[0.0f32; 17]),
            Err(HmdError::InvalidInput(_))
        ));
        assert!(relayout_row_major(&[]).is_err());
    }
}
