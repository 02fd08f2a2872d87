//! 3D position/orientation primitives (C10).

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// A point or direction in 3D space.
pub type Position = Vector3<f32>;

/// A rotation, represented as a unit quaternion.
pub type Rotation = UnitQuaternion<f32>;

/// World "up" direction, used by [`look_rotation`] and the WFS/VBAP
/// renderers' azimuth computations.
pub const UP: Position = Vector3::new(0.0, 0.0, 1.0);

/// Builds the rotation `Rz(azimuth) * Rx(elevation) * Ry(roll)` (intrinsic
/// ZXY order), all angles in degrees.
pub fn angles_to_rotation(azimuth: f32, elevation: f32, roll: f32) -> Rotation {
    let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), azimuth.to_radians());
    let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), elevation.to_radians());
    let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), roll.to_radians());
    rz * rx * ry
}

/// Inverse of [`angles_to_rotation`]: recovers `(azimuth, elevation,
/// roll)` in degrees. Guards gimbal lock at elevation ±90° by returning
/// `roll = 0` and folding the remaining degree of freedom into azimuth.
pub fn rotation_to_angles(rot: Rotation) -> (f32, f32, f32) {
    // quaternion coordinates: (b, c, d, a) = (x, y, z, w)
    let q = rot.quaternion();
    let (b, c, d, a) = (q.i, q.j, q.k, q.w);
    let sin_elevation = 2.0 * (a * b + c * d);

    if sin_elevation > 0.999_999 {
        let azimuth = (2.0 * (a * c + b * d)).atan2(2.0 * (a * b - c * d));
        return (azimuth.to_degrees(), 90.0, 0.0);
    }
    if sin_elevation < -0.999_999 {
        let azimuth = (-2.0 * (a * c + b * d)).atan2(2.0 * (c * d - a * b));
        return (azimuth.to_degrees(), -90.0, 0.0);
    }

    let azimuth = (2.0 * (a * d - b * c)).atan2(1.0 - 2.0 * (b * b + d * d));
    let elevation = sin_elevation.asin();
    let roll = (2.0 * (a * c - b * d)).atan2(1.0 - 2.0 * (b * b + c * c));
    (azimuth.to_degrees(), elevation.to_degrees(), roll.to_degrees())
}

/// Builds a rotation whose local +y axis points from `from` towards `to`,
/// with world up = +z. Fails if the points coincide or the direction is
/// parallel to up (both cases leave the rotation about the forward axis
/// undetermined).
pub fn look_rotation(from: Position, to: Position) -> Option<Rotation> {
    let diff = to - from;
    let length = diff.norm();
    if length < 0.000_001 {
        return None;
    }
    let y = diff / length;
    if y.dot(&UP).abs() > 0.999_999 {
        return None;
    }
    let x = y.cross(&UP).normalize();
    let z = x.cross(&y);
    let basis = Matrix3::from_columns(&[x, y, z]);
    Some(UnitQuaternion::from_rotation_matrix(
        &Rotation3::from_matrix_unchecked(basis),
    ))
}

/// Converts a 2D-scene azimuth (degrees, mathematical convention — zero
/// pointing along +x, increasing counter-clockwise) into the 3D rotation
/// used internally, offsetting by 90° to the 3D system's zero (+y
/// forward).
pub fn rotation_from_2d_azimuth(azimuth_deg: f32) -> Rotation {
    angles_to_rotation(90.0 - azimuth_deg, 0.0, 0.0)
}

/// Inverse of [`rotation_from_2d_azimuth`].
pub fn azimuth_2d_from_rotation(rot: Rotation) -> f32 {
    let (azimuth, _, _) = rotation_to_angles(rot);
    90.0 - azimuth
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn angle_round_trip_away_from_gimbal_lock() {
        let rot = angles_to_rotation(30.0, 20.0, 0.0);
        let (az, el, roll) = rotation_to_angles(rot);
        assert_relative_eq!(az, 30.0, epsilon = 1e-3);
        assert_relative_eq!(el, 20.0, epsilon = 1e-3);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn look_rotation_fails_for_coincident_points() {
        let p = Position::new(1.0, 2.0, 3.0);
        assert!(look_rotation(p, p).is_none());
    }

    #[test]
    fn look_rotation_fails_parallel_to_up() {
        let from = Position::new(0.0, 0.0, 0.0);
        let to = Position::new(0.0, 0.0, 5.0);
        assert!(look_rotation(from, to).is_none());
    }

    #[test]
    fn look_rotation_points_y_towards_target() {
        let from = Position::new(0.0, 0.0, 0.0);
        let to = Position::new(0.0, 5.0, 0.0);
        let rot = look_rotation(from, to).unwrap();
        let forward = rot * Vector3::y();
        assert_relative_eq!(forward.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn azimuth_2d_round_trips() {
        let rot = rotation_from_2d_azimuth(45.0);
        let az = azimuth_2d_from_rotation(rot);
        assert_relative_eq!(az, 45.0, epsilon = 1e-3);
    }
}
