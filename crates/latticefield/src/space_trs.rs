use fearless_simd::{Simd, f32x4};
use glam::{Affine3A, Mat3, Mat3A, Quat, Vec3, Vec3A};

/// A translation, rotation and scale that maps one space into another. Rotation is given in degrees and applied
/// around Z first, then X, then Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceTrs {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for SpaceTrs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SpaceTrs {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn uniform_scale(scale: f32) -> Self {
        Self {
            scale: Vec3::splat(scale),
            ..Self::IDENTITY
        }
    }

    pub fn rotation_quat(&self) -> Quat {
        let radians = Vec3::new(
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        Quat::from_rotation_y(radians.y)
            * Quat::from_rotation_x(radians.x)
            * Quat::from_rotation_z(radians.z)
    }

    /// The 3x4 affine matrix for this transform.
    pub fn matrix(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(
            self.scale,
            self.rotation_quat(),
            self.translation,
        )
    }

    pub fn has_degenerate_scale(&self) -> bool {
        self.scale.to_array().iter().any(|s| *s == 0.0 || !s.is_finite())
    }
}

/// A 3x4 affine matrix applied to four points at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trs3x4 {
    matrix: Affine3A,
}

impl Trs3x4 {
    pub fn new(matrix: Affine3A) -> Self {
        Self { matrix }
    }

    /// The matrix that transforms normals for `positions`: the inverse transpose of its linear part, with no
    /// translation.
    pub fn normal_matrix_for(positions: &Affine3A) -> Self {
        let linear = Mat3::from(positions.matrix3).inverse().transpose();
        Self {
            matrix: Affine3A::from_mat3(linear),
        }
    }

    pub fn matrix(&self) -> &Affine3A {
        &self.matrix
    }

    #[inline(always)]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.matrix.transform_point3(point)
    }

    /// Transform four points stored as x, y and z lanes. `w` is the homogeneous coordinate: 1 for positions, 0 for
    /// directions.
    #[inline(always)]
    pub fn transform_vectors<S: Simd>(&self, [x, y, z]: [f32x4<S>; 3], w: f32) -> [f32x4<S>; 3] {
        let Mat3A {
            x_axis: c0,
            y_axis: c1,
            z_axis: c2,
        } = self.matrix.matrix3;
        let c3: Vec3A = self.matrix.translation * w;
        [
            c0.x * x + c1.x * y + c2.x * z + c3.x,
            c0.y * x + c1.y * y + c2.y * z + c3.y,
            c0.z * x + c1.z * y + c2.z * z + c3.z,
        ]
    }
}

impl From<&SpaceTrs> for Trs3x4 {
    fn from(trs: &SpaceTrs) -> Self {
        Self::new(trs.matrix())
    }
}

#[cfg(test)]
mod tests {
    use fearless_simd::{Level, SimdFrom, dispatch};

    use super::*;

    fn assert_vec_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-5, "{a} != {b}");
    }

    fn identity_round_trip<S: Simd>(simd: S) -> bool {
        let trs = Trs3x4::from(&SpaceTrs::IDENTITY);
        let p = [
            [1.0, -2.0, 0.5, 0.0],
            [3.0, 0.25, -1.0, 0.0],
            [-4.0, 8.0, 2.0, 0.0],
        ];
        let moved = trs.transform_vectors(p.map(|axis| f32x4::simd_from(simd, axis)), 1.0);
        moved.map(|axis| *axis) == p
    }

    #[test]
    fn identity_leaves_points_alone() {
        assert!(dispatch!(Level::new(), simd => identity_round_trip(simd)));
    }

    #[test]
    fn rotation_composes_z_then_x_then_y() {
        let trs = SpaceTrs {
            rotation: Vec3::new(90.0, 90.0, 90.0),
            ..SpaceTrs::IDENTITY
        };
        // Z turns +X into +Y, X turns +Y into +Z, Y turns +Z into +X.
        let moved = trs.matrix().transform_vector3(Vec3::X);
        assert_vec_close(moved, Vec3::X);

        let z_only = SpaceTrs {
            rotation: Vec3::new(0.0, 0.0, 90.0),
            ..SpaceTrs::IDENTITY
        };
        assert_vec_close(z_only.matrix().transform_vector3(Vec3::X), Vec3::Y);
    }

    #[test]
    fn lane_transform_matches_glam() {
        let trs = SpaceTrs {
            translation: Vec3::new(1.0, -2.0, 3.0),
            rotation: Vec3::new(10.0, 20.0, 30.0),
            scale: Vec3::new(2.0, 0.5, 3.0),
        };
        let matrix = Trs3x4::from(&trs);
        let points = [
            Vec3::new(0.1, 0.2, 0.3),
            Vec3::new(-1.0, 0.0, 4.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(5.0, -5.0, 0.5),
        ];
        let lanes = [
            points.map(|p| p.x),
            points.map(|p| p.y),
            points.map(|p| p.z),
        ];
        let [x, y, z] = dispatch!(Level::new(), simd => {
            matrix
                .transform_vectors(lanes.map(|axis| f32x4::simd_from(simd, axis)), 1.0)
                .map(|axis| *axis)
        });
        for (i, p) in points.iter().enumerate() {
            assert_vec_close(Vec3::new(x[i], y[i], z[i]), matrix.transform_point(*p));
        }
    }

    #[test]
    fn normal_matrix_keeps_normals_perpendicular() {
        let trs = SpaceTrs {
            translation: Vec3::new(4.0, 5.0, 6.0),
            rotation: Vec3::new(0.0, 45.0, 0.0),
            scale: Vec3::new(1.0, 4.0, 0.25),
        };
        let positions = trs.matrix();
        let normals = Trs3x4::normal_matrix_for(&positions);
        assert_eq!(normals.matrix().translation, Vec3A::ZERO);

        // A tangent and normal of the plane y = x.
        let tangent = positions.transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        let normal = normals.matrix().transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        assert!(tangent.dot(normal).abs() < 1e-4);
    }

    #[test]
    fn zero_scale_is_degenerate() {
        assert!(SpaceTrs::uniform_scale(0.0).has_degenerate_scale());
        assert!(!SpaceTrs::uniform_scale(8.0).has_degenerate_scale());
    }
}
