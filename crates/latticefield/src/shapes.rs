use std::f32::consts::PI;

use fearless_simd::{f32x4, prelude::*};

use crate::lanes::sin_cos;

/// Four sample points, one per lane, in the canonical space of a shape.
#[derive(Clone, Copy)]
pub struct Point4<S: Simd> {
    pub positions: [f32x4<S>; 3],
    pub normals: [f32x4<S>; 3],
}

/// Added before flooring when deriving a row from a flat index, so that round-off at an exact row boundary doesn't
/// drop a sample into the previous row.
pub const ROW_EPSILON: f64 = 0.00001;

/// Compute the cell-centered `(u, v)` coordinates of the four samples in lane group `group`.
#[inline(always)]
pub fn index_to_uv4<S: Simd>(
    simd: S,
    group: usize,
    resolution: f32,
    inv_resolution: f32,
) -> [f32x4<S>; 2] {
    let first = 4 * group;
    let i4 = f32x4::from_fn(simd, |lane| (first + lane) as f32);
    // The row is taken in f64. In f32, `index / resolution` is off by more than the epsilon for resolutions above a
    // few hundred.
    let row_scale = 1.0 / resolution as f64;
    let v = f32x4::from_fn(simd, |lane| {
        ((first + lane) as f64 * row_scale + ROW_EPSILON).floor() as f32
    });
    let u = inv_resolution * (i4 - resolution * v + 0.5);
    let v = inv_resolution * (v + 0.5);
    [u, v]
}

/// A parametric surface sampled over a square grid.
pub trait Shape: Send + Sync {
    fn point4<S: Simd>(simd: S, group: usize, resolution: f32, inv_resolution: f32) -> Point4<S>;
}

/// A unit square in the XZ plane, centered on the origin, facing +Y.
pub struct Plane;

impl Shape for Plane {
    #[inline(always)]
    fn point4<S: Simd>(simd: S, group: usize, resolution: f32, inv_resolution: f32) -> Point4<S> {
        let [u, v] = index_to_uv4(simd, group, resolution, inv_resolution);
        Point4 {
            positions: [u - 0.5, f32x4::splat(simd, 0.0), v - 0.5],
            normals: [
                f32x4::splat(simd, 0.0),
                f32x4::splat(simd, 1.0),
                f32x4::splat(simd, 0.0),
            ],
        }
    }
}

/// A sphere of radius 0.5, sampled through an octahedral mapping of the grid.
pub struct Sphere;

impl Shape for Sphere {
    #[inline(always)]
    fn point4<S: Simd>(simd: S, group: usize, resolution: f32, inv_resolution: f32) -> Point4<S> {
        let [u, v] = index_to_uv4(simd, group, resolution, inv_resolution);

        let mut x = u - 0.5;
        let mut y = v - 0.5;
        let z = 0.5 - x.abs() - y.abs();

        // Fold the corners of the square, which lie outside the octahedron, back over its lower half.
        let offset = (-z).max(0.0);
        x += x.simd_lt(0.0).select(offset, -offset);
        y += y.simd_lt(0.0).select(offset, -offset);

        let scale = 0.5 / (x * x + y * y + z * z).sqrt();
        let positions = [x * scale, y * scale, z * scale];
        Point4 {
            positions,
            normals: positions,
        }
    }
}

/// A torus lying in the XZ plane.
pub struct Torus;

impl Torus {
    pub const MAJOR_RADIUS: f32 = 0.375;
    pub const MINOR_RADIUS: f32 = 0.125;
}

impl Shape for Torus {
    #[inline(always)]
    fn point4<S: Simd>(simd: S, group: usize, resolution: f32, inv_resolution: f32) -> Point4<S> {
        let [u, v] = index_to_uv4(simd, group, resolution, inv_resolution);
        let r1 = Torus::MAJOR_RADIUS;
        let r2 = Torus::MINOR_RADIUS;

        let (sin_u, cos_u) = sin_cos(2.0 * PI * u);
        let (sin_v, cos_v) = sin_cos(2.0 * PI * v);
        let s = r1 + r2 * cos_v;

        let positions = [s * sin_u, r2 * sin_v, s * cos_u];
        // Points from the center of the tube, not normalized.
        let normals = [
            positions[0] - r1 * sin_u,
            positions[1],
            positions[2] - r1 * cos_u,
        ];
        Point4 { positions, normals }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
pub enum ShapeKind {
    #[default]
    Plane = 0,
    Sphere = 1,
    Torus = 2,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 3] = [ShapeKind::Plane, ShapeKind::Sphere, ShapeKind::Torus];

    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Plane => "plane",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Torus => "torus",
        }
    }

    /// Generate a lane group with the shape this enum names.
    pub fn point4<S: Simd>(
        &self,
        simd: S,
        group: usize,
        resolution: f32,
        inv_resolution: f32,
    ) -> Point4<S> {
        match self {
            ShapeKind::Plane => Plane::point4(simd, group, resolution, inv_resolution),
            ShapeKind::Sphere => Sphere::point4(simd, group, resolution, inv_resolution),
            ShapeKind::Torus => Torus::point4(simd, group, resolution, inv_resolution),
        }
    }
}

#[cfg(test)]
mod tests {
    use fearless_simd::{Level, dispatch};
    use glam::Vec3;

    use super::*;
    use crate::field::MAX_RESOLUTION;

    fn lane_vec<S: Simd>(v: &[f32x4<S>; 3], lane: usize) -> Vec3 {
        Vec3::new(v[0][lane], v[1][lane], v[2][lane])
    }

    fn collect_samples<S: Simd>(simd: S, resolution: usize, shape: ShapeKind) -> Vec<(Vec3, Vec3)> {
        let res = resolution as f32;
        let count = resolution * resolution;
        let mut samples = Vec::with_capacity(count);
        for group in 0..count.div_ceil(4) {
            let p = shape.point4(simd, group, res, 1.0 / res);
            for lane in 0..4 {
                if group * 4 + lane < count {
                    samples.push((lane_vec(&p.positions, lane), lane_vec(&p.normals, lane)));
                }
            }
        }
        samples
    }

    fn for_each_sample(resolution: usize, shape: ShapeKind, mut f: impl FnMut(usize, Vec3, Vec3)) {
        let samples = dispatch!(Level::new(), simd => collect_samples(simd, resolution, shape));
        for (index, (p, n)) in samples.into_iter().enumerate() {
            f(index, p, n);
        }
    }

    fn uv_of<S: Simd>(simd: S, index: usize, res: f32) -> (f32, f32) {
        let [u, v] = index_to_uv4(simd, index / 4, res, 1.0 / res);
        (u[index % 4], v[index % 4])
    }

    fn check_uv_is_invertible<S: Simd>(simd: S) {
        for resolution in [1usize, 2, 3, 7, 16, 100, 397, 1000] {
            let res = resolution as f32;
            for group in 0..(resolution * resolution).div_ceil(4) {
                let [u, v] = index_to_uv4(simd, group, res, 1.0 / res);
                for lane in 0..4 {
                    let index = group * 4 + lane;
                    if index >= resolution * resolution {
                        continue;
                    }
                    let col = (u[lane] * res - 0.5).round() as usize;
                    let row = (v[lane] * res - 0.5).round() as usize;
                    assert_eq!(row * resolution + col, index, "resolution {resolution}");
                    assert!((u[lane] * res - 0.5 - col as f32).abs() < 1e-3);
                }
            }
        }
    }

    #[test]
    fn uv_is_cell_centered_and_invertible() {
        dispatch!(Level::new(), simd => check_uv_is_invertible(simd));
    }

    fn check_every_row_boundary<S: Simd>(simd: S) {
        for resolution in 1..=MAX_RESOLUTION as usize {
            let res = resolution as f32;
            let inv = 1.0 / res;
            let first_u = 0.5 * inv;
            let last_u = inv * ((resolution - 1) as f32 + 0.5);
            for row in 0..resolution {
                let start = row * resolution;
                let expected_v = inv * (row as f32 + 0.5);
                assert_eq!(
                    uv_of(simd, start, res),
                    (first_u, expected_v),
                    "resolution {resolution}, start of row {row}"
                );
                if row > 0 {
                    let previous_v = inv * ((row - 1) as f32 + 0.5);
                    assert_eq!(
                        uv_of(simd, start - 1, res),
                        (last_u, previous_v),
                        "resolution {resolution}, end of row {}",
                        row - 1
                    );
                }
            }
        }
    }

    #[test]
    fn every_row_starts_at_column_zero_up_to_max_resolution() {
        dispatch!(Level::new(), simd => check_every_row_boundary(simd));
    }

    fn check_first_plane_samples<S: Simd>(simd: S) {
        let p = Plane::point4(simd, 0, 4.0, 0.25);
        let [u, v] = index_to_uv4(simd, 0, 4.0, 0.25);
        assert_eq!((u[0], v[0]), (0.125, 0.125));
        assert_eq!(lane_vec(&p.positions, 0), Vec3::new(-0.375, 0.0, -0.375));
        assert_eq!(lane_vec(&p.normals, 0), Vec3::Y);

        let p = Plane::point4(simd, 0, 1.0, 1.0);
        assert_eq!(lane_vec(&p.positions, 0), Vec3::ZERO);
    }

    #[test]
    fn first_plane_samples_are_cell_centered() {
        dispatch!(Level::new(), simd => check_first_plane_samples(simd));
    }

    #[test]
    fn sphere_positions_are_normals_of_radius_half() {
        for resolution in [1, 2, 5, 32] {
            for_each_sample(resolution, ShapeKind::Sphere, |index, p, n| {
                assert_eq!(p, n);
                assert!((p.length() - 0.5).abs() < 1e-5, "sample {index}: {p}");
            });
        }
    }

    #[test]
    fn sphere_covers_both_hemispheres() {
        let mut below = 0;
        let mut above = 0;
        for_each_sample(16, ShapeKind::Sphere, |_, p, _| {
            if p.z < 0.0 {
                below += 1;
            } else {
                above += 1;
            }
        });
        assert_eq!(below + above, 256);
        assert!(below > 64 && above > 64);
    }

    #[test]
    fn torus_normals_point_away_from_the_tube_center() {
        for_each_sample(12, ShapeKind::Torus, |index, p, n| {
            assert!((n.length() - Torus::MINOR_RADIUS).abs() < 1e-5, "sample {index}");
            let ring = Vec3::new(p.x, 0.0, p.z).normalize() * Torus::MAJOR_RADIUS;
            assert!((p - ring - n).length() < 1e-5, "sample {index}");
        });
    }

    #[test]
    fn every_shape_yields_resolution_squared_samples() {
        for shape in ShapeKind::ALL {
            for resolution in [1, 3, 4, 9] {
                let mut seen = 0;
                for_each_sample(resolution, shape, |_, _, _| seen += 1);
                assert_eq!(seen, resolution * resolution, "{}", shape.name());
            }
        }
    }
}
