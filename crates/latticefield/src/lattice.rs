//! Value noise over an integer lattice. Each lattice point gets a pseudo-random value from [`SmallXxHash4`], and the
//! noise between lattice points is a smoothed multilinear blend of its corners.

use fearless_simd::{f32x4, i32x4, prelude::*};

use crate::{hash::SmallXxHash4, lanes::lerp};

/// The two lattice points bracketing a coordinate along one axis, and how far between them it lies.
#[derive(Clone, Copy)]
pub struct LatticeSpan4<S: Simd> {
    pub p0: i32x4<S>,
    pub p1: i32x4<S>,
    /// Smoothed interpolation weight in `[0, 1]`.
    pub t: f32x4<S>,
}

/// Quintic smoothing `t^3 (t (6t - 15) + 10)`. Its first and second derivatives are zero at 0 and 1, so the noise has
/// no creases where cells meet.
#[inline(always)]
pub fn smooth<S: Simd>(t: f32x4<S>) -> f32x4<S> {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline(always)]
pub fn lattice_span4<S: Simd>(coordinates: f32x4<S>) -> LatticeSpan4<S> {
    let points = coordinates.floor();
    let p0 = points.to_int::<i32x4<S>>();
    LatticeSpan4 {
        p0,
        p1: p0 + 1,
        t: smooth(coordinates - points),
    }
}

/// A noise function evaluated for four points at once.
pub trait Noise: Send + Sync {
    /// Number of position axes this noise reads.
    const DIMENSIONS: usize;

    fn noise4<S: Simd>(positions: [f32x4<S>; 3], hash: SmallXxHash4<S>) -> f32x4<S>;
}

/// Varies along X only.
pub struct Lattice1D;

/// Varies along X and Z, the axes of the plane shape.
pub struct Lattice2D;

pub struct Lattice3D;

impl Noise for Lattice1D {
    const DIMENSIONS: usize = 1;

    #[inline(always)]
    fn noise4<S: Simd>([x, ..]: [f32x4<S>; 3], hash: SmallXxHash4<S>) -> f32x4<S> {
        let x = lattice_span4(x);
        lerp(
            hash.eat(x.p0).floats01_a(),
            hash.eat(x.p1).floats01_a(),
            x.t,
        ) * 2.0
            - 1.0
    }
}

impl Noise for Lattice2D {
    const DIMENSIONS: usize = 2;

    #[inline(always)]
    fn noise4<S: Simd>([x, _, z]: [f32x4<S>; 3], hash: SmallXxHash4<S>) -> f32x4<S> {
        let x = lattice_span4(x);
        let z = lattice_span4(z);
        let h0 = hash.eat(x.p0);
        let h1 = hash.eat(x.p1);

        let blend_z =
            |h: SmallXxHash4<S>| lerp(h.eat(z.p0).floats01_a(), h.eat(z.p1).floats01_a(), z.t);

        lerp(blend_z(h0), blend_z(h1), x.t) * 2.0 - 1.0
    }
}

impl Noise for Lattice3D {
    const DIMENSIONS: usize = 3;

    #[inline(always)]
    fn noise4<S: Simd>([x, y, z]: [f32x4<S>; 3], hash: SmallXxHash4<S>) -> f32x4<S> {
        let x = lattice_span4(x);
        let y = lattice_span4(y);
        let z = lattice_span4(z);

        let h0 = hash.eat(x.p0);
        let h1 = hash.eat(x.p1);
        let h00 = h0.eat(y.p0);
        let h01 = h0.eat(y.p1);
        let h10 = h1.eat(y.p0);
        let h11 = h1.eat(y.p1);

        let blend_z =
            |h: SmallXxHash4<S>| lerp(h.eat(z.p0).floats01_a(), h.eat(z.p1).floats01_a(), z.t);

        lerp(
            lerp(blend_z(h00), blend_z(h01), y.t),
            lerp(blend_z(h10), blend_z(h11), y.t),
            x.t,
        ) * 2.0
            - 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
pub enum NoiseDimensions {
    One = 1,
    Two = 2,
    #[default]
    Three = 3,
}

impl NoiseDimensions {
    pub const ALL: [NoiseDimensions; 3] = [
        NoiseDimensions::One,
        NoiseDimensions::Two,
        NoiseDimensions::Three,
    ];

    pub fn count(&self) -> usize {
        match self {
            NoiseDimensions::One => Lattice1D::DIMENSIONS,
            NoiseDimensions::Two => Lattice2D::DIMENSIONS,
            NoiseDimensions::Three => Lattice3D::DIMENSIONS,
        }
    }

    pub fn noise4<S: Simd>(&self, positions: [f32x4<S>; 3], hash: SmallXxHash4<S>) -> f32x4<S> {
        match self {
            NoiseDimensions::One => Lattice1D::noise4(positions, hash),
            NoiseDimensions::Two => Lattice2D::noise4(positions, hash),
            NoiseDimensions::Three => Lattice3D::noise4(positions, hash),
        }
    }
}

#[cfg(test)]
mod tests {
    use fearless_simd::{Level, dispatch};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    use super::*;
    use crate::hash::SmallXxHash;

    fn sample(dimensions: NoiseDimensions, seed: i32, x: f32, y: f32, z: f32) -> f32 {
        fn sample_lanes<S: Simd>(
            simd: S,
            dimensions: NoiseDimensions,
            seed: i32,
            [x, y, z]: [f32; 3],
        ) -> f32 {
            let hash = SmallXxHash4::splat(simd, SmallXxHash::seed(seed));
            let positions = [x, y, z].map(|c| f32x4::splat(simd, c));
            dimensions.noise4(positions, hash)[0]
        }
        dispatch!(Level::new(), simd => sample_lanes(simd, dimensions, seed, [x, y, z]))
    }

    fn smoothing_and_spans<S: Simd>(simd: S) {
        let t = smooth(f32x4::simd_from(simd, [0.0, 0.5, 1.0, 0.25]));
        assert_eq!(t[0], 0.0);
        assert_eq!(t[1], 0.5);
        assert_eq!(t[2], 1.0);
        assert!(t[3] > 0.0 && t[3] < 0.25);

        let span = lattice_span4(f32x4::simd_from(simd, [-0.25, -1.0, 2.5, 0.0]));
        assert_eq!(*span.p0, [-1, -1, 2, 0]);
        assert_eq!(*span.p1, [0, 0, 3, 1]);
        assert_eq!(span.t[1], 0.0);
        assert_eq!(span.t[3], 0.0);
    }

    #[test]
    fn smoothing_hits_endpoints_and_spans_bracket_negatives() {
        dispatch!(Level::new(), simd => smoothing_and_spans(simd));
    }

    #[test]
    fn integer_points_take_the_lower_corner_value() {
        for seed in [0, 1, -17, i32::MAX] {
            for k in -3..=3 {
                let kf = k as f32;
                let base = SmallXxHash::seed(seed);

                let expected_1d = base.eat(k).floats01_a() * 2.0 - 1.0;
                assert_eq!(sample(NoiseDimensions::One, seed, kf, 0.3, 0.7), expected_1d);

                let expected_2d = base.eat(k).eat(-k).floats01_a() * 2.0 - 1.0;
                assert_eq!(sample(NoiseDimensions::Two, seed, kf, 0.3, -kf), expected_2d);

                let expected_3d = base.eat(k).eat(2).eat(k + 1).floats01_a() * 2.0 - 1.0;
                assert_eq!(
                    sample(NoiseDimensions::Three, seed, kf, 2.0, kf + 1.0),
                    expected_3d
                );
            }
        }
    }

    #[test]
    fn continuous_across_cell_boundaries() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        for dimensions in NoiseDimensions::ALL {
            for _ in 0..200 {
                let seed: i32 = rng.random();
                let k = rng.random_range(-50..50) as f32;
                let y = rng.random_range(-10.0..10.0f32);
                let z = rng.random_range(-10.0..10.0f32);
                let at = sample(dimensions, seed, k, y, z);
                let below = sample(dimensions, seed, k - 1e-3, y, z);
                let above = sample(dimensions, seed, k + 1e-3, y, z);
                assert!((at - below).abs() < 1e-3, "{dimensions:?} below {k}");
                assert!((at - above).abs() < 1e-3, "{dimensions:?} above {k}");
            }
        }
    }

    #[test]
    fn slope_flattens_out_at_cell_boundaries() {
        // With quintic smoothing the slope along x is 0 on both sides of an integer. One-sided differences over `H`
        // are bounded by 2 * 10 * H^2; a linear blend would give slopes up to 2.
        const H: f32 = 1e-2;
        const BOUND: f32 = 3e-3;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
        for dimensions in NoiseDimensions::ALL {
            for _ in 0..200 {
                let seed: i32 = rng.random();
                let k = rng.random_range(-50..50) as f32;
                let y = rng.random_range(-10.0..10.0f32);
                let z = rng.random_range(-10.0..10.0f32);
                let at = sample(dimensions, seed, k, y, z);
                let below = (at - sample(dimensions, seed, k - H, y, z)) / H;
                let above = (sample(dimensions, seed, k + H, y, z) - at) / H;
                assert!(below.abs() < BOUND, "{dimensions:?} slope {below} below {k}");
                assert!(above.abs() < BOUND, "{dimensions:?} slope {above} above {k}");
                assert!(
                    (below - above).abs() < BOUND,
                    "{dimensions:?} slopes {below} and {above} disagree at {k}"
                );
            }
        }
    }

    fn random_noise_in_range<S: Simd>(simd: S) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        for dimensions in NoiseDimensions::ALL {
            for _ in 0..500 {
                let positions = std::array::from_fn(|_| {
                    f32x4::from_fn(simd, |_| rng.random_range(-1000.0..1000.0f32))
                });
                let hash = SmallXxHash4::splat(simd, SmallXxHash::seed(rng.random()));
                let n = dimensions.noise4(positions, hash);
                for lane in 0..4 {
                    assert!((-1.0..=1.0).contains(&n[lane]), "{}", n[lane]);
                }
            }
        }
    }

    #[test]
    fn output_is_in_signed_unit_range() {
        dispatch!(Level::new(), simd => random_noise_in_range(simd));
    }

    #[test]
    fn unused_axes_are_ignored() {
        assert_eq!(
            sample(NoiseDimensions::One, 5, 0.4, 1.0, 2.0),
            sample(NoiseDimensions::One, 5, 0.4, -7.5, 9.25)
        );
        assert_eq!(
            sample(NoiseDimensions::Two, 5, 0.4, 1.0, 2.6),
            sample(NoiseDimensions::Two, 5, 0.4, -7.5, 2.6)
        );
    }

    fn batched_lanes_match_single<S: Simd>(simd: S) {
        let hash = SmallXxHash4::splat(simd, SmallXxHash::seed(9));
        let positions = [
            f32x4::simd_from(simd, [0.1, 5.5, -3.25, 100.0]),
            f32x4::simd_from(simd, [0.2, -1.5, 7.75, 0.0]),
            f32x4::simd_from(simd, [0.3, 2.5, 0.5, -100.0]),
        ];
        let batched = Lattice3D::noise4(positions, hash);
        for lane in 0..4 {
            let single = Lattice3D::noise4(
                positions.map(|axis| f32x4::splat(simd, axis[lane])),
                hash,
            );
            assert_eq!(batched[lane].to_bits(), single[0].to_bits());
        }
    }

    #[test]
    fn lanes_are_independent() {
        dispatch!(Level::new(), simd => batched_lanes_match_single(simd));
    }
}
