//! Lane helpers on top of the 4-wide `fearless_simd` vectors that every batched computation here works on.
//!
//! Every helper is applied lane by lane with plain adds, multiplies and shifts, so running a 4-lane computation gives
//! the same bits as running its scalar version four times.

use fearless_simd::{f32x4, prelude::*, u32x4};

/// Number of samples processed together as one lane group.
pub const LANES: usize = 4;

/// Rotate each lane left by `steps`, which must be in `1..32`.
#[inline(always)]
pub fn rotate_left<S: Simd>(v: u32x4<S>, steps: u32) -> u32x4<S> {
    debug_assert!((1..32).contains(&steps));
    (v << steps) | (v >> (32 - steps))
}

/// Linear interpolation `a + t * (b - a)`. Exact at `t == 0`.
#[inline(always)]
pub fn lerp<S: Simd>(a: f32x4<S>, b: f32x4<S>, t: f32x4<S>) -> f32x4<S> {
    a + t * (b - a)
}

/// Sine and cosine of each lane.
#[inline(always)]
pub fn sin_cos<S: Simd>(x: f32x4<S>) -> (f32x4<S>, f32x4<S>) {
    let simd = x.witness();
    (
        f32x4::from_fn(simd, |lane| x[lane].sin()),
        f32x4::from_fn(simd, |lane| x[lane].cos()),
    )
}
