//! A small xxHash32-style hash, used to turn integer lattice coordinates into reproducible pseudo-random values.
//!
//! Unlike the full xxHash32 this has no striping or length handling: the state is seeded, then fed one 32-bit value
//! at a time with [`SmallXxHash::eat`], then avalanched on output. The constants are the xxHash32 primes and must not
//! change, since every stored seed depends on them.

use fearless_simd::{f32x4, i32x4, prelude::*, u32x4};

use crate::lanes::rotate_left;

pub const PRIME_A: u32 = 0b1001_1110_0011_0111_0111_1001_1011_0001;
pub const PRIME_B: u32 = 0b1000_0101_1110_1011_1100_1010_0111_0111;
pub const PRIME_C: u32 = 0b1100_0010_1011_0010_1010_1110_0011_1101;
pub const PRIME_D: u32 = 0b0010_0111_1101_0100_1110_1011_0010_1111;
pub const PRIME_E: u32 = 0b0001_0110_0101_0110_0110_0111_1011_0001;

const ONE_BITS: u32 = 0x3F80_0000;
const MANTISSA_MASK: u32 = 0x007F_FFFF;

/// Which bits of a hash value become the mantissa when extracting a float in `[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Floats01Select {
    /// The high 23 bits.
    A,
    /// The low 23 bits.
    B,
}

#[inline(always)]
fn avalanche(mut a: u32) -> u32 {
    a ^= a >> 15;
    a = a.wrapping_mul(PRIME_B);
    a ^= a >> 13;
    a = a.wrapping_mul(PRIME_C);
    a ^= a >> 16;
    a
}

/// Map 23 bits onto the mantissa of a float in `[1, 2)` and shift it down to `[0, 1)`.
#[inline(always)]
fn mantissa_to_unit(bits: u32) -> f32 {
    f32::from_bits((bits & MANTISSA_MASK) | ONE_BITS) - 1.0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SmallXxHash {
    accumulator: u32,
}

impl SmallXxHash {
    #[inline(always)]
    pub fn seed(seed: i32) -> Self {
        Self {
            accumulator: (seed as u32).wrapping_add(PRIME_E),
        }
    }

    #[inline(always)]
    pub fn from_accumulator(accumulator: u32) -> Self {
        Self { accumulator }
    }

    #[inline(always)]
    pub fn accumulator(self) -> u32 {
        self.accumulator
    }

    /// Fold one integer into the state. The order of calls matters.
    #[inline(always)]
    #[must_use]
    pub fn eat(self, data: i32) -> Self {
        Self {
            accumulator: self
                .accumulator
                .wrapping_add((data as u32).wrapping_mul(PRIME_C))
                .rotate_left(17)
                .wrapping_mul(PRIME_D),
        }
    }

    #[inline(always)]
    #[must_use]
    pub fn eat_byte(self, data: u8) -> Self {
        Self {
            accumulator: self
                .accumulator
                .wrapping_add((data as u32).wrapping_mul(PRIME_E))
                .rotate_left(11)
                .wrapping_mul(PRIME_A),
        }
    }

    /// The final, avalanched hash value.
    #[inline(always)]
    pub fn value(self) -> u32 {
        avalanche(self.accumulator)
    }

    #[inline(always)]
    pub fn floats01(self, select: Floats01Select) -> f32 {
        let value = self.value();
        match select {
            Floats01Select::A => mantissa_to_unit(value >> 9),
            Floats01Select::B => mantissa_to_unit(value),
        }
    }

    #[inline(always)]
    pub fn floats01_a(self) -> f32 {
        self.floats01(Floats01Select::A)
    }

    #[inline(always)]
    pub fn floats01_b(self) -> f32 {
        self.floats01(Floats01Select::B)
    }
}

impl From<SmallXxHash> for u32 {
    #[inline(always)]
    fn from(hash: SmallXxHash) -> Self {
        hash.value()
    }
}

/// Four independent [`SmallXxHash`] states advanced together.
#[derive(Clone, Copy)]
pub struct SmallXxHash4<S: Simd> {
    accumulator: u32x4<S>,
}

impl<S: Simd> SmallXxHash4<S> {
    /// Seed each lane separately.
    #[inline(always)]
    pub fn seed4(seeds: i32x4<S>) -> Self {
        Self {
            accumulator: seeds.bitcast::<u32x4<S>>() + PRIME_E,
        }
    }

    /// Broadcast one scalar state to all four lanes.
    #[inline(always)]
    pub fn splat(simd: S, hash: SmallXxHash) -> Self {
        Self {
            accumulator: u32x4::splat(simd, hash.accumulator),
        }
    }

    #[inline(always)]
    pub fn accumulator(self) -> u32x4<S> {
        self.accumulator
    }

    #[inline(always)]
    #[must_use]
    pub fn eat(self, data: i32x4<S>) -> Self {
        let data = data.bitcast::<u32x4<S>>();
        Self {
            accumulator: rotate_left(self.accumulator + data * PRIME_C, 17) * PRIME_D,
        }
    }

    #[inline(always)]
    #[must_use]
    pub fn eat_byte(self, data: [u8; 4]) -> Self {
        let data = u32x4::from_fn(self.accumulator.witness(), |lane| data[lane] as u32);
        Self {
            accumulator: rotate_left(self.accumulator + data * PRIME_E, 11) * PRIME_A,
        }
    }

    #[inline(always)]
    pub fn value(self) -> u32x4<S> {
        let mut a = self.accumulator;
        a = a ^ (a >> 15);
        a = a * PRIME_B;
        a = a ^ (a >> 13);
        a = a * PRIME_C;
        a ^ (a >> 16)
    }

    #[inline(always)]
    pub fn floats01(self, select: Floats01Select) -> f32x4<S> {
        let value = self.value();
        let bits = match select {
            Floats01Select::A => value >> 9,
            Floats01Select::B => value,
        };
        ((bits & MANTISSA_MASK) | ONE_BITS).bitcast::<f32x4<S>>() - 1.0
    }

    #[inline(always)]
    pub fn floats01_a(self) -> f32x4<S> {
        self.floats01(Floats01Select::A)
    }

    #[inline(always)]
    pub fn floats01_b(self) -> f32x4<S> {
        self.floats01(Floats01Select::B)
    }

    /// Extract one lane as a scalar state.
    #[inline(always)]
    pub fn lane(self, index: usize) -> SmallXxHash {
        SmallXxHash::from_accumulator(self.accumulator[index])
    }
}

impl<S: Simd> From<SmallXxHash4<S>> for u32x4<S> {
    #[inline(always)]
    fn from(hash: SmallXxHash4<S>) -> Self {
        hash.value()
    }
}
