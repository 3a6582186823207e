//! Batched evaluation of a whole sample grid.
//!
//! A pass runs in two stages. The shape stage fills one position and one normal per sample; the value stage reads
//! those positions and fills one hash or noise value per sample. Both stages work on lane groups of four samples,
//! fanned out across the worker pool; every group writes only its own four output slots. Output buffers are padded up
//! to a whole number of lane groups, and the padding is never exposed.

use std::marker::PhantomData;

use fearless_simd::{Level, dispatch, f32x4, i32x4, prelude::*};
use glam::Vec3;
use log::{debug, trace};

use crate::{
    error::{FieldError, InvalidConfigurationSnafu},
    hash::{SmallXxHash, SmallXxHash4},
    lanes::LANES,
    lattice::{Lattice1D, Lattice2D, Lattice3D, Noise, NoiseDimensions},
    settings::FieldSettings,
    shapes::{Plane, Shape, ShapeKind, Sphere, Torus},
    space_trs::{SpaceTrs, Trs3x4},
    thread_pool::{JobHandle, ZipChunks, with_thread_pool},
};

/// Largest supported grid side. At this size the sample count is exactly 2^24, so every sample index is still
/// exactly representable as `f32`.
pub const MAX_RESOLUTION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
pub enum OutputKind {
    /// Raw 32-bit hash of the lattice cell containing each sample.
    Hash = 0,
    /// Lattice value noise in `[-1, 1]`.
    #[default]
    Noise = 1,
}

impl OutputKind {
    pub fn name(&self) -> &'static str {
        match self {
            OutputKind::Hash => "hash",
            OutputKind::Noise => "noise",
        }
    }
}

/// Number of lane groups needed to hold `sample_count` samples.
#[inline]
pub fn group_count(sample_count: usize) -> usize {
    sample_count.div_ceil(LANES)
}

/// Locate a sample within the lane-group layout.
#[inline]
pub fn group_and_lane(index: usize) -> (usize, usize) {
    (index / LANES, index % LANES)
}

fn validate_resolution(resolution: u32) -> Result<(), FieldError> {
    if resolution == 0 || resolution > MAX_RESOLUTION {
        return InvalidConfigurationSnafu {
            reason: format!("resolution must be between 1 and {MAX_RESOLUTION}, got {resolution}"),
        }
        .fail();
    }
    Ok(())
}

/// Positions and normals for every sample of a grid. Produced by the shape stage and read by the value stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeBuffers {
    resolution: u32,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
}

impl ShapeBuffers {
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn sample_count(&self) -> usize {
        self.resolution as usize * self.resolution as usize
    }

    pub fn group_count(&self) -> usize {
        self.positions.len() / LANES
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions[..self.sample_count()]
    }

    /// Unit-length normals.
    pub fn normals(&self) -> &[Vec3] {
        &self.normals[..self.sample_count()]
    }

    /// Axis-aligned bounds of all sample positions, as `(min, max)`.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        self.positions().iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        )
    }

    fn padded_positions(&self) -> &[Vec3] {
        &self.positions
    }
}

/// Generates positions and normals for shape `Sh`, mapped through a transform.
pub struct ShapeJob<Sh: Shape> {
    level: Level,
    resolution: u32,
    inv_resolution: f32,
    position_trs: Trs3x4,
    normal_trs: Trs3x4,
    groups_per_task: Option<usize>,
    _shape: PhantomData<Sh>,
}

impl<Sh: Shape> ShapeJob<Sh> {
    pub fn new(level: Level, resolution: u32, trs: &SpaceTrs) -> Self {
        let matrix = trs.matrix();
        Self {
            level,
            resolution,
            inv_resolution: 1.0 / resolution as f32,
            position_trs: Trs3x4::new(matrix),
            normal_trs: Trs3x4::normal_matrix_for(&matrix),
            groups_per_task: None,
            _shape: PhantomData,
        }
    }

    pub fn with_groups_per_task(mut self, groups_per_task: Option<usize>) -> Self {
        self.groups_per_task = groups_per_task;
        self
    }

    #[inline(always)]
    fn execute<S: Simd>(
        &self,
        simd: S,
        group: usize,
        positions: &mut [Vec3],
        normals: &mut [Vec3],
    ) {
        let point = Sh::point4(simd, group, self.resolution as f32, self.inv_resolution);
        let [px, py, pz] = self.position_trs.transform_vectors(point.positions, 1.0);
        let [nx, ny, nz] = self.normal_trs.transform_vectors(point.normals, 0.0);
        for lane in 0..LANES {
            positions[lane] = Vec3::new(px[lane], py[lane], pz[lane]);
            // The transform can stretch normals, so they're renormalized afterwards.
            normals[lane] = Vec3::new(nx[lane], ny[lane], nz[lane]).normalize();
        }
    }

    /// Fill a fresh set of shape buffers. Must be called on a pool thread (see [`with_thread_pool`]) to run in
    /// parallel.
    pub fn run(&self) -> ShapeBuffers {
        let sample_count = self.resolution as usize * self.resolution as usize;
        let padded_len = group_count(sample_count) * LANES;
        let mut positions = vec![Vec3::ZERO; padded_len];
        let mut normals = vec![Vec3::ZERO; padded_len];

        trace!("shape stage: {} groups", padded_len / LANES);
        ZipChunks::new([positions.as_mut_slice(), normals.as_mut_slice()], LANES).par_for_each(
            self.groups_per_task,
            |group, [positions, normals]| {
                dispatch!(self.level, simd => self.execute(simd, group, positions, normals))
            },
        );

        ShapeBuffers {
            resolution: self.resolution,
            positions,
            normals,
        }
    }
}

#[inline(always)]
fn gather_positions<S: Simd>(simd: S, positions: &[Vec3]) -> [f32x4<S>; 3] {
    [
        f32x4::from_fn(simd, |lane| positions[lane].x),
        f32x4::from_fn(simd, |lane| positions[lane].y),
        f32x4::from_fn(simd, |lane| positions[lane].z),
    ]
}

/// Samples lattice noise `N` at shape positions mapped through a domain transform.
pub struct NoiseJob<N: Noise> {
    level: Level,
    hash: SmallXxHash,
    domain_trs: Trs3x4,
    groups_per_task: Option<usize>,
    _noise: PhantomData<N>,
}

impl<N: Noise> NoiseJob<N> {
    pub fn new(level: Level, seed: i32, domain: &SpaceTrs) -> Self {
        Self {
            level,
            hash: SmallXxHash::seed(seed),
            domain_trs: domain.into(),
            groups_per_task: None,
            _noise: PhantomData,
        }
    }

    pub fn with_groups_per_task(mut self, groups_per_task: Option<usize>) -> Self {
        self.groups_per_task = groups_per_task;
        self
    }

    #[inline(always)]
    fn execute<S: Simd>(&self, simd: S, positions: &[Vec3], noise: &mut [f32]) {
        let positions = self
            .domain_trs
            .transform_vectors(gather_positions(simd, positions), 1.0);
        N::noise4(positions, SmallXxHash4::splat(simd, self.hash)).store_slice(noise);
    }

    pub fn run(&self, shape: &ShapeBuffers) -> Vec<f32> {
        let positions = shape.padded_positions();
        let mut noise = vec![0.0; positions.len()];
        trace!("noise stage: {} groups, {} axes", shape.group_count(), N::DIMENSIONS);
        ZipChunks::new([noise.as_mut_slice()], LANES).par_for_each(
            self.groups_per_task,
            |group, [noise]| {
                let start = group * LANES;
                let positions = &positions[start..start + LANES];
                dispatch!(self.level, simd => self.execute(simd, positions, noise));
            },
        );
        noise
    }
}

/// Hashes the integer lattice cell that each shape position falls into, after a domain transform.
pub struct HashJob {
    level: Level,
    hash: SmallXxHash,
    domain_trs: Trs3x4,
    groups_per_task: Option<usize>,
}

impl HashJob {
    pub fn new(level: Level, seed: i32, domain: &SpaceTrs) -> Self {
        Self {
            level,
            hash: SmallXxHash::seed(seed),
            domain_trs: domain.into(),
            groups_per_task: None,
        }
    }

    pub fn with_groups_per_task(mut self, groups_per_task: Option<usize>) -> Self {
        self.groups_per_task = groups_per_task;
        self
    }

    #[inline(always)]
    fn execute<S: Simd>(&self, simd: S, positions: &[Vec3], hashes: &mut [u32]) {
        let [x, y, z] = self
            .domain_trs
            .transform_vectors(gather_positions(simd, positions), 1.0);
        SmallXxHash4::splat(simd, self.hash)
            .eat(x.floor().to_int::<i32x4<S>>())
            .eat(y.floor().to_int::<i32x4<S>>())
            .eat(z.floor().to_int::<i32x4<S>>())
            .value()
            .store_slice(hashes);
    }

    pub fn run(&self, shape: &ShapeBuffers) -> Vec<u32> {
        let positions = shape.padded_positions();
        let mut hashes = vec![0; positions.len()];
        trace!("hash stage: {} groups", shape.group_count());
        ZipChunks::new([hashes.as_mut_slice()], LANES).par_for_each(
            self.groups_per_task,
            |group, [hashes]| {
                let start = group * LANES;
                let positions = &positions[start..start + LANES];
                dispatch!(self.level, simd => self.execute(simd, positions, hashes));
            },
        );
        hashes
    }
}

/// Hash every cell of a flat `resolution` x `resolution` integer grid centered on the origin, one sample per cell,
/// without any shape or transform. Row `v`, column `u` holds `seed.eat(u - resolution / 2).eat(v - resolution / 2)`.
pub fn grid_hashes(resolution: u32, seed: i32) -> Result<Vec<u32>, FieldError> {
    validate_resolution(resolution)?;
    let hash = SmallXxHash::seed(seed);
    let half = (resolution / 2) as i32;
    let mut hashes = vec![0; resolution as usize * resolution as usize];

    with_thread_pool(|| {
        ZipChunks::new([hashes.as_mut_slice()], resolution as usize).par_for_each(
            None,
            |row, [hashes]| {
                let v = row as i32 - half;
                for (u, out) in hashes.iter_mut().enumerate() {
                    *out = hash.eat(u as i32 - half).eat(v).value();
                }
            },
        );
    })?;

    Ok(hashes)
}

/// The per-sample values produced by the value stage.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    Hash(Vec<u32>),
    Noise(Vec<f32>),
}

/// One sample's value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Hash(u32),
    Noise(f32),
}

impl FieldValues {
    fn padded_len(&self) -> usize {
        match self {
            FieldValues::Hash(v) => v.len(),
            FieldValues::Noise(v) => v.len(),
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            FieldValues::Hash(_) => OutputKind::Hash,
            FieldValues::Noise(_) => OutputKind::Noise,
        }
    }
}

/// The finished result of a pass. Every accessor is limited to the real samples.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutput {
    shape: ShapeBuffers,
    values: FieldValues,
}

impl FieldOutput {
    pub fn resolution(&self) -> u32 {
        self.shape.resolution()
    }

    pub fn sample_count(&self) -> usize {
        self.shape.sample_count()
    }

    pub fn shape(&self) -> &ShapeBuffers {
        &self.shape
    }

    pub fn positions(&self) -> &[Vec3] {
        self.shape.positions()
    }

    pub fn normals(&self) -> &[Vec3] {
        self.shape.normals()
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        self.shape.bounds()
    }

    pub fn output_kind(&self) -> OutputKind {
        self.values.kind()
    }

    pub fn hashes(&self) -> Option<&[u32]> {
        match &self.values {
            FieldValues::Hash(v) => Some(&v[..self.sample_count()]),
            FieldValues::Noise(_) => None,
        }
    }

    pub fn noise(&self) -> Option<&[f32]> {
        match &self.values {
            FieldValues::Noise(v) => Some(&v[..self.sample_count()]),
            FieldValues::Hash(_) => None,
        }
    }

    pub fn value(&self, index: usize) -> Option<FieldValue> {
        if index >= self.sample_count() {
            return None;
        }
        Some(match &self.values {
            FieldValues::Hash(v) => FieldValue::Hash(v[index]),
            FieldValues::Noise(v) => FieldValue::Noise(v[index]),
        })
    }

    /// Look up a value by column `u` and row `v`.
    pub fn grid_value(&self, u: u32, v: u32) -> Option<FieldValue> {
        let resolution = self.resolution();
        if u >= resolution || v >= resolution {
            return None;
        }
        self.value(v as usize * resolution as usize + u as usize)
    }

    /// Split into shape buffers and values, with the values cut down to the real samples.
    pub fn into_parts(self) -> (ShapeBuffers, FieldValues) {
        let count = self.sample_count();
        let values = match self.values {
            FieldValues::Hash(mut v) => {
                v.truncate(count);
                FieldValues::Hash(v)
            }
            FieldValues::Noise(mut v) => {
                v.truncate(count);
                FieldValues::Noise(v)
            }
        };
        (self.shape, values)
    }
}

/// A completion handle for a pass running in the background.
#[must_use = "a pass's output can only be read by completing its handle"]
pub struct PassHandle {
    job: JobHandle<Result<FieldOutput, FieldError>>,
}

impl PassHandle {
    /// Wait for both stages of the pass to finish.
    pub fn complete(self) -> Result<FieldOutput, FieldError> {
        self.job.complete()?
    }

    /// Check whether the pass has finished without waiting. An unfinished pass gives its handle back so it can be
    /// polled again.
    pub fn try_complete(self) -> Result<Result<FieldOutput, FieldError>, Self> {
        match self.job.try_complete() {
            Ok(result) => Ok(result.and_then(|output| output)),
            Err(job) => Err(Self { job }),
        }
    }
}

/// A validated configuration, ready to run.
#[derive(Debug, Clone)]
pub struct FieldPass {
    settings: FieldSettings,
    level: Level,
}

impl FieldPass {
    /// Validate `settings`. The SIMD level is detected once here and used by every stage.
    pub fn new(settings: FieldSettings) -> Result<Self, FieldError> {
        validate_resolution(settings.resolution)?;
        Ok(Self {
            settings,
            level: Level::new(),
        })
    }

    pub fn settings(&self) -> &FieldSettings {
        &self.settings
    }

    fn groups_per_task(&self) -> Option<usize> {
        self.settings.groups_per_task.map(|n| n as usize)
    }

    fn shape_stage<Sh: Shape>(&self) -> ShapeBuffers {
        ShapeJob::<Sh>::new(
            self.level,
            self.settings.resolution,
            &self.settings.position_transform,
        )
            .with_groups_per_task(self.groups_per_task())
            .run()
    }

    fn noise_stage<N: Noise>(&self, shape: &ShapeBuffers) -> Vec<f32> {
        NoiseJob::<N>::new(self.level, self.settings.seed, &self.settings.noise_transform)
            .with_groups_per_task(self.groups_per_task())
            .run(shape)
    }

    /// Generate positions and normals for the configured shape.
    pub fn run_shape_stage(&self) -> Result<ShapeBuffers, FieldError> {
        with_thread_pool(|| match self.settings.shape {
            ShapeKind::Plane => self.shape_stage::<Plane>(),
            ShapeKind::Sphere => self.shape_stage::<Sphere>(),
            ShapeKind::Torus => self.shape_stage::<Torus>(),
        })
    }

    /// Compute the configured values at the positions of a finished shape stage.
    pub fn run_value_stage(&self, shape: &ShapeBuffers) -> Result<FieldValues, FieldError> {
        if shape.resolution() != self.settings.resolution {
            return InvalidConfigurationSnafu {
                reason: format!(
                    "shape buffers have resolution {}, pass expects {}",
                    shape.resolution(),
                    self.settings.resolution
                ),
            }
            .fail();
        }

        with_thread_pool(|| match self.settings.output_kind {
            OutputKind::Hash => FieldValues::Hash(
                HashJob::new(self.level, self.settings.seed, &self.settings.noise_transform)
                    .with_groups_per_task(self.groups_per_task())
                    .run(shape),
            ),
            OutputKind::Noise => FieldValues::Noise(match self.settings.noise_dimensions {
                NoiseDimensions::One => self.noise_stage::<Lattice1D>(shape),
                NoiseDimensions::Two => self.noise_stage::<Lattice2D>(shape),
                NoiseDimensions::Three => self.noise_stage::<Lattice3D>(shape),
            }),
        })
    }

    /// Run both stages and wait for them.
    pub fn run(&self) -> Result<FieldOutput, FieldError> {
        debug!(
            "field pass: resolution {}, {} shape, {} output",
            self.settings.resolution,
            self.settings.shape.name(),
            self.settings.output_kind.name()
        );
        let shape = self.run_shape_stage()?;
        let values = self.run_value_stage(&shape)?;
        debug_assert_eq!(values.padded_len(), shape.padded_positions().len());
        Ok(FieldOutput { shape, values })
    }

    /// Start the pass in the background. The shape stage always finishes before the value stage starts.
    pub fn schedule(self) -> Result<PassHandle, FieldError> {
        let job = JobHandle::spawn(move || self.run())?;
        Ok(PassHandle { job })
    }
}
