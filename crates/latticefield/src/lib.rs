//! Evaluates a square grid of samples over a parametric surface. Each sample gets a position, a normal, and either a
//! raw lattice hash or a value-noise value, computed four at a time and spread across a shared worker pool.

pub mod error;
pub mod field;
pub mod hash;
pub mod lanes;
pub mod lattice;
pub mod settings;
pub mod shapes;
pub mod space_trs;
pub mod thread_pool;

#[macro_use]
extern crate num_derive;

pub use error::FieldError;
pub use field::{FieldOutput, FieldPass, FieldValue, FieldValues, MAX_RESOLUTION, OutputKind, PassHandle};
pub use glam::Vec3;
pub use lattice::NoiseDimensions;
pub use num_traits::cast::{FromPrimitive, ToPrimitive};
pub use settings::{FieldSettings, ParseSettingsError};
pub use shapes::ShapeKind;
pub use space_trs::SpaceTrs;
