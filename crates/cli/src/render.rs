//! Turning a finished field into things people can look at: a grayscale image of the values, and a point list with
//! every sample pushed along its normal by its value.

use std::io::{self, Write};

use image::{GrayImage, Luma};
use latticefield::{FieldOutput, FieldValue, Vec3};

/// Brightness of one sample. Noise maps `[-1, 1]` onto the full range; hashes show their lowest byte.
pub fn value_to_luma(value: FieldValue) -> u8 {
    match value {
        FieldValue::Hash(h) => (h & 255) as u8,
        FieldValue::Noise(n) => (((n.clamp(-1.0, 1.0) + 1.0) * 0.5) * 255.0).round() as u8,
    }
}

/// How far a sample is displaced along its normal, before scaling. Noise is used as-is; hashes use their lowest byte
/// mapped to `[0, 1]`.
pub fn value_to_offset(value: FieldValue) -> f32 {
    match value {
        FieldValue::Hash(h) => (h & 255) as f32 * (1.0 / 255.0),
        FieldValue::Noise(n) => n,
    }
}

/// One pixel per sample. Column `u` is the x coordinate and row `v` is the y coordinate.
pub fn field_image(output: &FieldOutput) -> GrayImage {
    let resolution = output.resolution();
    GrayImage::from_fn(resolution, resolution, |u, v| {
        Luma([output.grid_value(u, v).map(value_to_luma).unwrap_or(0)])
    })
}

pub fn displaced_positions(output: &FieldOutput, displacement: f32) -> Vec<Vec3> {
    output
        .positions()
        .iter()
        .zip(output.normals())
        .enumerate()
        .map(|(i, (position, normal))| {
            let offset = output.value(i).map(value_to_offset).unwrap_or(0.0);
            *position + *normal * (offset * displacement)
        })
        .collect()
}

/// Write every sample as a CSV row: displaced position, normal, and raw value.
pub fn write_points_csv(
    output: &FieldOutput,
    displacement: f32,
    mut dst: impl Write,
) -> io::Result<()> {
    writeln!(dst, "x,y,z,nx,ny,nz,value")?;
    let displaced = displaced_positions(output, displacement);
    for (i, (position, normal)) in displaced.iter().zip(output.normals()).enumerate() {
        write!(
            dst,
            "{},{},{},{},{},{},",
            position.x, position.y, position.z, normal.x, normal.y, normal.z
        )?;
        match output.value(i) {
            Some(FieldValue::Hash(h)) => writeln!(dst, "{h}")?,
            Some(FieldValue::Noise(n)) => writeln!(dst, "{n}")?,
            None => writeln!(dst)?,
        }
    }
    Ok(())
}
