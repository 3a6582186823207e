//! The configuration record for a field pass, and its JSON preset format.
//!
//! Presets are flat JSON objects with a `version` key. Every other key is optional and falls back to the default, so
//! hand-written presets only need to mention what they change. Enums are stored as their integer values.

use std::collections::HashMap;

use glam::Vec3;
use num_traits::{FromPrimitive, ToPrimitive};
use snafu::Snafu;
pub use sval;
pub use sval_json;
use tinyjson::{InnerAsRef, JsonParseError, JsonValue};

use crate::{field::OutputKind, lattice::NoiseDimensions, shapes::ShapeKind, space_trs::SpaceTrs};

pub const SETTINGS_VERSION: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSettings {
    /// Side length of the sample grid.
    pub resolution: u32,
    pub seed: i32,
    pub shape: ShapeKind,
    /// Only used for noise output.
    pub noise_dimensions: NoiseDimensions,
    /// Maps canonical shape space into the space positions and normals are reported in.
    pub position_transform: SpaceTrs,
    /// Maps reported positions into the space that is hashed or sampled for noise.
    pub noise_transform: SpaceTrs,
    pub output_kind: OutputKind,
    /// Lane groups handled by each worker task. `None` splits the work evenly across the pool.
    pub groups_per_task: Option<u32>,
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self {
            resolution: 16,
            seed: 0,
            shape: ShapeKind::Plane,
            noise_dimensions: NoiseDimensions::Three,
            position_transform: SpaceTrs::IDENTITY,
            noise_transform: SpaceTrs::uniform_scale(8.0),
            output_kind: OutputKind::Noise,
            groups_per_task: None,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParseSettingsError {
    #[snafu(display("Error parsing JSON: {error}"))]
    InvalidJson { error: JsonParseError },

    #[snafu(display("Setting {key} should be a {expected}"))]
    InvalidSettingType { key: String, expected: &'static str },

    #[snafu(display("Missing field: {field}"))]
    MissingField { field: &'static str },

    #[snafu(display("Unsupported settings version: {version}"))]
    UnsupportedVersion { version: f64 },

    #[snafu(display("Setting {key} has an invalid value: {value}"))]
    InvalidValue { key: String, value: f64 },
}

/// Convenience trait for asserting the "shape" of the JSON we're parsing is what we expect.
trait GetAndExpect {
    fn get_and_expect<T: InnerAsRef + Clone>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ParseSettingsError>;
}

impl GetAndExpect for HashMap<String, JsonValue> {
    fn get_and_expect<T: InnerAsRef + Clone>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ParseSettingsError> {
        self.get(key)
            .map(|v| {
                v.get::<T>()
                    .cloned()
                    .ok_or_else(|| ParseSettingsError::InvalidSettingType {
                        key: key.to_owned(),
                        expected: std::any::type_name::<T>(),
                    })
            })
            .transpose()
    }
}

fn integer<T: FromPrimitive>(key: &str, value: f64) -> Result<T, ParseSettingsError> {
    if value.fract() != 0.0 {
        return InvalidValueSnafu { key, value }.fail();
    }
    T::from_f64(value).ok_or_else(|| ParseSettingsError::InvalidValue {
        key: key.to_owned(),
        value,
    })
}

fn vec3(key: &str, value: &JsonValue) -> Result<Vec3, ParseSettingsError> {
    let wrong_type = || ParseSettingsError::InvalidSettingType {
        key: key.to_owned(),
        expected: "array of 3 numbers",
    };
    let items = value.get::<Vec<JsonValue>>().ok_or_else(wrong_type)?;
    if items.len() != 3 {
        return Err(wrong_type());
    }
    let mut out = [0.0f32; 3];
    for (dst, item) in out.iter_mut().zip(items) {
        *dst = *item.get::<f64>().ok_or_else(wrong_type)? as f32;
    }
    Ok(Vec3::from_array(out))
}

fn space_trs_from_json(
    key: &str,
    value: &JsonValue,
    defaults: SpaceTrs,
) -> Result<SpaceTrs, ParseSettingsError> {
    let map = value
        .get::<HashMap<String, JsonValue>>()
        .ok_or_else(|| ParseSettingsError::InvalidSettingType {
            key: key.to_owned(),
            expected: "object",
        })?;

    let mut trs = defaults;
    if let Some(v) = map.get("translation") {
        trs.translation = vec3(&format!("{key}.translation"), v)?;
    }
    if let Some(v) = map.get("rotation") {
        trs.rotation = vec3(&format!("{key}.rotation"), v)?;
    }
    if let Some(v) = map.get("scale") {
        // A single number scales all axes alike.
        trs.scale = match v.get::<f64>() {
            Some(uniform) => Vec3::splat(*uniform as f32),
            None => vec3(&format!("{key}.scale"), v)?,
        };
    }
    Ok(trs)
}

impl FieldSettings {
    /// Parse a JSON preset. Keys that are absent keep their default values.
    pub fn from_json(json: &str) -> Result<Self, ParseSettingsError> {
        let parsed = json
            .parse::<JsonValue>()
            .map_err(|error| ParseSettingsError::InvalidJson { error })?;
        let map = parsed.get::<HashMap<String, JsonValue>>().ok_or_else(|| {
            ParseSettingsError::InvalidSettingType {
                key: "<root>".to_string(),
                expected: "object",
            }
        })?;

        let version = map
            .get_and_expect::<f64>("version")?
            .ok_or(ParseSettingsError::MissingField { field: "version" })?;
        if version != SETTINGS_VERSION {
            return UnsupportedVersionSnafu { version }.fail();
        }

        let mut settings = Self::default();

        if let Some(n) = map.get_and_expect::<f64>("resolution")? {
            settings.resolution = integer("resolution", n)?;
        }
        if let Some(n) = map.get_and_expect::<f64>("seed")? {
            settings.seed = integer("seed", n)?;
        }
        if let Some(n) = map.get_and_expect::<f64>("shape")? {
            settings.shape = integer::<u32>("shape", n)
                .ok()
                .and_then(ShapeKind::from_u32)
                .ok_or_else(|| ParseSettingsError::InvalidValue {
                    key: "shape".to_string(),
                    value: n,
                })?;
        }
        if let Some(n) = map.get_and_expect::<f64>("noise_dimensions")? {
            settings.noise_dimensions = integer::<u32>("noise_dimensions", n)
                .ok()
                .and_then(NoiseDimensions::from_u32)
                .ok_or_else(|| ParseSettingsError::InvalidValue {
                    key: "noise_dimensions".to_string(),
                    value: n,
                })?;
        }
        if let Some(n) = map.get_and_expect::<f64>("output_kind")? {
            settings.output_kind = integer::<u32>("output_kind", n)
                .ok()
                .and_then(OutputKind::from_u32)
                .ok_or_else(|| ParseSettingsError::InvalidValue {
                    key: "output_kind".to_string(),
                    value: n,
                })?;
        }
        match map.get("groups_per_task") {
            None | Some(JsonValue::Null) => {}
            Some(v) => {
                let n = v
                    .get::<f64>()
                    .ok_or_else(|| ParseSettingsError::InvalidSettingType {
                        key: "groups_per_task".to_string(),
                        expected: "number or null",
                    })?;
                let groups: u32 = integer("groups_per_task", *n)?;
                if groups == 0 {
                    return InvalidValueSnafu {
                        key: "groups_per_task",
                        value: *n,
                    }
                    .fail();
                }
                settings.groups_per_task = Some(groups);
            }
        }
        if let Some(v) = map.get("position_transform") {
            settings.position_transform =
                space_trs_from_json("position_transform", v, settings.position_transform)?;
        }
        if let Some(v) = map.get("noise_transform") {
            settings.noise_transform =
                space_trs_from_json("noise_transform", v, settings.noise_transform)?;
        }

        Ok(settings)
    }

    pub fn write_json_to_fmt(&self, dst: impl std::fmt::Write) -> Result<(), sval_json::Error> {
        sval_json::stream_to_fmt_write(dst, self)
    }

    pub fn write_json_to_io(&self, dst: impl std::io::Write) -> Result<(), sval_json::Error> {
        sval_json::stream_to_io_write(dst, self)
    }

    pub fn to_json_string(&self) -> Result<String, sval_json::Error> {
        let mut out = String::new();
        self.write_json_to_fmt(&mut out)?;
        Ok(out)
    }
}

fn stream_key<'sval, S: sval::Stream<'sval> + ?Sized>(
    stream: &mut S,
    key: &'static str,
) -> sval::Result {
    stream.map_key_begin()?;
    stream.text_begin(Some(key.len()))?;
    stream.text_fragment(key)?;
    stream.text_end()?;
    stream.map_key_end()
}

fn stream_vec3<'sval, S: sval::Stream<'sval> + ?Sized>(stream: &mut S, v: Vec3) -> sval::Result {
    stream.seq_begin(Some(3))?;
    for component in v.to_array() {
        stream.seq_value_begin()?;
        stream.f32(component)?;
        stream.seq_value_end()?;
    }
    stream.seq_end()
}

impl sval::Value for SpaceTrs {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        stream.map_begin(Some(3))?;
        for (key, value) in [
            ("translation", self.translation),
            ("rotation", self.rotation),
            ("scale", self.scale),
        ] {
            stream_key(stream, key)?;
            stream.map_value_begin()?;
            stream_vec3(stream, value)?;
            stream.map_value_end()?;
        }
        stream.map_end()
    }
}

impl sval::Value for FieldSettings {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        stream.map_begin(None)?;

        stream_key(stream, "version")?;
        stream.map_value_begin()?;
        stream.u32(SETTINGS_VERSION as u32)?;
        stream.map_value_end()?;

        for (key, value) in [
            ("resolution", self.resolution as i64),
            ("seed", self.seed as i64),
            ("shape", self.shape.to_i64().unwrap_or_default()),
            (
                "noise_dimensions",
                self.noise_dimensions.to_i64().unwrap_or_default(),
            ),
            ("output_kind", self.output_kind.to_i64().unwrap_or_default()),
        ] {
            stream_key(stream, key)?;
            stream.map_value_begin()?;
            stream.i64(value)?;
            stream.map_value_end()?;
        }

        stream_key(stream, "groups_per_task")?;
        stream.map_value_begin()?;
        match self.groups_per_task {
            Some(n) => stream.u32(n)?,
            None => stream.null()?,
        }
        stream.map_value_end()?;

        stream_key(stream, "position_transform")?;
        stream.map_value_begin()?;
        sval::Value::stream(&self.position_transform, stream)?;
        stream.map_value_end()?;

        stream_key(stream, "noise_transform")?;
        stream.map_value_begin()?;
        sval::Value::stream(&self.noise_transform, stream)?;
        stream.map_value_end()?;

        stream.map_end()
    }
}
