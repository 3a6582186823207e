use std::{
    fs,
    io::{self, BufWriter, Write},
    path::PathBuf,
    time::Instant,
};

use clap::{
    Arg, ArgAction, ArgGroup, ValueEnum,
    builder::{EnumValueParser, PathBufValueParser, PossibleValue},
    command,
};
use color_eyre::eyre::{Report, Result, WrapErr};
use console::{Term, style};
use latticefield::{
    FieldPass, FieldSettings, NoiseDimensions, OutputKind, ParseSettingsError, ShapeKind,
    SpaceTrs, Vec3,
};
use latticefield_cli::{
    render::{field_image, write_points_csv},
    summary::FieldSummary,
};
use log::info;

fn parse_settings(json: &str) -> Result<FieldSettings, ParseSettingsError> {
    FieldSettings::from_json(json)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShapeArg(ShapeKind);

impl ValueEnum for ShapeArg {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self(ShapeKind::Plane),
            Self(ShapeKind::Sphere),
            Self(ShapeKind::Torus),
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(PossibleValue::new(self.0.name()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputKindArg(OutputKind);

impl ValueEnum for OutputKindArg {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self(OutputKind::Hash), Self(OutputKind::Noise)]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(
            PossibleValue::new(self.0.name()).help(match self.0 {
                OutputKind::Hash => "Raw hash of the lattice cell containing each sample.",
                OutputKind::Noise => "Smoothed value noise in [-1, 1].",
            }),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DimensionsArg(NoiseDimensions);

impl ValueEnum for DimensionsArg {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self(NoiseDimensions::One),
            Self(NoiseDimensions::Two),
            Self(NoiseDimensions::Three),
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(match self.0 {
            NoiseDimensions::One => PossibleValue::new("1"),
            NoiseDimensions::Two => PossibleValue::new("2"),
            NoiseDimensions::Three => PossibleValue::new("3"),
        })
    }
}

macro_rules! warn {
    ($dst:expr, $($arg:tt)*) => {
        writeln!(
            $dst,
            "{}",
            style(format!($($arg)*)).yellow()
        )
    }
}

pub fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let command = command!()
        .name("latticefield")
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(PathBufValueParser::new())
                .help("Path of the PNG image to write, one pixel per sample."),
        )
        .arg(
            Arg::new("points")
                .long("points")
                .value_parser(PathBufValueParser::new())
                .help("Path of a CSV file to write displaced sample positions, normals, and values to."),
        )
        .arg(
            Arg::new("displacement")
                .long("displacement")
                .value_parser(clap::value_parser!(f32))
                .default_value("0.1")
                .help("How far each exported point is pushed along its normal, per unit of value."),
        )
        .arg(
            Arg::new("overwrite")
                .short('y')
                .long("overwrite")
                .action(ArgAction::SetTrue)
                .help("Overwrite output files that already exist."),
        )
        .arg(
            Arg::new("settings-path")
                .short('p')
                .long("settings-path")
                .value_parser(PathBufValueParser::new())
                .help("Path to a JSON settings preset.")
                .conflicts_with("settings-json"),
        )
        .arg(
            Arg::new("settings-json")
                .short('j')
                .long("settings-json")
                .help("JSON string for a settings preset.")
                .conflicts_with("settings-path")
                .value_parser(parse_settings),
        )
        .group(ArgGroup::new("settings").args(["settings-path", "settings-json"]))
        .arg(
            Arg::new("dump-settings")
                .long("dump-settings")
                .action(ArgAction::SetTrue)
                .help("Print the final settings as a JSON preset and exit."),
        )
        .next_help_heading("Overrides")
        .arg(
            Arg::new("resolution")
                .short('r')
                .long("resolution")
                .value_parser(clap::value_parser!(u32).range(1..=latticefield::MAX_RESOLUTION as i64))
                .help("Number of samples along each side of the grid."),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_parser(clap::value_parser!(i32))
                .allow_negative_numbers(true)
                .help("Seed for the hash."),
        )
        .arg(
            Arg::new("shape")
                .long("shape")
                .value_parser(EnumValueParser::<ShapeArg>::new())
                .help("Surface to place the samples on."),
        )
        .arg(
            Arg::new("output-kind")
                .long("output-kind")
                .value_parser(EnumValueParser::<OutputKindArg>::new())
                .help("What to compute at each sample."),
        )
        .arg(
            Arg::new("dimensions")
                .long("dimensions")
                .value_parser(EnumValueParser::<DimensionsArg>::new())
                .help("Number of axes the noise varies along."),
        )
        .arg(
            Arg::new("noise-scale")
                .long("noise-scale")
                .value_parser(clap::value_parser!(f32))
                .help("Uniform scale of the noise domain. Larger values give finer detail."),
        )
        .arg(
            Arg::new("groups-per-task")
                .long("groups-per-task")
                .value_parser(clap::value_parser!(u32).range(1..))
                .help("Lane groups handled by each worker task."),
        );

    let matches = command.get_matches();

    let mut settings = if let Some(settings_path) = matches.get_one::<PathBuf>("settings-path") {
        parse_settings(
            std::str::from_utf8(&fs::read(settings_path).wrap_err("Failed to open settings file")?)
                .wrap_err("Settings file is not valid UTF-8")?,
        )
        .wrap_err("Failed to parse settings file")?
    } else if let Some(settings) = matches.get_one::<FieldSettings>("settings-json") {
        settings.clone()
    } else {
        FieldSettings::default()
    };

    if let Some(resolution) = matches.get_one::<u32>("resolution") {
        settings.resolution = *resolution;
    }
    if let Some(seed) = matches.get_one::<i32>("seed") {
        settings.seed = *seed;
    }
    if let Some(shape) = matches.get_one::<ShapeArg>("shape") {
        settings.shape = shape.0;
    }
    if let Some(output_kind) = matches.get_one::<OutputKindArg>("output-kind") {
        settings.output_kind = output_kind.0;
    }
    if let Some(dimensions) = matches.get_one::<DimensionsArg>("dimensions") {
        settings.noise_dimensions = dimensions.0;
    }
    if let Some(scale) = matches.get_one::<f32>("noise-scale") {
        settings.noise_transform = SpaceTrs {
            scale: Vec3::splat(*scale),
            ..settings.noise_transform
        };
    }
    if let Some(groups) = matches.get_one::<u32>("groups-per-task") {
        settings.groups_per_task = Some(*groups);
    }

    if matches.get_flag("dump-settings") {
        let mut out = io::stdout().lock();
        settings
            .write_json_to_io(&mut out)
            .map_err(|err| Report::msg(err.to_string()))?;
        writeln!(out)?;
        return Ok(());
    }

    let output_path = matches.get_one::<PathBuf>("output");
    let points_path = matches.get_one::<PathBuf>("points");
    let displacement = *matches
        .get_one::<f32>("displacement")
        .expect("displacement has a default");
    let overwrite = matches.get_flag("overwrite");

    for path in output_path.iter().chain(points_path.iter()) {
        let metadata = fs::metadata(path);
        if metadata.as_ref().is_ok_and(|metadata| metadata.is_dir()) {
            return Err(Report::msg(format!(
                "Output path {} is a folder",
                path.to_string_lossy()
            )));
        }
        if metadata.is_ok() && !overwrite {
            return Err(Report::msg(format!(
                "{} already exists. Pass --overwrite to replace it.",
                path.to_string_lossy()
            )));
        }
    }

    let mut term = Term::buffered_stdout();

    if let Some(path) = output_path
        && path
            .extension()
            .is_none_or(|extension| !extension.eq_ignore_ascii_case("png"))
    {
        warn!(
            term,
            "Warning: {} does not end in .png, but a PNG image will be written to it.",
            path.to_string_lossy()
        )?;
    }

    let pass = FieldPass::new(settings).wrap_err("Invalid settings")?;
    let start = Instant::now();
    let output = pass.run()?;
    let elapsed = start.elapsed();
    info!("pass finished in {elapsed:?}");

    let summary = FieldSummary::new(&output);
    writeln!(
        term,
        "{} {} samples on a {} in {:.2} ms",
        style("Evaluated").green().bold(),
        summary.sample_count,
        pass.settings().shape.name(),
        elapsed.as_secs_f64() * 1000.0
    )?;
    let (min, max) = summary.bounds;
    writeln!(term, "  bounds: {min} .. {max}")?;
    if let Some((min, max, mean)) = summary.noise_range {
        writeln!(term, "  noise: min {min:.4}, max {max:.4}, mean {mean:.4}")?;
    }
    if let Some(distinct) = summary.distinct_hashes {
        writeln!(term, "  hashes: {distinct} distinct values")?;
    }

    if let Some(path) = output_path {
        field_image(&output)
            .save_with_format(path, image::ImageFormat::Png)
            .wrap_err("Failed to write image")?;
        writeln!(term, "Wrote image to {}", path.to_string_lossy())?;
    }
    if let Some(path) = points_path {
        let file = fs::File::create(path).wrap_err("Failed to create points file")?;
        let mut writer = BufWriter::new(file);
        write_points_csv(&output, displacement, &mut writer).wrap_err("Failed to write points")?;
        writer.flush()?;
        writeln!(term, "Wrote points to {}", path.to_string_lossy())?;
    }
    term.flush()?;

    Ok(())
}
