// cli.rs — Command-line interface.
//
//   cone-stipple [-n samples] [-r radius%] [-i iterations] [-o out.svg] <image>
//
// Every range check happens in clap's value parsers, so a bad argument is
// reported with usage before any image is decoded or GPU work starts.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{
    Config, ConfigError, Normalization, RunMode, Seeding, DEFAULT_RESOLUTION, DEFAULT_SITES, MAX_RESOLUTION,
    MAX_SITES, MIN_RESOLUTION,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliNormalization {
    /// (i + 0.5) / size
    Size,
    /// i / (size - 1)
    SizeMinusOne,
}

impl From<CliNormalization> for Normalization {
    fn from(value: CliNormalization) -> Self {
        match value {
            CliNormalization::Size => Normalization::Size,
            CliNormalization::SizeMinusOne => Normalization::SizeMinusOne,
        }
    }
}

/// Weighted Voronoi stippling on the GPU
#[derive(Parser, Debug)]
#[command(name = "cone-stipple", version, about)]
pub struct Cli {
    /// Number of stipples
    #[arg(
        short = 'n',
        long = "samples",
        default_value_t = DEFAULT_SITES,
        value_parser = clap::value_parser!(u32).range(1..=MAX_SITES as i64)
    )]
    pub samples: u32,

    /// Stipple radius in percent of the shorter image side
    #[arg(short = 'r', long = "radius", default_value_t = 1.0, value_parser = parse_radius)]
    pub radius: f32,

    /// Iterations to run; negative opens a preview window and runs until it is closed
    #[arg(short = 'i', long = "iterations", default_value_t = -1, allow_negative_numbers = true)]
    pub iterations: i64,

    /// Output SVG file (batch mode writes to stdout without it)
    #[arg(short = 'o', long = "output", value_name = "FILE", value_parser = parse_svg_path)]
    pub output: Option<PathBuf>,

    /// Input image (any format the `image` crate decodes)
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Random seed for the initial sites
    #[arg(long)]
    pub seed: Option<u64>,

    /// Cone tessellation (rim segments)
    #[arg(
        long,
        default_value_t = DEFAULT_RESOLUTION,
        value_parser = clap::value_parser!(u32).range(MIN_RESOLUTION as i64..=MAX_RESOLUTION as i64)
    )]
    pub resolution: u32,

    /// Place initial sites uniformly instead of following the image
    #[arg(long)]
    pub uniform_seeding: bool,

    /// Minimum weight of white pixels, in [0, 1]
    #[arg(long, default_value_t = 0.0, value_parser = parse_unit_interval)]
    pub weight_floor: f32,

    /// How pixel coordinates are mapped into [0, 1]
    #[arg(long, value_enum, default_value_t = CliNormalization::Size)]
    pub normalization: CliNormalization,
}

impl Cli {
    /// Build the run configuration for a decoded image of the given size.
    pub fn into_config(self, width: u32, height: u32) -> Result<Config, ConfigError> {
        let seeding = if self.uniform_seeding { Seeding::Uniform } else { Seeding::Weighted };
        let seed = self.seed.unwrap_or_else(rand::random);
        log::info!("seed {seed}");
        Ok(Config::new(width, height, self.samples)?
            .with_base_radius(self.radius * 0.01)?
            .with_resolution(self.resolution)?
            .with_weight_floor(self.weight_floor)?
            .with_normalization(self.normalization.into())
            .with_seeding(seeding, seed)
            .with_mode(RunMode::from_iterations(self.iterations))
            .with_output(self.output))
    }
}

fn parse_radius(s: &str) -> Result<f32, String> {
    let r: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if !r.is_finite() || r < 0.0 {
        return Err(format!("radius must be a finite number >= 0 (got {s})"));
    }
    Ok(r)
}

fn parse_unit_interval(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(format!("expected a value in [0, 1] (got {s})"));
    }
    Ok(v)
}

fn parse_svg_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("svg") => Ok(path),
        _ => Err(format!("output file must have a .svg extension (got {s})")),
    }
}
