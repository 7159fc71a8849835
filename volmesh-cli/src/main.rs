//! `volmesh`: mesh one raw voxel volume into an OBJ file
//!
//! The input is a headerless C-ordered `(Z, Y, X)` array in native byte
//! order. Placement comes from an optional TOML metadata sidecar, and any
//! command line values override it.

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::Pod;
use clap::{ArgAction, Parser, ValueEnum};
use ndarray::Array3;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use volmesh_core::{select_label, BoundingBox, PipelineConfig, StackMetadata, Voxel};
use volmesh_reconstruction::MeshPipeline;
use volmesh_simplification::{PipeStreamer, DEFAULT_SIMPLIFIER};

/// Element type of the raw input volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Dtype {
    U8,
    U16,
    U32,
    U64,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dtype::U8 => "u8",
            Dtype::U16 => "u16",
            Dtype::U32 => "u32",
            Dtype::U64 => "u64",
        };
        f.write_str(name)
    }
}

/// Convert a segmented voxel volume into a (optionally simplified) OBJ mesh
#[derive(Parser, Debug)]
#[command(name = "volmesh", version, about, long_about = None)]
struct Cli {
    /// Raw volume file
    input: PathBuf,

    /// Volume shape
    #[arg(long, num_args = 3, value_names = ["Z", "Y", "X"], required = true)]
    shape: Vec<usize>,

    /// Voxel element type
    #[arg(long, value_enum, default_value_t = Dtype::U8)]
    dtype: Dtype,

    /// Mesh only the voxels carrying this label; otherwise every nonzero voxel
    #[arg(long)]
    label: Option<u64>,

    /// Output OBJ path
    #[arg(short, long)]
    output: PathBuf,

    /// Crop box instead of the computed foreground box, max exclusive
    #[arg(long, num_args = 6, value_names = ["Z0", "Z1", "Y0", "Y1", "X0", "X1"])]
    bbox: Option<Vec<usize>>,

    /// Downsample factor of the volume relative to full resolution
    #[arg(long)]
    downsample: Option<f64>,

    /// Global offset added to every vertex, in output units
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
    offset: Option<Vec<f64>>,

    /// Smoothing iterations for the isosurface
    #[arg(long)]
    smoothing: Option<usize>,

    /// Fraction of faces to keep after simplification
    #[arg(long)]
    simplify: Option<f64>,

    /// Simplifier executable
    #[arg(long, default_value = DEFAULT_SIMPLIFIER)]
    simplifier: PathBuf,

    /// Kill the simplifier after this many seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// TOML sidecar with `offset` and `downsample_factor`
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn dims(&self) -> (usize, usize, usize) {
        (self.shape[0], self.shape[1], self.shape[2])
    }

    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.metadata {
            Some(path) => {
                let metadata = StackMetadata::load(path)
                    .with_context(|| format!("failed to load metadata from {}", path.display()))?;
                PipelineConfig::from_metadata(&metadata)
            }
            None => PipelineConfig::default(),
        };

        if let Some(factor) = self.downsample {
            config = config.with_downsample_factor(factor);
        }
        if let Some(offset) = &self.offset {
            config = config.with_offset([offset[0], offset[1], offset[2]]);
        }
        if let Some(iterations) = self.smoothing {
            config = config.with_smoothing_iterations(iterations);
        }
        if let Some(ratio) = self.simplify {
            config = config.with_simplify_ratio(ratio);
        }
        config.validate()?;
        Ok(config)
    }

    fn crop_box(&self) -> Option<BoundingBox> {
        self.bbox
            .as_ref()
            .map(|b| BoundingBox::new(b[0]..b[1], b[2]..b[3], b[4]..b[5]))
    }

    fn streamer(&self) -> Result<PipeStreamer> {
        let mut streamer = PipeStreamer::new(&self.simplifier);
        if let Some(seconds) = self.timeout {
            let limit = Duration::try_from_secs_f64(seconds)
                .map_err(|e| anyhow!("invalid timeout {seconds}: {e}"))?;
            streamer = streamer.with_timeout(limit);
        }
        Ok(streamer)
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read a headerless native-endian volume of `dims` elements
fn read_raw_volume<T: Pod>(path: &Path, dims: (usize, usize, usize)) -> Result<Array3<T>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let expected = dims
        .0
        .checked_mul(dims.1)
        .and_then(|n| n.checked_mul(dims.2))
        .and_then(|n| n.checked_mul(std::mem::size_of::<T>()))
        .with_context(|| format!("shape {dims:?} is too large"))?;
    if bytes.len() != expected {
        bail!(
            "{} holds {} bytes, shape {:?} needs {}",
            path.display(),
            bytes.len(),
            dims,
            expected
        );
    }
    let values: Vec<T> = bytemuck::pod_collect_to_vec(&bytes);
    Ok(Array3::from_shape_vec(dims, values)?)
}

fn mesh_volume<T>(cli: &Cli) -> Result<()>
where
    T: Voxel + Pod + TryFrom<u64>,
{
    let volume = read_raw_volume::<T>(&cli.input, cli.dims())?;
    let config = cli.pipeline_config()?;
    let pipeline = MeshPipeline::with_simplifier(cli.streamer()?);
    tracing::info!(input = %cli.input.display(), shape = ?cli.dims(), dtype = %cli.dtype, "loaded volume");

    let written = match cli.label {
        Some(label) => {
            let label = T::try_from(label)
                .map_err(|_| anyhow!("label {label} does not fit in {}", cli.dtype))?;
            let mask = select_label(volume.view(), label);
            pipeline.run_to_path(mask.view(), cli.crop_box(), &config, &cli.output)
        }
        None => pipeline.run_to_path(volume.view(), cli.crop_box(), &config, &cli.output),
    };
    written.with_context(|| format!("failed to mesh {}", cli.input.display()))
}

fn run(cli: &Cli) -> Result<()> {
    match cli.dtype {
        Dtype::U8 => mesh_volume::<u8>(cli),
        Dtype::U16 => mesh_volume::<u16>(cli),
        Dtype::U32 => mesh_volume::<u32>(cli),
        Dtype::U64 => mesh_volume::<u64>(cli),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(&cli)
}
