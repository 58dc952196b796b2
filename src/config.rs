use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::pooling::PoolingMethod;
use crate::quality::{PixelFormat, QualityRunner};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Stop at the first failed ffmpeg or ffprobe invocation
    #[default]
    Abort,
    /// Log the failure and carry on with the remaining files
    Continue,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Metric {
    Vmaf,
    VmafPhone,
    Psnr,
    Ssim,
    MsSsim,
    All,
}

impl Metric {
    #[must_use]
    pub fn runners(&self) -> Vec<QualityRunner> {
        match self {
            Self::Vmaf => vec![QualityRunner::Vmaf],
            Self::VmafPhone => vec![QualityRunner::VmafPhone],
            Self::Psnr => vec![QualityRunner::Psnr],
            Self::Ssim => vec![QualityRunner::Ssim],
            Self::MsSsim => vec![QualityRunner::MsSsim],
            Self::All => QualityRunner::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// ffmpeg binary used for transcoding and quality measurement
    #[arg(long, global = true, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// ffprobe binary used for metadata extraction
    #[arg(long, global = true, default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    /// What to do when an external tool fails while processing a batch
    #[arg(long, global = true, value_enum, default_value_t = FailurePolicy::Abort)]
    pub on_failure: FailurePolicy,

    /// Overwrite existing output files instead of failing
    #[arg(long, global = true)]
    pub overwrite: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Command {
    /// Resize a single video or every video in a directory
    Resize(ResizeArgs),

    /// Print duration, bitrate, size and dimensions of a video
    Probe(ProbeArgs),

    /// Split a video into fixed-duration chunks
    Split(SplitArgs),

    /// Compare a distorted video against its reference
    Quality(QualityArgs),
}

#[derive(Clone, Args, Debug)]
pub struct ResizeArgs {
    /// Resize every file directly inside this directory
    #[arg(short, long, conflicts_with_all = ["input", "output"])]
    pub directory: Option<PathBuf>,

    /// Video file to resize
    #[arg(required_unless_present = "directory")]
    pub input: Option<PathBuf>,

    /// Output file (defaults to the input name with a resolution suffix)
    pub output: Option<PathBuf>,

    /// Target width; -2 keeps the aspect ratio with an even width
    #[arg(long, default_value_t = -2, allow_negative_numbers = true)]
    pub width: i32,

    /// Target height
    #[arg(long, default_value_t = 1440, allow_negative_numbers = true)]
    pub height: i32,
}

#[derive(Clone, Args, Debug)]
pub struct ProbeArgs {
    /// Video file to inspect
    pub input: PathBuf,

    /// Print the metadata as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Args, Debug)]
pub struct SplitArgs {
    /// Video file to split
    pub input: PathBuf,

    /// Chunk duration in seconds
    #[arg(short, long, default_value_t = 10.0)]
    pub chunk_size: f64,

    /// Print the produced chunks as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Args, Debug)]
pub struct QualityArgs {
    /// Reference (pristine) video
    pub reference: PathBuf,

    /// Distorted (compressed or rescaled) video
    pub distorted: PathBuf,

    /// Width both videos are compared at
    #[arg(long)]
    pub width: u32,

    /// Height both videos are compared at
    #[arg(long)]
    pub height: u32,

    /// Pixel format both videos are compared in
    #[arg(long, value_enum, default_value_t = PixelFormat::Yuv420p)]
    pub pixel_format: PixelFormat,

    /// Metric to compute
    #[arg(short, long, value_enum, default_value_t = Metric::All)]
    pub metric: Metric,

    /// Pooling method: mean, harmonic_mean, min, median, perc5, perc10 or perc20
    #[arg(short, long)]
    pub pool: Option<PoolingMethod>,

    /// Number of libvmaf threads (0 uses every available core)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Directory for libvmaf logs (defaults to the system temporary directory)
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Print the full report, including per-frame scores, as JSON
    #[arg(long)]
    pub json: bool,
}
