use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::ffmpeg::Tools;
use crate::pooling::{aggregate, PoolingError, PoolingMethod};
use crate::util::verify_directory;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PixelFormat {
    #[value(name = "yuv420p")]
    Yuv420p,
    #[value(name = "yuv422p")]
    Yuv422p,
    #[value(name = "yuv444p")]
    Yuv444p,
    #[value(name = "yuv420p10le")]
    Yuv420p10le,
    #[value(name = "yuv422p10le")]
    Yuv422p10le,
    #[value(name = "yuv444p10le")]
    Yuv444p10le,
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Yuv420p => write!(f, "yuv420p"),
            Self::Yuv422p => write!(f, "yuv422p"),
            Self::Yuv444p => write!(f, "yuv444p"),
            Self::Yuv420p10le => write!(f, "yuv420p10le"),
            Self::Yuv422p10le => write!(f, "yuv422p10le"),
            Self::Yuv444p10le => write!(f, "yuv444p10le"),
        }
    }
}

const VMAF_FEATURES: [(&str, &str); 6] = [
    ("integer_adm2", "VMAF_feature_adm2_scores"),
    ("integer_motion2", "VMAF_feature_motion2_scores"),
    ("integer_vif_scale0", "VMAF_feature_vif_scale0_scores"),
    ("integer_vif_scale1", "VMAF_feature_vif_scale1_scores"),
    ("integer_vif_scale2", "VMAF_feature_vif_scale2_scores"),
    ("integer_vif_scale3", "VMAF_feature_vif_scale3_scores"),
];

const PSNR_FEATURES: [(&str, &str); 2] = [
    ("psnr_cb", "PSNR_feature_psnr_cb_scores"),
    ("psnr_cr", "PSNR_feature_psnr_cr_scores"),
];

const SSIM_FEATURES: [(&str, &str); 3] = [
    ("float_ssim_l", "SSIM_feature_ssim_l_scores"),
    ("float_ssim_c", "SSIM_feature_ssim_c_scores"),
    ("float_ssim_s", "SSIM_feature_ssim_s_scores"),
];

const MS_SSIM_FEATURES: [(&str, &str); 15] = [
    ("float_ms_ssim_l_scale0", "MS_SSIM_feature_ms_ssim_l_scale0_scores"),
    ("float_ms_ssim_c_scale0", "MS_SSIM_feature_ms_ssim_c_scale0_scores"),
    ("float_ms_ssim_s_scale0", "MS_SSIM_feature_ms_ssim_s_scale0_scores"),
    ("float_ms_ssim_l_scale1", "MS_SSIM_feature_ms_ssim_l_scale1_scores"),
    ("float_ms_ssim_c_scale1", "MS_SSIM_feature_ms_ssim_c_scale1_scores"),
    ("float_ms_ssim_s_scale1", "MS_SSIM_feature_ms_ssim_s_scale1_scores"),
    ("float_ms_ssim_l_scale2", "MS_SSIM_feature_ms_ssim_l_scale2_scores"),
    ("float_ms_ssim_c_scale2", "MS_SSIM_feature_ms_ssim_c_scale2_scores"),
    ("float_ms_ssim_s_scale2", "MS_SSIM_feature_ms_ssim_s_scale2_scores"),
    ("float_ms_ssim_l_scale3", "MS_SSIM_feature_ms_ssim_l_scale3_scores"),
    ("float_ms_ssim_c_scale3", "MS_SSIM_feature_ms_ssim_c_scale3_scores"),
    ("float_ms_ssim_s_scale3", "MS_SSIM_feature_ms_ssim_s_scale3_scores"),
    ("float_ms_ssim_l_scale4", "MS_SSIM_feature_ms_ssim_l_scale4_scores"),
    ("float_ms_ssim_c_scale4", "MS_SSIM_feature_ms_ssim_c_scale4_scores"),
    ("float_ms_ssim_s_scale4", "MS_SSIM_feature_ms_ssim_s_scale4_scores"),
];

/// Characters that end or escape a value inside an FFmpeg filtergraph.
const FILTER_SPECIAL_CHARACTERS: [char; 7] = [':', '\'', '\\', ',', ';', '[', ']'];

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityRunner {
    Vmaf,
    VmafPhone,
    Psnr,
    Ssim,
    MsSsim,
}

impl QualityRunner {
    pub const ALL: [Self; 5] = [
        Self::Vmaf,
        Self::Psnr,
        Self::VmafPhone,
        Self::Ssim,
        Self::MsSsim,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vmaf => "vmaf",
            Self::VmafPhone => "vmaf_phone",
            Self::Psnr => "psnr",
            Self::Ssim => "ssim",
            Self::MsSsim => "ms_ssim",
        }
    }

    /// Options appended to the `libvmaf` filter.
    #[must_use]
    pub const fn filter_options(self) -> &'static str {
        match self {
            Self::Vmaf => "model='version=vmaf_v0.6.1\\:name=vmaf'",
            Self::VmafPhone => {
                "model='version=vmaf_v0.6.1\\:name=vmaf_phone\\:enable_transform=true'"
            }
            Self::Psnr => "feature=name=psnr",
            Self::Ssim => "feature=name=float_ssim\\:enable_lcs=true",
            Self::MsSsim => "feature=name=float_ms_ssim\\:enable_lcs=true",
        }
    }

    /// libvmaf log metric holding the runner's score, and the key it is
    /// reported under.
    #[must_use]
    pub const fn primary(self) -> (&'static str, &'static str) {
        match self {
            Self::Vmaf => ("vmaf", "VMAF_scores"),
            Self::VmafPhone => ("vmaf_phone", "VMAF_Phone_scores"),
            Self::Psnr => ("psnr_y", "PSNR_scores"),
            Self::Ssim => ("float_ssim", "SSIM_scores"),
            Self::MsSsim => ("float_ms_ssim", "MS_SSIM_scores"),
        }
    }

    #[must_use]
    pub const fn features(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Vmaf | Self::VmafPhone => &VMAF_FEATURES,
            Self::Psnr => &PSNR_FEATURES,
            Self::Ssim => &SSIM_FEATURES,
            Self::MsSsim => &MS_SSIM_FEATURES,
        }
    }

    pub fn run(self, tools: &Tools, request: &QualityRequest) -> anyhow::Result<QualityResult> {
        verify_directory(&request.workdir).with_context(|| {
            format!("Unable to verify quality work directory {:?}", request.workdir)
        })?;

        let log_path = request.workdir.join(format!(
            "{}-{}.json",
            asset_id(&request.reference)?,
            self.name()
        ));

        if log_path.exists() {
            fs::remove_file(&log_path)
                .with_context(|| format!("Unable to remove stale libvmaf log {log_path:?}"))?;
        }

        info!(
            "Computing {} of {:?} against {:?}",
            self.name(),
            request.distorted,
            request.reference
        );

        let args = build_arguments(request, self, &log_path)
            .with_context(|| format!("Unable to build {} arguments", self.name()))?;

        tools
            .run_ffmpeg(&args)
            .with_context(|| format!("FFmpeg {} subprocess failed", self.name()))?;

        if !log_path.exists() {
            return Err(anyhow!(
                "FFmpeg {} subprocess did not write {log_path:?}",
                self.name()
            ));
        }

        let log_file = File::open(&log_path)
            .with_context(|| format!("Unable to open libvmaf log {log_path:?}"))?;

        let log: VmafLog = serde_json::from_reader(BufReader::new(log_file))
            .context("Unable to parse libvmaf JSON log file")?;

        let result = QualityResult::from_log(self, log)
            .with_context(|| format!("Unable to read {} scores from {log_path:?}", self.name()))?;

        fs::remove_file(&log_path).with_context(|| format!("Unable to remove {log_path:?}"))?;

        debug!("{} produced {} frames", self.name(), result.frames());

        Ok(result)
    }
}

impl fmt::Display for QualityRunner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug)]
pub struct QualityRequest {
    pub reference: PathBuf,
    pub distorted: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub threads: usize,
    pub workdir: PathBuf,
}

/// Stable identifier for an asset, derived from the reference file stem.
pub fn asset_id(reference: &Path) -> anyhow::Result<String> {
    let stem = reference
        .file_stem()
        .ok_or_else(|| anyhow!("{reference:?} has no file name"))?;

    let mut hasher = Sha256::new();
    hasher.update(stem.to_string_lossy().as_bytes());
    let result = hasher.finalize();

    let mut id = base16ct::lower::encode_string(&result);
    id.truncate(16);

    Ok(id)
}

fn is_raw_yuv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("yuv"))
}

fn push_input(args: &mut Vec<OsString>, path: &Path, request: &QualityRequest) {
    if is_raw_yuv(path) {
        args.push("-f".into());
        args.push("rawvideo".into());
        args.push("-pix_fmt".into());
        args.push(request.pixel_format.to_string().into());
        args.push("-s".into());
        args.push(format!("{}x{}", request.width, request.height).into());
    }

    args.push("-i".into());
    args.push(path.into());
}

/// Renders `path` for use as a filter option value, rejecting paths that
/// would need filtergraph escaping.
fn filter_path(path: &Path) -> anyhow::Result<&str> {
    let rendered = path
        .to_str()
        .ok_or_else(|| anyhow!("{path:?} is not valid UTF-8"))?;

    if let Some(character) = rendered
        .chars()
        .find(|character| FILTER_SPECIAL_CHARACTERS.contains(character))
    {
        return Err(anyhow!(
            "{path:?} contains '{character}', which cannot appear in a libvmaf log path"
        ));
    }

    Ok(rendered)
}

pub fn build_arguments(
    request: &QualityRequest,
    runner: QualityRunner,
    log_path: &Path,
) -> anyhow::Result<Vec<OsString>> {
    let log_path = filter_path(log_path)?;

    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-nostdin".into()];

    push_input(&mut args, &request.reference, request);
    push_input(&mut args, &request.distorted, request);

    let threads = if request.threads == 0 {
        std::thread::available_parallelism().map_or(1, usize::from)
    } else {
        request.threads
    };

    let normalize = format!(
        "scale={}:{}:flags=bicubic,format={},setpts=PTS-STARTPTS",
        request.width, request.height, request.pixel_format
    );

    let filters = [
        format!("[0:v]{normalize}[reference]"),
        format!("[1:v]{normalize}[distorted]"),
        format!(
            "[distorted][reference]libvmaf=log_fmt=json:log_path={log_path}:n_threads={threads}:{}",
            runner.filter_options()
        ),
    ];

    args.push("-lavfi".into());
    args.push(filters.join(";").into());
    args.push("-f".into());
    args.push("null".into());
    args.push("-".into());

    Ok(args)
}

#[derive(Deserialize)]
struct VmafLogFrame {
    metrics: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
struct VmafLog {
    frames: Vec<VmafLogFrame>,
}

/// Per-frame scores of one runner, keyed the way they are reported.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QualityResult {
    #[serde(skip)]
    runner: QualityRunner,
    scores: BTreeMap<String, Vec<f64>>,
}

impl QualityResult {
    fn from_log(runner: QualityRunner, log: VmafLog) -> anyhow::Result<Self> {
        if log.frames.is_empty() {
            return Err(anyhow!("libvmaf log contains no frames"));
        }

        let (primary_metric, primary_key) = runner.primary();

        let mut scores = BTreeMap::new();

        for (metric, key) in std::iter::once((primary_metric, primary_key))
            .chain(runner.features().iter().copied())
        {
            let values = log
                .frames
                .iter()
                .enumerate()
                .map(|(index, frame)| {
                    frame
                        .metrics
                        .get(metric)
                        .copied()
                        .ok_or_else(|| anyhow!("Frame {index} has no '{metric}' metric"))
                })
                .collect::<anyhow::Result<Vec<f64>>>()?;

            scores.insert(key.to_owned(), values);
        }

        Ok(Self { runner, scores })
    }

    pub fn parse(runner: QualityRunner, json: &str) -> anyhow::Result<Self> {
        let log: VmafLog = serde_json::from_str(json).context("Unable to parse libvmaf JSON log")?;

        Self::from_log(runner, log)
    }

    #[must_use]
    pub const fn runner(&self) -> QualityRunner {
        self.runner
    }

    #[must_use]
    pub const fn scores(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.scores
    }

    #[must_use]
    pub fn primary_scores(&self) -> &[f64] {
        self.scores
            .get(self.runner.primary().1)
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.primary_scores().len()
    }

    pub fn report(&self, method: Option<PoolingMethod>) -> Result<QualityReport, PoolingError> {
        let aggregates = self
            .scores
            .iter()
            .map(|(key, values)| -> Result<(String, f64), PoolingError> {
                Ok((key.clone(), aggregate(values, method)?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(QualityReport {
            metric: self.runner.name().to_owned(),
            pool_method: method.unwrap_or_default(),
            score: aggregate(self.primary_scores(), method)?,
            frames: self.frames(),
            aggregates,
            scores: self.scores.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QualityReport {
    pub metric: String,
    pub pool_method: PoolingMethod,
    pub score: f64,
    pub frames: usize,
    pub aggregates: BTreeMap<String, f64>,
    pub scores: BTreeMap<String, Vec<f64>>,
}

pub fn run_all(
    tools: &Tools,
    request: &QualityRequest,
    runners: &[QualityRunner],
    method: Option<PoolingMethod>,
) -> anyhow::Result<BTreeMap<String, QualityReport>> {
    let mut reports = BTreeMap::new();

    for runner in runners {
        let result = runner
            .run(tools, request)
            .with_context(|| format!("Unable to compute {runner}"))?;

        let report = result
            .report(method)
            .with_context(|| format!("Unable to pool {runner} scores"))?;

        reports.insert(runner.name().to_owned(), report);
    }

    Ok(reports)
}
