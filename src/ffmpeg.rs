use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::str;

use anyhow::{anyhow, Context};
use cached::{proc_macro::cached, UnboundCache};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;

/// Locations of the external binaries, and how the transcoder treats
/// existing output files.
#[derive(Clone, Debug)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub overwrite: bool,
}

impl Tools {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
            overwrite: config.overwrite,
        }
    }

    /// Arguments every transcoder invocation starts with.
    #[must_use]
    pub fn base_arguments(&self) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            OsString::from(if self.overwrite { "-y" } else { "-n" }),
        ]
    }

    pub fn run_ffmpeg(&self, args: &[OsString]) -> anyhow::Result<Output> {
        run(&self.ffmpeg, args)
    }

    pub fn run_ffprobe(&self, args: &[OsString]) -> anyhow::Result<Output> {
        run(&self.ffprobe, args)
    }
}

fn run(program: &Path, args: &[OsString]) -> anyhow::Result<Output> {
    debug!(
        "Running {} {}",
        program.to_string_lossy(),
        args.iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Unable to spawn {program:?} subprocess"))?;

    let result = child
        .wait_with_output()
        .with_context(|| format!("Unable to wait for {program:?} subprocess"))?;

    if !result.status.success() {
        return Err(anyhow!(
            "{program:?} did not complete successfully ({}): {}",
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        ));
    }

    Ok(result)
}

#[must_use]
pub fn scale_arguments(
    tools: &Tools,
    input: &Path,
    width: i32,
    height: i32,
    output: &Path,
) -> Vec<OsString> {
    let mut args = tools.base_arguments();

    args.push("-i".into());
    args.push(input.into());
    args.push("-vf".into());
    args.push(format!("scale={width}:{height}").into());
    args.push(output.into());

    args
}

#[must_use]
pub fn chunk_arguments(
    tools: &Tools,
    input: &Path,
    start: f64,
    length: f64,
    output: &Path,
) -> Vec<OsString> {
    let mut args = tools.base_arguments();

    args.push("-ss".into());
    args.push(format!("{start}").into());
    args.push("-t".into());
    args.push(format!("{length}").into());
    args.push("-i".into());
    args.push(input.into());
    args.push(output.into());

    args
}

/// Runs the transcoder and checks that it actually produced `output`.
pub fn transcode(tools: &Tools, args: &[OsString], output: &Path) -> anyhow::Result<()> {
    tools
        .run_ffmpeg(args)
        .with_context(|| format!("Unable to produce {output:?}"))?;

    if !output.exists() {
        return Err(anyhow!(
            "FFmpeg reported success but {output:?} does not exist"
        ));
    }

    Ok(())
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub duration: f64,
    pub bit_rate: f64,
    pub size: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: String,
    bit_rate: String,
    size: String,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    streams: Vec<ProbeStream>,
}

pub fn parse_probe_output(json: &str) -> anyhow::Result<MediaInfo> {
    let output: ProbeOutput =
        serde_json::from_str(json).context("Unable to parse ffprobe JSON output")?;

    let stream = output
        .streams
        .iter()
        .find(|stream| stream.codec_type == "video")
        .ok_or_else(|| anyhow!("ffprobe reported no video stream"))?;

    Ok(MediaInfo {
        duration: output
            .format
            .duration
            .parse()
            .with_context(|| format!("Invalid duration '{}'", output.format.duration))?,
        bit_rate: output
            .format
            .bit_rate
            .parse()
            .with_context(|| format!("Invalid bit rate '{}'", output.format.bit_rate))?,
        size: output
            .format
            .size
            .parse()
            .with_context(|| format!("Invalid size '{}'", output.format.size))?,
        width: stream
            .width
            .ok_or_else(|| anyhow!("Video stream has no width"))?,
        height: stream
            .height
            .ok_or_else(|| anyhow!("Video stream has no height"))?,
    })
}

#[cached(
    result = true,
    ty = "UnboundCache<String, MediaInfo>",
    create = "{ UnboundCache::new() }",
    convert = r#"{ format!("{}", path.to_string_lossy()) }"#
)]
pub fn probe(tools: &Tools, path: &Path) -> anyhow::Result<MediaInfo> {
    let args: Vec<OsString> = vec![
        "-v".into(),
        "quiet".into(),
        "-print_format".into(),
        "json".into(),
        "-show_format".into(),
        "-show_streams".into(),
        path.into(),
    ];

    let output = tools
        .run_ffprobe(&args)
        .with_context(|| format!("Unable to probe {path:?}"))?;

    let json =
        str::from_utf8(&output.stdout).context("Unable to decode ffprobe output as UTF-8")?;

    parse_probe_output(json).with_context(|| format!("Unable to read metadata of {path:?}"))
}

/// Splits `path` at the last `.` of its file name into stem and extension.
pub fn split_extension(path: &Path) -> anyhow::Result<(String, String)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{path:?} has no file name"))?
        .to_string_lossy();

    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.is_empty() => {
            Ok((stem.to_owned(), extension.to_owned()))
        }
        _ => Err(anyhow!("{path:?} has no file extension")),
    }
}
