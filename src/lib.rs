use std::path::PathBuf;

use anyhow::{anyhow, Context};

pub mod config;
pub mod ffmpeg;
pub mod pooling;
pub mod quality;
pub mod resize;
pub mod split;
pub mod util;

use config::{Command, Config, ProbeArgs, QualityArgs, ResizeArgs, SplitArgs};
use ffmpeg::Tools;
use quality::QualityRequest;

#[allow(clippy::print_stdout)]
fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Unable to serialize output as JSON")?
    );

    Ok(())
}

fn resize(config: &Config, tools: &Tools, args: &ResizeArgs) -> anyhow::Result<()> {
    if let Some(directory) = &args.directory {
        resize::resize_directory(tools, directory, args.width, args.height, config.on_failure)
            .with_context(|| format!("Unable to resize videos in {directory:?}"))?;
    } else {
        let input = args
            .input
            .as_deref()
            .ok_or_else(|| anyhow!("No input file or directory given"))?;

        resize::resize_file(tools, input, args.output.as_deref(), args.width, args.height)
            .with_context(|| format!("Unable to resize {input:?}"))?;
    }

    Ok(())
}

fn probe(tools: &Tools, args: &ProbeArgs) -> anyhow::Result<()> {
    let info = ffmpeg::probe(tools, &args.input)
        .with_context(|| format!("Unable to probe {:?}", args.input))?;

    if args.json {
        print_json(&info)?;
    } else {
        util::media_info_table(&args.input, &info).printstd();
    }

    Ok(())
}

fn split(config: &Config, tools: &Tools, args: &SplitArgs) -> anyhow::Result<()> {
    let chunks = split::split_into_chunks(tools, &args.input, args.chunk_size, config.on_failure)
        .with_context(|| format!("Unable to split {:?}", args.input))?;

    if args.json {
        print_json(&chunks)?;
    }

    Ok(())
}

fn quality(tools: &Tools, args: &QualityArgs) -> anyhow::Result<()> {
    let request = QualityRequest {
        reference: args.reference.clone(),
        distorted: args.distorted.clone(),
        width: args.width,
        height: args.height,
        pixel_format: args.pixel_format,
        threads: args.threads,
        workdir: args.workdir.clone().unwrap_or_else(default_workdir),
    };

    for path in [&request.reference, &request.distorted] {
        if !path.is_file() {
            return Err(anyhow!("{path:?} is not a file"));
        }
    }

    let reports = quality::run_all(tools, &request, &args.metric.runners(), args.pool)
        .context("Unable to compute quality metrics")?;

    if args.json {
        print_json(&reports)?;
    } else {
        util::quality_table(&reports).printstd();
    }

    Ok(())
}

pub fn run(config: &Config) -> anyhow::Result<()> {
    let tools = Tools::new(config);

    match &config.command {
        Command::Resize(args) => resize(config, &tools, args).context("Resize failed"),
        Command::Probe(args) => probe(&tools, args).context("Probe failed"),
        Command::Split(args) => split(config, &tools, args).context("Split failed"),
        Command::Quality(args) => quality(&tools, args).context("Quality assessment failed"),
    }
}

#[must_use]
pub fn default_workdir() -> PathBuf {
    std::env::temp_dir().join("vqa")
}
