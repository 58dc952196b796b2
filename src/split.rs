use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::FailurePolicy;
use crate::ffmpeg::{chunk_arguments, probe, split_extension, transcode, Tools};
use crate::util::create_progress_style;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub start: f64,
    pub length: f64,
    pub path: PathBuf,
}

const MAX_CHUNKS: usize = 100_000;

/// Index, start time and length of consecutive `chunk_size`-second chunks
/// covering `duration` seconds. The last chunk is cut at the end of the input.
#[allow(clippy::as_conversions)]
#[allow(clippy::cast_precision_loss)]
pub fn chunk_plan(duration: f64, chunk_size: f64) -> anyhow::Result<Vec<(usize, f64, f64)>> {
    if !chunk_size.is_finite() || chunk_size <= 0.0_f64 {
        return Err(anyhow!("Chunk size must be a positive number of seconds, got {chunk_size}"));
    }

    if !duration.is_finite() || duration < 0.0_f64 {
        return Err(anyhow!("Invalid duration {duration}"));
    }

    if (duration / chunk_size).ceil() > MAX_CHUNKS as f64 {
        return Err(anyhow!(
            "Splitting {duration} seconds into {chunk_size}-second chunks exceeds {MAX_CHUNKS} chunks"
        ));
    }

    let mut plan = vec![];
    let mut index = 0;

    loop {
        let start = index as f64 * chunk_size;

        if start >= duration {
            break;
        }

        plan.push((index, start, chunk_size.min(duration - start)));
        index += 1;
    }

    Ok(plan)
}

pub fn chunk_name(input: &Path, index: usize) -> anyhow::Result<PathBuf> {
    let (stem, extension) = split_extension(input)?;

    Ok(input.with_file_name(format!("{stem}_part{index}.{extension}")))
}

pub fn split_into_chunks(
    tools: &Tools,
    input: &Path,
    chunk_size: f64,
    policy: FailurePolicy,
) -> anyhow::Result<Vec<Chunk>> {
    if !input.is_file() {
        return Err(anyhow!("{input:?} is not a file"));
    }

    let metadata =
        probe(tools, input).with_context(|| format!("Unable to fetch metadata for {input:?}"))?;

    let plan = chunk_plan(metadata.duration, chunk_size)
        .with_context(|| format!("Unable to plan chunks for {input:?}"))?;

    info!("Starting to split {input:?} into {} chunks", plan.len());

    let progress_bar = ProgressBar::new(plan.len().try_into().unwrap_or(u64::MAX));

    progress_bar.set_style(
        create_progress_style(
            "{spinner:.green} [{elapsed_precise}] Splitting video...         [{wide_bar:.cyan/blue}] {human_pos:>4}/{human_len:>4} (ETA: {smooth_eta:>3}) {msg}"
        ).context("Unable to create split progress bar style")?
    );

    let mut chunks = vec![];

    for (index, start, length) in plan {
        let path = chunk_name(input, index)
            .with_context(|| format!("Unable to name chunk {index} of {input:?}"))?;

        progress_bar.set_message(path.to_string_lossy().to_string());

        let result = transcode(
            tools,
            &chunk_arguments(tools, input, start, length, &path),
            &path,
        )
        .with_context(|| format!("Unable to extract chunk {index} of {input:?}"));

        match result {
            Ok(()) => {
                progress_bar.suspend(|| info!("  ~> {path:?}"));
                chunks.push(Chunk {
                    index,
                    start,
                    length,
                    path,
                });
            }
            Err(error) => match policy {
                FailurePolicy::Abort => {
                    progress_bar.abandon();
                    return Err(error);
                }
                FailurePolicy::Continue => {
                    progress_bar.suspend(|| warn!("Skipping chunk {index}: {error:#}"));
                }
            },
        }

        progress_bar.inc(1);
    }

    progress_bar.finish();

    info!(
        "Completed splitting {input:?} into {} chunks of {chunk_size} seconds",
        chunks.len()
    );

    Ok(chunks)
}
