use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::config::FailurePolicy;
use crate::ffmpeg::{scale_arguments, split_extension, transcode, Tools};
use crate::util::{create_progress_style, verify_filename};

#[must_use]
pub fn resolution_label(height: i32) -> String {
    match height {
        2160 => "UHD".to_owned(),
        1440 => "QHD".to_owned(),
        1080 => "FHD".to_owned(),
        720 => "HD".to_owned(),
        _ => format!("{height}p"),
    }
}

/// Default output path for `input` resized to `height`: the resolution label
/// is appended to the file stem, in the same directory.
pub fn output_name(input: &Path, height: i32) -> anyhow::Result<PathBuf> {
    let (stem, extension) = split_extension(input)?;
    let label = resolution_label(height);

    Ok(input.with_file_name(format!("{stem}{label}.{extension}")))
}

pub fn resize_file(
    tools: &Tools,
    input: &Path,
    output: Option<&Path>,
    width: i32,
    height: i32,
) -> anyhow::Result<PathBuf> {
    if !input.is_file() {
        return Err(anyhow!("{input:?} is not a file"));
    }

    let output = match output {
        Some(output) => {
            verify_filename(output)
                .with_context(|| format!("Unable to prepare output location {output:?}"))?;
            output.to_path_buf()
        }
        None => output_name(input, height)
            .with_context(|| format!("Unable to name resized output for {input:?}"))?,
    };

    info!("Resizing {input:?} to {width}:{height} as {output:?}");

    transcode(
        tools,
        &scale_arguments(tools, input, width, height, &output),
        &output,
    )
    .with_context(|| format!("Unable to resize {input:?}"))?;

    Ok(output)
}

/// Resizes every regular file directly inside `directory`, in name order.
pub fn resize_directory(
    tools: &Tools,
    directory: &Path,
    width: i32,
    height: i32,
    policy: FailurePolicy,
) -> anyhow::Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(anyhow!("{directory:?} is not a directory"));
    }

    let mut samples = vec![];

    for entry in fs::read_dir(directory)
        .with_context(|| format!("Unable to read directory {directory:?}"))?
    {
        let path = entry
            .with_context(|| format!("Unable to read entry of {directory:?}"))?
            .path();

        if path.is_file() {
            samples.push(path);
        }
    }

    samples.sort();

    let progress_bar = ProgressBar::new(samples.len().try_into().unwrap_or(u64::MAX));

    progress_bar.set_style(
        create_progress_style(
            "{spinner:.green} [{elapsed_precise}] Resizing videos...         [{wide_bar:.cyan/blue}] {human_pos:>4}/{human_len:>4} (ETA: {smooth_eta:>3}) {msg}"
        ).context("Unable to create resize progress bar style")?
    );

    let mut outputs = vec![];

    for sample in &samples {
        progress_bar.set_message(sample.to_string_lossy().to_string());

        match resize_file(tools, sample, None, width, height) {
            Ok(output) => outputs.push(output),
            Err(error) => match policy {
                FailurePolicy::Abort => {
                    progress_bar.abandon();
                    return Err(error);
                }
                FailurePolicy::Continue => {
                    progress_bar.suspend(|| warn!("Skipping {sample:?}: {error:#}"));
                }
            },
        }

        progress_bar.inc(1);
    }

    progress_bar.finish_with_message(format!("{} of {} resized", outputs.len(), samples.len()));

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_tools() -> Tools {
        Tools {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
            overwrite: false,
        }
    }

    #[test]
    fn labels_for_common_heights() {
        assert_eq!(resolution_label(1440), "QHD");
        assert_eq!(resolution_label(2160), "UHD");
        assert_eq!(resolution_label(1080), "FHD");
        assert_eq!(resolution_label(720), "HD");
        assert_eq!(resolution_label(240), "240p");
    }

    #[test]
    fn output_name_appends_label_to_stem() {
        assert_eq!(
            output_name(Path::new("samples/incredibles.mp4"), 1440).unwrap(),
            PathBuf::from("samples/incrediblesQHD.mp4")
        );
        assert_eq!(
            output_name(Path::new("a.b.mkv"), 360).unwrap(),
            PathBuf::from("a.b360p.mkv")
        );
        assert!(output_name(Path::new("samples/noext"), 1440).is_err());
    }

    #[test]
    fn missing_input_is_rejected() {
        let root = tempfile::tempdir().unwrap();

        assert!(resize_file(&missing_tools(), &root.path().join("missing.mp4"), None, -2, 1440)
            .is_err());
        assert!(resize_directory(
            &missing_tools(),
            &root.path().join("missing"),
            -2,
            1440,
            FailurePolicy::Abort
        )
        .is_err());
    }

    #[test]
    fn explicit_output_directory_is_created() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("clip.mp4");
        let output = root.path().join("resized").join("clip_small.mp4");
        fs::write(&input, b"").unwrap();

        assert!(resize_file(&missing_tools(), &input, Some(&output), 640, 360).is_err());
        assert!(root.path().join("resized").is_dir());
        assert!(!output.exists());
    }

    #[test]
    fn directory_failures_follow_policy() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.mp4"), b"").unwrap();
        fs::write(root.path().join("b.mp4"), b"").unwrap();
        fs::create_dir(root.path().join("nested")).unwrap();

        assert!(
            resize_directory(&missing_tools(), root.path(), -2, 1440, FailurePolicy::Abort)
                .is_err()
        );

        let outputs =
            resize_directory(&missing_tools(), root.path(), -2, 1440, FailurePolicy::Continue)
                .unwrap();
        assert!(outputs.is_empty());
    }
}
