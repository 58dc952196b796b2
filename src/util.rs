use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context};
use indicatif::{HumanBytes, HumanDuration, ProgressState, ProgressStyle};
use number_prefix::NumberPrefix;
use prettytable::{format, row, Table};
use tracing::{error, level_filters::LevelFilter};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::ffmpeg::MediaInfo;
use crate::quality::QualityReport;

#[allow(clippy::as_conversions)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_sign_loss)]
pub fn create_progress_style(template: &str) -> anyhow::Result<ProgressStyle> {
    let progress_style = ProgressStyle::with_template(template)
        .with_context(|| format!("Unable to create progress bar style with template '{template}'"))?
        .with_key("smooth_eta", |s: &ProgressState, w: &mut dyn Write| {
            match (s.pos(), s.len()) {
                (pos, Some(len)) if pos > 0 => write!(
                    w,
                    "{:#}",
                    HumanDuration(Duration::from_millis(
                        (s.elapsed().as_millis() as f64 * (len as f64 - pos as f64) / pos as f64)
                            .round() as u64
                    ))
                ),
                _ => write!(w, "-"),
            }
            .unwrap_or_else(|err| {
                error!("Unexpected error while formatting smooth_eta in progress bar: {err}");
            });
        })
        .with_key("smooth_per_sec", |s: &ProgressState, w: &mut dyn Write| {
            match (s.pos(), s.elapsed().as_millis()) {
                (pos, elapsed_ms) if elapsed_ms > 0 => {
                    write!(w, "{:.2}", pos as f64 * 1000_f64 / elapsed_ms as f64)
                }
                _ => write!(w, "-"),
            }
            .unwrap_or_else(|err| {
                error!("Unexpected error while formatting smooth_per_sec in progress bar: {err}");
            });
        });

    Ok(progress_style)
}

pub fn install_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .context("Unable to initialize global default subscriber")?;

    Ok(())
}

pub fn verify_filename(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Unable to create directory {parent:?}"))?;
    }

    Ok(())
}

pub fn verify_directory(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(anyhow!("{path:?} exists but is not a directory"));
        }
    } else {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Unable to create directory {path:?}"))?;
    }

    Ok(())
}

pub struct HumanBitrate(pub f64);

impl fmt::Display for HumanBitrate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match NumberPrefix::decimal(self.0) {
            NumberPrefix::Standalone(bits) => write!(f, "{bits:.0} bps"),
            NumberPrefix::Prefixed(prefix, n) => write!(f, "{n:.2} {prefix}bps"),
        }
    }
}

#[must_use]
pub fn media_info_table(path: &Path, info: &MediaInfo) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["File", path.to_string_lossy()]);

    table.add_row(row![
        "Duration",
        format!(
            "{:.3} s ({})",
            info.duration,
            HumanDuration(Duration::from_secs_f64(info.duration.max(0.0_f64)))
        )
    ]);
    table.add_row(row!["Bitrate", HumanBitrate(info.bit_rate)]);
    table.add_row(row!["Size", format!("{} ({})", info.size, HumanBytes(info.size))]);
    table.add_row(row!["Dimensions", format!("{}x{}", info.width, info.height)]);

    table
}

#[must_use]
pub fn quality_table(reports: &BTreeMap<String, QualityReport>) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["Metric", "Key", "Pool", "Frames", "Value"]);

    for report in reports.values() {
        table.add_row(row![
            b->report.metric,
            "",
            report.pool_method,
            report.frames,
            b->format!("{:.6}", report.score)
        ]);

        for (key, value) in &report.aggregates {
            table.add_row(row!["", key, "", "", format!("{value:.6}")]);
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_uses_decimal_prefixes() {
        assert_eq!(HumanBitrate(800.0).to_string(), "800 bps");
        assert_eq!(HumanBitrate(1_500_000.0).to_string(), "1.50 Mbps");
        assert_eq!(HumanBitrate(256_000.0).to_string(), "256.00 kbps");
    }

    #[test]
    fn verify_directory_creates_missing_directories() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("work").join("logs");

        verify_directory(&nested).unwrap();
        assert!(nested.is_dir());

        verify_directory(&nested).unwrap();
    }

    #[test]
    fn verify_directory_rejects_files() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("clip.mp4");
        std::fs::write(&file, b"").unwrap();

        assert!(verify_directory(&file).is_err());
    }

    #[test]
    fn verify_filename_creates_parent() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("chunks").join("clip_part0.mp4");

        verify_filename(&file).unwrap();
        assert!(file.parent().unwrap().is_dir());
        assert!(!file.exists());
    }

    #[test]
    fn media_info_table_lists_every_field() {
        let info = MediaInfo {
            duration: 30.016,
            bit_rate: 1_397_333.0,
            size: 5_242_880,
            width: 1280,
            height: 720,
        };

        let table = media_info_table(Path::new("incredibles.mp4"), &info);
        let rendered = table.to_string();

        assert_eq!(table.len(), 4);
        assert!(rendered.contains("1.40 Mbps"));
        assert!(rendered.contains("1280x720"));
        assert!(rendered.contains("30.016 s"));
    }

    #[test]
    fn progress_style_accepts_custom_keys() {
        assert!(create_progress_style("{spinner} {smooth_eta} {smooth_per_sec}").is_ok());
    }
}
