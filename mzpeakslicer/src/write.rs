use std::io::{self, Write};
use std::path::Path;

use itertools::Itertools;
use tracing::debug;

use mzpeakslice::{ChromatogramAxis, PeakFeature};

use crate::driver::MZPeakSlicerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Tab-separated rows, one per feature with drift sub-features following
    /// their parent
    #[default]
    Table,
    /// The nested feature list as JSON
    Json,
}

impl OutputFormat {
    /// Infer the output format from a path's extension, and whether the
    /// path asks for gzip compression
    pub fn infer_from_path(path: &Path) -> (Self, bool) {
        let compressed = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        let inner = if compressed {
            path.file_stem().map(Path::new).unwrap_or(path)
        } else {
            path
        };
        let format = match inner.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Table,
        };
        (format, compressed)
    }
}

const COLUMNS: [&str; 25] = [
    "id",
    "master_id",
    "parent_id",
    "axis",
    "mass",
    "retention_time",
    "drift_time",
    "left",
    "top",
    "right",
    "intensity",
    "left_intensity",
    "right_intensity",
    "area_above_zero",
    "area_above_baseline",
    "signal_to_noise",
    "symmetry",
    "sharpness",
    "amplitude_score",
    "ms1_left_scan",
    "ms1_top_scan",
    "ms1_right_scan",
    "ms2_primary_scan",
    "ms2_scans",
    "ms1_accumulated_scans",
];

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_row<W: Write>(feature: &PeakFeature, writer: &mut W) -> io::Result<()> {
    let axis = match feature.axis {
        ChromatogramAxis::RetentionTime => "rt",
        ChromatogramAxis::DriftTime => "dt",
    };
    let ms2_scans = feature
        .ms2
        .scans
        .iter()
        .map(|(scan, energy)| format!("{scan}:{energy}"))
        .join(";");
    let accumulated = optional(
        feature
            .accumulated_ms1
            .map(|acc| format!("{}-{}", acc.first_scan, acc.last_scan)),
    );
    writeln!(
        writer,
        "{}\t{}\t{}\t{axis}\t{:.5}\t{:.4}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.2}\t{:.2}\t{:.2}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.4}\t{}\t{}\t{}\t{}\t{ms2_scans}\t{accumulated}",
        feature.id,
        feature.master_id,
        optional(feature.parent_id),
        feature.mass,
        feature.retention_time,
        optional(feature.drift_time.map(|t| format!("{t:.4}"))),
        feature.times.left,
        feature.times.top,
        feature.times.right,
        feature.intensities.top,
        feature.intensities.left,
        feature.intensities.right,
        feature.area_above_zero,
        feature.area_above_baseline,
        feature.shape.signal_to_noise,
        feature.shape.symmetry,
        feature.shape.sharpness,
        feature.amplitude_score,
        feature.ms1_scans.left,
        feature.ms1_scans.top,
        feature.ms1_scans.right,
        optional(feature.ms2.primary),
    )
}

fn write_table<W: Write>(features: &[PeakFeature], writer: &mut W) -> io::Result<()> {
    writeln!(writer, "{}", COLUMNS.iter().join("\t"))?;
    for feature in features {
        write_row(feature, writer)?;
        for sub in feature.drift_features.iter() {
            write_row(sub, writer)?;
        }
    }
    Ok(())
}

/// Write `features` to `writer` in `format`, flushing it afterwards
pub fn write_features<W: Write>(
    features: &[PeakFeature],
    format: OutputFormat,
    mut writer: W,
) -> Result<(), MZPeakSlicerError> {
    debug!("Writing {} features as {format:?}", features.len());
    match format {
        OutputFormat::Table => write_table(features, &mut writer)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, features)?;
            writeln!(writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}
