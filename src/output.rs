use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::Writer;
use ndarray::Array2;
use serde::Serialize;

use crate::channels::platform_code;
use crate::config::ProcessingConfig;
use crate::pipeline::SegmentProduct;
use crate::record::CHANNEL_NAMES;
use crate::{FcdrError, SENSOR_CHANNELS};

pub const MANIFEST_SCHEMA_VERSION: &str = "easy-fcdr/v1";

pub fn create_timestamped_output_dir(output_root: &Path) -> Result<PathBuf, FcdrError> {
    fs::create_dir_all(output_root)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut output_dir = output_root.join(&timestamp);
    let mut counter = 1_u32;

    while output_dir.exists() {
        output_dir = output_root.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.10}")
}

fn fmt_time(value: DateTime<Utc>) -> String {
    value.format("%Y%m%d%H%M%S").to_string()
}

/// Channel-split tag appended to the platform code.
pub fn channel_tag(product: &SegmentProduct) -> &'static str {
    match (product.split, product.secondary_visible) {
        (true, true) => "C3A",
        (true, false) => "C3B",
        (false, _) => "ALL",
    }
}

/// File name of the standardized product for a segment.
///
/// With an explicit `output_name`, split segments get a `ch3a_`/`ch3b_` prefix
/// so that both halves of an orbit can share one requested name.
pub fn product_file_name(
    product: &SegmentProduct,
    output_name: Option<&str>,
) -> Result<String, FcdrError> {
    if let Some(name) = output_name {
        return Ok(match (product.split, product.secondary_visible) {
            (true, true) => format!("ch3a_{name}"),
            (true, false) => format!("ch3b_{name}"),
            (false, _) => name.to_string(),
        });
    }

    let record = &product.record;
    let code = platform_code(&record.sensor)
        .ok_or_else(|| FcdrError::UnknownPlatform(record.sensor.clone()))?;
    let (start, end) = record.time_span().ok_or(FcdrError::NoUsableData)?;
    Ok(format!(
        "FIDUCEO_FCDR_L1C_AVHRR_{code}{tag}_{start}_{end}_EASY_v{version}.nc",
        tag = channel_tag(product),
        start = fmt_time(start),
        end = fmt_time(end),
        version = record.version,
    ))
}

pub fn write_matrix_csv(path: &Path, matrix: &Array2<f64>) -> Result<(), FcdrError> {
    if matrix.shape() != [SENSOR_CHANNELS, SENSOR_CHANNELS] {
        return Err(FcdrError::ShapeMismatch {
            context: path.display().to_string(),
            expected: vec![SENSOR_CHANNELS, SENSOR_CHANNELS],
            got: matrix.shape().to_vec(),
        });
    }

    let mut writer = Writer::from_path(path)?;
    let mut header = vec!["channel"];
    header.extend_from_slice(&CHANNEL_NAMES);
    writer.write_record(&header)?;

    for (row, name) in matrix.rows().into_iter().zip(CHANNEL_NAMES) {
        let mut record = vec![name.to_string()];
        record.extend(row.iter().map(|&v| fmt_f64(v)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes a channel-padded (offset, channel) profile.
pub fn write_profile_csv(path: &Path, profile: &Array2<f64>) -> Result<(), FcdrError> {
    let mut writer = Writer::from_path(path)?;
    let mut header = vec!["offset"];
    header.extend_from_slice(&CHANNEL_NAMES[..profile.ncols().min(SENSOR_CHANNELS)]);
    writer.write_record(&header)?;

    for (offset, row) in profile.rows().into_iter().enumerate() {
        let mut record = vec![offset.to_string()];
        record.extend(row.iter().map(|&v| fmt_f64(v)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct UnrepairableEntry {
    pub category: String,
    pub effect: String,
    pub channel: String,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub schema_version: String,
    pub product_name: String,
    pub sensor: String,
    pub version: String,
    pub sources: String,
    pub split: bool,
    pub secondary_visible: bool,
    pub ocean_only: bool,
    pub n_lines: usize,
    pub n_elements: usize,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub channels: Vec<String>,
    pub line_truncation: usize,
    pub element_truncation: usize,
    pub repaired_samples: usize,
    pub unrepairable_lanes: Vec<UnrepairableEntry>,
    pub config: ProcessingConfig,
}

impl Manifest {
    pub fn from_product(
        product: &SegmentProduct,
        product_name: &str,
        config: &ProcessingConfig,
    ) -> Self {
        let record = &product.record;
        let span = record.time_span();
        let unrepairable_lanes = product
            .repairs
            .iter()
            .flat_map(|(category, report)| {
                report.unrepairable.iter().map(move |lane| UnrepairableEntry {
                    category: category.to_string(),
                    effect: lane.effect.to_string(),
                    channel: CHANNEL_NAMES[lane.channel].to_string(),
                    line: lane.line,
                })
            })
            .collect();

        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            product_name: product_name.to_string(),
            sensor: record.sensor.clone(),
            version: record.version.clone(),
            sources: record.sources.clone(),
            split: product.split,
            secondary_visible: product.secondary_visible,
            ocean_only: config.ocean_only,
            n_lines: record.n_lines(),
            n_elements: record.n_elements(),
            start_time: span.map(|(start, _)| start.to_rfc3339()),
            end_time: span.map(|(_, end)| end.to_rfc3339()),
            channels: product
                .merged
                .present_channels()
                .into_iter()
                .map(|ch| CHANNEL_NAMES[ch].to_string())
                .collect(),
            line_truncation: product.merged.line_truncation,
            element_truncation: product.merged.element_truncation,
            repaired_samples: product.total_repairs().repaired,
            unrepairable_lanes,
            config: config.clone(),
        }
    }
}

pub fn write_manifest_json(path: &Path, manifest: &Manifest) -> Result<(), FcdrError> {
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(path, json)?;
    Ok(())
}

/// Writes the merged matrices, padded profiles and manifest for one segment
/// into `dir`.
pub fn write_segment_outputs(
    dir: &Path,
    product: &SegmentProduct,
    product_name: &str,
    config: &ProcessingConfig,
) -> Result<(), FcdrError> {
    fs::create_dir_all(dir)?;
    let merged = &product.merged;

    write_matrix_csv(&dir.join("channel_correlation_independent.csv"), &merged.independent)?;
    write_matrix_csv(&dir.join("channel_correlation_structured.csv"), &merged.structured)?;
    write_matrix_csv(&dir.join("channel_correlation_common.csv"), &merged.common)?;
    write_profile_csv(&dir.join("cross_line_correlation.csv"), &merged.padded_cross_line())?;
    write_profile_csv(
        &dir.join("cross_element_correlation.csv"),
        &merged.padded_cross_element(),
    )?;
    write_manifest_json(
        &dir.join("manifest.json"),
        &Manifest::from_product(product, product_name, config),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_precision() {
        assert_eq!(fmt_f64(0.5), "0.5000000000");
        assert_eq!(fmt_f64(-1.0), "-1.0000000000");
    }

    #[test]
    fn matrix_csv_requires_full_sensor_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("m.csv");
        let result = write_matrix_csv(&path, &Array2::eye(3));
        assert!(matches!(result, Err(FcdrError::ShapeMismatch { .. })));

        write_matrix_csv(&path, &Array2::eye(SENSOR_CHANNELS)).expect("write");
        let text = fs::read_to_string(&path).expect("read");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("channel,ch1,ch2,ch3a,ch3b,ch4,ch5"));
        assert!(lines
            .next()
            .is_some_and(|l| l.starts_with("ch1,1.0000000000,0.0000000000")));
    }

    #[test]
    fn timestamped_dirs_do_not_collide() {
        let root = tempfile::tempdir().expect("tempdir");
        let first = create_timestamped_output_dir(root.path()).expect("first");
        let second = create_timestamped_output_dir(root.path()).expect("second");
        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
    }
}
