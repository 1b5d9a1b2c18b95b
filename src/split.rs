//! Splitting of secondary-visible orbits into Ch3a and Ch3b segments.

use ndarray::s;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channels::Sensor;
use crate::masking::{BAD_TIME, DO_NOT_USE};
use crate::record::MeasurementRecord;
use crate::FcdrError;

/// How a segment is cut out of its orbit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Full-length copy with the other segment's scanlines set to missing
    #[default]
    Mask,
    /// Compact copy of the segment's scanlines only
    Extract,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub record: MeasurementRecord,
    /// Ch3a is the active 3rd channel in this segment
    pub secondary_visible: bool,
    /// Segment came from a split orbit
    pub split: bool,
}

pub const MASKED_SCANLINE: i32 = 255;
pub const MASKED_ORIG_SCANLINE: i32 = -32767;

pub fn extract_segment(record: &MeasurementRecord, lines: &[usize]) -> MeasurementRecord {
    record.select_lines(lines)
}

/// Sets every scanline not in `keep` to missing, then trims leading and
/// trailing lines flagged do-not-use or bad-time.
pub fn mask_segment(record: &MeasurementRecord, keep: &[bool]) -> MeasurementRecord {
    let mut masked = record.clone();
    for (line, _) in keep.iter().enumerate().filter(|(_, &kept)| !kept) {
        for values in masked.fields.values_mut() {
            values.row_mut(line).fill(f64::NAN);
        }
        masked.time[line] = f64::NAN;
        masked.date_time[line] = None;
        masked.scan_quality[line] = DO_NOT_USE;
        masked.channel_quality.row_mut(line).fill(DO_NOT_USE);

        let provenance = &mut masked.provenance;
        provenance.scanline[line] = MASKED_SCANLINE;
        provenance.orig_scanline[line] = MASKED_ORIG_SCANLINE;
        provenance.missing_lines[line] = 1;
        provenance.bad_navigation[line] = 0;
        provenance.bad_calibration[line] = 0;
        provenance.bad_time[line] = 0;
    }

    let unusable = |line: usize| {
        masked.scan_quality[line] & (DO_NOT_USE | BAD_TIME) != 0
            || masked.provenance.bad_time[line] != 0
            || !masked.time[line].is_finite()
    };
    let n_lines = masked.n_lines();
    let Some(first) = (0..n_lines).find(|&line| !unusable(line)) else {
        return masked.select_lines(&[]);
    };
    let last = (0..n_lines)
        .rev()
        .find(|&line| !unusable(line))
        .unwrap_or(first);

    if first == 0 && last + 1 == n_lines {
        return masked;
    }
    let kept: Vec<usize> = (first..=last).collect();
    masked.select_lines(&kept)
}

fn build_segment(
    record: &MeasurementRecord,
    selected: &[bool],
    mode: SplitMode,
) -> MeasurementRecord {
    match mode {
        SplitMode::Mask => mask_segment(record, selected),
        SplitMode::Extract => {
            let lines: Vec<usize> = selected
                .iter()
                .enumerate()
                .filter_map(|(line, &kept)| kept.then_some(line))
                .collect();
            extract_segment(record, &lines)
        }
    }
}

/// Splits a cleansed orbit into processing segments, Ch3a segment first.
/// Segments shorter than `min_lines` are dropped.
pub fn split_orbit(
    record: &MeasurementRecord,
    mode: SplitMode,
    min_lines: usize,
) -> Result<Vec<Segment>, FcdrError> {
    let sensor = Sensor::from_identifier(&record.sensor)?;
    let ch3a_lines = record.ch3a_present.iter().filter(|&&flag| flag).count();

    let candidates = if sensor.secondary_visible_capable() && ch3a_lines > 0 {
        info!(
            sensor = %sensor.identifier,
            ch3a_lines,
            total_lines = record.n_lines(),
            "splitting orbit on Ch3a flag"
        );
        let ch3a: Vec<bool> = record.ch3a_present.to_vec();
        let ch3b: Vec<bool> = ch3a.iter().map(|&flag| !flag).collect();
        let mut segments = Vec::with_capacity(2);
        if ch3a.iter().any(|&flag| flag) {
            segments.push(Segment {
                record: build_segment(record, &ch3a, mode),
                secondary_visible: true,
                split: true,
            });
        }
        if ch3b.iter().any(|&flag| flag) {
            segments.push(Segment {
                record: build_segment(record, &ch3b, mode),
                secondary_visible: false,
                split: true,
            });
        }
        segments
    } else {
        vec![Segment {
            record: record.clone(),
            secondary_visible: false,
            split: false,
        }]
    };

    Ok(candidates
        .into_iter()
        .filter(|segment| {
            let n_lines = segment.record.n_lines();
            if n_lines < min_lines {
                info!(
                    n_lines,
                    min_lines,
                    secondary_visible = segment.secondary_visible,
                    "dropping short segment"
                );
                return false;
            }
            true
        })
        .collect())
}

/// Number of lines in `record` whose every measurement is missing.
pub fn fully_masked_lines(record: &MeasurementRecord) -> usize {
    (0..record.n_lines())
        .filter(|&line| {
            record
                .fields
                .values()
                .all(|values| values.slice(s![line, ..]).iter().all(|v| v.is_nan()))
        })
        .count()
}
