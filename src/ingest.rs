//! Cleansing of a raw orbit into a `MeasurementRecord`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use ndarray::{Array1, Array2};
use tracing::{debug, info};

use crate::record::{Field, LineProvenance, MeasurementRecord, RawOrbit};
use crate::{FcdrError, FILL_THRESHOLD, SENSOR_CHANNELS};

fn ensure_len(context: &str, expected: usize, got: usize) -> Result<(), FcdrError> {
    if expected == got {
        return Ok(());
    }

    Err(FcdrError::ShapeMismatch {
        context: context.to_string(),
        expected: vec![expected],
        got: vec![got],
    })
}

/// Whether a physical value is a usable number.
pub fn is_valid_value(value: f64) -> bool {
    value.is_finite() && value > FILL_THRESHOLD
}

/// Replaces fill values and non-finite values with NaN.
pub fn sanitize(values: &Array2<f64>) -> Array2<f64> {
    values.mapv(|v| if is_valid_value(v) { v } else { f64::NAN })
}

/// Converts a (year, month, day, fractional hour) stamp to UTC, `None` when invalid.
pub fn scanline_timestamp(year: i32, month: u32, day: u32, hours: f64) -> Option<DateTime<Utc>> {
    if year <= 1900 || month == 0 || day == 0 || !(0.0..24.0).contains(&hours) {
        return None;
    }
    let midnight = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    let offset = TimeDelta::try_milliseconds((hours * 3_600_000.0).round() as i64)?;
    let stamp = midnight.checked_add_signed(offset)?;
    Some(Utc.from_utc_datetime(&stamp))
}

fn provenance_column<T: Copy>(
    name: &str,
    values: &[T],
    n_lines: usize,
    fallback: impl Fn(usize) -> T,
) -> Result<Array1<T>, FcdrError> {
    if values.is_empty() {
        return Ok((0..n_lines).map(fallback).collect());
    }
    ensure_len(name, n_lines, values.len())?;
    Ok(Array1::from(values.to_vec()))
}

/// Sanitizes every physical field, builds timestamps and trims scanlines with
/// invalid times from both ends of the orbit.
pub fn cleanse(raw: &RawOrbit) -> Result<MeasurementRecord, FcdrError> {
    let n_lines = raw.n_lines();
    ensure_len("month", n_lines, raw.month.len())?;
    ensure_len("day", n_lines, raw.day.len())?;
    ensure_len("hours", n_lines, raw.hours.len())?;
    ensure_len("scan_quality", n_lines, raw.scan_quality.len())?;
    ensure_len("ch3a_present", n_lines, raw.ch3a_present.len())?;

    let latitude_name = Field::Latitude.name();
    let n_elements = raw
        .fields
        .get(&latitude_name)
        .map(|lat| lat.ncols())
        .ok_or(FcdrError::MissingField(latitude_name))?;

    let quality_shape = raw.channel_quality.shape();
    if quality_shape != [n_lines, SENSOR_CHANNELS] {
        return Err(FcdrError::ShapeMismatch {
            context: "channel_quality".to_string(),
            expected: vec![n_lines, SENSOR_CHANNELS],
            got: quality_shape.to_vec(),
        });
    }

    let mut fields = BTreeMap::new();
    for (name, values) in &raw.fields {
        let Some(field) = Field::from_name(name) else {
            debug!(variable = %name, "ignoring unrecognised variable");
            continue;
        };
        if values.shape() != [n_lines, n_elements] {
            return Err(FcdrError::ShapeMismatch {
                context: name.clone(),
                expected: vec![n_lines, n_elements],
                got: values.shape().to_vec(),
            });
        }
        fields.insert(field, sanitize(values));
    }

    let date_time: Vec<Option<DateTime<Utc>>> = (0..n_lines)
        .map(|i| scanline_timestamp(raw.year[i], raw.month[i], raw.day[i], raw.hours[i]))
        .collect();

    let first = date_time
        .iter()
        .position(Option::is_some)
        .ok_or(FcdrError::NoUsableData)?;
    let last = date_time
        .iter()
        .rposition(Option::is_some)
        .ok_or(FcdrError::NoUsableData)?;

    let time: Array1<f64> = date_time
        .iter()
        .map(|stamp| {
            stamp
                .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
                .unwrap_or(f64::NAN)
        })
        .collect();

    let provenance = LineProvenance {
        scanline: provenance_column("scanline", &raw.scanline, n_lines, |i| i as i32 + 1)?,
        orig_scanline: provenance_column("orig_scanline", &raw.orig_scanline, n_lines, |i| {
            i as i32
        })?,
        bad_navigation: provenance_column("bad_navigation", &raw.bad_navigation, n_lines, |_| 0)?,
        bad_calibration: provenance_column("bad_calibration", &raw.bad_calibration, n_lines, |_| {
            0
        })?,
        bad_time: provenance_column("bad_time", &raw.bad_time, n_lines, |_| 0)?,
        missing_lines: provenance_column("missing_lines", &raw.missing_lines, n_lines, |_| 0)?,
    };

    let record = MeasurementRecord::from_parts(
        raw.sensor.clone(),
        raw.version.clone(),
        raw.sources.clone(),
        date_time,
        time,
        fields,
        Array1::from(raw.scan_quality.clone()),
        raw.channel_quality.clone(),
        raw.ch3a_present.iter().map(|&flag| flag != 0).collect(),
        provenance,
        raw.constants.clone(),
        n_elements,
    );

    if first == 0 && last + 1 == n_lines {
        return Ok(record);
    }

    info!(
        leading = first,
        trailing = n_lines - 1 - last,
        "trimming scanlines with invalid timestamps"
    );
    let kept: Vec<usize> = (first..=last).collect();
    Ok(record.select_lines(&kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticOrbit, SyntheticParams};

    #[test]
    fn timestamp_validity() {
        assert!(scanline_timestamp(2010, 3, 4, 12.5).is_some());
        assert!(scanline_timestamp(1900, 3, 4, 1.0).is_none());
        assert!(scanline_timestamp(2010, 0, 4, 1.0).is_none());
        assert!(scanline_timestamp(2010, 3, 0, 1.0).is_none());
        assert!(scanline_timestamp(2010, 3, 4, -1.0).is_none());
        assert!(scanline_timestamp(2010, 2, 30, 1.0).is_none());
        assert!(scanline_timestamp(2010, 3, 4, 24.0).is_none());
        assert!(scanline_timestamp(2010, 3, 4, 1.0e12).is_none());
        assert!(scanline_timestamp(2010, 3, 4, f64::NAN).is_none());

        let stamp = scanline_timestamp(2010, 3, 4, 1.5).expect("valid stamp");
        assert_eq!(stamp.format("%H:%M").to_string(), "01:30");
    }

    #[test]
    fn sentinels_become_nan() {
        let values = Array2::from_shape_vec((1, 4), vec![1.0, -1.0e30, f64::INFINITY, -5.0])
            .expect("shape");
        let clean = sanitize(&values);
        assert_eq!(clean[[0, 0]], 1.0);
        assert!(clean[[0, 1]].is_nan());
        assert!(clean[[0, 2]].is_nan());
        assert_eq!(clean[[0, 3]], -5.0);
    }

    #[test]
    fn trims_invalid_edges_only() {
        let params = SyntheticParams {
            n_lines: 20,
            invalid_leading: 3,
            invalid_trailing: 2,
            ..SyntheticParams::default()
        };
        let mut raw = SyntheticOrbit::new(params).generate();
        raw.year[10] = 0;

        let record = cleanse(&raw).expect("cleanse");
        assert_eq!(record.n_lines(), 15);
        assert!(record.time[0].is_finite());
        assert!(record.time[14].is_finite());
        assert!(record.time[7].is_nan());
        assert_eq!(record.provenance.orig_scanline[0], 3);
    }

    #[test]
    fn corrupt_hours_mark_line_invalid() {
        let mut raw = SyntheticOrbit::new(SyntheticParams {
            n_lines: 20,
            ..SyntheticParams::default()
        })
        .generate();
        raw.hours[9] = 1.0e12;
        raw.hours[19] = 36.0;

        let record = cleanse(&raw).expect("cleanse");
        assert_eq!(record.n_lines(), 19);
        assert!(record.time[9].is_nan());
        assert!(record.time[8].is_finite());
        assert!(record.time[18].is_finite());
    }

    #[test]
    fn all_invalid_times_fail() {
        let mut raw = SyntheticOrbit::new(SyntheticParams {
            n_lines: 8,
            ..SyntheticParams::default()
        })
        .generate();
        raw.year.iter_mut().for_each(|y| *y = 0);
        assert!(matches!(cleanse(&raw), Err(FcdrError::NoUsableData)));
    }

    #[test]
    fn mismatched_field_shape_is_reported() {
        let mut raw = SyntheticOrbit::new(SyntheticParams {
            n_lines: 8,
            ..SyntheticParams::default()
        })
        .generate();
        raw.fields
            .insert("ch4".to_string(), Array2::zeros((7, raw.fields["latitude"].ncols())));
        assert!(matches!(
            cleanse(&raw),
            Err(FcdrError::ShapeMismatch { context, .. }) if context == "ch4"
        ));
    }
}
