//! Per-orbit measurement record
//!
//! `RawOrbit` is what the file reader hands over; `MeasurementRecord` is the
//! cleansed form every later stage works on. Per-pixel fields are keyed by
//! `Field` so that cleansing, splitting and masking treat them uniformly.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{FcdrError, SENSOR_CHANNELS};

/// Short channel names in slot order.
pub const CHANNEL_NAMES: [&str; SENSOR_CHANNELS] = ["ch1", "ch2", "ch3a", "ch3b", "ch4", "ch5"];

const DERIVATIVE_STEMS: [&str; SENSOR_CHANNELS] = ["Re1", "Re2", "Re3a", "BT3", "BT4", "BT5"];

/// Calibration quantity a derivative is taken against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeKind {
    /// ICT temperature (`dBT/dT`)
    Temperature,
    /// Space-view counts (`dBT/dCS`, `dRe/dCS`)
    SpaceCounts,
    /// ICT-view counts (`dBT/dCICT`)
    IctCounts,
}

impl DerivativeKind {
    fn suffix(self) -> &'static str {
        match self {
            DerivativeKind::Temperature => "T",
            DerivativeKind::SpaceCounts => "CS",
            DerivativeKind::IctCounts => "CICT",
        }
    }
}

/// Identifies one per-pixel field of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Latitude,
    Longitude,
    SatelliteZenith,
    SolarZenith,
    RelativeAzimuth,
    Measurement(usize),
    IndependentUncertainty(usize),
    StructuredUncertainty(usize),
    CommonUncertainty(usize),
    Derivative(usize, DerivativeKind),
    Harmonisation(usize),
}

impl Field {
    /// Every field a record can carry, in a stable order.
    pub fn all() -> Vec<Field> {
        let mut fields = vec![
            Field::Latitude,
            Field::Longitude,
            Field::SatelliteZenith,
            Field::SolarZenith,
            Field::RelativeAzimuth,
        ];
        for channel in 0..SENSOR_CHANNELS {
            fields.push(Field::Measurement(channel));
            fields.push(Field::IndependentUncertainty(channel));
            fields.push(Field::StructuredUncertainty(channel));
            fields.push(Field::CommonUncertainty(channel));
        }
        for channel in 0..SENSOR_CHANNELS {
            for kind in derivative_kinds(channel) {
                fields.push(Field::Derivative(channel, *kind));
            }
        }
        for channel in 3..SENSOR_CHANNELS {
            fields.push(Field::Harmonisation(channel));
        }
        fields
    }

    /// Variable name used by the upstream reader.
    pub fn name(&self) -> String {
        match *self {
            Field::Latitude => "latitude".to_string(),
            Field::Longitude => "longitude".to_string(),
            Field::SatelliteZenith => "satza".to_string(),
            Field::SolarZenith => "solza".to_string(),
            Field::RelativeAzimuth => "relaz".to_string(),
            Field::Measurement(ch) => CHANNEL_NAMES[ch].to_string(),
            Field::IndependentUncertainty(ch) => format!("{}_random", CHANNEL_NAMES[ch]),
            Field::StructuredUncertainty(ch) => format!("{}_non_random", CHANNEL_NAMES[ch]),
            Field::CommonUncertainty(ch) => format!("{}_common", CHANNEL_NAMES[ch]),
            Field::Derivative(ch, kind) => {
                format!("d{}_over_d{}", DERIVATIVE_STEMS[ch], kind.suffix())
            }
            Field::Harmonisation(ch) => format!("{}_harm_uncertainty", CHANNEL_NAMES[ch]),
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::all().into_iter().find(|field| field.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Derivative kinds that exist for a channel slot. Reflectance channels only
/// carry the space-count derivative.
pub fn derivative_kinds(channel: usize) -> &'static [DerivativeKind] {
    const VISIBLE: [DerivativeKind; 1] = [DerivativeKind::SpaceCounts];
    const INFRARED: [DerivativeKind; 3] = [
        DerivativeKind::Temperature,
        DerivativeKind::SpaceCounts,
        DerivativeKind::IctCounts,
    ];
    match channel {
        0..=2 => &VISIBLE,
        3..=5 => &INFRARED,
        _ => &[],
    }
}

/// Scalar calibration constants attached to an orbit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConstants {
    pub ict_temperature_uncertainty: f64,
    pub prt_uncertainty: f64,
    /// Calibration-view counts noise per channel slot
    pub cal_counts_noise: [f64; SENSOR_CHANNELS],
    /// Earth-view pixel counts noise per channel slot
    pub counts_noise: [f64; SENSOR_CHANNELS],
    /// Spatial correlation scale of the calibration averaging [scanlines]
    pub spatial_correlation_scale: f64,
}

impl SensorConstants {
    /// Combined ICT/PRT temperature uncertainty.
    pub fn ict_prt_uncertainty(&self) -> f64 {
        (self.ict_temperature_uncertainty.powi(2) + self.prt_uncertainty.powi(2)).sqrt()
    }
}

/// Orbit as delivered by the file reader, before cleansing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOrbit {
    /// Platform identifier, e.g. `NOAA19` or `METOPA`
    pub sensor: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sources: String,
    pub year: Vec<i32>,
    pub month: Vec<u32>,
    pub day: Vec<u32>,
    /// Fractional hour of day
    pub hours: Vec<f64>,
    /// Per-pixel variables keyed by reader variable name
    pub fields: BTreeMap<String, Array2<f64>>,
    pub scan_quality: Vec<u16>,
    pub channel_quality: Array2<u16>,
    pub ch3a_present: Vec<u8>,
    #[serde(default)]
    pub scanline: Vec<i32>,
    #[serde(default)]
    pub orig_scanline: Vec<i32>,
    #[serde(default)]
    pub bad_navigation: Vec<u8>,
    #[serde(default)]
    pub bad_calibration: Vec<u8>,
    #[serde(default)]
    pub bad_time: Vec<u8>,
    #[serde(default)]
    pub missing_lines: Vec<u8>,
    pub constants: SensorConstants,
}

impl RawOrbit {
    pub fn from_json_file(path: &Path) -> Result<Self, FcdrError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn n_lines(&self) -> usize {
        self.year.len()
    }
}

/// Per-scanline bookkeeping carried through splits.
#[derive(Debug, Clone, PartialEq)]
pub struct LineProvenance {
    pub scanline: Array1<i32>,
    pub orig_scanline: Array1<i32>,
    pub bad_navigation: Array1<u8>,
    pub bad_calibration: Array1<u8>,
    pub bad_time: Array1<u8>,
    pub missing_lines: Array1<u8>,
}

impl LineProvenance {
    pub fn select(&self, lines: &[usize]) -> Self {
        Self {
            scanline: self.scanline.select(Axis(0), lines),
            orig_scanline: self.orig_scanline.select(Axis(0), lines),
            bad_navigation: self.bad_navigation.select(Axis(0), lines),
            bad_calibration: self.bad_calibration.select(Axis(0), lines),
            bad_time: self.bad_time.select(Axis(0), lines),
            missing_lines: self.missing_lines.select(Axis(0), lines),
        }
    }
}

/// Cleansed per-orbit record. Missing values are NaN.
#[derive(Debug, Clone)]
pub struct MeasurementRecord {
    pub sensor: String,
    pub version: String,
    pub sources: String,
    pub date_time: Vec<Option<DateTime<Utc>>>,
    /// Seconds since 1970-01-01, NaN where the timestamp is invalid
    pub time: Array1<f64>,
    pub fields: BTreeMap<Field, Array2<f64>>,
    pub scan_quality: Array1<u16>,
    pub channel_quality: Array2<u16>,
    pub ch3a_present: Array1<bool>,
    pub provenance: LineProvenance,
    pub constants: SensorConstants,
    n_elements: usize,
}

impl MeasurementRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        sensor: String,
        version: String,
        sources: String,
        date_time: Vec<Option<DateTime<Utc>>>,
        time: Array1<f64>,
        fields: BTreeMap<Field, Array2<f64>>,
        scan_quality: Array1<u16>,
        channel_quality: Array2<u16>,
        ch3a_present: Array1<bool>,
        provenance: LineProvenance,
        constants: SensorConstants,
        n_elements: usize,
    ) -> Self {
        Self {
            sensor,
            version,
            sources,
            date_time,
            time,
            fields,
            scan_quality,
            channel_quality,
            ch3a_present,
            provenance,
            constants,
            n_elements,
        }
    }

    pub fn n_lines(&self) -> usize {
        self.time.len()
    }

    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    pub fn field(&self, field: Field) -> Option<&Array2<f64>> {
        self.fields.get(&field)
    }

    pub fn require(&self, field: Field) -> Result<&Array2<f64>, FcdrError> {
        self.field(field)
            .ok_or_else(|| FcdrError::MissingField(field.name()))
    }

    pub fn derivative(&self, channel: usize, kind: DerivativeKind) -> Option<&Array2<f64>> {
        self.field(Field::Derivative(channel, kind))
    }

    /// First and last valid timestamps.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.date_time.iter().flatten().next()?;
        let last = self.date_time.iter().rev().flatten().next()?;
        Some((*first, *last))
    }

    /// Compact copy holding only the given scanlines, in order.
    pub fn select_lines(&self, lines: &[usize]) -> Self {
        Self {
            sensor: self.sensor.clone(),
            version: self.version.clone(),
            sources: self.sources.clone(),
            date_time: lines.iter().map(|&line| self.date_time[line]).collect(),
            time: self.time.select(Axis(0), lines),
            fields: self
                .fields
                .iter()
                .map(|(field, values)| (*field, values.select(Axis(0), lines)))
                .collect(),
            scan_quality: self.scan_quality.select(Axis(0), lines),
            channel_quality: self.channel_quality.select(Axis(0), lines),
            ch3a_present: self.ch3a_present.select(Axis(0), lines),
            provenance: self.provenance.select(lines),
            constants: self.constants.clone(),
            n_elements: self.n_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip() {
        for field in Field::all() {
            assert_eq!(Field::from_name(&field.name()), Some(field));
        }
    }

    #[test]
    fn reader_names_match_source_variables() {
        assert_eq!(
            Field::Derivative(4, DerivativeKind::IctCounts).name(),
            "dBT4_over_dCICT"
        );
        assert_eq!(
            Field::Derivative(2, DerivativeKind::SpaceCounts).name(),
            "dRe3a_over_dCS"
        );
        assert_eq!(Field::Harmonisation(3).name(), "ch3b_harm_uncertainty");
        assert_eq!(Field::StructuredUncertainty(0).name(), "ch1_non_random");
        assert_eq!(Field::from_name("dRe1_over_dT"), None);
    }

    #[test]
    fn combined_temperature_uncertainty() {
        let constants = SensorConstants {
            ict_temperature_uncertainty: 0.3,
            prt_uncertainty: 0.4,
            cal_counts_noise: [0.0; SENSOR_CHANNELS],
            counts_noise: [0.0; SENSOR_CHANNELS],
            spatial_correlation_scale: 20.0,
        };
        assert!((constants.ict_prt_uncertainty() - 0.5).abs() < 1e-12);
    }
}
