//! Deterministic synthetic orbits for demos and tests.

use std::collections::BTreeMap;
use std::ops::Range;

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::channels::{ChannelConfiguration, Sensor, SensorFamily};
use crate::config::DEGENERATE_SENSITIVITY;
use crate::masking::{BAD_TIME, CH3A_PRESENT};
use crate::record::{derivative_kinds, Field, RawOrbit, SensorConstants};
use crate::SENSOR_CHANNELS;

/// Value the upstream reader uses for missing samples.
pub const FILL_VALUE: f64 = -1.0e30;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticParams {
    pub sensor: String,
    pub n_lines: usize,
    pub n_elements: usize,
    pub seed: u64,
    /// Scanlines flagged with Ch3a active
    pub ch3a_lines: Option<Range<usize>>,
    /// Lines at the start with an invalid timestamp
    pub invalid_leading: usize,
    /// Lines at the end with an invalid timestamp
    pub invalid_trailing: usize,
    /// Probability that a derivative sample is the degenerate value
    pub degenerate_fraction: f64,
    /// Lines whose derivatives carry a fill value at element 0
    pub bad_derivative_lines: Vec<usize>,
    pub spatial_correlation_scale: f64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            sensor: "NOAA19".to_string(),
            n_lines: 40,
            n_elements: 51,
            seed: 0xFCD2_0180_0001_u64,
            ch3a_lines: None,
            invalid_leading: 0,
            invalid_trailing: 0,
            degenerate_fraction: 0.0,
            bad_derivative_lines: Vec::new(),
            spatial_correlation_scale: 25.0,
        }
    }
}

pub struct SyntheticOrbit {
    params: SyntheticParams,
    rng: ChaCha8Rng,
}

impl SyntheticOrbit {
    pub fn new(params: SyntheticParams) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(params.seed);
        Self { params, rng }
    }

    fn noise(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }

    /// Smooth field around `base` with a small relative perturbation.
    fn field(&mut self, base: f64, relative_noise: f64) -> Array2<f64> {
        let (n_lines, n_elements) = (self.params.n_lines, self.params.n_elements);
        let mut values = Array2::zeros((n_lines, n_elements));
        for ((line, element), value) in values.indexed_iter_mut() {
            let trend = 1.0
                + 0.05 * (line as f64 / n_lines.max(1) as f64)
                + 0.02 * (element as f64 / n_elements.max(1) as f64);
            *value = base * trend * (1.0 + relative_noise * self.noise());
        }
        values
    }

    fn derivative_field(&mut self, base: f64) -> Array2<f64> {
        let mut values = self.field(base, 0.02);
        let fraction = self.params.degenerate_fraction;
        if fraction > 0.0 {
            for value in values.iter_mut() {
                if self.rng.gen::<f64>() < fraction {
                    *value = DEGENERATE_SENSITIVITY;
                }
            }
        }
        for &line in &self.params.bad_derivative_lines {
            if line < values.nrows() && values.ncols() > 0 {
                values[[line, 0]] = FILL_VALUE;
            }
        }
        values
    }

    fn channels(&self) -> Vec<usize> {
        match Sensor::from_identifier(&self.params.sensor) {
            Ok(sensor) if sensor.family != SensorFamily::SecondaryVisible => {
                ChannelConfiguration::resolve(sensor.family, false)
                    .channels()
                    .as_slice()
                    .to_vec()
            }
            _ => (0..SENSOR_CHANNELS).collect(),
        }
    }

    pub fn generate(mut self) -> RawOrbit {
        let n_lines = self.params.n_lines;
        let mut fields = BTreeMap::new();

        fields.insert(Field::Latitude.name(), self.field(40.0, 0.001));
        fields.insert(Field::Longitude.name(), self.field(-20.0, 0.001));
        fields.insert(Field::SatelliteZenith.name(), self.field(30.0, 0.01));
        fields.insert(Field::SolarZenith.name(), self.field(50.0, 0.01));
        fields.insert(Field::RelativeAzimuth.name(), self.field(90.0, 0.01));

        for channel in self.channels() {
            let infrared = channel >= 3;
            let (measurement, uncertainty) = if infrared { (280.0, 0.1) } else { (0.3, 0.01) };
            fields.insert(Field::Measurement(channel).name(), self.field(measurement, 0.02));
            fields.insert(
                Field::IndependentUncertainty(channel).name(),
                self.field(uncertainty, 0.05),
            );
            fields.insert(
                Field::StructuredUncertainty(channel).name(),
                self.field(uncertainty * 0.5, 0.05),
            );
            fields.insert(
                Field::CommonUncertainty(channel).name(),
                self.field(uncertainty * 0.2, 0.05),
            );
            for (k, kind) in derivative_kinds(channel).iter().enumerate() {
                let base = 0.4 + 0.1 * channel as f64 + 0.05 * k as f64;
                fields.insert(
                    Field::Derivative(channel, *kind).name(),
                    self.derivative_field(base),
                );
            }
            if infrared {
                fields.insert(Field::Harmonisation(channel).name(), self.field(0.05, 0.05));
            }
        }

        let invalid = |line: usize| {
            line < self.params.invalid_leading
                || line + self.params.invalid_trailing >= n_lines
        };
        let ch3a = |line: usize| {
            self.params
                .ch3a_lines
                .as_ref()
                .is_some_and(|range| range.contains(&line))
        };

        let mut year = Vec::with_capacity(n_lines);
        let mut hours = Vec::with_capacity(n_lines);
        let mut scan_quality = Vec::with_capacity(n_lines);
        let mut ch3a_present = Vec::with_capacity(n_lines);
        for line in 0..n_lines {
            let bad_time = invalid(line);
            year.push(if bad_time { 0 } else { 2015 });
            hours.push(if bad_time { -1.0 } else { 10.0 + line as f64 / 6.0 / 3600.0 });
            let mut quality = 0_u16;
            if bad_time {
                quality |= BAD_TIME;
            }
            if ch3a(line) {
                quality |= CH3A_PRESENT;
            }
            scan_quality.push(quality);
            ch3a_present.push(u8::from(ch3a(line)));
        }

        RawOrbit {
            sensor: self.params.sensor.clone(),
            version: "0.1".to_string(),
            sources: "synthetic".to_string(),
            year,
            month: vec![6; n_lines],
            day: vec![1; n_lines],
            hours,
            fields,
            scan_quality,
            channel_quality: Array2::zeros((n_lines, SENSOR_CHANNELS)),
            ch3a_present,
            scanline: (1..=n_lines as i32).collect(),
            orig_scanline: (0..n_lines as i32).collect(),
            bad_navigation: vec![0; n_lines],
            bad_calibration: vec![0; n_lines],
            bad_time: (0..n_lines).map(|line| u8::from(invalid(line))).collect(),
            missing_lines: vec![0; n_lines],
            constants: SensorConstants {
                ict_temperature_uncertainty: 0.1,
                prt_uncertainty: 0.05,
                cal_counts_noise: [0.2, 0.2, 0.2, 0.5, 0.4, 0.4],
                counts_noise: [0.3, 0.3, 0.3, 0.6, 0.5, 0.5],
                spatial_correlation_scale: self.params.spatial_correlation_scale,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_orbit() {
        let a = SyntheticOrbit::new(SyntheticParams::default()).generate();
        let b = SyntheticOrbit::new(SyntheticParams::default()).generate();
        assert_eq!(a.fields, b.fields);
        assert_eq!(a.hours, b.hours);
    }

    #[test]
    fn older_families_lack_ch3a_and_ch5() {
        let raw = SyntheticOrbit::new(SyntheticParams {
            sensor: "NOAA06".to_string(),
            ..SyntheticParams::default()
        })
        .generate();
        assert!(raw.fields.contains_key("dBT4_over_dCICT"));
        assert!(!raw.fields.contains_key("ch3a"));
        assert!(!raw.fields.contains_key("ch5"));
    }

    #[test]
    fn ch3a_flags_follow_range() {
        let raw = SyntheticOrbit::new(SyntheticParams {
            n_lines: 10,
            ch3a_lines: Some(2..5),
            ..SyntheticParams::default()
        })
        .generate();
        assert_eq!(raw.ch3a_present, vec![0, 0, 1, 1, 1, 0, 0, 0, 0, 0]);
        assert_eq!(raw.scan_quality[3], CH3A_PRESENT);
    }
}
