//! Scanline validity masking and degenerate-sensitivity repair.
//!
//! Everything here is a pure transformation: the input tensors are left
//! untouched and repaired copies are returned alongside a report.

use ndarray::{Array1, Array4, Axis};
use tracing::warn;

use crate::effects::Effect;
use crate::record::{derivative_kinds, DerivativeKind, Field, MeasurementRecord};
use crate::tensors::{EffectTensors, SampledTensor, TensorKind};
use crate::{FcdrError, FILL_THRESHOLD};

pub const DO_NOT_USE: u16 = 1;
pub const BAD_TIME: u16 = 2;
pub const BAD_NAVIGATION: u16 = 4;
pub const BAD_CALIBRATION: u16 = 8;
pub const CH3A_PRESENT: u16 = 16;
pub const SOLAR_CONTAMINATION: u16 = 32;
pub const SOLAR_IN_EARTHVIEW: u16 = 64;

const BAD_SCAN_BITS: u16 = DO_NOT_USE | BAD_TIME | BAD_NAVIGATION | BAD_CALIBRATION;

pub fn bad_scan_quality(quality: u16) -> bool {
    quality & BAD_SCAN_BITS != 0
}

fn bad_sample(value: f64) -> bool {
    !value.is_finite() || value <= FILL_THRESHOLD
}

/// Derivative fields whose samples decide whether a scanline is usable.
fn checked_fields(tensors: &EffectTensors) -> Vec<Field> {
    let kinds: &[DerivativeKind] = if tensors.category.is_visible() {
        &[DerivativeKind::SpaceCounts]
    } else {
        &[
            DerivativeKind::Temperature,
            DerivativeKind::SpaceCounts,
            DerivativeKind::IctCounts,
        ]
    };
    tensors
        .channels
        .iter()
        .flat_map(|channel| {
            kinds
                .iter()
                .filter(move |kind| derivative_kinds(channel).contains(kind))
                .map(move |&kind| Field::Derivative(channel, kind))
        })
        .collect()
}

/// Validity mask over the subsampled scanlines; `true` marks an excluded line.
pub fn scanline_mask(
    record: &MeasurementRecord,
    tensors: &EffectTensors,
) -> Result<Array1<bool>, FcdrError> {
    let fields = checked_fields(tensors)
        .into_iter()
        .map(|field| record.require(field))
        .collect::<Result<Vec<_>, _>>()?;
    let grid = &tensors.grid;

    Ok(grid
        .lines
        .iter()
        .map(|&line| {
            bad_scan_quality(record.scan_quality[line])
                || fields.iter().any(|values| {
                    grid.elements
                        .iter()
                        .any(|&element| bad_sample(values[[line, element]]))
                })
        })
        .collect())
}

/// (effect, channel, scanline) lane that had nothing to take a median from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnrepairableLane {
    pub effect: Effect,
    pub channel: usize,
    /// Full-resolution scanline index within the segment
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Samples replaced by a lane median, summed over all tensors
    pub repaired: usize,
    pub unrepairable: Vec<UnrepairableLane>,
    pub masked_lines: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.unrepairable.is_empty()
    }

    fn flag(&mut self, lane: UnrepairableLane) {
        if !self.unrepairable.contains(&lane) {
            self.unrepairable.push(lane);
        }
    }

    pub fn merge(&mut self, other: &RepairReport) {
        self.repaired += other.repaired;
        self.masked_lines = self.masked_lines.max(other.masked_lines);
        for lane in &other.unrepairable {
            self.flag(*lane);
        }
    }
}

/// Median as numpy computes it: mean of the two middle values for even counts.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(0.5 * (values[mid - 1] + values[mid]))
    } else {
        Some(values[mid])
    }
}

/// Lane-wise repair of a canonical (effect, channel, line, element) tensor.
///
/// Positions where `reference` equals `degenerate` are replaced by the median
/// of the lane's finite values at non-degenerate positions. Lanes on masked
/// lines are skipped. Returns the repaired copy, the number of replaced
/// samples and the (effect, channel, line) index of every lane left as is.
pub fn repair_lanes(
    values: &Array4<f64>,
    reference: &Array4<f64>,
    line_mask: &Array1<bool>,
    degenerate: f64,
) -> (Array4<f64>, usize, Vec<(usize, usize, usize)>) {
    let mut repaired = values.clone();
    let mut count = 0;
    let mut unrepairable = Vec::new();
    let (n_effects, n_channels, n_lines, _) = values.dim();

    for effect in 0..n_effects {
        for channel in 0..n_channels {
            for line in 0..n_lines {
                if line_mask.get(line).copied().unwrap_or(false) {
                    continue;
                }
                let reference_lane = reference.slice(ndarray::s![effect, channel, line, ..]);
                if !reference_lane.iter().any(|&r| r == degenerate) {
                    continue;
                }
                let mut lane = repaired.slice_mut(ndarray::s![effect, channel, line, ..]);
                let mut candidates: Vec<f64> = lane
                    .iter()
                    .zip(reference_lane.iter())
                    .filter(|(&v, &r)| r != degenerate && v != degenerate && !bad_sample(v))
                    .map(|(&v, _)| v)
                    .collect();
                let Some(replacement) = median(&mut candidates) else {
                    unrepairable.push((effect, channel, line));
                    continue;
                };
                for (v, &r) in lane.iter_mut().zip(reference_lane.iter()) {
                    if r == degenerate {
                        *v = replacement;
                        count += 1;
                    }
                }
            }
        }
    }
    (repaired, count, unrepairable)
}

/// Sentinel-range values and every value on a masked line become NaN.
pub fn apply_line_mask(values: &Array4<f64>, line_mask: &Array1<bool>) -> Array4<f64> {
    let mut masked = values.mapv(|v| if v <= FILL_THRESHOLD { f64::NAN } else { v });
    for (line, _) in line_mask.iter().enumerate().filter(|(_, &bad)| bad) {
        if line < masked.len_of(Axis(2)) {
            masked.index_axis_mut(Axis(2), line).fill(f64::NAN);
        }
    }
    masked
}

const TENSOR_PAIRS: [(TensorKind, TensorKind); 4] = [
    (TensorKind::UncertaintyElement, TensorKind::SensitivityElement),
    (TensorKind::UncertaintyLine, TensorKind::SensitivityLine),
    (TensorKind::UncertaintyChannel, TensorKind::SensitivityChannel),
    (
        TensorKind::UncertaintyIndependent,
        TensorKind::SensitivityIndependent,
    ),
];

/// Repairs degenerate sensitivities (and the uncertainties paired with them)
/// in every tensor, then blanks sentinel values and masked lines.
pub fn repair_tensors(
    tensors: &EffectTensors,
    line_mask: &Array1<bool>,
    degenerate: f64,
) -> (EffectTensors, RepairReport) {
    let mut out = tensors.clone();
    let mut report = RepairReport {
        masked_lines: line_mask.iter().filter(|&&bad| bad).count(),
        ..RepairReport::default()
    };

    for (u_kind, c_kind) in TENSOR_PAIRS {
        let independent = c_kind == TensorKind::SensitivityIndependent;
        let u = tensors.tensor(u_kind);
        let c = tensors.tensor(c_kind);
        let c_canonical = c.canonical();
        let u_canonical = u.canonical();

        let (u_fixed, u_count, _) = repair_lanes(&u_canonical, &c_canonical, line_mask, degenerate);
        let (c_fixed, c_count, lanes) =
            repair_lanes(&c_canonical, &c_canonical, line_mask, degenerate);
        report.repaired += u_count + c_count;

        for (effect, channel, line) in lanes {
            report.flag(UnrepairableLane {
                effect: if independent {
                    Effect::PixelNoise
                } else {
                    tensors.effects[effect]
                },
                channel: tensors.channels.as_slice()[channel],
                line: tensors.grid.lines[line],
            });
        }

        *out.tensor_mut(u_kind) =
            SampledTensor::from_canonical(u.orientation, apply_line_mask(&u_fixed, line_mask));
        *out.tensor_mut(c_kind) =
            SampledTensor::from_canonical(c.orientation, apply_line_mask(&c_fixed, line_mask));
    }

    for lane in &report.unrepairable {
        warn!(
            category = %tensors.category,
            effect = %lane.effect,
            channel = lane.channel,
            line = lane.line,
            "all sensitivities degenerate in lane, left unrepaired"
        );
    }

    (out, report)
}

/// Masked and repaired tensors ready for the engine.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub tensors: EffectTensors,
    pub line_mask: Array1<bool>,
    pub report: RepairReport,
}

pub fn prepare_run(
    record: &MeasurementRecord,
    tensors: &EffectTensors,
    degenerate: f64,
) -> Result<PreparedRun, FcdrError> {
    let line_mask = scanline_mask(record, tensors)?;
    let (tensors, report) = repair_tensors(tensors, &line_mask, degenerate);
    Ok(PreparedRun {
        tensors,
        line_mask,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array4;

    const TINY: f64 = 1.0e-10;

    fn lane_tensor(values: &[f64]) -> Array4<f64> {
        Array4::from_shape_vec((1, 1, 1, values.len()), values.to_vec()).expect("shape")
    }

    #[test]
    fn quality_bits() {
        assert!(bad_scan_quality(DO_NOT_USE));
        assert!(bad_scan_quality(BAD_CALIBRATION | CH3A_PRESENT));
        assert!(!bad_scan_quality(CH3A_PRESENT | SOLAR_CONTAMINATION));
        assert!(!bad_scan_quality(SOLAR_IN_EARTHVIEW));
    }

    #[test]
    fn median_matches_numpy() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn degenerate_sample_takes_lane_median() {
        let values = lane_tensor(&[
            1.0, 2.0, 3.0, TINY, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0,
        ]);
        let mask = Array1::from(vec![false]);
        let (fixed, count, unrepairable) = repair_lanes(&values, &values, &mask, TINY);
        assert_eq!(count, 1);
        assert!(unrepairable.is_empty());
        assert_relative_eq!(fixed[[0, 0, 0, 3]], 5.0);
        assert_relative_eq!(fixed[[0, 0, 0, 0]], 1.0);
    }

    #[test]
    fn all_degenerate_lane_is_left_alone() {
        let values = lane_tensor(&[TINY; 6]);
        let mask = Array1::from(vec![false]);
        let (fixed, count, unrepairable) = repair_lanes(&values, &values, &mask, TINY);
        assert_eq!(count, 0);
        assert_eq!(unrepairable, vec![(0, 0, 0)]);
        assert_eq!(fixed, values);
    }

    #[test]
    fn uncertainty_follows_sensitivity_reference() {
        let c = lane_tensor(&[2.0, TINY, 4.0]);
        let u = lane_tensor(&[0.1, 0.7, 0.3]);
        let mask = Array1::from(vec![false]);
        let (fixed, count, _) = repair_lanes(&u, &c, &mask, TINY);
        assert_eq!(count, 1);
        assert_relative_eq!(fixed[[0, 0, 0, 1]], 0.2);
    }

    #[test]
    fn masked_lines_are_blanked_and_not_repaired() {
        let values = Array4::from_shape_vec(
            (1, 1, 2, 3),
            vec![1.0, TINY, 3.0, 1.0, TINY, -1.0e30],
        )
        .expect("shape");
        let mask = Array1::from(vec![false, true]);
        let (fixed, count, _) = repair_lanes(&values, &values, &mask, TINY);
        assert_eq!(count, 1);
        let blanked = apply_line_mask(&fixed, &mask);
        assert_relative_eq!(blanked[[0, 0, 0, 1]], 2.0);
        assert!(blanked
            .slice(ndarray::s![0, 0, 1, ..])
            .iter()
            .all(|v| v.is_nan()));
    }
}
