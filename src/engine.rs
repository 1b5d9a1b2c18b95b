//! Correlation engine contract and the deterministic reference implementation.

use ndarray::{Array1, Array2, Array4, Axis};
use tracing::debug;

use crate::effects::EffectCategory;
use crate::tensors::{EffectTensors, Toeplitz};
use crate::FcdrError;

/// Everything one engine run consumes.
#[derive(Debug, Clone)]
pub struct EngineInput<'a> {
    pub tensors: &'a EffectTensors,
    /// `true` marks an excluded subsampled scanline
    pub line_mask: &'a Array1<bool>,
    /// `true` marks an excluded channel
    pub channel_mask: Array1<bool>,
    pub line_skip: usize,
    pub elem_skip: usize,
    /// Maximum number of subsampled line offsets in the profile
    pub cutoff_lines: usize,
    /// Maximum number of subsampled element offsets in the profile
    pub cutoff_elements: usize,
    /// Report profiles on native pixel offsets
    pub interpolate: bool,
}

impl<'a> EngineInput<'a> {
    /// Input with every channel kept and cutoffs derived from the segment size.
    pub fn new(
        tensors: &'a EffectTensors,
        line_mask: &'a Array1<bool>,
        n_lines: usize,
        n_elements: usize,
        interpolate: bool,
    ) -> Self {
        let line_skip = tensors.grid.line_skip.max(1);
        let elem_skip = tensors.grid.elem_skip.max(1);
        Self {
            tensors,
            line_mask,
            channel_mask: Array1::from_elem(tensors.n_channels(), false),
            line_skip,
            elem_skip,
            cutoff_lines: (n_lines / line_skip).max(1),
            cutoff_elements: (n_elements / elem_skip).max(1),
            interpolate,
        }
    }
}

/// Profiles are (offset, channel); matrices are sized to the run's channels.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub line_profile: Array2<f64>,
    pub element_profile: Array2<f64>,
    pub independent: Array2<f64>,
    pub structured: Array2<f64>,
    pub common: Array2<f64>,
}

pub trait CorrelationEngine {
    fn propagate(&self, input: &EngineInput<'_>) -> Result<EngineOutput, FcdrError>;
}

/// Propagates effect covariances through the sensitivities and collapses the
/// per-effect correlation shapes into variance-weighted profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagationEngine;

/// U·C per sample in (effect, channel, line, element) order.
fn contributions(u: &Array4<f64>, c: &Array4<f64>) -> Array4<f64> {
    let mut product = u * c;
    product.mapv_inplace(|v| if v.is_finite() { v } else { f64::NAN });
    product
}

fn valid_line(mask: &Array1<bool>, line: usize) -> bool {
    !mask.get(line).copied().unwrap_or(false)
}

/// Mean over valid samples of `v_a * v_b` for one effect.
fn cross_moment(values: &Array4<f64>, effect: usize, a: usize, b: usize, mask: &Array1<bool>) -> f64 {
    let lane_a = values.index_axis(Axis(0), effect);
    let lane_a = lane_a.index_axis(Axis(0), a);
    let lane_b = values.index_axis(Axis(0), effect);
    let lane_b = lane_b.index_axis(Axis(0), b);

    let mut sum = 0.0;
    let mut count = 0_usize;
    for (((line, _), &va), &vb) in lane_a.indexed_iter().zip(lane_b.iter()) {
        if !valid_line(mask, line) || !va.is_finite() || !vb.is_finite() {
            continue;
        }
        sum += va * vb;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Channel correlation from per-effect channel correlation shapes.
fn channel_correlation(
    values: &Array4<f64>,
    r_xchan: &[Array2<f64>],
    line_mask: &Array1<bool>,
    channel_mask: &Array1<bool>,
) -> Array2<f64> {
    let n = values.len_of(Axis(1));
    let mut covariance = Array2::<f64>::zeros((n, n));
    for (effect, shape) in r_xchan.iter().enumerate() {
        for a in 0..n {
            for b in a..n {
                let r = shape[[a, b]];
                if r == 0.0 {
                    continue;
                }
                let term = r * cross_moment(values, effect, a, b, line_mask);
                covariance[[a, b]] += term;
                if a != b {
                    covariance[[b, a]] += term;
                }
            }
        }
    }

    let excluded = |ch: usize| channel_mask.get(ch).copied().unwrap_or(false);
    Array2::from_shape_fn((n, n), |(a, b)| {
        if a == b {
            return 1.0;
        }
        let (va, vb) = (covariance[[a, a]], covariance[[b, b]]);
        if excluded(a) || excluded(b) || !(va > 0.0 && vb > 0.0) {
            return 0.0;
        }
        let corr = covariance[[a, b]] / (va * vb).sqrt();
        if corr.is_finite() {
            corr.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    })
}

/// Variance-weighted mean of per-effect Toeplitz coefficients, (offset, channel).
fn weighted_profile(
    shapes: &[Toeplitz],
    weights: &Array2<f64>,
    n_offsets: usize,
) -> Array2<f64> {
    let n_channels = weights.ncols();
    Array2::from_shape_fn((n_offsets, n_channels), |(offset, channel)| {
        let column = weights.column(channel);
        let total: f64 = column.iter().filter(|w| w.is_finite()).sum();
        if total > 0.0 {
            shapes
                .iter()
                .zip(column.iter())
                .filter(|(_, w)| w.is_finite())
                .map(|(shape, w)| w * shape.coefficient(offset))
                .sum::<f64>()
                / total
        } else if shapes.is_empty() {
            0.0
        } else {
            shapes.iter().map(|s| s.coefficient(offset)).sum::<f64>() / shapes.len() as f64
        }
    })
}

/// Linear interpolation of a subsampled profile onto native pixel offsets.
pub fn interpolate_profile(profile: &Array2<f64>, skip: usize) -> Array2<f64> {
    let n = profile.nrows();
    if n <= 1 || skip <= 1 {
        return profile.clone();
    }
    let native = (n - 1) * skip + 1;
    Array2::from_shape_fn((native, profile.ncols()), |(offset, channel)| {
        let lo = offset / skip;
        let frac = (offset % skip) as f64 / skip as f64;
        if frac == 0.0 || lo + 1 >= n {
            return profile[[lo.min(n - 1), channel]];
        }
        let (a, b) = (profile[[lo, channel]], profile[[lo + 1, channel]]);
        a + frac * (b - a)
    })
}

fn check_channels(context: &str, expected: usize, got: usize) -> Result<(), FcdrError> {
    if expected == got {
        return Ok(());
    }
    Err(FcdrError::ShapeMismatch {
        context: context.to_string(),
        expected: vec![expected],
        got: vec![got],
    })
}

impl CorrelationEngine for PropagationEngine {
    fn propagate(&self, input: &EngineInput<'_>) -> Result<EngineOutput, FcdrError> {
        let tensors = input.tensors;
        let n_channels = tensors.n_channels();
        check_channels("r_xchan", n_channels, tensors.r_xchan.len_of(Axis(1)))?;
        check_channels("channel_mask", n_channels, input.channel_mask.len())?;

        let structured = contributions(&tensors.u_xelem.canonical(), &tensors.c_xelem.canonical());
        let independent = contributions(
            &tensors.u_xchan_i.canonical(),
            &tensors.c_xchan_i.canonical(),
        );

        let r_xchan: Vec<Array2<f64>> = tensors
            .r_xchan
            .axis_iter(Axis(0))
            .map(|m| m.to_owned())
            .collect();
        let structured_corr =
            channel_correlation(&structured, &r_xchan, input.line_mask, &input.channel_mask);
        let independent_corr = channel_correlation(
            &independent,
            std::slice::from_ref(&tensors.r_xchan_i),
            input.line_mask,
            &input.channel_mask,
        );

        let n_effects = structured.len_of(Axis(0));
        let weights = Array2::from_shape_fn((n_effects, n_channels), |(effect, channel)| {
            cross_moment(&structured, effect, channel, channel, input.line_mask)
        });

        let mut line_profile = weighted_profile(&tensors.r_xline, &weights, input.cutoff_lines);
        let mut element_profile =
            weighted_profile(&tensors.r_xelem, &weights, input.cutoff_elements);
        if input.interpolate {
            line_profile = interpolate_profile(&line_profile, input.line_skip);
            element_profile = interpolate_profile(&element_profile, input.elem_skip);
        }

        debug!(
            category = %tensors.category,
            channels = n_channels,
            line_offsets = line_profile.nrows(),
            element_offsets = element_profile.nrows(),
            "propagated effect tensors"
        );

        let identity = Array2::eye(n_channels);
        let (structured, common) = match tensors.category {
            EffectCategory::InfraredCommon => (identity, structured_corr),
            EffectCategory::Visible | EffectCategory::InfraredStructured => {
                (structured_corr, identity)
            }
        };

        Ok(EngineOutput {
            line_profile,
            element_profile,
            independent: independent_corr,
            structured,
            common,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolation_hits_subsampled_points() {
        let profile = Array2::from_shape_vec((3, 1), vec![1.0, 0.5, 0.0]).expect("shape");
        let native = interpolate_profile(&profile, 5);
        assert_eq!(native.nrows(), 11);
        assert_relative_eq!(native[[0, 0]], 1.0);
        assert_relative_eq!(native[[5, 0]], 0.5);
        assert_relative_eq!(native[[10, 0]], 0.0);
        assert_relative_eq!(native[[2, 0]], 0.8);
    }

    #[test]
    fn weighted_profile_falls_back_to_plain_mean() {
        let shapes = vec![Toeplitz::banded(10, 10.0, 5), Toeplitz::all_ones(10)];
        let zero = Array2::zeros((2, 1));
        let profile = weighted_profile(&shapes, &zero, 4);
        assert_relative_eq!(profile[[1, 0]], 0.75);
        assert_relative_eq!(profile[[3, 0]], 0.5);

        let weights = Array2::from_shape_vec((2, 1), vec![3.0, 1.0]).expect("shape");
        let profile = weighted_profile(&shapes, &weights, 4);
        assert_relative_eq!(profile[[1, 0]], (3.0 * 0.5 + 1.0) / 4.0);
    }

    #[test]
    fn channel_correlation_is_bounded_and_symmetric() {
        let values = Array4::from_shape_fn((1, 3, 4, 2), |(_, c, l, e)| {
            (c as f64 + 1.0) * (l as f64 - 1.5) + e as f64 * 0.1
        });
        let r = vec![Array2::ones((3, 3))];
        let mask = Array1::from_elem(4, false);
        let channel_mask = Array1::from_elem(3, false);
        let corr = channel_correlation(&values, &r, &mask, &channel_mask);
        for a in 0..3 {
            assert_relative_eq!(corr[[a, a]], 1.0);
            for b in 0..3 {
                assert_relative_eq!(corr[[a, b]], corr[[b, a]]);
                assert!(corr[[a, b]].abs() <= 1.0);
            }
        }
    }

    #[test]
    fn identity_shape_gives_identity_correlation() {
        let values = Array4::from_elem((1, 2, 3, 3), 0.5);
        let r = vec![Array2::eye(2)];
        let mask = Array1::from_elem(3, false);
        let corr = channel_correlation(&values, &r, &mask, &Array1::from_elem(2, false));
        assert_eq!(corr, Array2::<f64>::eye(2));
    }
}
