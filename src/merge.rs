//! Merge of the visible, infra-red structured and infra-red common runs into
//! full-sensor channel matrices and truncated correlation-length profiles.

use ndarray::{concatenate, s, Array2, Axis};

use crate::channels::{ChannelConfiguration, ChannelSubset};
use crate::effects::EffectCategory;
use crate::engine::EngineOutput;
use crate::{FcdrError, SENSOR_CHANNELS};

#[derive(Debug, Clone)]
pub struct RunResult {
    pub category: EffectCategory,
    pub channels: ChannelSubset,
    pub output: EngineOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedCorrelation {
    pub present: [bool; SENSOR_CHANNELS],
    pub independent: Array2<f64>,
    pub structured: Array2<f64>,
    pub common: Array2<f64>,
    /// Sensor channel of each profile column
    pub profile_channels: Vec<usize>,
    /// (offset, profile column)
    pub cross_line: Array2<f64>,
    /// (offset, profile column)
    pub cross_element: Array2<f64>,
    pub line_truncation: usize,
    pub element_truncation: usize,
}

impl MergedCorrelation {
    fn padded(&self, profile: &Array2<f64>) -> Array2<f64> {
        let mut padded = Array2::zeros((profile.nrows(), SENSOR_CHANNELS));
        for (column, &channel) in self.profile_channels.iter().enumerate() {
            padded.column_mut(channel).assign(&profile.column(column));
        }
        padded
    }

    /// Cross-line profile with one column per sensor channel, zero where absent.
    pub fn padded_cross_line(&self) -> Array2<f64> {
        self.padded(&self.cross_line)
    }

    pub fn padded_cross_element(&self) -> Array2<f64> {
        self.padded(&self.cross_element)
    }

    pub fn present_channels(&self) -> Vec<usize> {
        (0..SENSOR_CHANNELS).filter(|&ch| self.present[ch]).collect()
    }
}

/// Largest offset at which any column of any profile is finite and non-zero.
pub fn truncation_length(profiles: &[&Array2<f64>]) -> usize {
    profiles
        .iter()
        .filter_map(|profile| {
            profile
                .axis_iter(Axis(0))
                .enumerate()
                .filter(|(_, row)| row.iter().any(|&v| v.is_finite() && v != 0.0))
                .map(|(offset, _)| offset)
                .last()
        })
        .max()
        .unwrap_or(0)
}

fn truncate(profile: &Array2<f64>, length: usize) -> Array2<f64> {
    let rows = (length + 1).min(profile.nrows());
    profile.slice(s![..rows, ..]).to_owned()
}

/// 6×6 matrix with unit diagonal on present channels and `block` embedded at
/// `channels`.
pub fn embed_block(
    present: &[bool; SENSOR_CHANNELS],
    block: &Array2<f64>,
    channels: &ChannelSubset,
) -> Result<Array2<f64>, FcdrError> {
    let n = channels.len();
    if block.shape() != [n, n] {
        return Err(FcdrError::ShapeMismatch {
            context: "channel correlation block".to_string(),
            expected: vec![n, n],
            got: block.shape().to_vec(),
        });
    }

    let mut matrix = identity_over(present);
    for (i, ci) in channels.iter().enumerate() {
        for (j, cj) in channels.iter().enumerate() {
            matrix[[ci, cj]] = block[[i, j]];
        }
    }
    Ok(matrix)
}

fn identity_over(present: &[bool; SENSOR_CHANNELS]) -> Array2<f64> {
    let mut matrix = Array2::zeros((SENSOR_CHANNELS, SENSOR_CHANNELS));
    for (ch, _) in present.iter().enumerate().filter(|(_, &p)| p) {
        matrix[[ch, ch]] = 1.0;
    }
    matrix
}

fn check_category(run: &RunResult, expected: EffectCategory) -> Result<(), FcdrError> {
    if run.category == expected {
        return Ok(());
    }
    Err(FcdrError::InvalidConfig(format!(
        "expected {expected} run, got {}",
        run.category
    )))
}

/// Merges the three runs of one segment.
pub fn merge_runs(
    configuration: &ChannelConfiguration,
    visible: &RunResult,
    structured: &RunResult,
    common: &RunResult,
) -> Result<MergedCorrelation, FcdrError> {
    check_category(visible, EffectCategory::Visible)?;
    check_category(structured, EffectCategory::InfraredStructured)?;
    check_category(common, EffectCategory::InfraredCommon)?;

    let mut present = [true; SENSOR_CHANNELS];
    for ch in configuration.absent_channels() {
        present[ch] = false;
    }

    let line_truncation = truncation_length(&[
        &visible.output.line_profile,
        &structured.output.line_profile,
        &common.output.line_profile,
    ]);
    let element_truncation = truncation_length(&[
        &visible.output.element_profile,
        &structured.output.element_profile,
        &common.output.element_profile,
    ]);

    let cross_line = concatenate(
        Axis(1),
        &[
            visible.output.line_profile.view(),
            structured.output.line_profile.view(),
        ],
    )?;
    let cross_element = concatenate(
        Axis(1),
        &[
            visible.output.element_profile.view(),
            structured.output.element_profile.view(),
        ],
    )?;

    let profile_channels: Vec<usize> = visible
        .channels
        .iter()
        .chain(structured.channels.iter())
        .collect();

    Ok(MergedCorrelation {
        present,
        independent: identity_over(&present),
        structured: embed_block(&present, &structured.output.structured, &structured.channels)?,
        common: embed_block(&present, &common.output.common, &common.channels)?,
        profile_channels,
        cross_line: truncate(&cross_line, line_truncation),
        cross_element: truncate(&cross_element, element_truncation),
        line_truncation,
        element_truncation,
    })
}
