//! Generic channel-to-field gather onto the subsampled grid.

use ndarray::{stack, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::channels::ChannelCase;
use crate::record::{derivative_kinds, DerivativeKind, Field, MeasurementRecord};
use crate::FcdrError;

/// Axis layout of a gathered (channel, line, element) block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// (channel, line, element)
    ElementMajor,
    /// (channel, element, line)
    LineMajor,
    /// (line, element, channel)
    CrossChannel,
}

impl Orientation {
    /// Arranges per-channel (line, element) slices into this layout.
    pub fn arrange(self, slices: &[Array2<f64>]) -> Result<Array3<f64>, FcdrError> {
        let views: Vec<ArrayView2<'_, f64>> = match self {
            Orientation::LineMajor => slices.iter().map(|s| s.t()).collect(),
            _ => slices.iter().map(Array2::view).collect(),
        };
        let axis = match self {
            Orientation::ElementMajor | Orientation::LineMajor => Axis(0),
            Orientation::CrossChannel => Axis(2),
        };
        Ok(stack(axis, &views)?)
    }
}

/// Subsampled (line, element) coordinates of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGrid {
    pub lines: Vec<usize>,
    pub elements: Vec<usize>,
    pub line_skip: usize,
    pub elem_skip: usize,
}

impl SampleGrid {
    pub fn new(n_lines: usize, n_elements: usize, line_skip: usize, elem_skip: usize) -> Self {
        Self {
            lines: (0..n_lines).step_by(line_skip.max(1)).collect(),
            elements: (0..n_elements).step_by(elem_skip.max(1)).collect(),
            line_skip,
            elem_skip,
        }
    }

    pub fn for_record(record: &MeasurementRecord, line_skip: usize, elem_skip: usize) -> Self {
        Self::new(record.n_lines(), record.n_elements(), line_skip, elem_skip)
    }

    pub fn n_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Picks the grid points out of a full-resolution (line, element) field.
    pub fn sample(&self, values: &Array2<f64>) -> Array2<f64> {
        values
            .select(Axis(0), &self.lines)
            .select(Axis(1), &self.elements)
    }
}

/// Which per-channel field a gather reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector {
    Derivative(DerivativeKind),
    Harmonisation,
}

impl FieldSelector {
    pub fn field_for(self, channel: usize) -> Result<Field, FcdrError> {
        match self {
            FieldSelector::Derivative(kind) => {
                if derivative_kinds(channel).contains(&kind) {
                    Ok(Field::Derivative(channel, kind))
                } else {
                    Err(FcdrError::NoDerivative { channel, kind })
                }
            }
            FieldSelector::Harmonisation if channel >= 3 => Ok(Field::Harmonisation(channel)),
            FieldSelector::Harmonisation => {
                Err(FcdrError::MissingField(format!("harmonisation field for channel {channel}")))
            }
        }
    }
}

/// Gathers `selector`'s field for every channel at the grid points.
///
/// Fails with `ChannelOutOfRange` when a channel is not available in `case`.
pub fn gather(
    record: &MeasurementRecord,
    case: ChannelCase,
    channels: &[usize],
    selector: FieldSelector,
    grid: &SampleGrid,
    orientation: Orientation,
) -> Result<Array3<f64>, FcdrError> {
    let slices = channels
        .iter()
        .map(|&channel| {
            if !case.supports(channel) {
                return Err(FcdrError::ChannelOutOfRange { channel, case });
            }
            let field = selector.field_for(channel)?;
            Ok(grid.sample(record.require(field)?))
        })
        .collect::<Result<Vec<_>, FcdrError>>()?;
    orientation.arrange(&slices)
}
