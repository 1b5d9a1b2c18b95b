//! Effect-tensor builder: correlation (R), uncertainty (U) and sensitivity (C)
//! tensors for one channel partition of a segment.

use ndarray::{Array2, Array3, Array4, Axis};

use crate::channels::{ChannelCase, ChannelConfiguration, ChannelSubset};
use crate::config::ProcessingConfig;
use crate::effects::{
    descriptors, independent_descriptor, ChannelShape, Effect, EffectCategory, EffectDescriptor,
    ElementShape, LineShape, SensitivitySource, UncertaintySource,
};
use crate::gather::{gather, FieldSelector, Orientation, SampleGrid};
use crate::record::MeasurementRecord;
use crate::FcdrError;

/// Symmetric Toeplitz correlation matrix stored by offset.
///
/// `coefficients[k]` is the correlation between samples `k` apart; offsets
/// beyond the stored band are uncorrelated.
#[derive(Debug, Clone, PartialEq)]
pub struct Toeplitz {
    pub size: usize,
    pub coefficients: Vec<f64>,
}

impl Toeplitz {
    pub fn identity(size: usize) -> Self {
        Self {
            size,
            coefficients: vec![1.0],
        }
    }

    pub fn all_ones(size: usize) -> Self {
        Self {
            size,
            coefficients: vec![1.0; size.max(1)],
        }
    }

    /// Linear decay from 1 at zero offset over the correlation scale, in
    /// units of subsampled lines.
    pub fn banded(size: usize, scale: f64, skip: usize) -> Self {
        let skip = skip.max(1) as f64;
        if scale.is_nan() || scale <= 0.0 {
            return Self::identity(size);
        }
        let half_width = (scale / skip).floor() as usize;
        let step = skip / scale;
        let coefficients = (0..=half_width.min(size.saturating_sub(1)))
            .map(|k| (1.0 - k as f64 * step).max(0.0))
            .collect();
        Self { size, coefficients }
    }

    pub fn coefficient(&self, offset: usize) -> f64 {
        self.coefficients.get(offset).copied().unwrap_or(0.0)
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.coefficient(i.abs_diff(j))
    }

    pub fn to_dense(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.size, self.size), |(i, j)| self.get(i, j))
    }
}

/// One U or C tensor, effect-first, in a given channel/line/element layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTensor {
    pub orientation: Orientation,
    pub values: Array4<f64>,
}

fn to_canonical_axes(orientation: Orientation) -> [usize; 4] {
    match orientation {
        Orientation::ElementMajor => [0, 1, 2, 3],
        Orientation::LineMajor => [0, 1, 3, 2],
        Orientation::CrossChannel => [0, 3, 1, 2],
    }
}

fn from_canonical_axes(orientation: Orientation) -> [usize; 4] {
    match orientation {
        Orientation::ElementMajor => [0, 1, 2, 3],
        Orientation::LineMajor => [0, 1, 3, 2],
        Orientation::CrossChannel => [0, 2, 3, 1],
    }
}

impl SampledTensor {
    /// Copy in (effect, channel, line, element) order.
    pub fn canonical(&self) -> Array4<f64> {
        self.values
            .view()
            .permuted_axes(to_canonical_axes(self.orientation))
            .as_standard_layout()
            .into_owned()
    }

    pub fn from_canonical(orientation: Orientation, canonical: Array4<f64>) -> Self {
        let values = canonical
            .permuted_axes(from_canonical_axes(orientation))
            .as_standard_layout()
            .into_owned();
        Self {
            orientation,
            values,
        }
    }

    /// Builds from per-effect gathered blocks already in `orientation`.
    fn from_blocks(orientation: Orientation, blocks: &[Array3<f64>]) -> Result<Self, FcdrError> {
        let views: Vec<_> = blocks.iter().map(Array3::view).collect();
        Ok(Self {
            orientation,
            values: ndarray::stack(Axis(0), &views)?,
        })
    }

    pub fn n_effects(&self) -> usize {
        self.values.len_of(Axis(0))
    }
}

/// Which of the builder's tensors a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorKind {
    UncertaintyElement,
    UncertaintyLine,
    UncertaintyChannel,
    UncertaintyIndependent,
    SensitivityElement,
    SensitivityLine,
    SensitivityChannel,
    SensitivityIndependent,
}

/// R, U and C tensors for one engine run.
#[derive(Debug, Clone)]
pub struct EffectTensors {
    pub category: EffectCategory,
    pub case: ChannelCase,
    pub channels: ChannelSubset,
    pub effects: Vec<Effect>,
    pub grid: SampleGrid,
    /// Cross-element correlation per structured effect
    pub r_xelem: Vec<Toeplitz>,
    /// Cross-line correlation per structured effect
    pub r_xline: Vec<Toeplitz>,
    /// (effect, channel, channel) cross-channel correlation of structured effects
    pub r_xchan: Array3<f64>,
    /// Cross-channel correlation of the independent effect
    pub r_xchan_i: Array2<f64>,
    pub u_xelem: SampledTensor,
    pub u_xline: SampledTensor,
    pub u_xchan: SampledTensor,
    pub u_xchan_i: SampledTensor,
    pub c_xelem: SampledTensor,
    pub c_xline: SampledTensor,
    pub c_xchan: SampledTensor,
    pub c_xchan_i: SampledTensor,
}

impl EffectTensors {
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn tensor(&self, kind: TensorKind) -> &SampledTensor {
        match kind {
            TensorKind::UncertaintyElement => &self.u_xelem,
            TensorKind::UncertaintyLine => &self.u_xline,
            TensorKind::UncertaintyChannel => &self.u_xchan,
            TensorKind::UncertaintyIndependent => &self.u_xchan_i,
            TensorKind::SensitivityElement => &self.c_xelem,
            TensorKind::SensitivityLine => &self.c_xline,
            TensorKind::SensitivityChannel => &self.c_xchan,
            TensorKind::SensitivityIndependent => &self.c_xchan_i,
        }
    }

    pub fn tensor_mut(&mut self, kind: TensorKind) -> &mut SampledTensor {
        match kind {
            TensorKind::UncertaintyElement => &mut self.u_xelem,
            TensorKind::UncertaintyLine => &mut self.u_xline,
            TensorKind::UncertaintyChannel => &mut self.u_xchan,
            TensorKind::UncertaintyIndependent => &mut self.u_xchan_i,
            TensorKind::SensitivityElement => &mut self.c_xelem,
            TensorKind::SensitivityLine => &mut self.c_xline,
            TensorKind::SensitivityChannel => &mut self.c_xchan,
            TensorKind::SensitivityIndependent => &mut self.c_xchan_i,
        }
    }
}

fn channel_matrix(shape: ChannelShape, n: usize) -> Array2<f64> {
    match shape {
        ChannelShape::FullyCorrelated => Array2::ones((n, n)),
        ChannelShape::Identity => Array2::eye(n),
    }
}

fn line_correlation(
    shape: LineShape,
    grid: &SampleGrid,
    record: &MeasurementRecord,
) -> Toeplitz {
    match shape {
        LineShape::Banded => Toeplitz::banded(
            grid.n_lines(),
            record.constants.spatial_correlation_scale,
            grid.line_skip,
        ),
        LineShape::Independent => Toeplitz::identity(grid.n_lines()),
    }
}

fn element_correlation(shape: ElementShape, grid: &SampleGrid) -> Toeplitz {
    match shape {
        ElementShape::FullyCorrelated => Toeplitz::all_ones(grid.n_elements()),
        ElementShape::Independent => Toeplitz::identity(grid.n_elements()),
    }
}

/// (channel, line, element) uncertainty block for one effect.
fn uncertainty_block(
    descriptor: &EffectDescriptor,
    record: &MeasurementRecord,
    case: ChannelCase,
    channels: &[usize],
    grid: &SampleGrid,
) -> Result<Array3<f64>, FcdrError> {
    if descriptor.uncertainty == UncertaintySource::HarmonisationField {
        return gather(
            record,
            case,
            channels,
            FieldSelector::Harmonisation,
            grid,
            Orientation::ElementMajor,
        );
    }
    let shape = (channels.len(), grid.n_lines(), grid.n_elements());
    let mut block = Array3::zeros(shape);
    for (idx, &channel) in channels.iter().enumerate() {
        if !case.supports(channel) {
            return Err(FcdrError::ChannelOutOfRange { channel, case });
        }
        let value = descriptor
            .scalar_uncertainty(&record.constants, channel)
            .unwrap_or(f64::NAN);
        block.index_axis_mut(Axis(0), idx).fill(value);
    }
    Ok(block)
}

/// (channel, line, element) sensitivity block for one effect.
fn sensitivity_block(
    descriptor: &EffectDescriptor,
    record: &MeasurementRecord,
    case: ChannelCase,
    channels: &[usize],
    grid: &SampleGrid,
) -> Result<Array3<f64>, FcdrError> {
    match descriptor.sensitivity {
        SensitivitySource::Derivative(kind) => gather(
            record,
            case,
            channels,
            FieldSelector::Derivative(kind),
            grid,
            Orientation::ElementMajor,
        ),
        SensitivitySource::Unity => {
            if let Some(&channel) = channels.iter().find(|&&ch| !case.supports(ch)) {
                return Err(FcdrError::ChannelOutOfRange { channel, case });
            }
            Ok(Array3::ones((
                channels.len(),
                grid.n_lines(),
                grid.n_elements(),
            )))
        }
    }
}

fn oriented(
    canonical: &SampledTensor,
    orientation: Orientation,
) -> SampledTensor {
    SampledTensor::from_canonical(orientation, canonical.values.clone())
}

/// Builds the tensors for `category` over the segment's channels.
pub fn build_tensors(
    record: &MeasurementRecord,
    configuration: &ChannelConfiguration,
    category: EffectCategory,
    settings: &ProcessingConfig,
) -> Result<EffectTensors, FcdrError> {
    let (case, channels) = if category.is_visible() {
        (configuration.visible_case, configuration.visible_channels())
    } else {
        (configuration.infrared_case, configuration.infrared_channels())
    };
    build_for_channels(record, case, &channels, category, settings)
}

/// Builds the tensors for an explicit channel subset gathered under `case`.
pub fn build_for_channels(
    record: &MeasurementRecord,
    case: ChannelCase,
    channels: &ChannelSubset,
    category: EffectCategory,
    settings: &ProcessingConfig,
) -> Result<EffectTensors, FcdrError> {
    let grid = SampleGrid::for_record(record, settings.line_skip, settings.elem_skip);
    let table = descriptors(category);
    let n_channels = channels.len();
    let channel_list = channels.as_slice();

    let mut u_blocks = Vec::with_capacity(table.len());
    let mut c_blocks = Vec::with_capacity(table.len());
    let mut r_xchan = Array3::zeros((table.len(), n_channels, n_channels));
    for (idx, descriptor) in table.iter().enumerate() {
        u_blocks.push(uncertainty_block(descriptor, record, case, channel_list, &grid)?);
        c_blocks.push(sensitivity_block(descriptor, record, case, channel_list, &grid)?);
        r_xchan
            .index_axis_mut(Axis(0), idx)
            .assign(&channel_matrix(descriptor.channel, n_channels));
    }

    let independent = independent_descriptor(category);
    let u_independent = uncertainty_block(&independent, record, case, channel_list, &grid)?;
    let c_independent = sensitivity_block(&independent, record, case, channel_list, &grid)?;

    let u_xelem = SampledTensor::from_blocks(Orientation::ElementMajor, &u_blocks)?;
    let c_xelem = SampledTensor::from_blocks(Orientation::ElementMajor, &c_blocks)?;
    let u_i = SampledTensor::from_blocks(Orientation::ElementMajor, &[u_independent])?;
    let c_i = SampledTensor::from_blocks(Orientation::ElementMajor, &[c_independent])?;

    Ok(EffectTensors {
        category,
        case,
        channels: channels.clone(),
        effects: table.iter().map(|d| d.effect).collect(),
        r_xelem: table
            .iter()
            .map(|d| element_correlation(d.element, &grid))
            .collect(),
        r_xline: table
            .iter()
            .map(|d| line_correlation(d.line, &grid, record))
            .collect(),
        r_xchan,
        r_xchan_i: channel_matrix(independent.channel, n_channels),
        u_xline: oriented(&u_xelem, Orientation::LineMajor),
        u_xchan: oriented(&u_xelem, Orientation::CrossChannel),
        u_xchan_i: oriented(&u_i, Orientation::CrossChannel),
        c_xline: oriented(&c_xelem, Orientation::LineMajor),
        c_xchan: oriented(&c_xelem, Orientation::CrossChannel),
        c_xchan_i: oriented(&c_i, Orientation::CrossChannel),
        u_xelem,
        c_xelem,
        grid,
    })
}
