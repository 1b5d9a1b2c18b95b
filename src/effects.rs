//! Physical error effects and the descriptor table the tensor builder evaluates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{DerivativeKind, SensorConstants};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    IctTemperature,
    HarmonisationResidual,
    SpaceViewNoise,
    IctViewNoise,
    PixelNoise,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Effect::IctTemperature => "ict_prt_temperature",
            Effect::HarmonisationResidual => "harmonisation_residual",
            Effect::SpaceViewNoise => "space_view_noise",
            Effect::IctViewNoise => "ict_view_noise",
            Effect::PixelNoise => "pixel_noise",
        };
        f.write_str(name)
    }
}

/// Channel partition of one correlation-engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectCategory {
    Visible,
    InfraredStructured,
    InfraredCommon,
}

impl EffectCategory {
    pub const ALL: [EffectCategory; 3] = [
        EffectCategory::Visible,
        EffectCategory::InfraredStructured,
        EffectCategory::InfraredCommon,
    ];

    pub fn is_visible(self) -> bool {
        self == EffectCategory::Visible
    }
}

impl fmt::Display for EffectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectCategory::Visible => "visible",
            EffectCategory::InfraredStructured => "infrared_structured",
            EffectCategory::InfraredCommon => "infrared_common",
        };
        f.write_str(name)
    }
}

/// Correlation along the scan (element) direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementShape {
    FullyCorrelated,
    Independent,
}

/// Correlation along the track (scanline) direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineShape {
    /// Linear decay over the calibration averaging window
    Banded,
    Independent,
}

/// Correlation between channels of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelShape {
    FullyCorrelated,
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UncertaintySource {
    CalibrationCountsNoise,
    IctPrtCombined,
    HarmonisationField,
    PixelCountsNoise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitivitySource {
    Derivative(DerivativeKind),
    Unity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectDescriptor {
    pub effect: Effect,
    pub element: ElementShape,
    pub line: LineShape,
    pub channel: ChannelShape,
    pub uncertainty: UncertaintySource,
    pub sensitivity: SensitivitySource,
}

impl EffectDescriptor {
    const fn structured(
        effect: Effect,
        channel: ChannelShape,
        uncertainty: UncertaintySource,
        sensitivity: SensitivitySource,
    ) -> Self {
        Self {
            effect,
            element: ElementShape::FullyCorrelated,
            line: LineShape::Banded,
            channel,
            uncertainty,
            sensitivity,
        }
    }

    /// Scalar uncertainty for a channel, `None` when it comes from a per-pixel field.
    pub fn scalar_uncertainty(&self, constants: &SensorConstants, channel: usize) -> Option<f64> {
        match self.uncertainty {
            UncertaintySource::CalibrationCountsNoise => Some(constants.cal_counts_noise[channel]),
            UncertaintySource::IctPrtCombined => Some(constants.ict_prt_uncertainty()),
            UncertaintySource::PixelCountsNoise => Some(constants.counts_noise[channel]),
            UncertaintySource::HarmonisationField => None,
        }
    }
}

const ICT_TEMPERATURE: EffectDescriptor = EffectDescriptor::structured(
    Effect::IctTemperature,
    ChannelShape::FullyCorrelated,
    UncertaintySource::IctPrtCombined,
    SensitivitySource::Derivative(DerivativeKind::Temperature),
);

const SPACE_VIEW_NOISE: EffectDescriptor = EffectDescriptor::structured(
    Effect::SpaceViewNoise,
    ChannelShape::Identity,
    UncertaintySource::CalibrationCountsNoise,
    SensitivitySource::Derivative(DerivativeKind::SpaceCounts),
);

const ICT_VIEW_NOISE: EffectDescriptor = EffectDescriptor::structured(
    Effect::IctViewNoise,
    ChannelShape::Identity,
    UncertaintySource::CalibrationCountsNoise,
    SensitivitySource::Derivative(DerivativeKind::IctCounts),
);

const HARMONISATION: EffectDescriptor = EffectDescriptor::structured(
    Effect::HarmonisationResidual,
    ChannelShape::Identity,
    UncertaintySource::HarmonisationField,
    SensitivitySource::Unity,
);

const VISIBLE: [EffectDescriptor; 1] = [SPACE_VIEW_NOISE];
const INFRARED_STRUCTURED: [EffectDescriptor; 3] = [ICT_TEMPERATURE, SPACE_VIEW_NOISE, ICT_VIEW_NOISE];
const INFRARED_COMMON: [EffectDescriptor; 2] = [ICT_TEMPERATURE, HARMONISATION];

/// Structured effects propagated for a category, in tensor order.
pub fn descriptors(category: EffectCategory) -> &'static [EffectDescriptor] {
    match category {
        EffectCategory::Visible => &VISIBLE,
        EffectCategory::InfraredStructured => &INFRARED_STRUCTURED,
        EffectCategory::InfraredCommon => &INFRARED_COMMON,
    }
}

/// Pixel-level noise, independent between elements and lines.
pub fn independent_descriptor(category: EffectCategory) -> EffectDescriptor {
    let kind = if category.is_visible() {
        DerivativeKind::SpaceCounts
    } else {
        DerivativeKind::Temperature
    };
    EffectDescriptor {
        effect: Effect::PixelNoise,
        element: ElementShape::Independent,
        line: LineShape::Independent,
        channel: ChannelShape::FullyCorrelated,
        uncertainty: UncertaintySource::PixelCountsNoise,
        sensitivity: SensitivitySource::Derivative(kind),
    }
}
