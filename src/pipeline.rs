//! Per-orbit processing: cleanse, split, three engine runs per segment, merge.

use tracing::info;

use crate::channels::{ChannelConfiguration, Sensor};
use crate::config::ProcessingConfig;
use crate::effects::EffectCategory;
use crate::engine::{CorrelationEngine, EngineInput};
use crate::ingest::cleanse;
use crate::masking::{prepare_run, RepairReport};
use crate::merge::{merge_runs, MergedCorrelation, RunResult};
use crate::record::{MeasurementRecord, RawOrbit};
use crate::split::{split_orbit, Segment};
use crate::tensors::build_tensors;
use crate::FcdrError;

/// Everything produced for one orbit segment, ready for output assembly.
#[derive(Debug, Clone)]
pub struct SegmentProduct {
    pub record: MeasurementRecord,
    pub configuration: ChannelConfiguration,
    pub merged: MergedCorrelation,
    pub repairs: Vec<(EffectCategory, RepairReport)>,
    pub split: bool,
    pub secondary_visible: bool,
}

impl SegmentProduct {
    /// Repair counts summed over the three runs.
    pub fn total_repairs(&self) -> RepairReport {
        let mut total = RepairReport::default();
        for (_, report) in &self.repairs {
            total.merge(report);
        }
        total
    }
}

/// One engine run over `category`'s channel partition.
pub fn run_category(
    record: &MeasurementRecord,
    configuration: &ChannelConfiguration,
    category: EffectCategory,
    config: &ProcessingConfig,
    engine: &dyn CorrelationEngine,
) -> Result<(RunResult, RepairReport), FcdrError> {
    let tensors = build_tensors(record, configuration, category, config)?;
    let prepared = prepare_run(record, &tensors, config.degenerate_value)?;
    let input = EngineInput::new(
        &prepared.tensors,
        &prepared.line_mask,
        record.n_lines(),
        record.n_elements(),
        config.interpolate_lengths,
    );
    let output = engine.propagate(&input)?;

    info!(
        %category,
        channels = ?prepared.tensors.channels.as_slice(),
        masked_lines = prepared.report.masked_lines,
        repaired = prepared.report.repaired,
        unrepairable = prepared.report.unrepairable.len(),
        "engine run complete"
    );

    Ok((
        RunResult {
            category,
            channels: prepared.tensors.channels.clone(),
            output,
        },
        prepared.report,
    ))
}

pub fn process_segment(
    segment: Segment,
    config: &ProcessingConfig,
    engine: &dyn CorrelationEngine,
) -> Result<SegmentProduct, FcdrError> {
    let sensor = Sensor::from_identifier(&segment.record.sensor)?;
    let configuration = sensor.configuration(segment.secondary_visible);

    let mut runs = Vec::with_capacity(EffectCategory::ALL.len());
    let mut repairs = Vec::with_capacity(EffectCategory::ALL.len());
    for category in EffectCategory::ALL {
        let (run, report) = run_category(&segment.record, &configuration, category, config, engine)?;
        runs.push(run);
        repairs.push((category, report));
    }

    let merged = merge_runs(&configuration, &runs[0], &runs[1], &runs[2])?;

    Ok(SegmentProduct {
        record: segment.record,
        configuration,
        merged,
        repairs,
        split: segment.split,
        secondary_visible: segment.secondary_visible,
    })
}

/// Processes every usable segment of an orbit, Ch3a segment first.
pub fn process_orbit(
    raw: &RawOrbit,
    config: &ProcessingConfig,
    engine: &dyn CorrelationEngine,
) -> Result<Vec<SegmentProduct>, FcdrError> {
    config.validate()?;
    let record = cleanse(raw)?;
    info!(
        sensor = %record.sensor,
        lines = record.n_lines(),
        elements = record.n_elements(),
        "cleansed orbit"
    );

    split_orbit(&record, config.split_mode, config.min_segment_lines)?
        .into_iter()
        .map(|segment| process_segment(segment, config, engine))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PropagationEngine;
    use crate::synthetic::{SyntheticOrbit, SyntheticParams};

    fn small_config() -> ProcessingConfig {
        ProcessingConfig {
            min_segment_lines: 20,
            ..ProcessingConfig::default()
        }
    }

    #[test]
    fn three_channel_orbit_yields_one_product() {
        let raw = SyntheticOrbit::new(SyntheticParams {
            sensor: "NOAA11".to_string(),
            n_lines: 60,
            n_elements: 51,
            ..SyntheticParams::default()
        })
        .generate();
        let products = process_orbit(&raw, &small_config(), &PropagationEngine).expect("process");
        assert_eq!(products.len(), 1);
        let product = &products[0];
        assert!(!product.split);
        assert_eq!(product.merged.present_channels(), vec![0, 1, 3, 4, 5]);
        assert_eq!(product.repairs.len(), 3);
        assert!(product.total_repairs().is_clean());
    }

    #[test]
    fn split_orbit_yields_ch3a_then_ch3b() {
        let raw = SyntheticOrbit::new(SyntheticParams {
            sensor: "METOPB".to_string(),
            n_lines: 60,
            n_elements: 26,
            ch3a_lines: Some(0..30),
            ..SyntheticParams::default()
        })
        .generate();
        let products = process_orbit(&raw, &small_config(), &PropagationEngine).expect("process");
        assert_eq!(products.len(), 2);
        assert!(products[0].secondary_visible);
        assert_eq!(products[0].merged.present_channels(), vec![0, 1, 2, 4, 5]);
        assert!(!products[1].secondary_visible);
        assert_eq!(products[1].merged.present_channels(), vec![0, 1, 3, 4, 5]);
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let raw = SyntheticOrbit::new(SyntheticParams::default()).generate();
        let config = ProcessingConfig {
            line_skip: 0,
            ..ProcessingConfig::default()
        };
        assert!(matches!(
            process_orbit(&raw, &config, &PropagationEngine),
            Err(FcdrError::InvalidConfig(_))
        ));
    }
}
