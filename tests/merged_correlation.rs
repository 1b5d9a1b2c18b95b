use approx::assert_relative_eq;
use ndarray::s;

use easy_fcdr::channels::Sensor;
use easy_fcdr::ingest::cleanse;
use easy_fcdr::pipeline::run_category;
use easy_fcdr::synthetic::{SyntheticOrbit, SyntheticParams};
use easy_fcdr::{
    process_orbit, EffectCategory, ProcessingConfig, PropagationEngine, SegmentProduct,
    SENSOR_CHANNELS,
};

fn config() -> ProcessingConfig {
    ProcessingConfig {
        min_segment_lines: 50,
        ..ProcessingConfig::default()
    }
}

fn process(sensor: &str, ch3a_lines: Option<std::ops::Range<usize>>) -> Vec<SegmentProduct> {
    let raw = SyntheticOrbit::new(SyntheticParams {
        sensor: sensor.to_string(),
        n_lines: 200,
        n_elements: 76,
        ch3a_lines,
        ..SyntheticParams::default()
    })
    .generate();
    process_orbit(&raw, &config(), &PropagationEngine).expect("process orbit")
}

fn assert_well_formed(product: &SegmentProduct) {
    let merged = &product.merged;
    for matrix in [&merged.independent, &merged.structured, &merged.common] {
        assert_eq!(matrix.shape(), &[SENSOR_CHANNELS, SENSOR_CHANNELS]);
        for a in 0..SENSOR_CHANNELS {
            for b in 0..SENSOR_CHANNELS {
                assert!(matrix[[a, b]].is_finite());
                assert_relative_eq!(matrix[[a, b]], matrix[[b, a]]);
                assert!(matrix[[a, b]].abs() <= 1.0);
            }
            if merged.present[a] {
                assert_relative_eq!(matrix[[a, a]], 1.0);
            } else {
                assert!(matrix.row(a).iter().all(|&v| v == 0.0));
                assert!(matrix.column(a).iter().all(|&v| v == 0.0));
            }
        }
    }
}

#[test]
fn matrices_are_symmetric_with_unit_diagonal_for_every_family() {
    for sensor in ["NOAA06", "NOAA14", "NOAA17"] {
        for product in process(sensor, None) {
            assert_well_formed(&product);
        }
    }
    for product in process("METOPA", Some(0..100)) {
        assert_well_formed(&product);
    }
}

#[test]
fn two_channel_ir_scenario() {
    let products = process("NOAA10", None);
    assert_eq!(products.len(), 1);
    let product = &products[0];
    let merged = &product.merged;

    assert_eq!(merged.present_channels(), vec![0, 1, 3, 4]);
    for a in 0..SENSOR_CHANNELS {
        for b in 0..SENSOR_CHANNELS {
            let expected = if a == b && a != 2 && a != 5 { 1.0 } else { 0.0 };
            assert_eq!(merged.independent[[a, b]], expected);
        }
    }

    let sensor = Sensor::from_identifier("NOAA10").expect("sensor");
    let (run, _) = run_category(
        &product.record,
        &sensor.configuration(false),
        EffectCategory::InfraredStructured,
        &config(),
        &PropagationEngine,
    )
    .expect("structured run");
    assert_eq!(run.channels.as_slice(), &[3, 4]);
    assert_eq!(
        merged.structured.slice(s![3..5, 3..5]),
        run.output.structured.view()
    );
    assert_eq!(merged.structured[[0, 0]], 1.0);
    assert_eq!(merged.structured[[1, 1]], 1.0);
    assert_eq!(merged.structured[[0, 3]], 0.0);
}

#[test]
fn ict_temperature_correlates_infrared_channels() {
    let products = process("NOAA14", None);
    let merged = &products[0].merged;
    assert!(merged.structured[[3, 4]] > 0.0);
    assert!(merged.common[[4, 5]] > 0.0);
    assert_eq!(merged.structured[[0, 1]], 0.0);
}

#[test]
fn cross_line_profile_decays_within_scale() {
    let products = process("NOAA19", None);
    let merged = &products[0].merged;
    let cfg = config();

    // Spatial scale of 25 lines reaches zero at native offset 25.
    assert_eq!(merged.line_truncation, 24);
    assert_eq!(merged.cross_line.nrows(), merged.line_truncation + 1);
    assert_eq!(merged.cross_element.nrows(), (76 / cfg.elem_skip - 1) * cfg.elem_skip + 1);

    for column in merged.cross_line.columns() {
        assert_relative_eq!(column[0], 1.0);
        for pair in column.to_vec().windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }

    let padded = merged.padded_cross_line();
    assert!(padded.column(2).iter().all(|&v| v == 0.0));
    assert_eq!(padded.column(3), merged.cross_line.column(2));
}

#[test]
fn subsampled_profiles_without_interpolation() {
    let raw = SyntheticOrbit::new(SyntheticParams {
        sensor: "NOAA12".to_string(),
        n_lines: 120,
        n_elements: 76,
        ..SyntheticParams::default()
    })
    .generate();
    let cfg = ProcessingConfig {
        interpolate_lengths: false,
        ..config()
    };
    let products = process_orbit(&raw, &cfg, &PropagationEngine).expect("process");
    let merged = &products[0].merged;
    assert_eq!(merged.line_truncation, 4);
    assert_eq!(merged.cross_line.nrows(), 5);
    assert_relative_eq!(merged.cross_line[[2, 3]], 0.6, epsilon = 1e-12);
}

#[test]
fn cleansed_record_is_what_the_product_carries() {
    let raw = SyntheticOrbit::new(SyntheticParams {
        sensor: "NOAA11".to_string(),
        n_lines: 80,
        n_elements: 26,
        invalid_leading: 4,
        ..SyntheticParams::default()
    })
    .generate();
    let record = cleanse(&raw).expect("cleanse");
    let products = process_orbit(&raw, &config(), &PropagationEngine).expect("process");
    assert_eq!(products[0].record.n_lines(), record.n_lines());
    assert_eq!(products[0].record.n_lines(), 76);
}
