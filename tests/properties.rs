use ndarray::Array2;
use proptest::prelude::*;

use easy_fcdr::channels::ChannelSubset;
use easy_fcdr::ingest::cleanse;
use easy_fcdr::merge::{embed_block, truncation_length};
use easy_fcdr::synthetic::{SyntheticOrbit, SyntheticParams, FILL_VALUE};
use easy_fcdr::tensors::Toeplitz;
use easy_fcdr::{FILL_THRESHOLD, SENSOR_CHANNELS};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn cleansed_fields_hold_no_sentinels(
        seed in any::<u64>(),
        fills in prop::collection::vec((0usize..12, 0usize..30, 0u8..3), 0..40),
    ) {
        let mut raw = SyntheticOrbit::new(SyntheticParams {
            sensor: "NOAA15".to_string(),
            n_lines: 12,
            n_elements: 30,
            seed,
            ..SyntheticParams::default()
        })
        .generate();

        let names: Vec<String> = raw.fields.keys().cloned().collect();
        for (i, (line, element, kind)) in fills.iter().enumerate() {
            let value = match kind {
                0 => FILL_VALUE,
                1 => f64::INFINITY,
                _ => f64::NAN,
            };
            if let Some(field) = raw.fields.get_mut(&names[i % names.len()]) {
                field[[*line, *element]] = value;
            }
        }

        let record = cleanse(&raw).expect("cleanse");
        for values in record.fields.values() {
            for &v in values.iter() {
                prop_assert!(v.is_nan() || (v.is_finite() && v > FILL_THRESHOLD));
            }
        }
    }

    #[test]
    fn banded_correlation_decays_monotonically(
        size in 1usize..200,
        scale in 1.0f64..500.0,
        skip in 1usize..12,
    ) {
        let band = Toeplitz::banded(size, scale, skip);
        prop_assert!((band.coefficient(0) - 1.0).abs() < 1e-12);
        for pair in band.coefficients.windows(2) {
            prop_assert!(pair[1] <= pair[0]);
        }
        for &c in &band.coefficients {
            prop_assert!((-1e-12..=1.0).contains(&c));
        }
        for i in 0..size.min(20) {
            for j in 0..size.min(20) {
                prop_assert_eq!(band.get(i, j), band.get(j, i));
            }
        }
    }

    #[test]
    fn embedded_blocks_stay_symmetric(
        channels in prop::sample::subsequence(vec![0usize, 1, 2, 3, 4, 5], 1..=6),
        raw in prop::collection::vec(-1.0f64..1.0, 36),
    ) {
        let subset = ChannelSubset::new(channels.clone()).expect("subset");
        let n = subset.len();
        let block = Array2::from_shape_fn((n, n), |(a, b)| {
            if a == b {
                1.0
            } else {
                let (lo, hi) = (a.min(b), a.max(b));
                raw[lo * 6 + hi]
            }
        });
        let mut present = [false; SENSOR_CHANNELS];
        for &ch in &channels {
            present[ch] = true;
        }

        let matrix = embed_block(&present, &block, &subset).expect("embed");
        for a in 0..SENSOR_CHANNELS {
            for b in 0..SENSOR_CHANNELS {
                prop_assert_eq!(matrix[[a, b]], matrix[[b, a]]);
            }
            if present[a] {
                prop_assert_eq!(matrix[[a, a]], 1.0);
            } else {
                prop_assert!(matrix.row(a).iter().all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn truncation_keeps_every_non_zero_offset(
        values in prop::collection::vec(prop::option::of(0.01f64..1.0), 1..30),
    ) {
        let column: Vec<f64> = values.iter().map(|v| v.unwrap_or(0.0)).collect();
        let profile = Array2::from_shape_vec((column.len(), 1), column.clone()).expect("shape");
        let length = truncation_length(&[&profile]);
        prop_assert!(column.iter().skip(length + 1).all(|&v| v == 0.0));
        if column.iter().any(|&v| v != 0.0) {
            prop_assert!(column[length] != 0.0);
        }
    }
}
