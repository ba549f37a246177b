use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2, Array3};
use nsbas_xval::core::{
    reduce_pixel, DesignParams, NetworkDesign, PixelInverter, PixelOutcome, SkipReason, TimeFunction,
};
use nsbas_xval::io::{Epochs, EpochWeights, InMemoryStack};
use nsbas_xval::{InversionConfig, NetworkInputs, ProcessingParams, WeightSource, XvalPipeline};

const DATES: [&str; 5] = ["20100101", "20100401", "20100701", "20101001", "20110101"];

/// Pairs (0,1) (1,2) (2,3) (3,4) (0,2) (2,4)
fn incidence() -> Array2<f64> {
    array![
        [-1.0, 1.0, 0.0, 0.0, 0.0],
        [0.0, -1.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, -1.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, -1.0, 1.0],
        [-1.0, 0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, -1.0, 0.0, 1.0],
    ]
}

fn epochs() -> Epochs {
    Epochs::from_date_strings(&DATES).unwrap()
}

fn quadratic_design() -> NetworkDesign {
    let epochs = epochs();
    let jmat = incidence();
    let constraint = [TimeFunction::Poly { order: 2, t0: 0.0 }];
    NetworkDesign::build(&DesignParams {
        jmat: jmat.view(),
        tims: epochs.tims(),
        reference: 0,
        constraint: &constraint,
        bperp: None,
    })
    .unwrap()
}

/// Noise-free phase for displacement `a t + b t^2`
fn synthetic_phase(a: f64, b: f64) -> Array1<f64> {
    let disp = epochs().tims().mapv(|t| a * t + b * t * t);
    incidence().dot(&disp)
}

fn config(min_valid: usize) -> InversionConfig {
    InversionConfig {
        min_valid,
        ..InversionConfig::default()
    }
}

#[test]
fn test_recovers_noise_free_quadratic() {
    let _ = env_logger::builder().is_test(true).try_init();

    let design = quadratic_design();
    let weights = EpochWeights::uniform(5);
    let config = config(3);
    let inverter = PixelInverter::new(&design, &weights, &config).unwrap();

    let obs = synthetic_phase(3.0, -1.2);
    match inverter.invert(obs.view()) {
        PixelOutcome::Estimated { ifg_count, summary } => {
            assert_eq!(ifg_count, 6);
            assert_eq!(summary.samples.nrows(), 4);
            assert_eq!(summary.used, 4);
            assert_abs_diff_eq!(summary.mean[0], 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(summary.mean[1], 3.0, epsilon = 1e-6);
            assert_abs_diff_eq!(summary.mean[2], -1.2, epsilon = 1e-6);
            for s in summary.std.iter() {
                assert!(*s < 1e-6, "jackknife deviation {} should vanish", s);
            }
        }
        other => panic!("pixel should be inverted, got {:?}", other),
    }
}

#[test]
fn test_unobserved_epoch_column_is_dropped() {
    let design = quadratic_design();
    let weights = EpochWeights::uniform(5);
    let config = config(3);

    // Epoch 3 only appears in interferograms 2 and 3
    let mut obs = synthetic_phase(3.0, -1.2);
    obs[2] = 0.0;
    obs[3] = 0.0;

    let problem = reduce_pixel(&design, obs.view(), 3).unwrap();
    // Reduced column 2 is epoch 3
    assert_eq!(design.epoch_of_column(2), 3);
    assert_eq!(problem.columns, vec![0, 1, 3]);

    let inverter = PixelInverter::new(&design, &weights, &config).unwrap();
    match inverter.invert(obs.view()) {
        PixelOutcome::Estimated { ifg_count, summary } => {
            assert_eq!(ifg_count, 4);
            // One sample per remaining active epoch
            assert_eq!(summary.samples.nrows(), 3);
        }
        other => panic!("pixel should be inverted, got {:?}", other),
    }
}

#[test]
fn test_reference_neighbour_missing_skips_pixel() {
    let design = quadratic_design();
    let weights = EpochWeights::uniform(5);
    let config = config(3);
    let inverter = PixelInverter::new(&design, &weights, &config).unwrap();

    // Epoch 1 is the only neighbour of reference epoch 0
    let mut obs = synthetic_phase(3.0, -1.2);
    obs[0] = 0.0;
    obs[1] = f64::NAN;

    assert!(matches!(
        inverter.invert(obs.view()),
        PixelOutcome::Skipped(SkipReason::ReferenceDisconnected)
    ));
}

#[test]
fn test_degenerate_pixels_are_skipped() {
    let design = quadratic_design();
    let weights = EpochWeights::uniform(5);
    let config = config(1);
    let inverter = PixelInverter::new(&design, &weights, &config).unwrap();

    for obs in [
        Array1::<f64>::zeros(6),
        Array1::from_elem(6, f64::NAN),
        array![0.0, f64::INFINITY, f64::NAN, 0.0, f64::NEG_INFINITY, 0.0],
    ] {
        assert!(matches!(
            inverter.invert(obs.view()),
            PixelOutcome::Skipped(SkipReason::TooFewObservations { valid: 0, .. })
        ));
    }
}

#[test]
fn test_range_error_term_is_recovered() {
    // Pairs with temporal separation of one or two epochs over seven epochs
    let mut pairs = Vec::new();
    for gap in 1..=2 {
        for i in 0..7 - gap {
            pairs.push((i, i + gap));
        }
    }
    let mut jmat = Array2::<f64>::zeros((pairs.len(), 7));
    for (k, &(i, j)) in pairs.iter().enumerate() {
        jmat[[k, i]] = -1.0;
        jmat[[k, j]] = 1.0;
    }
    let tims = array![0.0, 0.15, 0.3, 0.5, 0.65, 0.8, 1.0];
    let epoch_bperp = array![0.0, 120.0, -80.0, 40.0, 150.0, -60.0, 30.0];
    let bperp = jmat.dot(&epoch_bperp);

    let constraint = [TimeFunction::Poly { order: 2, t0: 0.0 }];
    let design = NetworkDesign::build(&DesignParams {
        jmat: jmat.view(),
        tims: tims.view(),
        reference: 0,
        constraint: &constraint,
        bperp: Some(bperp.view()),
    })
    .unwrap();
    assert_eq!(design.num_params(), 4);

    // Displacement 2 t + 0.5 t^2 plus a range error of 3 per kilometer of baseline
    let disp = &tims.mapv(|t| 2.0 * t + 0.5 * t * t) + &epoch_bperp.mapv(|b| 3.0 * b / 1000.0);
    let obs = jmat.dot(&disp);

    let weights = EpochWeights::uniform(7);
    let config = config(5);
    let inverter = PixelInverter::new(&design, &weights, &config).unwrap();
    match inverter.invert(obs.view()) {
        PixelOutcome::Estimated { summary, .. } => {
            assert_eq!(summary.samples.nrows(), 6);
            assert_abs_diff_eq!(summary.mean[1], 2.0, epsilon = 1e-5);
            assert_abs_diff_eq!(summary.mean[2], 0.5, epsilon = 1e-5);
            assert_abs_diff_eq!(summary.mean[3], 3.0, epsilon = 1e-5);
        }
        other => panic!("pixel should be inverted, got {:?}", other),
    }
}

#[test]
fn test_stack_products_follow_thresholds() {
    let _ = env_logger::builder().is_test(true).try_init();

    let network = NetworkInputs {
        jmat: incidence(),
        dates: DATES.iter().map(|d| d.to_string()).collect(),
        bperp: Array1::zeros(6),
    };
    let params = ProcessingParams {
        min_valid: 5,
        constraint_model: Some("POLY 2".to_string()),
        workers: 2,
        ..ProcessingParams::default()
    };
    let pipeline = XvalPipeline::new(&params, &network, &WeightSource::Uniform).unwrap();

    // Line 0: clean pixel, pixel with one missing interferogram, pixel below threshold
    // Line 1: all zero, all NaN, clean pixel
    let phase = synthetic_phase(3.0, -1.2);
    let mut igram = Array3::<f32>::zeros((6, 2, 3));
    for k in 0..6 {
        igram[[k, 0, 0]] = phase[k] as f32;
        igram[[k, 0, 1]] = if k == 5 { f32::NAN } else { phase[k] as f32 };
        igram[[k, 0, 2]] = if k < 2 { 0.0 } else { phase[k] as f32 };
        igram[[k, 1, 1]] = f32::NAN;
        igram[[k, 1, 2]] = phase[k] as f32;
    }

    let mut stack = InMemoryStack::new(igram.clone());
    let (products, summary) = pipeline.run_to_products(&mut stack).unwrap();
    assert_eq!(summary.lines, 2);
    assert_eq!(summary.pixels_inverted, 3);
    assert_eq!(summary.pixels_skipped, 3);
    assert_eq!(products.lines_written(), 2);

    // Count equals the finite non-zero entries of inverted pixels, zero otherwise
    for line in 0..2 {
        for col in 0..3 {
            let valid = (0..6)
                .filter(|&k| {
                    let v = igram[[k, line, col]];
                    v.is_finite() && v != 0.0
                })
                .count();
            let count = products.ifgcnt[[line, col]] as usize;
            if valid >= 5 {
                assert_eq!(count, valid);
                assert_abs_diff_eq!(products.parms[[line, col, 1]], 3.0, epsilon = 1e-3);
                assert_abs_diff_eq!(products.parms[[line, col, 2]], -1.2, epsilon = 1e-3);
            } else {
                assert_eq!(count, 0);
                assert!(products.parms.slice(ndarray::s![line, col, ..]).iter().all(|v| v.is_nan()));
                assert!(products.error.slice(ndarray::s![line, col, ..]).iter().all(|v| v.is_nan()));
            }
        }
    }

    let metadata = products.metadata.as_ref().unwrap();
    assert_eq!(metadata.master_index, 0);
    assert_eq!(metadata.param_names, vec!["p0", "p1", "p2"]);
    assert_eq!(metadata.tims.len(), 5);
    // Input baselines are kept even without the range-error term
    assert_eq!(metadata.bperp.len(), 6);
    assert!(metadata.epoch_bperp.is_none());
}
