use mzpeakslice::{
    ChromatogramAxis, DriftParams, FeatureFinder, FeatureFinderParams, PrecursorWindow,
    RawSpectrum,
};

mod common;
use common::ion_mobility_run;

fn params() -> FeatureFinderParams {
    FeatureFinderParams::default().with_ion_mobility(DriftParams::default())
}

#[test_log::test]
fn test_conformers_resolved() {
    let spectra = ion_mobility_run(500.0);
    let finder = FeatureFinder::new(params()).unwrap();
    let features = finder.find_features(&spectra).unwrap();
    assert_eq!(features.len(), 1);

    let parent = &features.features[0];
    assert_eq!(parent.axis, ChromatogramAxis::RetentionTime);
    assert!((parent.times.top - 0.3).abs() < 1e-9);
    // the frame's first spectrum
    assert_eq!(parent.ms1_scans.top, 15 * 41);
    assert_eq!(parent.drift_features.len(), 2);

    let drift_apexes: Vec<f64> = parent.drift_features.iter().map(|f| f.times.top).collect();
    assert!((drift_apexes[0] - 0.70).abs() < 0.011, "{drift_apexes:?}");
    assert!((drift_apexes[1] - 0.85).abs() < 0.011, "{drift_apexes:?}");

    for (k, sub) in parent.drift_features.iter().enumerate() {
        assert_eq!(sub.id, k);
        assert_eq!(sub.parent_id, Some(parent.id));
        assert_eq!(sub.master_id, parent.master_id + k + 1);
        assert_eq!(sub.axis, ChromatogramAxis::DriftTime);
        assert_eq!(sub.retention_time, parent.retention_time);
        assert!(sub.is_well_formed());

        let accumulated = sub.accumulated_ms1.expect("drift features carry their summed frames");
        let (start, end) = accumulated.retention_time_window;
        assert!(start < parent.times.top && parent.times.top < end);
        assert!(end - start <= 0.2 + 1e-9);
        // whole frames of 41 drift spectra
        assert_eq!(accumulated.first_scan % 41, 0);
        assert_eq!(accumulated.last_scan % 41, 40);
        assert!(accumulated.first_scan < parent.ms1_scans.top);
        assert!(parent.ms1_scans.top < accumulated.last_scan);
    }
    assert_eq!(
        parent.drift_features[0].accumulated_ms1,
        parent.drift_features[1].accumulated_ms1
    );
    assert_eq!(parent.accumulated_ms1, None);
    assert!(parent.drift_features[0].intensities.top > parent.drift_features[1].intensities.top);
    assert_eq!(parent.drift_features[0].amplitude_score, 1.0);
}

#[test_log::test]
fn test_without_ion_mobility_params() {
    let spectra = ion_mobility_run(500.0);
    let finder = FeatureFinder::new(FeatureFinderParams::default()).unwrap();
    let features = finder.find_features(&spectra).unwrap();
    assert_eq!(features.len(), 1);
    assert!(features.features[0].drift_features.is_empty());
}

#[test_log::test]
fn test_gated_ms2_linking() {
    let mut spectra = ion_mobility_run(500.0);
    let prec = PrecursorWindow::new(500.0, 499.5, 500.5);
    let time = 0.3 + 0.001;
    let next = spectra.len();
    spectra.push(
        RawSpectrum::from_arrays(next, 2, time, &[200.0], &[50.0])
            .unwrap()
            .with_precursor(prec.with_drift_window(0.65, 0.75), 25.0),
    );
    spectra.push(
        RawSpectrum::from_arrays(next + 1, 2, time, &[200.0], &[500.0])
            .unwrap()
            .with_precursor(prec.with_drift_window(0.80, 0.90), 25.0),
    );
    // keep acquisition order intact
    spectra.sort_by(|a, b| a.retention_time.total_cmp(&b.retention_time).then(a.index.cmp(&b.index)));
    for (i, s) in spectra.iter_mut().enumerate() {
        s.index = i;
    }
    let gated: Vec<usize> = spectra
        .iter()
        .filter(|s| s.ms_level == 2)
        .map(|s| s.index)
        .collect();

    let finder = FeatureFinder::new(params()).unwrap();
    let features = finder.find_features(&spectra).unwrap();
    assert_eq!(features.len(), 1);
    let parent = &features.features[0];
    assert_eq!(parent.drift_features.len(), 2);
    assert_eq!(parent.drift_features[0].ms2.primary, Some(gated[0]));
    assert_eq!(parent.drift_features[1].ms2.primary, Some(gated[1]));
    assert_eq!(parent.ms2.scans.len(), 1);
}
