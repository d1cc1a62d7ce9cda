//! Resolve retention time features along the ion mobility drift axis
use mzpeaks::Tolerance;
use tracing::debug;

use crate::chromatogram::{extract_chromatogram, ChromatogramRequest};
use crate::feature::{build_feature, AccumulatedSpectra, PeakFeature};
use crate::ms2::Ms2Linker;
use crate::params::{DriftParams, PeakDetectionParams};
use crate::refine::Refiner;
use crate::signal::SignalPrimitives;
use crate::spectrum::SpectrumIndex;

pub struct DriftExtender<'a, S: SignalPrimitives> {
    index: &'a SpectrumIndex<'a>,
    signal: &'a S,
    refiner: &'a Refiner<'a, S>,
    linker: Ms2Linker<'a>,
    tolerance: Tolerance,
    detection: PeakDetectionParams,
    params: DriftParams,
}

impl<'a, S: SignalPrimitives> DriftExtender<'a, S> {
    pub fn new(
        index: &'a SpectrumIndex<'a>,
        signal: &'a S,
        refiner: &'a Refiner<'a, S>,
        linker: Ms2Linker<'a>,
        tolerance: Tolerance,
        detection: PeakDetectionParams,
        params: DriftParams,
    ) -> Self {
        Self {
            index,
            signal,
            refiner,
            linker,
            tolerance,
            detection,
            params,
        }
    }

    /// The retention time window drift signal is accumulated over, centered
    /// on the feature's apex
    pub fn retention_time_window(&self, feature: &PeakFeature) -> (f64, f64) {
        let half_width = feature.width() * 0.5;
        let half_width = if half_width > 0.0 {
            half_width.min(self.params.retention_time_half_width)
        } else {
            self.params.retention_time_half_width
        };
        (feature.times.top - half_width, feature.times.top + half_width)
    }

    /// Find the drift time sub-features of `feature`, ordered by drift apex
    pub fn drift_features(&self, feature: &PeakFeature) -> Vec<PeakFeature> {
        let window = self.retention_time_window(feature);
        let request = ChromatogramRequest::drift_time(
            feature.mass,
            self.tolerance,
            window,
            self.params.drift_range,
            self.params.bin_width,
        );
        let chrom = extract_chromatogram(self.index, &request);
        if chrom.is_empty() {
            return Vec::new();
        }
        let accumulated = self
            .index
            .spectra_span_between(window.0, window.1)
            .map(|(first_scan, last_scan)| AccumulatedSpectra {
                first_scan,
                last_scan,
                retention_time_window: window,
            });

        let smoothed = self.signal.smooth(&chrom);
        let candidates: Vec<PeakFeature> = self
            .signal
            .detect_peaks(chrom.times(), &smoothed, &self.detection)
            .iter()
            .filter_map(|r| build_feature(&chrom, r))
            .map(|mut f| {
                f.retention_time = feature.retention_time;
                f
            })
            .collect();

        let tallest = candidates
            .iter()
            .map(|f| f.apex_intensity())
            .fold(0.0f64, f64::max);
        let threshold = tallest * self.params.minimum_relative_drop;

        let mut subfeatures: Vec<PeakFeature> = candidates
            .into_iter()
            .filter(|f| {
                f.intensities.top - f.intensities.left.max(f.intensities.right) >= threshold
            })
            .filter_map(|f| self.refiner.refine_drift(f, window, &self.params))
            .map(|mut f| {
                f.ms2 = self.linker.link_drift(&f, feature, window);
                f.accumulated_ms1 = accumulated;
                f
            })
            .collect();
        subfeatures.sort_by(|a, b| a.times.top.total_cmp(&b.times.top));
        subfeatures
    }

    /// Attach drift sub-features to every feature in `features`
    pub fn extend(&self, features: &mut [PeakFeature]) {
        let mut total = 0;
        for feature in features.iter_mut() {
            feature.drift_features = self.drift_features(feature);
            total += feature.drift_features.len();
        }
        debug!(
            "Resolved {total} drift features across {} features",
            features.len()
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::FeatureTimes;
    use crate::params::{FeatureFinderParams, SmoothingMethod};
    use crate::signal::LocalMaximumPeakDetector;
    use crate::spectrum::{Polarity, RawSpectrum};

    fn gauss(x: f64, mu: f64, sigma: f64) -> f64 {
        (-0.5 * ((x - mu) / sigma).powi(2)).exp()
    }

    fn two_conformer_run() -> Vec<RawSpectrum> {
        let mut spectra = Vec::new();
        let mut index = 0;
        for i in 0..21 {
            let t = i as f64 * 0.05;
            for j in 0..51 {
                let d = 0.5 + j as f64 * 0.01;
                let y = 10000.0 * gauss(t, 0.5, 0.1) * (gauss(d, 0.7, 0.02) + 0.6 * gauss(d, 0.85, 0.02));
                spectra.push(
                    RawSpectrum::from_arrays(index, 1, t, &[500.0], &[y as f32])
                        .unwrap()
                        .with_drift_time(d),
                );
                index += 1;
            }
        }
        spectra
    }

    #[test_log::test]
    fn test_two_conformers() {
        let spectra = two_conformer_run();
        let spec_index = SpectrumIndex::new(&spectra, Polarity::Positive);
        let drift = DriftParams::default();
        let params = FeatureFinderParams::default()
            .with_peak_thresholds(3, 10.0)
            .with_smoothing(SmoothingMethod::None, 0)
            .with_ion_mobility(drift);
        let signal = LocalMaximumPeakDetector::new(SmoothingMethod::None, 0);
        let linker = Ms2Linker::new(&spec_index, params.acquisition_type, params.ms2_tolerance);
        let refiner = Refiner::new(&spec_index, &signal, linker, &params);
        let extender = DriftExtender::new(
            &spec_index,
            &signal,
            &refiner,
            linker,
            params.ms1_tolerance,
            params.detection_params(),
            drift,
        );

        let parent = PeakFeature {
            mass: 500.0,
            times: FeatureTimes::new(0.3, 0.5, 0.7),
            retention_time: 0.5,
            ..Default::default()
        };
        assert_eq!(extender.retention_time_window(&parent), (0.4, 0.6));

        let subs = extender.drift_features(&parent);
        assert_eq!(subs.len(), 2);
        assert!((subs[0].times.top - 0.7).abs() < 0.011);
        assert!((subs[1].times.top - 0.85).abs() < 0.011);
        assert!(subs[0].apex_intensity() > subs[1].apex_intensity());
        for sub in subs.iter() {
            assert!(sub.is_drift_feature());
            assert!(sub.is_well_formed());
            assert_eq!(sub.retention_time, 0.5);
            assert_eq!(sub.drift_time, Some(sub.times.top));
            let accumulated = sub.accumulated_ms1.unwrap();
            assert_eq!(accumulated.retention_time_window, (0.4, 0.6));
            // frame 8 at 0.4 opens the window, 51 drift spectra per frame
            assert_eq!(accumulated.first_scan, 8 * 51);
            assert_eq!(accumulated.last_scan % 51, 50);
            assert!(accumulated.last_scan > accumulated.first_scan + 3 * 51);
        }
    }
}
