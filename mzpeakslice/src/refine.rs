//! Re-extract and re-delimit features with the tighter MS1 tolerance
use mzpeaks::Tolerance;
use tracing::trace;

use crate::chromatogram::{
    extract_chromatogram, Chromatogram, ChromatogramAxis, ChromatogramRequest,
};
use crate::feature::{
    ChromatogramIndices, FeatureIntensities, FeatureTimes, PeakFeature, PeakShape, ScanReferences,
};
use crate::ms2::Ms2Linker;
use crate::params::{DriftParams, FeatureFinderParams, RefinementParams};
use crate::signal::{area_above_chord, sharpness, symmetry, trapezoid_area, SignalPrimitives};
use crate::spectrum::SpectrumIndex;

#[inline]
fn is_valley(y: &[f64], j: usize) -> bool {
    (j == 0 || y[j - 1] >= y[j]) && (j + 1 >= y.len() || y[j + 1] >= y[j])
}

/// The index of the highest strict local maximum within `radius` points of
/// `anchor`, or `anchor` when there is none
pub fn reanchor_apex(y: &[f64], anchor: usize, radius: usize) -> usize {
    let n = y.len();
    let lo = anchor.saturating_sub(radius).max(1);
    let hi = (anchor + radius).min(n.saturating_sub(2));
    let mut best: Option<usize> = None;
    for j in lo..=hi {
        if !(y[j] > y[j - 1] && y[j] > y[j + 1]) {
            continue;
        }
        best = match best {
            Some(b) if y[b] > y[j] => Some(b),
            Some(b) if y[b] == y[j] && b.abs_diff(anchor) <= j.abs_diff(anchor) => Some(b),
            _ => Some(j),
        };
    }
    best.unwrap_or(anchor)
}

/// Walk away from `apex` toward lower indices to the first valley at least
/// `min_steps` and at most `max_steps` points away
fn walk_left(y: &[f64], apex: usize, min_steps: usize, max_steps: usize) -> Option<usize> {
    (min_steps..=max_steps)
        .take_while(|step| *step <= apex)
        .map(|step| apex - step)
        .find(|j| is_valley(y, *j))
}

fn walk_right(y: &[f64], apex: usize, min_steps: usize, max_steps: usize) -> Option<usize> {
    (min_steps..=max_steps)
        .map(|step| apex + step)
        .take_while(|j| *j < y.len())
        .find(|j| is_valley(y, *j))
}

/// Redraws feature boundaries on a fresh chromatogram and recomputes every
/// derived quantity.
pub struct Refiner<'a, S: SignalPrimitives> {
    index: &'a SpectrumIndex<'a>,
    signal: &'a S,
    linker: Ms2Linker<'a>,
    tolerance: Tolerance,
    minimum_amplitude: f64,
    retention_time_range: (f64, f64),
    params: RefinementParams,
}

impl<'a, S: SignalPrimitives> Refiner<'a, S> {
    pub fn new(
        index: &'a SpectrumIndex<'a>,
        signal: &'a S,
        linker: Ms2Linker<'a>,
        params: &FeatureFinderParams,
    ) -> Self {
        Self {
            index,
            signal,
            linker,
            tolerance: params.ms1_tolerance,
            minimum_amplitude: params.minimum_amplitude,
            retention_time_range: params.retention_time_range,
            params: params.refinement,
        }
    }

    /// Refine a retention time feature and re-link its MS2 scans
    pub fn refine(&self, feature: PeakFeature) -> Option<PeakFeature> {
        let half_width = feature.width() * 0.5;
        let start = (feature.times.left - half_width).max(self.retention_time_range.0);
        let end = (feature.times.right + half_width).min(self.retention_time_range.1);
        let request = ChromatogramRequest::retention_time(feature.mass, self.tolerance, (start, end));
        let chrom = extract_chromatogram(self.index, &request);
        let mut refined = self.refine_on(feature, &chrom)?;
        refined.ms2 = self.linker.link(&refined);
        Some(refined)
    }

    /// Refine a drift time sub-feature within the retention time window its
    /// parent's drift chromatogram was accumulated over
    pub fn refine_drift(
        &self,
        feature: PeakFeature,
        retention_time_window: (f64, f64),
        drift: &DriftParams,
    ) -> Option<PeakFeature> {
        let half_width = feature.width() * 0.5;
        let start = (feature.times.left - half_width).max(drift.drift_range.0);
        let end = (feature.times.right + half_width).min(drift.drift_range.1);
        let request = ChromatogramRequest::drift_time(
            feature.mass,
            self.tolerance,
            retention_time_window,
            (start, end),
            drift.bin_width,
        );
        let chrom = extract_chromatogram(self.index, &request);
        self.refine_on(feature, &chrom)
    }

    /// Re-delimit `feature` on `chromatogram`, or reject it
    pub fn refine_on(&self, feature: PeakFeature, chromatogram: &Chromatogram) -> Option<PeakFeature> {
        if chromatogram.len() < 3 {
            trace!("Too few points to refine {:0.4}@{:0.3}", feature.mass, feature.apex_time());
            return None;
        }
        let raw = chromatogram.intensities();
        let smoothed = self.signal.smooth(chromatogram);
        let times = chromatogram.times();

        let anchor = chromatogram.nearest_index(feature.times.top)?;
        let apex = reanchor_apex(&smoothed, anchor, self.params.apex_search_radius);
        let left_guess = chromatogram.nearest_index(feature.times.left)?.min(apex);
        let right_guess = chromatogram.nearest_index(feature.times.right)?.max(apex);

        let k = self.params.minimum_edge_points;
        let left = walk_left(&smoothed, apex, k, (apex - left_guess).max(k)).unwrap_or(left_guess);
        let right =
            walk_right(&smoothed, apex, k, (right_guess - apex).max(k)).unwrap_or(right_guess);

        let apex_height = smoothed[apex];
        let (left_height, right_height) = (smoothed[left], smoothed[right]);
        if left_height.max(right_height) >= apex_height {
            trace!("Rejected {:0.4}@{:0.3}, edges reach the apex", feature.mass, feature.apex_time());
            return None;
        }
        if apex_height - left_height.min(right_height) < self.minimum_amplitude {
            trace!("Rejected {:0.4}@{:0.3}, below minimum amplitude", feature.mass, feature.apex_time());
            return None;
        }

        let mut top = left;
        for j in left..=right {
            if raw[j] > raw[top] {
                top = j;
            }
        }
        if !(raw[top] > 0.0) {
            return None;
        }

        let (lp, tp, rp) = (
            chromatogram.get(left)?,
            chromatogram.get(top)?,
            chromatogram.get(right)?,
        );
        let noise = if feature.shape.estimated_noise > 0.0 {
            feature.shape.estimated_noise
        } else {
            1.0
        };
        let amplitude = tp.intensity - lp.intensity.min(rp.intensity);

        let (retention_time, drift_time) = match chromatogram.axis() {
            ChromatogramAxis::RetentionTime => (tp.time, None),
            ChromatogramAxis::DriftTime => (feature.retention_time, Some(tp.time)),
        };

        Some(PeakFeature {
            axis: chromatogram.axis(),
            mass: tp.mz,
            times: FeatureTimes::new(lp.time, tp.time, rp.time),
            retention_time,
            drift_time,
            intensities: FeatureIntensities {
                left: lp.intensity,
                top: tp.intensity,
                right: rp.intensity,
            },
            area_above_zero: trapezoid_area(times, &raw, left, right),
            area_above_baseline: area_above_chord(times, &raw, left, right),
            shape: PeakShape {
                estimated_noise: noise,
                signal_to_noise: amplitude / noise,
                symmetry: symmetry(lp.time, tp.time, rp.time),
                sharpness: sharpness(lp.time, rp.time, lp.intensity, tp.intensity, rp.intensity),
            },
            ms1_scans: ScanReferences {
                left: lp.scan_id,
                top: tp.scan_id,
                right: rp.scan_id,
            },
            chromatogram_indices: ChromatogramIndices { left, top, right },
            ..feature
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chromatogram::ChromatogramPoint;
    use crate::params::{AcquisitionType, SmoothingMethod};
    use crate::signal::LocalMaximumPeakDetector;
    use crate::spectrum::{Polarity, RawSpectrum};

    fn chromatogram(values: &[f64]) -> Chromatogram {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, y)| ChromatogramPoint::new(i, i as f64 * 0.1, 300.0, *y))
            .collect();
        Chromatogram::new(ChromatogramAxis::RetentionTime, points)
    }

    fn feature_at(left: f64, top: f64, right: f64) -> PeakFeature {
        PeakFeature {
            mass: 300.0,
            times: FeatureTimes::new(left, top, right),
            shape: PeakShape {
                estimated_noise: 10.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_reanchor() {
        let y = [0.0, 1.0, 5.0, 3.0, 4.0, 9.0, 2.0, 0.0];
        assert_eq!(reanchor_apex(&y, 3, 2), 5);
        assert_eq!(reanchor_apex(&y, 2, 1), 2);
        let flat = [1.0; 6];
        assert_eq!(reanchor_apex(&flat, 3, 2), 3);
    }

    #[test]
    fn test_refine_on() {
        let spectra: Vec<RawSpectrum> = Vec::new();
        let index = SpectrumIndex::new(&spectra, Polarity::Positive);
        let signal = LocalMaximumPeakDetector::new(SmoothingMethod::None, 0);
        let params = FeatureFinderParams::default().with_peak_thresholds(3, 100.0);
        let linker = Ms2Linker::new(&index, AcquisitionType::DDA, params.ms2_tolerance);
        let refiner = Refiner::new(&index, &signal, linker, &params);

        let chrom = chromatogram(&[0.0, 0.0, 100.0, 400.0, 1000.0, 500.0, 200.0, 0.0, 0.0, 0.0]);
        let refined = refiner
            .refine_on(feature_at(0.1, 0.3, 0.8), &chrom)
            .unwrap();
        assert_eq!(refined.chromatogram_indices.top, 4);
        assert_eq!(refined.chromatogram_indices.left, 1);
        assert_eq!(refined.chromatogram_indices.right, 7);
        assert_eq!(refined.intensities.top, 1000.0);
        assert!(refined.is_well_formed());
        assert!(refined.area_above_zero > 0.0);
        assert_eq!(refined.shape.signal_to_noise, 100.0);
        assert_eq!(refined.ms1_scans.top, 4);
    }

    #[test]
    fn test_refine_keeps_edges_without_valley() {
        let spectra: Vec<RawSpectrum> = Vec::new();
        let index = SpectrumIndex::new(&spectra, Polarity::Positive);
        let signal = LocalMaximumPeakDetector::new(SmoothingMethod::None, 0);
        let params = FeatureFinderParams::default().with_peak_thresholds(3, 100.0);
        let linker = Ms2Linker::new(&index, AcquisitionType::DDA, params.ms2_tolerance);
        let refiner = Refiner::new(&index, &signal, linker, &params);

        // rising shoulder on the left and a slow tail on the right, neither
        // reaches a valley within the walk
        let chrom = chromatogram(&[50.0, 100.0, 200.0, 400.0, 1000.0, 800.0, 600.0, 400.0, 300.0, 200.0]);
        let refined = refiner
            .refine_on(feature_at(0.2, 0.4, 0.7), &chrom)
            .unwrap();
        assert_eq!(refined.chromatogram_indices.top, 4);
        assert_eq!(
            refined.chromatogram_indices.left,
            chrom.nearest_index(0.2).unwrap()
        );
        assert_eq!(
            refined.chromatogram_indices.right,
            chrom.nearest_index(0.7).unwrap()
        );
        assert_eq!(refined.intensities.left, 200.0);
        assert_eq!(refined.intensities.right, 400.0);
        assert!(refined.is_well_formed());
    }

    #[test]
    fn test_refine_rejects_weak() {
        let spectra: Vec<RawSpectrum> = Vec::new();
        let index = SpectrumIndex::new(&spectra, Polarity::Positive);
        let signal = LocalMaximumPeakDetector::new(SmoothingMethod::None, 0);
        let params = FeatureFinderParams::default().with_peak_thresholds(3, 2000.0);
        let linker = Ms2Linker::new(&index, AcquisitionType::DDA, params.ms2_tolerance);
        let refiner = Refiner::new(&index, &signal, linker, &params);
        let chrom = chromatogram(&[0.0, 0.0, 100.0, 400.0, 1000.0, 500.0, 200.0, 0.0, 0.0, 0.0]);
        assert!(refiner.refine_on(feature_at(0.2, 0.4, 0.6), &chrom).is_none());
        assert!(refiner.refine_on(feature_at(0.2, 0.4, 0.6), &chromatogram(&[1.0, 2.0])).is_none());
    }
}
