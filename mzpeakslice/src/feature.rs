use std::collections::BTreeMap;

use crate::chromatogram::{Chromatogram, ChromatogramAxis};
use crate::signal::PeakDetectionResult;

/// The boundaries and apex of a feature along its axis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureTimes {
    pub left: f64,
    pub top: f64,
    pub right: f64,
}

impl FeatureTimes {
    pub fn new(left: f64, top: f64, right: f64) -> Self {
        Self { left, top, right }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn contains(&self, time: f64) -> bool {
        self.left <= time && time <= self.right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureIntensities {
    pub left: f64,
    pub top: f64,
    pub right: f64,
}

/// Spectrum indices of the MS1 scans at the feature's left edge, apex and right edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanReferences {
    pub left: usize,
    pub top: usize,
    pub right: usize,
}

/// The MS1 spectra a drift time chromatogram was summed from, enough to
/// rebuild the accumulated spectrum
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccumulatedSpectra {
    pub first_scan: usize,
    pub last_scan: usize,
    pub retention_time_window: (f64, f64),
}

/// Positions of the feature's edges and apex in the chromatogram it was last
/// built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChromatogramIndices {
    pub left: usize,
    pub top: usize,
    pub right: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakShape {
    pub estimated_noise: f64,
    pub signal_to_noise: f64,
    pub symmetry: f64,
    pub sharpness: f64,
}

/// The MS2 scans attributed to a feature
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ms2Links {
    /// The single most representative MS2 scan
    pub primary: Option<usize>,
    /// One scan per distinct collision energy, mapped to that energy
    pub scans: BTreeMap<usize, f64>,
}

impl Ms2Links {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.scans.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }
}

/// A chromatographic peak at a single mass.
///
/// Retention time features may carry drift time sub-features when the run has
/// ion mobility, each of which refers back to its parent through `parent_id`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakFeature {
    pub id: usize,
    pub master_id: usize,
    pub parent_id: Option<usize>,
    pub axis: ChromatogramAxis,
    pub mass: f64,
    pub times: FeatureTimes,
    pub retention_time: f64,
    pub drift_time: Option<f64>,
    pub intensities: FeatureIntensities,
    pub area_above_zero: f64,
    pub area_above_baseline: f64,
    pub shape: PeakShape,
    pub ms1_scans: ScanReferences,
    /// Set on drift time features only
    pub accumulated_ms1: Option<AccumulatedSpectra>,
    pub chromatogram_indices: ChromatogramIndices,
    pub ms2: Ms2Links,
    pub drift_features: Vec<PeakFeature>,
    pub amplitude_score: f64,
    pub amplitude_order: usize,
}

impl PeakFeature {
    #[inline]
    pub fn apex_time(&self) -> f64 {
        self.times.top
    }

    #[inline]
    pub fn apex_intensity(&self) -> f64 {
        self.intensities.top
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.times.width()
    }

    pub fn is_drift_feature(&self) -> bool {
        matches!(self.axis, ChromatogramAxis::DriftTime)
    }

    /// Check the ordering constraints every returned feature satisfies
    pub fn is_well_formed(&self) -> bool {
        self.times.left <= self.times.top
            && self.times.top <= self.times.right
            && self.intensities.top >= self.intensities.left
            && self.intensities.top >= self.intensities.right
            && self.ms1_scans.left <= self.ms1_scans.right
    }
}

/// Translate a detection result on `chromatogram` into a feature.
///
/// Returns `None` when the result's indices fall outside the chromatogram or
/// are out of order, or when the apex carries no signal.
pub fn build_feature(chromatogram: &Chromatogram, result: &PeakDetectionResult) -> Option<PeakFeature> {
    if !(result.left <= result.top && result.top <= result.right) {
        return None;
    }
    let left = chromatogram.get(result.left)?;
    let top = chromatogram.get(result.top)?;
    let right = chromatogram.get(result.right)?;
    if !(top.intensity > 0.0) {
        return None;
    }

    let (retention_time, drift_time) = match chromatogram.axis() {
        ChromatogramAxis::RetentionTime => (top.time, None),
        ChromatogramAxis::DriftTime => (0.0, Some(top.time)),
    };

    Some(PeakFeature {
        axis: chromatogram.axis(),
        mass: top.mz,
        times: FeatureTimes::new(left.time, top.time, right.time),
        retention_time,
        drift_time,
        intensities: FeatureIntensities {
            left: left.intensity,
            top: top.intensity,
            right: right.intensity,
        },
        area_above_zero: result.area_above_zero,
        area_above_baseline: result.area_above_baseline,
        shape: PeakShape {
            estimated_noise: result.estimated_noise,
            signal_to_noise: result.signal_to_noise,
            symmetry: result.symmetry,
            sharpness: result.sharpness,
        },
        ms1_scans: ScanReferences {
            left: left.scan_id,
            top: top.scan_id,
            right: right.scan_id,
        },
        chromatogram_indices: ChromatogramIndices {
            left: result.left,
            top: result.top,
            right: result.right,
        },
        ..Default::default()
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chromatogram::ChromatogramPoint;

    fn chrom() -> Chromatogram {
        let points = [0.0, 50.0, 200.0, 60.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, y)| ChromatogramPoint::new(i * 2, i as f64 * 0.1, 400.0 + i as f64 * 0.001, *y))
            .collect();
        Chromatogram::new(ChromatogramAxis::RetentionTime, points)
    }

    #[test]
    fn test_build_feature() {
        let result = PeakDetectionResult {
            left: 0,
            top: 2,
            right: 4,
            area_above_zero: 31.0,
            ..Default::default()
        };
        let feature = build_feature(&chrom(), &result).unwrap();
        assert!((feature.mass - 400.002).abs() < 1e-9);
        assert_eq!(feature.ms1_scans.top, 4);
        assert_eq!(feature.ms1_scans.right, 8);
        assert_eq!(feature.retention_time, feature.times.top);
        assert!(feature.is_well_formed());
        assert!(!feature.is_drift_feature());
    }

    #[test]
    fn test_build_rejects_bad_indices() {
        let result = PeakDetectionResult {
            left: 3,
            top: 2,
            right: 4,
            ..Default::default()
        };
        assert!(build_feature(&chrom(), &result).is_none());
        let result = PeakDetectionResult {
            left: 3,
            top: 4,
            right: 9,
            ..Default::default()
        };
        assert!(build_feature(&chrom(), &result).is_none());
        let result = PeakDetectionResult {
            left: 0,
            top: 0,
            right: 1,
            ..Default::default()
        };
        assert!(build_feature(&chrom(), &result).is_none());
    }
}
