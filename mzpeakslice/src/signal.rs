//! Smoothing and local maximum peak detection over a one dimensional trace.
//!
//! The feature finder only talks to these through [`SignalPrimitives`], so an
//! alternative kernel can be injected with
//! [`FeatureFinder::with_signal_primitives`](crate::scanner::FeatureFinder::with_signal_primitives).
use mzsignal::feature_statistics::FeatureTransform;

use crate::chromatogram::{Chromatogram, ChromatogramTrace};
use crate::params::{PeakDetectionParams, SmoothingMethod};

/// A peak found by a [`SignalPrimitives`] implementation, expressed in indices
/// of the trace it was detected on
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakDetectionResult {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub left_intensity: f64,
    pub top_intensity: f64,
    pub right_intensity: f64,
    pub area_above_zero: f64,
    pub area_above_baseline: f64,
    pub estimated_noise: f64,
    pub signal_to_noise: f64,
    pub symmetry: f64,
    pub sharpness: f64,
}

pub trait SignalPrimitives {
    /// The smoothed intensities of `chromatogram`, one per point
    fn smooth(&self, chromatogram: &Chromatogram) -> Vec<f64>;

    /// Find peaks in an already smoothed trace. `times` and `intensities` have
    /// the same length.
    fn detect_peaks(
        &self,
        times: &[f64],
        intensities: &[f64],
        params: &PeakDetectionParams,
    ) -> Vec<PeakDetectionResult>;
}

/// The trapezoidal integral of `intensities` over `times[left..=right]`
pub fn trapezoid_area(times: &[f64], intensities: &[f64], left: usize, right: usize) -> f64 {
    if right <= left || right >= times.len() || right >= intensities.len() {
        return 0.0;
    }
    (left..right)
        .map(|i| (times[i + 1] - times[i]) * (intensities[i] + intensities[i + 1]) * 0.5)
        .sum()
}

/// The trapezoidal integral above the straight chord joining the two edges,
/// never negative
pub fn area_above_chord(times: &[f64], intensities: &[f64], left: usize, right: usize) -> f64 {
    let total = trapezoid_area(times, intensities, left, right);
    if right <= left || right >= times.len() {
        return 0.0;
    }
    let chord = (times[right] - times[left]) * (intensities[left] + intensities[right]) * 0.5;
    (total - chord).max(0.0)
}

/// The ratio of the shorter side of a peak to the longer, in time units
pub fn symmetry(left_time: f64, top_time: f64, right_time: f64) -> f64 {
    let front = top_time - left_time;
    let tail = right_time - top_time;
    let longest = front.max(tail);
    if longest > 0.0 {
        front.min(tail) / longest
    } else {
        1.0
    }
}

/// Apex height over the baseline per unit of time the peak spans
pub fn sharpness(
    left_time: f64,
    right_time: f64,
    left_intensity: f64,
    top_intensity: f64,
    right_intensity: f64,
) -> f64 {
    let width = right_time - left_time;
    if width > 0.0 {
        (top_intensity - left_intensity.min(right_intensity)) / width
    } else {
        0.0
    }
}

/// Estimate the noise of a trace as the median absolute difference between
/// neighboring non-flat points
pub fn estimate_noise(intensities: &[f64]) -> f64 {
    let mut diffs: Vec<f64> = intensities
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .filter(|d| *d > 0.0)
        .collect();
    if diffs.is_empty() {
        return 1.0;
    }
    diffs.sort_by(|a, b| a.total_cmp(b));
    let mid = diffs.len() / 2;
    let median = if diffs.len() % 2 == 0 {
        (diffs[mid - 1] + diffs[mid]) / 2.0
    } else {
        diffs[mid]
    };
    if median > 0.0 {
        median
    } else {
        1.0
    }
}

/// Repeated moving average passes over a trace with `mzsignal`. Two passes
/// give a triangular kernel, three approach a Gaussian.
macro_rules! smooth_passes {
    ($feature:expr, $size:expr, $passes:expr) => {{
        let mut feature = $feature.clone();
        for _ in 0..$passes {
            feature.smooth($size);
        }
        feature.iter().map(|(_, _, z)| z as f64).collect()
    }};
}

/// The default [`SignalPrimitives`]: `mzsignal` moving average smoothing followed by a
/// local maximum search that walks down each side of a maximum to the nearest
/// valley.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalMaximumPeakDetector {
    pub method: SmoothingMethod,
    pub level: usize,
}

impl LocalMaximumPeakDetector {
    pub fn new(method: SmoothingMethod, level: usize) -> Self {
        Self { method, level }
    }

    fn describe_peak(
        times: &[f64],
        y: &[f64],
        left: usize,
        top: usize,
        right: usize,
        noise: f64,
    ) -> PeakDetectionResult {
        let amplitude = y[top] - y[left].min(y[right]);
        PeakDetectionResult {
            left,
            top,
            right,
            left_intensity: y[left],
            top_intensity: y[top],
            right_intensity: y[right],
            area_above_zero: trapezoid_area(times, y, left, right),
            area_above_baseline: area_above_chord(times, y, left, right),
            estimated_noise: noise,
            signal_to_noise: amplitude / noise,
            symmetry: symmetry(times[left], times[top], times[right]),
            sharpness: sharpness(times[left], times[right], y[left], y[top], y[right]),
        }
    }
}

impl SignalPrimitives for LocalMaximumPeakDetector {
    fn smooth(&self, chromatogram: &Chromatogram) -> Vec<f64> {
        let passes = match self.method {
            SmoothingMethod::None => 0,
            SmoothingMethod::SimpleMovingAverage => 1,
            SmoothingMethod::LinearWeightedMovingAverage => 2,
            SmoothingMethod::Gaussian => 3,
        };
        if self.level == 0 || passes == 0 || chromatogram.len() < 3 {
            return chromatogram.intensities();
        }
        match chromatogram.trace() {
            ChromatogramTrace::RetentionTime(feature) => smooth_passes!(feature, self.level, passes),
            ChromatogramTrace::DriftTime(feature) => smooth_passes!(feature, self.level, passes),
        }
    }

    fn detect_peaks(
        &self,
        times: &[f64],
        intensities: &[f64],
        params: &PeakDetectionParams,
    ) -> Vec<PeakDetectionResult> {
        let y = intensities;
        let n = y.len().min(times.len());
        if n < 3 || n < params.minimum_data_points {
            return Vec::new();
        }
        let noise = estimate_noise(&y[..n]);

        let mut peaks = Vec::new();
        let mut last_right = None;
        for i in 1..n - 1 {
            if !(y[i] > y[i - 1] && y[i] >= y[i + 1] && y[i] > 0.0) {
                continue;
            }
            if matches!(last_right, Some(r) if i <= r) {
                continue;
            }

            let mut left = i;
            while left > 0 && y[left - 1] <= y[left] && y[left] > 0.0 {
                left -= 1;
            }
            let mut right = i;
            while right + 1 < n && y[right + 1] <= y[right] && y[right] > 0.0 {
                right += 1;
            }

            if right - left + 1 < params.minimum_data_points {
                continue;
            }
            if y[i] - y[left].min(y[right]) < params.minimum_amplitude {
                continue;
            }
            peaks.push(Self::describe_peak(times, y, left, i, right, noise));
            last_right = Some(right);
        }
        peaks
    }
}
