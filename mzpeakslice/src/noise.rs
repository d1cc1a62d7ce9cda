//! Reject peaks that sit in a spiky stretch of chromatogram
use tracing::trace;

use crate::feature::PeakFeature;
use crate::params::NoiseFilterParams;

/// A spike-count test for noise.
///
/// The chromatogram on either side of a peak is scanned for pairs of a local
/// maximum and the next local minimum. A pair whose half amplitude, scaled by
/// the noise factor, exceeds the peak's own rise counts as a spike. A peak with
/// too many spikes around it is not distinguishable from the noise it sits in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoiseFilter {
    pub params: NoiseFilterParams,
}

#[inline]
fn is_local_maximum(y: &[f64], j: usize) -> bool {
    y[j - 1] < y[j] && y[j] >= y[j + 1]
}

#[inline]
fn is_local_minimum(y: &[f64], j: usize) -> bool {
    y[j - 1] > y[j] && y[j] <= y[j + 1]
}

impl NoiseFilter {
    pub fn new(params: NoiseFilterParams) -> Self {
        Self { params }
    }

    /// Count the spike pairs among `y[start..end]` larger than `amplitude_difference`
    fn count_spikes(&self, y: &[f64], start: usize, end: usize, amplitude_difference: f64) -> usize {
        let n = y.len();
        if n < 3 {
            return 0;
        }
        let start = start.max(1);
        let end = end.min(n - 1);
        let mut count = 0;
        let mut pending_max: Option<f64> = None;
        for j in start..end {
            if is_local_maximum(y, j) {
                pending_max = Some(y[j]);
            } else if is_local_minimum(y, j) {
                if let Some(top) = pending_max.take() {
                    let noise = 0.5 * (top - y[j]).abs();
                    if noise * self.params.noise_factor > amplitude_difference {
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Decide whether the peak spanning `left..=right` with apex `top` in
    /// `intensities` is noise
    pub fn is_noise(&self, intensities: &[f64], left: usize, top: usize, right: usize) -> bool {
        let y = intensities;
        let n = y.len();
        if top == 0 || top + 1 >= n || left > top || right < top {
            return true;
        }
        if y[top - 1] <= 0.0 || y[top + 1] <= 0.0 {
            return true;
        }

        let tracking_window =
            (self.params.tracking_window_factor * (right - left)).min(self.params.tracking_window_cap);
        let amplitude_difference = (y[top] - y[left]).max(y[top] - y[right]);

        let spikes = self.count_spikes(y, left.saturating_sub(tracking_window), left, amplitude_difference)
            + self.count_spikes(y, right + 1, (right + 1 + tracking_window).min(n), amplitude_difference);
        spikes >= self.params.spike_threshold
    }

    /// Keep only the features that are not noise on the trace they were detected on
    pub fn retain(&self, features: Vec<PeakFeature>, intensities: &[f64]) -> Vec<PeakFeature> {
        let before = features.len();
        let kept: Vec<_> = features
            .into_iter()
            .filter(|f| {
                let idx = f.chromatogram_indices;
                !self.is_noise(intensities, idx.left, idx.top, idx.right)
            })
            .collect();
        if kept.len() != before {
            trace!("Rejected {} noisy features", before - kept.len());
        }
        kept
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn trace_with_spikes(spike_height: f64) -> Vec<f64> {
        let mut y: Vec<f64> = (0..200)
            .map(|j| if j % 2 == 1 { spike_height } else { 0.0 })
            .collect();
        for (k, v) in [0.0, 200.0, 400.0, 600.0, 800.0, 1000.0, 800.0, 600.0, 400.0, 200.0, 0.0]
            .iter()
            .enumerate()
        {
            y[95 + k] = *v;
        }
        y
    }

    #[test]
    fn test_spiky_neighborhood() {
        let filter = NoiseFilter::default();
        let y = trace_with_spikes(700.0);
        assert!(filter.is_noise(&y, 95, 100, 105));
    }

    #[test]
    fn test_quiet_neighborhood() {
        let filter = NoiseFilter::default();
        let y = trace_with_spikes(100.0);
        assert!(!filter.is_noise(&y, 95, 100, 105));
    }

    #[test]
    fn test_boundary_apex() {
        let filter = NoiseFilter::default();
        let y = vec![1000.0, 500.0, 0.0];
        assert!(filter.is_noise(&y, 0, 0, 2));
        let y = vec![0.0, 0.0, 1000.0, 500.0, 0.0];
        assert!(filter.is_noise(&y, 1, 2, 4));
    }
}
