//! Remove the duplicate features that neighboring mass slices produce when a
//! peak straddles a slice boundary
use tracing::trace;

use crate::feature::PeakFeature;

/// Whether `a` and `b` overlap in time.
///
/// The test is asymmetric. When `a` elutes later, `a` must begin before `b`'s
/// apex, otherwise `b` must begin before `a`'s apex.
pub fn time_windows_overlap(a: &PeakFeature, b: &PeakFeature) -> bool {
    if a.apex_time() > b.apex_time() {
        a.times.left < b.apex_time()
    } else {
        b.times.left < a.apex_time()
    }
}

/// The largest apex time difference at which two overlapping features are the same peak
pub fn apex_tolerance(a: &PeakFeature, b: &PeakFeature) -> f64 {
    0.03f64.min((a.width() + b.width()) * 0.25)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedundancyResolver {
    pub slice_width: f64,
}

impl RedundancyResolver {
    pub fn new(slice_width: f64) -> Self {
        Self { slice_width }
    }

    pub fn is_redundant(&self, a: &PeakFeature, b: &PeakFeature) -> bool {
        (a.mass - b.mass).abs() <= self.slice_width * 0.5
            && time_windows_overlap(a, b)
            && (a.apex_time() - b.apex_time()).abs() <= apex_tolerance(a, b)
    }

    /// Resolve the `current` slice's features against the `previous` slice's.
    ///
    /// Of each redundant pair the feature with the lower apex intensity is
    /// dropped, `b` losing ties. `previous` is rebuilt in place and the
    /// surviving members of `current` are returned.
    pub fn resolve(&self, previous: &mut Vec<PeakFeature>, current: Vec<PeakFeature>) -> Vec<PeakFeature> {
        let mut alive = vec![true; previous.len()];
        let mut survivors = Vec::with_capacity(current.len());

        for b in current {
            let mut keep_b = true;
            for (a, a_alive) in previous.iter().zip(alive.iter_mut()) {
                if !*a_alive || !self.is_redundant(a, &b) {
                    continue;
                }
                if a.apex_intensity() < b.apex_intensity() {
                    *a_alive = false;
                } else {
                    keep_b = false;
                    break;
                }
            }
            if keep_b {
                survivors.push(b);
            }
        }

        if alive.iter().any(|x| !x) {
            let before = previous.len();
            let mut flags = alive.into_iter();
            previous.retain(|_| flags.next().unwrap_or(true));
            trace!("Dropped {} features from the previous slice", before - previous.len());
        }
        survivors
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::{FeatureIntensities, FeatureTimes};

    fn feature(mass: f64, left: f64, top: f64, right: f64, height: f64) -> PeakFeature {
        PeakFeature {
            mass,
            times: FeatureTimes::new(left, top, right),
            intensities: FeatureIntensities {
                left: 0.0,
                top: height,
                right: 0.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_asymmetric_overlap() {
        let a = feature(100.0, 5.0, 5.2, 5.4, 10.0);
        let b = feature(100.0, 4.9, 5.1, 5.3, 10.0);
        assert!(time_windows_overlap(&a, &b));
        let far = feature(100.0, 5.15, 5.3, 5.5, 10.0);
        let early = feature(100.0, 4.8, 5.0, 5.1, 10.0);
        assert!(!time_windows_overlap(&far, &early));
        assert!(!time_windows_overlap(&early, &far));
    }

    #[test]
    fn test_resolve_drops_lower() {
        let resolver = RedundancyResolver::new(0.1);
        let mut previous = vec![
            feature(100.0, 5.0, 5.2, 5.4, 1000.0),
            feature(100.0, 8.0, 8.2, 8.4, 1000.0),
        ];
        let current = vec![
            feature(100.04, 5.0, 5.21, 5.4, 2000.0),
            feature(100.04, 8.0, 8.2, 8.4, 500.0),
            feature(100.04, 12.0, 12.2, 12.4, 500.0),
        ];
        let survivors = resolver.resolve(&mut previous, current);
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].apex_time(), 8.2);
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].apex_intensity(), 2000.0);
        assert_eq!(survivors[1].apex_time(), 12.2);
    }

    #[test]
    fn test_tie_keeps_previous() {
        let resolver = RedundancyResolver::new(0.1);
        let mut previous = vec![feature(100.0, 5.0, 5.2, 5.4, 1000.0)];
        let current = vec![feature(100.05, 5.0, 5.2, 5.4, 1000.0)];
        let survivors = resolver.resolve(&mut previous, current);
        assert_eq!(previous.len(), 1);
        assert!(survivors.is_empty());
    }

    #[test]
    fn test_distant_masses_kept() {
        let resolver = RedundancyResolver::new(0.1);
        let mut previous = vec![feature(100.0, 5.0, 5.2, 5.4, 1000.0)];
        let current = vec![feature(100.06, 5.0, 5.2, 5.4, 2000.0)];
        let survivors = resolver.resolve(&mut previous, current);
        assert_eq!(previous.len(), 1);
        assert_eq!(survivors.len(), 1);
    }
}
