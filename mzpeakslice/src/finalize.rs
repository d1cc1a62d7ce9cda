//! Assign identities and amplitude ranks to the final feature list
use std::cmp::Ordering;

use crate::feature::PeakFeature;

/// Order features by apex time, then by mass
pub fn feature_order(a: &PeakFeature, b: &PeakFeature) -> Ordering {
    a.times
        .top
        .total_cmp(&b.times.top)
        .then_with(|| a.mass.total_cmp(&b.mass))
}

/// Rank `features` by apex intensity, lowest first, with ties broken by
/// their current position
fn assign_amplitude_ranks(features: &mut [PeakFeature]) {
    let n = features.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| {
        features[*a]
            .intensities
            .top
            .total_cmp(&features[*b].intensities.top)
            .then(a.cmp(b))
    });
    for (rank, i) in order.into_iter().enumerate() {
        let f = &mut features[i];
        f.amplitude_order = rank;
        f.amplitude_score = if n > 1 {
            rank as f64 / (n - 1) as f64
        } else {
            1.0
        };
    }
}

/// Sort, number and rank features.
///
/// Top-level features are numbered from zero in (time, mass) order. Master ids
/// run across each parent followed by its drift features. Drift features are
/// numbered from zero within their parent and ranked among their siblings.
pub fn finalize_features(mut features: Vec<PeakFeature>) -> Vec<PeakFeature> {
    features.sort_by(feature_order);
    let mut master_id = 0;
    for (i, feature) in features.iter_mut().enumerate() {
        feature.id = i;
        feature.parent_id = None;
        feature.master_id = master_id;
        master_id += 1;
        for (k, sub) in feature.drift_features.iter_mut().enumerate() {
            sub.id = k;
            sub.parent_id = Some(i);
            sub.master_id = master_id;
            master_id += 1;
        }
        assign_amplitude_ranks(&mut feature.drift_features);
    }
    assign_amplitude_ranks(&mut features);
    features
}
