//! Attribute MS2 scans to features by precursor membership
use std::collections::{BTreeMap, HashMap};

use identity_hash::{BuildIdentityHasher, IdentityHashable};
use mzpeaks::Tolerance;
use tracing::trace;

use crate::feature::{Ms2Links, PeakFeature};
use crate::params::AcquisitionType;
use crate::spectrum::{RawSpectrum, SpectrumIndex};

/// A collision energy rounded to two decimal places, so that energies which
/// differ only by floating point noise group together
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollisionEnergyKey(pub i64);

impl IdentityHashable for CollisionEnergyKey {}

impl std::hash::Hash for CollisionEnergyKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.0 as u64)
    }
}

impl From<f64> for CollisionEnergyKey {
    fn from(value: f64) -> Self {
        Self((value * 100.0).round() as i64)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    scan: usize,
    collision_energy: f64,
    distance: usize,
    total_ion_current: f64,
}

impl Candidate {
    fn new(spectrum: &RawSpectrum, apex_scan: usize) -> Self {
        Self {
            scan: spectrum.index,
            collision_energy: spectrum.collision_energy,
            distance: spectrum.index.abs_diff(apex_scan),
            total_ion_current: spectrum.total_ion_current,
        }
    }

    /// Nearest to the apex, then earliest
    fn is_nearer_than(&self, other: &Self) -> bool {
        (self.distance, self.scan) < (other.distance, other.scan)
    }

    /// Most intense, then nearest to the apex, then earliest
    fn is_stronger_than(&self, other: &Self) -> bool {
        match self.total_ion_current.total_cmp(&other.total_ion_current) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.is_nearer_than(other),
        }
    }
}

type CandidateGroups = HashMap<CollisionEnergyKey, Candidate, BuildIdentityHasher<CollisionEnergyKey>>;

fn collect_links(groups: CandidateGroups, prefer: impl Fn(&Candidate, &Candidate) -> bool) -> Ms2Links {
    let mut primary: Option<Candidate> = None;
    let mut scans = BTreeMap::new();
    for (_, cand) in groups {
        scans.insert(cand.scan, cand.collision_energy);
        match primary {
            Some(best) if !prefer(&cand, &best) => {}
            _ => primary = Some(cand),
        }
    }
    Ms2Links {
        primary: primary.map(|c| c.scan),
        scans,
    }
}

/// Finds the MS2 scans whose precursor selection covers a feature
#[derive(Debug, Clone, Copy)]
pub struct Ms2Linker<'a> {
    index: &'a SpectrumIndex<'a>,
    acquisition_type: AcquisitionType,
    tolerance: Tolerance,
}

impl<'a> Ms2Linker<'a> {
    pub fn new(
        index: &'a SpectrumIndex<'a>,
        acquisition_type: AcquisitionType,
        tolerance: Tolerance,
    ) -> Self {
        Self {
            index,
            acquisition_type,
            tolerance,
        }
    }

    /// Test whether `spectrum` isolated a precursor at `mass`
    pub fn precursor_matches(&self, spectrum: &RawSpectrum, mass: f64) -> bool {
        match (self.acquisition_type, spectrum.precursor.as_ref()) {
            (AcquisitionType::DDA, Some(prec)) => self.tolerance.test(prec.target_mz, mass),
            (AcquisitionType::DDA, None) => false,
            (AcquisitionType::SWATH | AcquisitionType::AIF, Some(prec))
                if prec.has_isolation_window() =>
            {
                let (lo, hi) = self.tolerance.bounds(mass);
                hi >= prec.lower_bound && lo <= prec.upper_bound
            }
            (AcquisitionType::AIF, _) => true,
            (AcquisitionType::SWATH, _) => false,
        }
    }

    fn candidates<'s>(
        &'s self,
        left_scan: usize,
        right_scan: usize,
        mass: f64,
    ) -> impl Iterator<Item = &'a RawSpectrum> + 's {
        let polarity = self.index.polarity();
        self.index
            .msn_between(left_scan, right_scan)
            .filter(move |s| s.polarity == polarity && self.precursor_matches(s, mass))
    }

    /// Link a retention time feature to one MS2 scan per collision energy,
    /// preferring the scan nearest the MS1 apex
    pub fn link(&self, feature: &PeakFeature) -> Ms2Links {
        let apex = feature.ms1_scans.top;
        let mut groups = CandidateGroups::default();
        for spec in self.candidates(feature.ms1_scans.left, feature.ms1_scans.right, feature.mass) {
            let cand = Candidate::new(spec, apex);
            groups
                .entry(CollisionEnergyKey::from(spec.collision_energy))
                .and_modify(|best| {
                    if cand.is_nearer_than(best) {
                        *best = cand
                    }
                })
                .or_insert(cand);
        }
        let links = collect_links(groups, Candidate::is_nearer_than);
        trace!(
            "Linked {} MS2 scans to {:0.4}@{:0.3}",
            links.len(),
            feature.mass,
            feature.apex_time()
        );
        links
    }

    /// Link a drift time sub-feature of `parent`. Mobility-gated MS2 scans must
    /// cover the sub-feature's drift apex, ungated scans must fall within the
    /// retention time window the drift chromatogram was accumulated over. The
    /// most intense scan wins within each collision energy.
    pub fn link_drift(
        &self,
        feature: &PeakFeature,
        parent: &PeakFeature,
        retention_time_window: (f64, f64),
    ) -> Ms2Links {
        let apex = parent.ms1_scans.top;
        let drift_apex = feature.times.top;
        let mut groups = CandidateGroups::default();
        for spec in self.candidates(parent.ms1_scans.left, parent.ms1_scans.right, feature.mass) {
            let accepted = match spec.precursor.as_ref().and_then(|p| p.drift_window) {
                Some((start, end)) => start <= drift_apex && drift_apex <= end,
                None => {
                    retention_time_window.0 <= spec.retention_time
                        && spec.retention_time <= retention_time_window.1
                }
            };
            if !accepted {
                continue;
            }
            let cand = Candidate::new(spec, apex);
            groups
                .entry(CollisionEnergyKey::from(spec.collision_energy))
                .and_modify(|best| {
                    if cand.is_stronger_than(best) {
                        *best = cand
                    }
                })
                .or_insert(cand);
        }
        collect_links(groups, Candidate::is_stronger_than)
    }
}
