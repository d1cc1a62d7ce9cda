//! The raw spectrum model consumed by the feature finder and the index built over it
use std::ops::Range;

use mzpeaks::{prelude::*, CentroidPeak, PeakSet};

use crate::error::FeatureFinderError;

/// The ionization polarity of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

/// The precursor isolation descriptor of an MSn scan.
///
/// A window whose bounds are both zero carries no explicit isolation range,
/// only a selected target.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrecursorWindow {
    pub target_mz: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// The drift time range the quadrupole was gated to, for ion mobility
    /// acquisitions that synchronize isolation with mobility
    pub drift_window: Option<(f64, f64)>,
}

impl PrecursorWindow {
    pub fn new(target_mz: f64, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            target_mz,
            lower_bound,
            upper_bound,
            drift_window: None,
        }
    }

    pub fn with_drift_window(mut self, start: f64, end: f64) -> Self {
        self.drift_window = Some((start, end));
        self
    }

    pub fn has_isolation_window(&self) -> bool {
        !(self.lower_bound == 0.0 && self.upper_bound == 0.0)
    }
}

/// A single scan as supplied by a spectrum provider.
///
/// `index` is both the scan id and the scan's position in acquisition order.
#[derive(Debug, Clone)]
pub struct RawSpectrum {
    pub index: usize,
    pub ms_level: u8,
    pub polarity: Polarity,
    pub retention_time: f64,
    pub drift_time: Option<f64>,
    pub collision_energy: f64,
    pub precursor: Option<PrecursorWindow>,
    pub total_ion_current: f64,
    pub peaks: PeakSet,
}

impl RawSpectrum {
    pub fn new(index: usize, ms_level: u8, retention_time: f64, peaks: PeakSet) -> Self {
        let total_ion_current = peaks.iter().map(|p| p.intensity as f64).sum();
        Self {
            index,
            ms_level,
            polarity: Polarity::Positive,
            retention_time,
            drift_time: None,
            collision_energy: 0.0,
            precursor: None,
            total_ion_current,
            peaks,
        }
    }

    /// Build a spectrum from parallel m/z and intensity arrays.
    ///
    /// # Errors
    /// [`FeatureFinderError::InconsistentInput`] if the arrays differ in length.
    pub fn from_arrays(
        index: usize,
        ms_level: u8,
        retention_time: f64,
        mzs: &[f64],
        intensities: &[f32],
    ) -> Result<Self, FeatureFinderError> {
        if mzs.len() != intensities.len() {
            return Err(FeatureFinderError::InconsistentInput {
                context: "spectrum intensity array",
                expected: mzs.len(),
                found: intensities.len(),
            });
        }
        let peaks: Vec<CentroidPeak> = mzs
            .iter()
            .zip(intensities.iter())
            .enumerate()
            .map(|(i, (mz, intensity))| CentroidPeak::new(*mz, *intensity, i as u32))
            .collect();
        Ok(Self::new(index, ms_level, retention_time, PeakSet::new(peaks)))
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_drift_time(mut self, drift_time: f64) -> Self {
        self.drift_time = Some(drift_time);
        self
    }

    pub fn with_precursor(mut self, precursor: PrecursorWindow, collision_energy: f64) -> Self {
        self.precursor = Some(precursor);
        self.collision_energy = collision_energy;
        self
    }

    #[inline]
    pub fn is_ms1(&self) -> bool {
        self.ms_level <= 1
    }

    pub fn mz_range(&self) -> Option<(f64, f64)> {
        if self.peaks.is_empty() {
            None
        } else {
            Some((self.peaks[0].mz, self.peaks[self.peaks.len() - 1].mz))
        }
    }
}

/// A source of ordered raw spectra.
///
/// Spectra must be ordered by acquisition, so that `index` and retention time
/// both increase monotonically.
pub trait SpectrumProvider {
    fn spectra(&self) -> &[RawSpectrum];
}

impl SpectrumProvider for [RawSpectrum] {
    fn spectra(&self) -> &[RawSpectrum] {
        self
    }
}

impl SpectrumProvider for Vec<RawSpectrum> {
    fn spectra(&self) -> &[RawSpectrum] {
        self.as_slice()
    }
}

/// A group of consecutive MS1 spectra sharing one retention time.
///
/// Ion mobility instruments emit one spectrum per drift bin for each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ms1Frame {
    pub scan_id: usize,
    pub time: f64,
    pub(crate) members: (usize, usize),
}

/// A read-only lookup structure over one run's spectra, shared by every
/// stage of the feature finder.
#[derive(Debug, Clone)]
pub struct SpectrumIndex<'a> {
    spectra: &'a [RawSpectrum],
    polarity: Polarity,
    ms1_positions: Vec<usize>,
    frames: Vec<Ms1Frame>,
    msn_positions: Vec<usize>,
    has_ion_mobility: bool,
}

impl<'a> SpectrumIndex<'a> {
    pub fn new(spectra: &'a [RawSpectrum], polarity: Polarity) -> Self {
        let mut ms1_positions = Vec::new();
        let mut msn_positions = Vec::new();
        let mut frames: Vec<Ms1Frame> = Vec::new();
        let mut has_ion_mobility = false;

        for (i, spec) in spectra.iter().enumerate() {
            if !spec.is_ms1() {
                msn_positions.push(i);
                continue;
            }
            if spec.polarity != polarity {
                continue;
            }
            has_ion_mobility |= spec.drift_time.is_some();
            let k = ms1_positions.len();
            ms1_positions.push(i);
            match frames.last_mut() {
                Some(frame)
                    if frame.time == spec.retention_time && frame.members.1 == k =>
                {
                    frame.members.1 = k + 1;
                }
                _ => frames.push(Ms1Frame {
                    scan_id: spec.index,
                    time: spec.retention_time,
                    members: (k, k + 1),
                }),
            }
        }

        Self {
            spectra,
            polarity,
            ms1_positions,
            frames,
            msn_positions,
            has_ion_mobility,
        }
    }

    pub fn spectra(&self) -> &'a [RawSpectrum] {
        self.spectra
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn has_ion_mobility(&self) -> bool {
        self.has_ion_mobility
    }

    pub fn frames(&self) -> &[Ms1Frame] {
        &self.frames
    }

    /// The MS1 frames whose retention time lies within `[start, end]`
    pub fn frames_between(&self, start: f64, end: f64) -> &[Ms1Frame] {
        let lo = self.frames.partition_point(|f| f.time < start);
        let hi = self.frames.partition_point(|f| f.time <= end);
        if lo >= hi {
            &[]
        } else {
            &self.frames[lo..hi]
        }
    }

    /// The indices of the first and last MS1 spectrum of the frames within
    /// `[start, end]`
    pub fn spectra_span_between(&self, start: f64, end: f64) -> Option<(usize, usize)> {
        let frames = self.frames_between(start, end);
        let first = frames.first()?;
        let last = frames.last()?;
        let last_member = self.ms1_positions[last.members.1 - 1];
        Some((first.scan_id, self.spectra[last_member].index))
    }

    pub fn frame_members(&self, frame: &Ms1Frame) -> impl Iterator<Item = &'a RawSpectrum> + '_ {
        let spectra = self.spectra;
        self.ms1_positions[frame.members.0..frame.members.1]
            .iter()
            .map(move |i| &spectra[*i])
    }

    /// All MSn spectra with a scan index within `[left_scan, right_scan]`, found
    /// by binary search over the scan order.
    pub fn msn_between(
        &self,
        left_scan: usize,
        right_scan: usize,
    ) -> impl Iterator<Item = &'a RawSpectrum> + '_ {
        let span = self.msn_span(left_scan, right_scan);
        let spectra = self.spectra;
        self.msn_positions[span].iter().map(move |i| &spectra[*i])
    }

    fn msn_span(&self, left_scan: usize, right_scan: usize) -> Range<usize> {
        let spectra = self.spectra;
        let lo = self
            .msn_positions
            .partition_point(|i| spectra[*i].index < left_scan);
        let hi = self
            .msn_positions
            .partition_point(|i| spectra[*i].index <= right_scan);
        lo..hi.max(lo)
    }

    /// The smallest and largest m/z observed across all MS1 spectra of the
    /// indexed polarity
    pub fn observed_mz_range(&self) -> Option<(f64, f64)> {
        self.ms1_positions
            .iter()
            .filter_map(|i| self.spectra[*i].mz_range())
            .fold(None, |acc, (lo, hi)| match acc {
                None => Some((lo, hi)),
                Some((a, b)) => Some((a.min(lo), b.max(hi))),
            })
    }
}
