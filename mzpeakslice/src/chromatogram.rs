//! Extracted ion chromatograms along the retention time or drift time axis
use std::collections::BTreeMap;

use mzpeaks::feature::{Feature, IMSFeature, LCMSFeature};
use mzpeaks::{prelude::*, Tolerance};
use tracing::trace;

use crate::spectrum::{RawSpectrum, SpectrumIndex};

/// The separation dimension a chromatogram or feature is laid out along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChromatogramAxis {
    #[default]
    RetentionTime,
    DriftTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChromatogramPoint {
    /// The spectrum this point was read from. For a retention time point this
    /// is the first spectrum of its frame.
    pub scan_id: usize,
    pub time: f64,
    /// The m/z of the most intense matching peak, or the requested m/z when
    /// nothing matched
    pub mz: f64,
    pub intensity: f64,
}

impl ChromatogramPoint {
    pub fn new(scan_id: usize, time: f64, mz: f64, intensity: f64) -> Self {
        Self {
            scan_id,
            time,
            mz,
            intensity,
        }
    }
}

/// The (m/z, time, intensity) series of a chromatogram, typed by its axis
#[derive(Debug, Clone, PartialEq)]
pub enum ChromatogramTrace {
    RetentionTime(LCMSFeature),
    DriftTime(IMSFeature),
}

macro_rules! with_trace {
    ($trace:expr, $f:ident => $body:expr) => {
        match $trace {
            ChromatogramTrace::RetentionTime($f) => $body,
            ChromatogramTrace::DriftTime($f) => $body,
        }
    };
}

impl ChromatogramTrace {
    fn from_columns(axis: ChromatogramAxis, mzs: Vec<f64>, times: Vec<f64>, intensities: Vec<f32>) -> Self {
        match axis {
            ChromatogramAxis::RetentionTime => Self::RetentionTime(Feature::new(mzs, times, intensities)),
            ChromatogramAxis::DriftTime => Self::DriftTime(Feature::new(mzs, times, intensities)),
        }
    }

    pub fn axis(&self) -> ChromatogramAxis {
        match self {
            Self::RetentionTime(_) => ChromatogramAxis::RetentionTime,
            Self::DriftTime(_) => ChromatogramAxis::DriftTime,
        }
    }

    pub fn len(&self) -> usize {
        with_trace!(self, f => f.len())
    }

    pub fn is_empty(&self) -> bool {
        with_trace!(self, f => f.is_empty())
    }

    /// The m/z, time and intensity columns
    pub fn columns(&self) -> (&[f64], &[f64], &[f32]) {
        with_trace!(self, f => f.as_view().into_inner())
    }

    pub fn at(&self, index: usize) -> Option<(f64, f64, f32)> {
        let (mzs, times, intensities) = self.columns();
        Some((*mzs.get(index)?, *times.get(index)?, *intensities.get(index)?))
    }

    pub fn time_view(&self) -> &[f64] {
        with_trace!(self, f => f.time_view())
    }

    pub fn intensity_view(&self) -> &[f32] {
        with_trace!(self, f => f.intensity_view())
    }
}

/// An extracted ion chromatogram. The trace is an `mzpeaks` feature, and
/// `scan_ids` runs parallel to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromatogram {
    trace: ChromatogramTrace,
    scan_ids: Vec<usize>,
}

impl Default for Chromatogram {
    fn default() -> Self {
        Self::empty(ChromatogramAxis::RetentionTime)
    }
}

impl Chromatogram {
    pub fn new(axis: ChromatogramAxis, points: Vec<ChromatogramPoint>) -> Self {
        let n = points.len();
        let mut mzs = Vec::with_capacity(n);
        let mut times = Vec::with_capacity(n);
        let mut intensities = Vec::with_capacity(n);
        let mut scan_ids = Vec::with_capacity(n);
        for p in points {
            mzs.push(p.mz);
            times.push(p.time);
            intensities.push(p.intensity as f32);
            scan_ids.push(p.scan_id);
        }
        Self {
            trace: ChromatogramTrace::from_columns(axis, mzs, times, intensities),
            scan_ids,
        }
    }

    pub fn empty(axis: ChromatogramAxis) -> Self {
        Self::new(axis, Vec::new())
    }

    pub fn axis(&self) -> ChromatogramAxis {
        self.trace.axis()
    }

    pub fn trace(&self) -> &ChromatogramTrace {
        &self.trace
    }

    pub fn scan_ids(&self) -> &[usize] {
        &self.scan_ids
    }

    pub fn len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ChromatogramPoint> {
        let (mz, time, intensity) = self.trace.at(index)?;
        let scan_id = *self.scan_ids.get(index)?;
        Some(ChromatogramPoint::new(scan_id, time, mz, intensity as f64))
    }

    pub fn iter(&self) -> impl Iterator<Item = ChromatogramPoint> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    pub fn times(&self) -> &[f64] {
        self.trace.time_view()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.trace.intensity_view().iter().map(|y| *y as f64).collect()
    }

    /// The index of the point closest to `time`, the earlier one on a tie
    pub fn nearest_index(&self, time: f64) -> Option<usize> {
        let times = self.times();
        if times.is_empty() {
            return None;
        }
        let i = times.partition_point(|t| *t < time);
        if i == 0 {
            return Some(0);
        }
        if i == times.len() {
            return Some(i - 1);
        }
        let before = (time - times[i - 1]).abs();
        let after = (times[i] - time).abs();
        if after < before {
            Some(i)
        } else {
            Some(i - 1)
        }
    }
}

/// Describes one chromatogram to extract
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromatogramRequest {
    pub mz: f64,
    pub tolerance: Tolerance,
    pub axis: ChromatogramAxis,
    /// The retention time window spectra must fall within
    pub time_range: (f64, f64),
    /// The drift time window points must fall within, used only on the drift axis
    pub drift_range: (f64, f64),
    pub drift_bin_width: f64,
}

impl ChromatogramRequest {
    pub fn retention_time(mz: f64, tolerance: Tolerance, time_range: (f64, f64)) -> Self {
        Self {
            mz,
            tolerance,
            axis: ChromatogramAxis::RetentionTime,
            time_range,
            drift_range: (0.0, f64::INFINITY),
            drift_bin_width: 0.0,
        }
    }

    pub fn drift_time(
        mz: f64,
        tolerance: Tolerance,
        time_range: (f64, f64),
        drift_range: (f64, f64),
        drift_bin_width: f64,
    ) -> Self {
        Self {
            mz,
            tolerance,
            axis: ChromatogramAxis::DriftTime,
            time_range,
            drift_range,
            drift_bin_width,
        }
    }
}

/// Sum the matching peak intensity of a spectrum and find its base peak
#[inline]
fn window_signal(spectrum: &RawSpectrum, mz: f64, tolerance: Tolerance) -> (f64, Option<(f64, f32)>) {
    let mut total = 0.0;
    let mut base: Option<(f64, f32)> = None;
    for peak in spectrum.peaks.all_peaks_for(mz, tolerance) {
        total += peak.intensity as f64;
        match base {
            Some((_, inten)) if inten >= peak.intensity => {}
            _ => base = Some((peak.mz, peak.intensity)),
        }
    }
    (total, base)
}

/// Extract the chromatogram described by `request` from the indexed spectra.
///
/// An empty chromatogram is returned when no spectrum qualifies or when every
/// point is zero.
pub fn extract_chromatogram(index: &SpectrumIndex<'_>, request: &ChromatogramRequest) -> Chromatogram {
    let chrom = match request.axis {
        ChromatogramAxis::RetentionTime => extract_retention_time(index, request),
        ChromatogramAxis::DriftTime => extract_drift_time(index, request),
    };
    if chrom.iter().all(|p| p.intensity <= 0.0) {
        trace!("No signal for {:0.4} on {:?}", request.mz, request.axis);
        Chromatogram::empty(request.axis)
    } else {
        chrom
    }
}

fn extract_retention_time(index: &SpectrumIndex<'_>, request: &ChromatogramRequest) -> Chromatogram {
    let (start, end) = request.time_range;
    let frames = index.frames_between(start, end);
    let mut points = Vec::with_capacity(frames.len());
    for frame in frames {
        let mut intensity = 0.0;
        let mut base: Option<(f64, f32)> = None;
        for spec in index.frame_members(frame) {
            let (total, spec_base) = window_signal(spec, request.mz, request.tolerance);
            intensity += total;
            if let Some((mz, inten)) = spec_base {
                match base {
                    Some((_, best)) if best >= inten => {}
                    _ => base = Some((mz, inten)),
                }
            }
        }
        let mz = base.map(|(mz, _)| mz).unwrap_or(request.mz);
        points.push(ChromatogramPoint::new(frame.scan_id, frame.time, mz, intensity));
    }
    Chromatogram::new(ChromatogramAxis::RetentionTime, points)
}

#[derive(Debug, Default, Clone, Copy)]
struct DriftBin {
    intensity: f64,
    base: Option<(f64, f32)>,
    top_scan: Option<(usize, f64)>,
}

fn extract_drift_time(index: &SpectrumIndex<'_>, request: &ChromatogramRequest) -> Chromatogram {
    let (start, end) = request.time_range;
    let (drift_start, drift_end) = request.drift_range;
    let width = request.drift_bin_width;
    if !(width > 0.0) {
        return Chromatogram::empty(ChromatogramAxis::DriftTime);
    }

    let mut bins: BTreeMap<i64, DriftBin> = BTreeMap::new();
    for frame in index.frames_between(start, end) {
        for spec in index.frame_members(frame) {
            let Some(drift) = spec.drift_time else {
                continue;
            };
            if drift < drift_start || drift > drift_end {
                continue;
            }
            let key = (drift / width).round() as i64;
            let (total, spec_base) = window_signal(spec, request.mz, request.tolerance);
            let bin = bins.entry(key).or_default();
            bin.intensity += total;
            if let Some((mz, inten)) = spec_base {
                match bin.base {
                    Some((_, best)) if best >= inten => {}
                    _ => bin.base = Some((mz, inten)),
                }
            }
            match bin.top_scan {
                Some((_, best)) if best >= total => {}
                _ => bin.top_scan = Some((spec.index, total)),
            }
        }
    }

    let (Some(first), Some(last)) = (
        bins.first_key_value().map(|(k, _)| *k),
        bins.last_key_value().map(|(k, _)| *k),
    ) else {
        return Chromatogram::empty(ChromatogramAxis::DriftTime);
    };

    let mut points = Vec::with_capacity((last - first + 1) as usize);
    let mut last_scan = 0;
    for key in first..=last {
        let time = key as f64 * width;
        match bins.get(&key) {
            Some(bin) => {
                let scan_id = bin.top_scan.map(|(i, _)| i).unwrap_or(last_scan);
                last_scan = scan_id;
                let mz = bin.base.map(|(mz, _)| mz).unwrap_or(request.mz);
                points.push(ChromatogramPoint::new(scan_id, time, mz, bin.intensity));
            }
            None => {
                points.push(ChromatogramPoint::new(last_scan, time, request.mz, 0.0));
            }
        }
    }
    Chromatogram::new(ChromatogramAxis::DriftTime, points)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::{Polarity, RawSpectrum};

    fn spectra() -> Vec<RawSpectrum> {
        let mut out = Vec::new();
        for i in 0..5 {
            let t = i as f64 * 0.1;
            out.push(
                RawSpectrum::from_arrays(
                    i,
                    1,
                    t,
                    &[200.0, 300.0, 300.004, 400.0],
                    &[50.0, 10.0 * i as f32, 20.0, 5.0],
                )
                .unwrap(),
            );
        }
        out
    }

    #[test]
    fn test_retention_time_extraction() {
        let spectra = spectra();
        let index = SpectrumIndex::new(&spectra, Polarity::Positive);
        let req = ChromatogramRequest::retention_time(300.0, Tolerance::Da(0.01), (0.0, 10.0));
        let chrom = extract_chromatogram(&index, &req);
        assert_eq!(chrom.len(), 5);
        assert_eq!(chrom.get(0).unwrap().intensity, 20.0);
        assert_eq!(chrom.get(0).unwrap().mz, 300.004);
        assert_eq!(chrom.get(4).unwrap().intensity, 60.0);
        assert_eq!(chrom.get(4).unwrap().mz, 300.0);
        assert_eq!(chrom.nearest_index(0.26), Some(3));
        assert_eq!(chrom.nearest_index(0.25), Some(2));

        let req = ChromatogramRequest::retention_time(300.0, Tolerance::Da(0.01), (0.15, 0.35));
        let chrom = extract_chromatogram(&index, &req);
        assert_eq!(chrom.len(), 2);
        assert_eq!(chrom.get(0).unwrap().scan_id, 2);
    }

    #[test]
    fn test_empty_extraction() {
        let spectra = spectra();
        let index = SpectrumIndex::new(&spectra, Polarity::Positive);
        let req = ChromatogramRequest::retention_time(250.0, Tolerance::Da(0.01), (0.0, 10.0));
        assert!(extract_chromatogram(&index, &req).is_empty());

        let index = SpectrumIndex::new(&spectra, Polarity::Negative);
        let req = ChromatogramRequest::retention_time(300.0, Tolerance::Da(0.01), (0.0, 10.0));
        assert!(extract_chromatogram(&index, &req).is_empty());
    }

    #[test]
    fn test_drift_extraction() {
        let mut spectra = Vec::new();
        let drifts = [0.80, 0.81, 0.84];
        for (i, d) in drifts.iter().enumerate() {
            spectra.push(
                RawSpectrum::from_arrays(i, 1, 1.0, &[500.0], &[100.0 * (i + 1) as f32])
                    .unwrap()
                    .with_drift_time(*d),
            );
        }
        let index = SpectrumIndex::new(&spectra, Polarity::Positive);
        let req = ChromatogramRequest::drift_time(
            500.0,
            Tolerance::PPM(10.0),
            (0.9, 1.1),
            (0.0, f64::INFINITY),
            0.01,
        );
        let chrom = extract_chromatogram(&index, &req);
        assert_eq!(chrom.axis(), ChromatogramAxis::DriftTime);
        assert_eq!(chrom.len(), 5);
        let intensities = chrom.intensities();
        assert_eq!(intensities, vec![100.0, 200.0, 0.0, 0.0, 300.0]);
        assert_eq!(chrom.get(4).unwrap().scan_id, 2);
        assert_eq!(chrom.get(2).unwrap().mz, 500.0);
    }
}
