use std::collections::BTreeMap;

use mzdata::prelude::*;
use mzdata::spectrum::{MultiLayerSpectrum, ScanPolarity, SignalContinuity};
use mzpeaks::{CentroidPeak, DeconvolutedPeak, PeakSet};
use rayon::prelude::*;
use tracing::trace;

use mzpeakslice::{PeakFeature, Polarity, PrecursorWindow, RawSpectrum};

use crate::driver::MZPeakSlicerError;
use crate::progress::ReadRecord;

pub(crate) type CPeak = CentroidPeak;
pub(crate) type DPeak = DeconvolutedPeak;
pub(crate) type SpectrumType = MultiLayerSpectrum<CPeak, DPeak>;

pub(crate) fn polarity_of(polarity: ScanPolarity) -> Polarity {
    match polarity {
        ScanPolarity::Negative => Polarity::Negative,
        ScanPolarity::Unknown | ScanPolarity::Positive => Polarity::Positive,
    }
}

/// The isolation descriptor and collision energy of an MSn spectrum, keyed on
/// the selected ion's m/z
pub(crate) fn precursor_of(spectrum: &SpectrumType) -> Option<(PrecursorWindow, f64)> {
    let prec = spectrum.precursor()?;
    let ion = prec.ion();
    let window = &prec.isolation_window;
    let precursor = PrecursorWindow::new(
        ion.mz,
        window.lower_bound as f64,
        window.upper_bound as f64,
    );
    Some((precursor, prec.activation.energy as f64))
}

fn centroids_of(
    spectrum: &mut SpectrumType,
    record: &mut ReadRecord,
) -> Result<PeakSet, MZPeakSlicerError> {
    if let Some(peaks) = spectrum.peaks.take() {
        return Ok(peaks);
    }
    if spectrum.arrays.is_none() {
        return Ok(PeakSet::new(Vec::new()));
    }
    let index = spectrum.index();
    match spectrum.signal_continuity() {
        SignalContinuity::Centroid => {
            spectrum
                .try_build_centroids()
                .map_err(|e| MZPeakSlicerError::PeakPickingError(index, e.to_string()))?;
        }
        _ => {
            trace!("Picking peaks for {index}");
            spectrum
                .pick_peaks(1.0)
                .map_err(|e| MZPeakSlicerError::PeakPickingError(index, e.to_string()))?;
            record.centroided_spectra += 1;
        }
    }
    Ok(spectrum
        .peaks
        .take()
        .unwrap_or_else(|| PeakSet::new(Vec::new())))
}

/// Convert one spectrum into the finder's model, placing it at `position` in
/// acquisition order
pub(crate) fn convert_spectrum(
    position: usize,
    mut spectrum: SpectrumType,
) -> Result<(RawSpectrum, ReadRecord), MZPeakSlicerError> {
    let mut record = ReadRecord::default();
    let peaks = centroids_of(&mut spectrum, &mut record)?;
    let ms_level = spectrum.ms_level();
    if ms_level > 1 {
        record.msn_spectra += 1;
        record.msn_peaks += peaks.len();
    } else {
        record.ms1_spectra += 1;
        record.ms1_peaks += peaks.len();
    }

    let mut converted = RawSpectrum::new(position, ms_level, spectrum.start_time(), peaks)
        .with_polarity(polarity_of(spectrum.polarity()));
    if let Some(drift_time) = spectrum.ion_mobility() {
        record.ion_mobility_spectra += 1;
        converted = converted.with_drift_time(drift_time);
    }
    if let Some((precursor, collision_energy)) = precursor_of(&spectrum) {
        converted = converted.with_precursor(precursor, collision_energy);
    }
    Ok((converted, record))
}

/// The converted spectra renumbered by position, alongside the source index of
/// each one
pub struct ConvertedRun {
    pub spectra: Vec<RawSpectrum>,
    pub source_indices: Vec<usize>,
    pub record: ReadRecord,
}

pub(crate) fn convert_spectra(
    spectra: Vec<SpectrumType>,
) -> Result<ConvertedRun, MZPeakSlicerError> {
    let source_indices: Vec<usize> = spectra.iter().map(|s| s.index()).collect();
    let converted: Vec<(RawSpectrum, ReadRecord)> = spectra
        .into_par_iter()
        .enumerate()
        .map(|(position, spectrum)| convert_spectrum(position, spectrum))
        .collect::<Result<_, _>>()?;

    let mut record = ReadRecord::default();
    let spectra = converted
        .into_iter()
        .map(|(spectrum, part)| {
            record += part;
            spectrum
        })
        .collect();
    Ok(ConvertedRun {
        spectra,
        source_indices,
        record,
    })
}

fn source_index(source_indices: &[usize], position: usize) -> usize {
    source_indices.get(position).copied().unwrap_or(position)
}

/// Rewrite every scan reference in `features` from positions in the converted
/// run back to the indices of the source file
pub fn restore_source_indices(features: &mut [PeakFeature], source_indices: &[usize]) {
    for feature in features.iter_mut() {
        let scans = &mut feature.ms1_scans;
        scans.left = source_index(source_indices, scans.left);
        scans.top = source_index(source_indices, scans.top);
        scans.right = source_index(source_indices, scans.right);

        feature.ms2.primary = feature
            .ms2
            .primary
            .map(|i| source_index(source_indices, i));
        feature.ms2.scans = feature
            .ms2
            .scans
            .iter()
            .map(|(i, ce)| (source_index(source_indices, *i), *ce))
            .collect::<BTreeMap<_, _>>();

        if let Some(accumulated) = feature.accumulated_ms1.as_mut() {
            accumulated.first_scan = source_index(source_indices, accumulated.first_scan);
            accumulated.last_scan = source_index(source_indices, accumulated.last_scan);
        }

        restore_source_indices(&mut feature.drift_features, source_indices);
    }
}

#[cfg(test)]
mod test {
    use mzpeakslice::AccumulatedSpectra;

    use super::*;

    #[test]
    fn test_restore_source_indices() {
        let mut child = PeakFeature::default();
        child.ms1_scans.top = 1;
        child.ms2.primary = Some(2);
        child.ms2.scans.insert(2, 25.0);
        child.accumulated_ms1 = Some(AccumulatedSpectra {
            first_scan: 0,
            last_scan: 3,
            retention_time_window: (0.1, 0.3),
        });

        let mut parent = PeakFeature::default();
        parent.ms1_scans.left = 0;
        parent.ms1_scans.top = 1;
        parent.ms1_scans.right = 3;
        parent.ms2.primary = Some(2);
        parent.ms2.scans.insert(2, 25.0);
        parent.drift_features.push(child);

        let mut features = vec![parent];
        restore_source_indices(&mut features, &[10, 11, 12, 13]);
        let parent = &features[0];
        assert_eq!(
            (parent.ms1_scans.left, parent.ms1_scans.top, parent.ms1_scans.right),
            (10, 11, 13)
        );
        assert_eq!(parent.ms2.primary, Some(12));
        assert_eq!(parent.ms2.scans.get(&12), Some(&25.0));
        let child = &parent.drift_features[0];
        assert_eq!(child.ms1_scans.top, 11);
        assert_eq!(child.ms2.primary, Some(12));
        let accumulated = child.accumulated_ms1.unwrap();
        assert_eq!((accumulated.first_scan, accumulated.last_scan), (10, 13));
        assert_eq!(accumulated.retention_time_window, (0.1, 0.3));
        assert_eq!(parent.accumulated_ms1, None);
    }

    #[test]
    fn test_polarity() {
        assert_eq!(polarity_of(ScanPolarity::Negative), Polarity::Negative);
        assert_eq!(polarity_of(ScanPolarity::Unknown), Polarity::Positive);
    }
}
