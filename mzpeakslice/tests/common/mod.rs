#![allow(dead_code)]
use mzpeakslice::{PrecursorWindow, RawSpectrum};

/// A Gaussian elution profile truncated at four standard deviations
#[derive(Debug, Clone, Copy)]
pub struct Analyte {
    pub mz: f64,
    pub apex_scan: usize,
    pub sigma: f64,
    pub height: f64,
}

impl Analyte {
    pub fn new(mz: f64, apex_scan: usize, sigma: f64, height: f64) -> Self {
        Self {
            mz,
            apex_scan,
            sigma,
            height,
        }
    }

    pub fn intensity_at(&self, scan: usize) -> f64 {
        let d = scan as f64 - self.apex_scan as f64;
        if d.abs() > 4.0 * self.sigma {
            0.0
        } else {
            self.height * (-0.5 * (d / self.sigma).powi(2)).exp()
        }
    }
}

pub const SCAN_INTERVAL: f64 = 0.01;

/// An MS1-only LC run with one spectrum every [`SCAN_INTERVAL`] minutes. The
/// `background` masses are present in every scan at a constant intensity.
pub fn lc_run(n_scans: usize, analytes: &[Analyte], background: &[f64]) -> Vec<RawSpectrum> {
    (0..n_scans)
        .map(|i| {
            let mut points: Vec<(f64, f32)> = background.iter().map(|mz| (*mz, 50.0)).collect();
            for analyte in analytes {
                let y = analyte.intensity_at(i);
                if y > 0.0 {
                    points.push((analyte.mz, y as f32));
                }
            }
            let (mzs, intensities): (Vec<f64>, Vec<f32>) = points.into_iter().unzip();
            RawSpectrum::from_arrays(i, 1, i as f64 * SCAN_INTERVAL, &mzs, &intensities).unwrap()
        })
        .collect()
}

/// Insert an MS2 scan after each MS1 scan for which `ms2_for` returns a
/// precursor and collision energy, renumbering every spectrum
pub fn interleave_ms2<F: Fn(usize) -> Option<(PrecursorWindow, f64)>>(
    ms1: Vec<RawSpectrum>,
    ms2_for: F,
) -> Vec<RawSpectrum> {
    let mut out = Vec::with_capacity(ms1.len());
    for (position, mut spec) in ms1.into_iter().enumerate() {
        spec.index = out.len();
        let time = spec.retention_time;
        out.push(spec);
        if let Some((prec, ce)) = ms2_for(position) {
            let ms2 = RawSpectrum::from_arrays(out.len(), 2, time + SCAN_INTERVAL / 2.0, &[150.0, 250.0], &[300.0, 200.0])
                .unwrap()
                .with_precursor(prec, ce);
            out.push(ms2);
        }
    }
    out
}

/// Fifty well separated analytes spread over 300-398 m/z
pub fn many_analytes() -> Vec<Analyte> {
    (0..50)
        .map(|k| {
            Analyte::new(
                300.0 + k as f64 * 2.0,
                20 + (k * 7) % 60,
                3.0,
                1e4 + k as f64 * 1000.0,
            )
        })
        .collect()
}

fn gauss(x: f64, mu: f64, sigma: f64) -> f64 {
    (-0.5 * ((x - mu) / sigma).powi(2)).exp()
}

/// An LC-IM run of one analyte at `mz` eluting at frame 15 with two drift
/// time conformers at 0.70 and 0.85, the second half as abundant
pub fn ion_mobility_run(mz: f64) -> Vec<RawSpectrum> {
    let mut spectra = Vec::new();
    let elution = Analyte::new(mz, 15, 2.5, 1e4);
    for frame in 0..30 {
        let time = frame as f64 * 0.02;
        let w = elution.intensity_at(frame);
        for j in 0..41 {
            let drift = 0.6 + j as f64 * 0.01;
            let y = w * (gauss(drift, 0.7, 0.02) + 0.5 * gauss(drift, 0.85, 0.02));
            let (mzs, intensities): (Vec<f64>, Vec<f32>) = if y > 0.0 {
                (vec![mz], vec![y as f32])
            } else {
                (Vec::new(), Vec::new())
            };
            spectra.push(
                RawSpectrum::from_arrays(spectra.len(), 1, time, &mzs, &intensities)
                    .unwrap()
                    .with_drift_time(drift),
            );
        }
    }
    spectra
}
