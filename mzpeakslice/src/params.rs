//! Configuration for a feature finding run.
//!
//! All parameter blocks carry defaults suitable for high resolution LC-MS data,
//! and are validated once before any scanning begins.
use mzpeaks::Tolerance;

use crate::error::FeatureFinderError;
use crate::spectrum::Polarity;

/// How MS2 scans were acquired, which determines how a precursor is matched
/// to a feature mass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AcquisitionType {
    /// Data dependent acquisition, one selected precursor per scan
    #[default]
    DDA,
    /// Sequential isolation windows covering the mass range
    SWATH,
    /// All ion fragmentation, no isolation
    AIF,
}

/// The smoothing kernel applied to a chromatogram before peak detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SmoothingMethod {
    None,
    /// One moving average pass
    SimpleMovingAverage,
    /// Two moving average passes
    #[default]
    LinearWeightedMovingAverage,
    /// Three moving average passes
    Gaussian,
}

/// A mass to skip during untargeted scanning, such as a known contaminant
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExcludedMass {
    pub mz: f64,
    pub tolerance: f64,
}

impl ExcludedMass {
    pub fn new(mz: f64, tolerance: f64) -> Self {
        Self { mz, tolerance }
    }

    pub fn excludes(&self, mz: f64) -> bool {
        (self.mz - mz).abs() <= self.tolerance
    }
}

/// Thresholds controlling the spike-count noise test
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NoiseFilterParams {
    /// Multiplier on the peak width in points giving the tracking window
    pub tracking_window_factor: usize,
    /// Upper limit on the tracking window
    pub tracking_window_cap: usize,
    pub noise_factor: f64,
    /// Number of spike pairs that marks a peak as noise
    pub spike_threshold: usize,
}

impl Default for NoiseFilterParams {
    fn default() -> Self {
        Self {
            tracking_window_factor: 10,
            tracking_window_cap: 50,
            noise_factor: 3.0,
            spike_threshold: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RefinementParams {
    /// The fewest points to walk away from the apex before accepting a local minimum as an edge
    pub minimum_edge_points: usize,
    /// The distance in points to search around the old apex for a new local maximum
    pub apex_search_radius: usize,
}

impl Default for RefinementParams {
    fn default() -> Self {
        Self {
            minimum_edge_points: 2,
            apex_search_radius: 2,
        }
    }
}

/// Ion mobility handling. When present and the data carry drift times, every
/// retention time feature is resolved along the drift axis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriftParams {
    pub drift_range: (f64, f64),
    pub bin_width: f64,
    /// The largest half-width of the retention time window accumulated around a feature apex
    pub retention_time_half_width: f64,
    /// Sub-peaks whose apex-to-edge drop is below this fraction of the tallest
    /// sub-peak are discarded
    pub minimum_relative_drop: f64,
}

impl Default for DriftParams {
    fn default() -> Self {
        Self {
            drift_range: (0.0, f64::INFINITY),
            bin_width: 0.01,
            retention_time_half_width: 0.1,
            minimum_relative_drop: 0.1,
        }
    }
}

/// The thresholds handed to [`SignalPrimitives::detect_peaks`](crate::signal::SignalPrimitives::detect_peaks)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDetectionParams {
    pub minimum_data_points: usize,
    pub minimum_amplitude: f64,
}

impl Default for PeakDetectionParams {
    fn default() -> Self {
        Self {
            minimum_data_points: 5,
            minimum_amplitude: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FeatureFinderParams {
    pub polarity: Polarity,
    pub mz_range: (f64, f64),
    pub retention_time_range: (f64, f64),
    pub slice_width: f64,
    /// Scan in steps of 1 m/z regardless of `slice_width`
    pub nominal_accuracy: bool,
    pub smoothing_method: SmoothingMethod,
    pub smoothing_level: usize,
    pub minimum_data_points: usize,
    pub minimum_amplitude: f64,
    pub ms1_tolerance: Tolerance,
    pub ms2_tolerance: Tolerance,
    pub acquisition_type: AcquisitionType,
    pub ion_mobility: Option<DriftParams>,
    /// The number of worker threads. One or fewer runs sequentially
    pub threads: usize,
    /// Explicit masses to extract instead of scanning the whole mass range
    pub targets: Vec<f64>,
    /// Per-target extraction tolerances in Da, parallel to `targets`. When empty,
    /// `ms1_tolerance` is used for every target.
    pub target_tolerances: Vec<f64>,
    pub excluded_masses: Vec<ExcludedMass>,
    pub noise_filter: NoiseFilterParams,
    pub refinement: RefinementParams,
}

impl Default for FeatureFinderParams {
    fn default() -> Self {
        Self {
            polarity: Polarity::Positive,
            mz_range: (0.0, f64::INFINITY),
            retention_time_range: (0.0, f64::INFINITY),
            slice_width: 0.1,
            nominal_accuracy: false,
            smoothing_method: SmoothingMethod::LinearWeightedMovingAverage,
            smoothing_level: 3,
            minimum_data_points: 5,
            minimum_amplitude: 1000.0,
            ms1_tolerance: Tolerance::Da(0.01),
            ms2_tolerance: Tolerance::Da(0.025),
            acquisition_type: AcquisitionType::DDA,
            ion_mobility: None,
            threads: 1,
            targets: Vec::new(),
            target_tolerances: Vec::new(),
            excluded_masses: Vec::new(),
            noise_filter: NoiseFilterParams::default(),
            refinement: RefinementParams::default(),
        }
    }
}

fn tolerance_width(tolerance: &Tolerance) -> f64 {
    match tolerance {
        Tolerance::PPM(x) => *x,
        Tolerance::Da(x) => *x,
    }
}

fn check_range(name: &str, range: (f64, f64)) -> Result<(), FeatureFinderError> {
    if range.0.is_nan() || range.1.is_nan() || range.0 > range.1 {
        Err(FeatureFinderError::invalid(format!(
            "{name} must be an ordered interval, got {}-{}",
            range.0, range.1
        )))
    } else {
        Ok(())
    }
}

impl FeatureFinderParams {
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_mz_range(mut self, start: f64, end: f64) -> Self {
        self.mz_range = (start, end);
        self
    }

    pub fn with_retention_time_range(mut self, start: f64, end: f64) -> Self {
        self.retention_time_range = (start, end);
        self
    }

    pub fn with_slice_width(mut self, slice_width: f64) -> Self {
        self.slice_width = slice_width;
        self
    }

    pub fn with_smoothing(mut self, method: SmoothingMethod, level: usize) -> Self {
        self.smoothing_method = method;
        self.smoothing_level = level;
        self
    }

    pub fn with_peak_thresholds(mut self, minimum_data_points: usize, minimum_amplitude: f64) -> Self {
        self.minimum_data_points = minimum_data_points;
        self.minimum_amplitude = minimum_amplitude;
        self
    }

    pub fn with_tolerances(mut self, ms1_tolerance: Tolerance, ms2_tolerance: Tolerance) -> Self {
        self.ms1_tolerance = ms1_tolerance;
        self.ms2_tolerance = ms2_tolerance;
        self
    }

    pub fn with_acquisition_type(mut self, acquisition_type: AcquisitionType) -> Self {
        self.acquisition_type = acquisition_type;
        self
    }

    pub fn with_ion_mobility(mut self, drift: DriftParams) -> Self {
        self.ion_mobility = Some(drift);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_targets(mut self, targets: Vec<f64>, tolerances: Vec<f64>) -> Self {
        self.targets = targets;
        self.target_tolerances = tolerances;
        self
    }

    pub fn with_excluded_masses(mut self, excluded_masses: Vec<ExcludedMass>) -> Self {
        self.excluded_masses = excluded_masses;
        self
    }

    /// The distance between consecutive mass slices
    pub fn slice_step(&self) -> f64 {
        if self.nominal_accuracy {
            1.0
        } else {
            self.slice_width
        }
    }

    pub fn is_targeted(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn detection_params(&self) -> PeakDetectionParams {
        PeakDetectionParams {
            minimum_data_points: self.minimum_data_points,
            minimum_amplitude: self.minimum_amplitude,
        }
    }

    pub fn is_excluded(&self, mz: f64) -> bool {
        self.excluded_masses.iter().any(|e| e.excludes(mz))
    }

    /// The extraction tolerance for the `i`th target
    pub fn target_tolerance(&self, i: usize) -> Tolerance {
        self.target_tolerances
            .get(i)
            .map(|t| Tolerance::Da(*t))
            .unwrap_or(self.ms1_tolerance)
    }

    /// Check that this configuration can drive a run.
    ///
    /// # Errors
    /// [`FeatureFinderError::InvalidConfiguration`] for unusable values, and
    /// [`FeatureFinderError::InconsistentInput`] when the per-target tolerances
    /// do not line up with the targets.
    pub fn validate(&self) -> Result<(), FeatureFinderError> {
        if !(self.slice_step() > 0.0) || !self.slice_step().is_finite() {
            return Err(FeatureFinderError::invalid(format!(
                "slice width must be positive and finite, got {}",
                self.slice_step()
            )));
        }
        for (name, tol) in [
            ("MS1 tolerance", &self.ms1_tolerance),
            ("MS2 tolerance", &self.ms2_tolerance),
        ] {
            let width = tolerance_width(tol);
            if !(width > 0.0) || !width.is_finite() {
                return Err(FeatureFinderError::invalid(format!(
                    "{name} must be positive, got {width}"
                )));
            }
        }
        check_range("m/z range", self.mz_range)?;
        check_range("retention time range", self.retention_time_range)?;
        if self.minimum_data_points == 0 {
            return Err(FeatureFinderError::invalid(
                "minimum data points must be at least 1",
            ));
        }
        if self.minimum_amplitude.is_nan() {
            return Err(FeatureFinderError::invalid("minimum amplitude is NaN"));
        }
        if let Some(drift) = self.ion_mobility.as_ref() {
            if !(drift.bin_width > 0.0) || !drift.bin_width.is_finite() {
                return Err(FeatureFinderError::invalid(format!(
                    "drift bin width must be positive, got {}",
                    drift.bin_width
                )));
            }
            check_range("drift range", drift.drift_range)?;
            if !(drift.retention_time_half_width > 0.0) {
                return Err(FeatureFinderError::invalid(
                    "drift retention time half width must be positive",
                ));
            }
        }
        if !self.target_tolerances.is_empty() && self.target_tolerances.len() != self.targets.len()
        {
            return Err(FeatureFinderError::InconsistentInput {
                context: "per-target tolerances",
                expected: self.targets.len(),
                found: self.target_tolerances.len(),
            });
        }
        if let Some(t) = self.target_tolerances.iter().find(|t| !(**t > 0.0)) {
            return Err(FeatureFinderError::invalid(format!(
                "target tolerance must be positive, got {t}"
            )));
        }
        Ok(())
    }
}
