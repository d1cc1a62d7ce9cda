//! Extract chromatographic peak features from LC-MS and LC-IM-MS spectra by
//! scanning the mass range in narrow slices.
//!
//! Each slice's extracted ion chromatogram is smoothed and searched for local
//! maxima, the resulting peaks are screened for noise and de-duplicated against
//! the previous slice, then re-delimited on a tighter extraction, optionally
//! resolved along the drift time axis, and finally numbered and ranked.
pub mod chromatogram;
pub mod drift;
pub mod error;
pub mod feature;
pub mod finalize;
pub mod ms2;
pub mod noise;
pub mod params;
pub mod redundancy;
pub mod refine;
pub mod scanner;
pub mod signal;
pub mod spectrum;

pub use chromatogram::{
    extract_chromatogram, Chromatogram, ChromatogramAxis, ChromatogramPoint, ChromatogramRequest,
    ChromatogramTrace,
};
pub use error::FeatureFinderError;
pub use feature::{
    AccumulatedSpectra, ChromatogramIndices, FeatureIntensities, FeatureTimes, Ms2Links,
    PeakFeature, PeakShape, ScanReferences,
};
pub use params::{
    AcquisitionType, DriftParams, ExcludedMass, FeatureFinderParams, NoiseFilterParams,
    PeakDetectionParams, RefinementParams, SmoothingMethod,
};
pub use scanner::{
    CancellationToken, FeatureFinder, FeatureSet, ProgressReporter, ScanControl, ScanProgress,
    ScanStatus,
};
pub use signal::{LocalMaximumPeakDetector, PeakDetectionResult, SignalPrimitives};
pub use spectrum::{Polarity, PrecursorWindow, RawSpectrum, SpectrumIndex, SpectrumProvider};

pub use mzpeaks::Tolerance;
