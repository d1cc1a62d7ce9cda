//! Drive feature finding over mass slices or an explicit target list
use std::fmt::Debug;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use mzpeaks::Tolerance;
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::chromatogram::{extract_chromatogram, ChromatogramRequest};
use crate::drift::DriftExtender;
use crate::error::FeatureFinderError;
use crate::feature::{build_feature, PeakFeature};
use crate::finalize::{feature_order, finalize_features};
use crate::ms2::Ms2Linker;
use crate::noise::NoiseFilter;
use crate::params::{FeatureFinderParams, PeakDetectionParams};
use crate::redundancy::RedundancyResolver;
use crate::refine::Refiner;
use crate::signal::{LocalMaximumPeakDetector, SignalPrimitives};
use crate::spectrum::{SpectrumIndex, SpectrumProvider};

/// A cloneable flag that asks a running scan to stop at the next unit boundary
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
}

pub type ProgressReporter = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// Cancellation and progress reporting hooks for a scan
#[derive(Clone)]
pub struct ScanControl {
    cancellation: CancellationToken,
    reporter: Option<ProgressReporter>,
    progress_interval: usize,
}

impl Default for ScanControl {
    fn default() -> Self {
        Self {
            cancellation: CancellationToken::default(),
            reporter: None,
            progress_interval: 100,
        }
    }
}

impl Debug for ScanControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanControl")
            .field("cancellation", &self.cancellation)
            .field("reporter", &self.reporter.is_some())
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress<F: Fn(ScanProgress) + Send + Sync + 'static>(mut self, reporter: F) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Report progress every `interval` units. The last unit is always reported.
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Counts finished units and fires the progress reporter
struct ProgressCounter<'a> {
    done: AtomicUsize,
    total: usize,
    control: &'a ScanControl,
}

impl<'a> ProgressCounter<'a> {
    fn new(total: usize, control: &'a ScanControl) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
            control,
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(reporter) = self.control.reporter.as_ref() {
            if done % self.control.progress_interval == 0 || done == self.total {
                reporter(ScanProgress {
                    processed: done,
                    total: self.total,
                })
            }
        }
    }
}

/// Running totals of what the scan saw, for logging
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ScanTally {
    pub units: usize,
    pub chromatograms: usize,
    pub peaks_detected: usize,
    pub noise_rejected: usize,
    pub features_kept: usize,
}

impl Add for ScanTally {
    type Output = ScanTally;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for ScanTally {
    fn add_assign(&mut self, rhs: Self) {
        self.units += rhs.units;
        self.chromatograms += rhs.chromatograms;
        self.peaks_detected += rhs.peaks_detected;
        self.noise_rejected += rhs.noise_rejected;
        self.features_kept += rhs.features_kept;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    /// The scan stopped early, `processed` of `total` units contributed
    Cancelled { processed: usize, total: usize },
}

/// The outcome of a feature finding run
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub features: Vec<PeakFeature>,
    pub status: ScanStatus,
}

impl FeatureSet {
    fn completed(features: Vec<PeakFeature>) -> Self {
        Self {
            features,
            status: ScanStatus::Completed,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, ScanStatus::Cancelled { .. })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PeakFeature> {
        self.features.iter()
    }

    pub fn into_inner(self) -> Vec<PeakFeature> {
        self.features
    }
}

impl IntoIterator for FeatureSet {
    type Item = PeakFeature;
    type IntoIter = std::vec::IntoIter<PeakFeature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

/// One mass slice or one target
#[derive(Debug, Clone, Copy)]
struct ScanUnit {
    position: usize,
    mass: f64,
    tolerance: Tolerance,
    excluded: bool,
}

enum UnitOutcome {
    Cancelled,
    Completed(Vec<PeakFeature>, ScanTally),
}

/// The read-only state every unit shares
struct ScanContext<'a> {
    index: &'a SpectrumIndex<'a>,
    linker: Ms2Linker<'a>,
    noise: NoiseFilter,
    detection: PeakDetectionParams,
    retention_time_range: (f64, f64),
}

/// The accepted slices so far, folded in unit order
struct SliceHistory {
    resolver: Option<RedundancyResolver>,
    slices: Vec<Vec<PeakFeature>>,
    processed: usize,
    cancelled: bool,
    tally: ScanTally,
}

impl SliceHistory {
    fn new(resolver: Option<RedundancyResolver>) -> Self {
        Self {
            resolver,
            slices: Vec::new(),
            processed: 0,
            cancelled: false,
            tally: ScanTally::default(),
        }
    }

    /// Fold the next unit's outcome. Returns `false` once a unit reports
    /// cancellation, after which nothing more is accepted.
    fn accept(&mut self, outcome: UnitOutcome) -> bool {
        if self.cancelled {
            return false;
        }
        match outcome {
            UnitOutcome::Cancelled => {
                self.cancelled = true;
                false
            }
            UnitOutcome::Completed(features, tally) => {
                self.processed += 1;
                self.tally += tally;
                if features.is_empty() {
                    return true;
                }
                let survivors = match (self.resolver.as_ref(), self.slices.last_mut()) {
                    (Some(resolver), Some(previous)) => resolver.resolve(previous, features),
                    _ => features,
                };
                if !survivors.is_empty() {
                    self.slices.push(survivors);
                }
                true
            }
        }
    }

    fn into_features(self) -> Vec<PeakFeature> {
        self.slices.into_iter().flatten().collect()
    }
}

/// Extracts peak features from one sample's spectra.
///
/// ```no_run
/// # use mzpeakslice::{FeatureFinder, FeatureFinderParams, RawSpectrum};
/// # fn main() -> Result<(), mzpeakslice::FeatureFinderError> {
/// let spectra: Vec<RawSpectrum> = Vec::new();
/// let finder = FeatureFinder::new(FeatureFinderParams::default().with_slice_width(0.05))?;
/// let features = finder.find_features(&spectra)?;
/// for feature in features.iter() {
///     println!("{} {} {}", feature.mass, feature.retention_time, feature.intensities.top);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FeatureFinder<S: SignalPrimitives = LocalMaximumPeakDetector> {
    params: FeatureFinderParams,
    signal: S,
}

impl FeatureFinder<LocalMaximumPeakDetector> {
    /// Create a finder using the built-in smoothing and peak detection.
    ///
    /// # Errors
    /// When `params` fails [`FeatureFinderParams::validate`]
    pub fn new(params: FeatureFinderParams) -> Result<Self, FeatureFinderError> {
        let signal = LocalMaximumPeakDetector::new(params.smoothing_method, params.smoothing_level);
        Self::with_signal_primitives(params, signal)
    }
}

impl<S: SignalPrimitives + Sync> FeatureFinder<S> {
    pub fn with_signal_primitives(params: FeatureFinderParams, signal: S) -> Result<Self, FeatureFinderError> {
        params.validate()?;
        Ok(Self { params, signal })
    }

    pub fn params(&self) -> &FeatureFinderParams {
        &self.params
    }

    pub fn find_features<P: SpectrumProvider + ?Sized>(
        &self,
        provider: &P,
    ) -> Result<FeatureSet, FeatureFinderError> {
        self.find_features_with(provider, &ScanControl::default())
    }

    /// Run the full pipeline with cancellation and progress hooks.
    ///
    /// On cancellation the features of the units accepted so far are still
    /// refined and finalized, and the returned status says how far the scan got.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn find_features_with<P: SpectrumProvider + ?Sized>(
        &self,
        provider: &P,
        control: &ScanControl,
    ) -> Result<FeatureSet, FeatureFinderError> {
        let index = SpectrumIndex::new(provider.spectra(), self.params.polarity);
        let units = self.build_units(&index);
        if units.is_empty() {
            debug!("Nothing to scan");
            return Ok(FeatureSet::completed(Vec::new()));
        }

        let linker = Ms2Linker::new(&index, self.params.acquisition_type, self.params.ms2_tolerance);
        let context = ScanContext {
            index: &index,
            linker,
            noise: NoiseFilter::new(self.params.noise_filter),
            detection: self.params.detection_params(),
            retention_time_range: self.params.retention_time_range,
        };
        let resolver = if self.params.is_targeted() {
            None
        } else {
            Some(RedundancyResolver::new(self.params.slice_step()))
        };
        let mut history = SliceHistory::new(resolver);
        let counter = ProgressCounter::new(units.len(), control);

        if self.params.threads <= 1 {
            self.scan_sequential(&context, &units, control, &counter, &mut history);
        } else {
            self.scan_parallel(&context, &units, control, &counter, &mut history)?;
        }

        let status = if history.cancelled {
            ScanStatus::Cancelled {
                processed: history.processed,
                total: units.len(),
            }
        } else {
            ScanStatus::Completed
        };
        let tally = history.tally;
        let features = self.post_process(&index, linker, history.into_features());
        info!(
            "Scanned {} of {} units, {} chromatograms, {} peaks detected, {} rejected as noise, {} features reported",
            tally.units,
            units.len(),
            tally.chromatograms,
            tally.peaks_detected,
            tally.noise_rejected,
            features.len()
        );
        Ok(FeatureSet { features, status })
    }

    fn build_units(&self, index: &SpectrumIndex<'_>) -> Vec<ScanUnit> {
        if self.params.is_targeted() {
            return self
                .params
                .targets
                .iter()
                .enumerate()
                .map(|(i, mass)| ScanUnit {
                    position: i,
                    mass: *mass,
                    tolerance: self.params.target_tolerance(i),
                    excluded: false,
                })
                .collect();
        }

        let Some((observed_start, observed_end)) = index.observed_mz_range() else {
            return Vec::new();
        };
        let start = observed_start.max(self.params.mz_range.0);
        let end = observed_end.min(self.params.mz_range.1);
        if start > end {
            return Vec::new();
        }
        let step = self.params.slice_step();
        let n = ((end - start) / step).floor() as usize + 1;
        debug!("Scanning {n} slices from {start:0.4} to {end:0.4} in steps of {step}");
        (0..n)
            .map(|i| {
                let mass = start + i as f64 * step;
                ScanUnit {
                    position: i,
                    mass,
                    tolerance: Tolerance::Da(step * 0.5),
                    excluded: self.params.is_excluded(mass),
                }
            })
            .collect()
    }

    /// Extract, detect, link and filter one unit
    fn process_unit(
        &self,
        context: &ScanContext<'_>,
        unit: &ScanUnit,
        control: &ScanControl,
        counter: &ProgressCounter<'_>,
    ) -> UnitOutcome {
        if control.is_cancelled() {
            return UnitOutcome::Cancelled;
        }
        let span = tracing::debug_span!("scan_unit", position = unit.position, mass = unit.mass);
        let _entered = span.enter();

        let mut tally = ScanTally {
            units: 1,
            ..Default::default()
        };
        let features = if unit.excluded {
            trace!("Skipping excluded mass {:0.4}", unit.mass);
            Vec::new()
        } else {
            self.detect_unit(context, unit, &mut tally)
        };
        counter.tick();
        UnitOutcome::Completed(features, tally)
    }

    fn detect_unit(&self, context: &ScanContext<'_>, unit: &ScanUnit, tally: &mut ScanTally) -> Vec<PeakFeature> {
        let request =
            ChromatogramRequest::retention_time(unit.mass, unit.tolerance, context.retention_time_range);
        let chrom = extract_chromatogram(context.index, &request);
        if chrom.is_empty() {
            return Vec::new();
        }
        tally.chromatograms += 1;

        let smoothed = self.signal.smooth(&chrom);
        let results = self
            .signal
            .detect_peaks(chrom.times(), &smoothed, &context.detection);
        tally.peaks_detected += results.len();

        let features: Vec<PeakFeature> = results
            .iter()
            .filter_map(|r| build_feature(&chrom, r))
            .map(|mut f| {
                f.ms2 = context.linker.link(&f);
                f
            })
            .collect();
        if features.is_empty() {
            return features;
        }

        let before = features.len();
        let features = context.noise.retain(features, &smoothed);
        tally.noise_rejected += before - features.len();
        tally.features_kept += features.len();
        if tracing::enabled!(tracing::Level::TRACE) && !features.is_empty() {
            trace!("{} features at {:0.4}", features.len(), unit.mass);
        }
        features
    }

    fn scan_sequential(
        &self,
        context: &ScanContext<'_>,
        units: &[ScanUnit],
        control: &ScanControl,
        counter: &ProgressCounter<'_>,
        history: &mut SliceHistory,
    ) {
        for unit in units {
            if !history.accept(self.process_unit(context, unit, control, counter)) {
                debug!("Scan cancelled after {} units", history.processed);
                break;
            }
        }
    }

    /// Run units in bounded chunks on a dedicated pool, folding each chunk in
    /// order before starting the next
    fn scan_parallel(
        &self,
        context: &ScanContext<'_>,
        units: &[ScanUnit],
        control: &ScanControl,
        counter: &ProgressCounter<'_>,
        history: &mut SliceHistory,
    ) -> Result<(), FeatureFinderError> {
        let threads = self.params.threads;
        debug!("Using {threads} threads");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| FeatureFinderError::ThreadPool(e.to_string()))?;

        pool.install(|| {
            for chunk in units.chunks(threads * 4) {
                if control.is_cancelled() {
                    history.accept(UnitOutcome::Cancelled);
                    break;
                }
                let outcomes: Vec<UnitOutcome> = chunk
                    .par_iter()
                    .map(|unit| self.process_unit(context, unit, control, counter))
                    .collect();
                let mut proceed = true;
                for outcome in outcomes {
                    if !history.accept(outcome) {
                        proceed = false;
                        break;
                    }
                }
                if !proceed {
                    debug!("Scan cancelled after {} units", history.processed);
                    break;
                }
            }
        });
        Ok(())
    }

    /// Refine, order, resolve drift and finalize the accepted features
    fn post_process(
        &self,
        index: &SpectrumIndex<'_>,
        linker: Ms2Linker<'_>,
        features: Vec<PeakFeature>,
    ) -> Vec<PeakFeature> {
        let refiner = Refiner::new(index, &self.signal, linker, &self.params);
        let before = features.len();
        let mut refined: Vec<PeakFeature> = features
            .into_iter()
            .filter_map(|f| refiner.refine(f))
            .collect();
        debug!("{} of {before} features survived refinement", refined.len());
        refined.sort_by(feature_order);

        if let Some(drift) = self.params.ion_mobility {
            if index.has_ion_mobility() {
                let extender = DriftExtender::new(
                    index,
                    &self.signal,
                    &refiner,
                    linker,
                    self.params.ms1_tolerance,
                    self.params.detection_params(),
                    drift,
                );
                extender.extend(&mut refined);
            } else {
                debug!("Ion mobility was requested but no spectrum carries a drift time");
            }
        }
        finalize_features(refined)
    }
}
