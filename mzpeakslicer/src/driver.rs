use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Instant;

use clap::parser::ValueSource;
use clap::{ArgMatches, Command, CommandFactory, FromArgMatches, Parser};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Value},
    Figment,
};
use serde::{Deserialize, Serialize};

use flate2::write::GzEncoder;
use flate2::Compression;

use thiserror::Error;

use tracing::{debug, info, warn};

use mzdata::prelude::{MZFileReader, SpectrumLike};
use mzdata::MZReader;
use mzpeaks::Tolerance;

use mzpeakslice::{
    DriftParams, ExcludedMass, FeatureFinder, FeatureFinderError, FeatureFinderParams,
    NoiseFilterParams, PeakFeature, RefinementParams, ScanControl, ScanStatus,
};

use crate::args::{ArgAcquisitionType, ArgPolarity, ArgSmoothingMethod};
use crate::convert::{convert_spectra, restore_source_indices, SpectrumType};
use crate::time_range::TimeRange;
use crate::write::{write_features, OutputFormat};

/// The configuration file read from the working directory when present
pub const CONFIG_FILE: &str = "mzpeakslicer.toml";
/// The prefix of environment variables that override configuration files
pub const ENV_PREFIX: &str = "MZPEAKSLICER_";

fn positive_float(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(format!("`{s}` is not greater than zero"))
    }
}

fn non_negative_float(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}

#[derive(Debug, Error)]
pub enum MZPeakSlicerError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to read {0}: {1}")]
    InputError(String, #[source] io::Error),
    #[error("Failed to centroid spectrum {0}: {1}")]
    PeakPickingError(usize, String),
    #[error("The configuration could not be read: {0}")]
    ConfigurationError(
        #[source]
        #[from]
        figment::Error,
    ),
    #[error("Feature finding failed: {0}")]
    FeatureFinderError(
        #[source]
        #[from]
        FeatureFinderError,
    ),
    #[error("Failed to build a thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
    #[error("Failed to serialize features: {0}")]
    SerializationError(
        #[source]
        #[from]
        serde_json::Error,
    ),
    #[error("Failed to initialize logging: {0}")]
    LoggingError(String),
}

/// Chromatographic peak feature extraction from mass spectrometry files.
///
/// Read an mzML or MGF file, scan its MS1 spectra in narrow mass slices for
/// chromatographic peaks, and write the features as a table or JSON.
#[derive(Parser, Debug, Clone, PartialEq, Deserialize, Serialize)]
#[command(author, version)]
#[serde(default)]
pub struct MZPeakSlicer {
    /// The path to read the input spectra from
    #[arg()]
    pub input_file: String,

    /// The path to write the features to, or if '-' is passed, write to STDOUT.
    ///
    /// Paths ending in `.json` are written as JSON, anything else as a tab-separated
    /// table. A trailing `.gz` compresses the output.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `mzpeakslicer.toml` in the working directory.
    /// Environment variables prefixed with `MZPEAKSLICER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    pub threads: i32,

    /// The time range to process, denoted (start?)-(stop?)
    #[arg(
        short='r',
        long="time-range",
        value_parser=TimeRange::from_str,
        value_name="BEGIN-END",
        long_help=r#"The time range to process, denoted (start?)-(stop?)

If a start is not specified, processing begins from the start of the run.
If a stop is not specified, processing stops at the end of the run.
"#
    )]
    pub time_range: Option<TimeRange>,

    /// The m/z range to scan, denoted (low?)-(high?)
    #[arg(
        short = 'm',
        long = "mz-range",
        value_parser = TimeRange::from_str,
        value_name = "LOW-HIGH"
    )]
    pub mz_range: Option<TimeRange>,

    /// The width of each mass slice in m/z
    #[arg(short = 'w', long = "slice-width", default_value_t = 0.1, value_parser = positive_float)]
    pub slice_width: f64,

    /// Step through the mass range in whole m/z units
    #[arg(long = "nominal")]
    pub nominal: bool,

    /// The polarity of the MS1 spectra to use
    #[arg(short = 'p', long = "polarity", default_value = "positive")]
    pub polarity: ArgPolarity,

    /// The MS1 mass tolerance in Da
    #[arg(long = "ms1-tolerance", default_value_t = 0.01, value_parser = positive_float)]
    pub ms1_tolerance: f64,

    /// The tolerance in Da for matching MS2 precursors to features
    #[arg(long = "ms2-tolerance", default_value_t = 0.025, value_parser = positive_float)]
    pub ms2_tolerance: f64,

    /// The smallest apex-to-edge height a chromatographic peak may have
    #[arg(short = 'a', long = "minimum-amplitude", default_value_t = 1000.0, value_parser = non_negative_float)]
    pub minimum_amplitude: f64,

    /// The fewest chromatogram points a peak may span
    #[arg(
        short = 'n',
        long = "minimum-data-points",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    pub minimum_data_points: u32,

    /// The smoothing applied to each chromatogram before peak detection
    #[arg(short = 's', long = "smoothing", default_value = "linear-weighted-moving-average")]
    pub smoothing_method: ArgSmoothingMethod,

    /// The half-width of the smoothing window in points
    #[arg(short = 'k', long = "smoothing-level", default_value_t = 3)]
    pub smoothing_level: u32,

    /// How MS2 spectra were acquired, which decides how precursors are matched
    #[arg(short = 'q', long = "acquisition-type", default_value = "dda")]
    pub acquisition_type: ArgAcquisitionType,

    /// Extract only these m/z values instead of scanning the whole mass range
    #[arg(long = "target", value_name = "MZ")]
    pub targets: Vec<f64>,

    /// The extraction tolerance in Da for each `--target`, in the same order
    #[arg(long = "target-tolerance", value_name = "DA")]
    pub target_tolerances: Vec<f64>,

    /// Resolve each feature along the drift time axis when the spectra carry ion mobility
    #[arg(short = 'i', long = "ion-mobility")]
    pub ion_mobility: bool,

    #[arg(
        skip,
        help = "Masses to skip while scanning slices"
    )]
    pub excluded_masses: Vec<ExcludedMass>,

    #[arg(skip)]
    pub noise_filter: NoiseFilterParams,

    #[arg(skip)]
    pub refinement: RefinementParams,

    #[arg(skip)]
    pub drift: DriftParams,
}

impl Default for MZPeakSlicer {
    fn default() -> Self {
        Self {
            input_file: String::new(),
            output_file: PathBuf::from("-"),
            log_file: None,
            config_file: None,
            threads: -1,
            time_range: None,
            mz_range: None,
            slice_width: 0.1,
            nominal: false,
            polarity: ArgPolarity::Positive,
            ms1_tolerance: 0.01,
            ms2_tolerance: 0.025,
            minimum_amplitude: 1000.0,
            minimum_data_points: 5,
            smoothing_method: ArgSmoothingMethod::LinearWeightedMovingAverage,
            smoothing_level: 3,
            acquisition_type: ArgAcquisitionType::Dda,
            targets: Vec::new(),
            target_tolerances: Vec::new(),
            ion_mobility: false,
            excluded_masses: Vec::new(),
            noise_filter: NoiseFilterParams::default(),
            refinement: RefinementParams::default(),
            drift: DriftParams::default(),
        }
    }
}

/// The names of the arguments given explicitly on the command line
fn explicit_arguments(command: &Command, matches: &ArgMatches) -> Vec<String> {
    command
        .get_arguments()
        .map(|arg| arg.get_id().as_str())
        .filter(|id| matches!(matches.value_source(id), Some(ValueSource::CommandLine)))
        .map(String::from)
        .collect()
}

impl MZPeakSlicer {
    /// Parse the command line and layer it over the configuration files and
    /// environment
    pub fn from_command_line() -> Result<Self, MZPeakSlicerError> {
        let command = Self::command();
        let matches = command.clone().get_matches();
        let args = Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
        let explicit = explicit_arguments(&command, &matches);
        Ok(args.configure(&explicit)?.extract()?)
    }

    /// Build the configuration stack: built-in defaults, then `mzpeakslicer.toml`
    /// and `--config-file`, then `MZPEAKSLICER_` environment variables, then the
    /// `explicit` fields of `self`.
    pub fn configure(&self, explicit: &[String]) -> Result<Figment, MZPeakSlicerError> {
        let mut config =
            Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(CONFIG_FILE));
        if let Some(path) = self.config_file.as_ref() {
            config = config.merge(Toml::file_exact(path));
        }
        config = config.merge(Env::prefixed(ENV_PREFIX));

        let flags: Dict = Value::serialize(self)?
            .into_dict()
            .unwrap_or_default()
            .into_iter()
            .filter(|(key, _)| explicit.iter().any(|e| e == key))
            .collect();
        Ok(config.merge(Serialized::defaults(flags)))
    }

    fn num_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    fn create_threadpool(&self) -> Result<rayon::ThreadPool, MZPeakSlicerError> {
        let num_threads = self.num_threads();
        debug!("Using {} cores", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    /// Translate the arguments into the feature finder's parameters
    pub fn finder_params(&self) -> FeatureFinderParams {
        let mut params = FeatureFinderParams::default()
            .with_polarity(self.polarity.into())
            .with_slice_width(self.slice_width)
            .with_smoothing(self.smoothing_method.into(), self.smoothing_level as usize)
            .with_peak_thresholds(self.minimum_data_points as usize, self.minimum_amplitude)
            .with_tolerances(Tolerance::Da(self.ms1_tolerance), Tolerance::Da(self.ms2_tolerance))
            .with_acquisition_type(self.acquisition_type.into())
            .with_threads(self.num_threads())
            .with_targets(self.targets.clone(), self.target_tolerances.clone())
            .with_excluded_masses(self.excluded_masses.clone());
        if let Some(time_range) = self.time_range {
            params = params.with_retention_time_range(time_range.start, time_range.end);
        }
        if let Some(mz_range) = self.mz_range {
            params = params.with_mz_range(mz_range.start, mz_range.end);
        }
        if self.ion_mobility {
            params = params.with_ion_mobility(self.drift);
        }
        params.nominal_accuracy = self.nominal;
        params.noise_filter = self.noise_filter;
        params.refinement = self.refinement;
        params
    }

    pub fn main(&self) -> Result<(), MZPeakSlicerError> {
        info!(
            "mzpeakslicer v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Input: {}", self.input_file);
        info!("Output: {}", self.output_file.display());
        if tracing::enabled!(tracing::Level::DEBUG) {
            match toml::to_string(self) {
                Ok(text) => debug!("Configuration:\n{text}"),
                Err(e) => warn!("Failed to render configuration: {e}"),
            }
        }
        // Validate before touching the input
        let finder = FeatureFinder::new(self.finder_params())?;
        self.create_threadpool()?.install(|| self.run(&finder))
    }

    fn read_spectra(&self) -> Result<Vec<SpectrumType>, MZPeakSlicerError> {
        let reader = MZReader::open_path(&self.input_file)
            .map_err(|e| MZPeakSlicerError::InputError(self.input_file.clone(), e))?;
        let time_range = self.time_range.unwrap_or_default();
        if self.time_range.is_some() {
            info!("Reading spectra in {time_range}");
        }
        let spectra = reader
            .into_iter()
            .skip_while(|s| s.start_time() < time_range.start)
            .take_while(|s| s.start_time() <= time_range.end)
            .collect();
        Ok(spectra)
    }

    fn run(&self, finder: &FeatureFinder) -> Result<(), MZPeakSlicerError> {
        let start = Instant::now();
        let run = convert_spectra(self.read_spectra()?)?;
        let record = run.record;
        info!("MS1 Spectra: {}", record.ms1_spectra);
        info!("MSn Spectra: {}", record.msn_spectra);
        info!("MS1 Peaks: {} | MSn Peaks: {}", record.ms1_peaks, record.msn_peaks);
        if record.centroided_spectra > 0 {
            info!("Centroided {} profile spectra", record.centroided_spectra);
        }
        if self.ion_mobility && record.ion_mobility_spectra == 0 {
            warn!("Ion mobility was requested but no spectrum carries a drift time");
        }
        let read_done = Instant::now();

        let control = ScanControl::new()
            .with_progress_interval(1000)
            .with_progress(|progress| {
                debug!("Scanned {} of {} mass units", progress.processed, progress.total)
            });
        let features = finder.find_features_with(&run.spectra, &control)?;
        if let ScanStatus::Cancelled { processed, total } = features.status {
            warn!("The scan stopped after {processed} of {total} mass units");
        }
        let mut features = features.into_inner();
        restore_source_indices(&mut features, &run.source_indices);
        info!("Features: {}", features.len());

        self.write_output(&features)?;
        let done = Instant::now();
        info!(
            "Reading Time: {:0.3?} | Processing Time: {:0.3?}",
            read_done - start,
            done - read_done
        );
        Ok(())
    }

    fn write_output(&self, features: &[PeakFeature]) -> Result<(), MZPeakSlicerError> {
        if self.output_file == PathBuf::from("-") {
            let stdout = io::stdout();
            write_features(features, OutputFormat::Table, stdout.lock())?;
        } else {
            let (format, compressed) = OutputFormat::infer_from_path(&self.output_file);
            let handle = io::BufWriter::new(fs::File::create(&self.output_file)?);
            if compressed {
                let mut encoder = GzEncoder::new(handle, Compression::best());
                write_features(features, format, &mut encoder)?;
                encoder.finish()?.flush()?;
            } else {
                write_features(features, format, handle)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use mzpeakslice::{AcquisitionType, SmoothingMethod};

    #[test]
    fn test_explicit_arguments() {
        let command = MZPeakSlicer::command();
        let matches = command
            .clone()
            .try_get_matches_from(["mzpeakslicer", "run.mzML", "-w", "0.05", "--ion-mobility"])
            .unwrap();
        let mut explicit = explicit_arguments(&command, &matches);
        explicit.sort();
        assert_eq!(explicit, ["input_file", "ion_mobility", "slice_width"]);
    }

    #[test]
    fn test_flags_override_configuration() {
        let args = MZPeakSlicer::try_parse_from(["mzpeakslicer", "run.mzML", "-w", "0.05"]).unwrap();
        let explicit = ["input_file".to_string(), "slice_width".to_string()];
        let config = args
            .configure(&explicit)
            .unwrap()
            .merge(Serialized::default("minimum_amplitude", 250.0));
        let layered: MZPeakSlicer = config.extract().unwrap();
        assert_eq!(layered.input_file, "run.mzML");
        assert_eq!(layered.slice_width, 0.05);
        assert_eq!(layered.minimum_amplitude, 250.0);
        assert_eq!(layered.threads, -1);
    }

    #[test]
    fn test_finder_params() {
        let args = MZPeakSlicer::try_parse_from([
            "mzpeakslicer",
            "run.mzML",
            "-t",
            "2",
            "-r",
            "1.5-3",
            "-m",
            "300-900",
            "-s",
            "gaussian",
            "-q",
            "swath",
            "--target",
            "400.2",
            "--target-tolerance",
            "0.02",
            "-i",
        ])
        .unwrap();
        let params = args.finder_params();
        assert_eq!(params.threads, 2);
        assert_eq!(params.retention_time_range, (1.5, 3.0));
        assert_eq!(params.mz_range, (300.0, 900.0));
        assert_eq!(params.smoothing_method, SmoothingMethod::Gaussian);
        assert_eq!(params.acquisition_type, AcquisitionType::SWATH);
        assert_eq!(params.targets, vec![400.2]);
        assert_eq!(params.target_tolerances, vec![0.02]);
        assert_eq!(params.ion_mobility, Some(DriftParams::default()));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(MZPeakSlicer::try_parse_from(["mzpeakslicer", "run.mzML", "-w", "0"]).is_err());
        assert!(MZPeakSlicer::try_parse_from(["mzpeakslicer", "run.mzML", "-n", "0"]).is_err());
        assert!(MZPeakSlicer::try_parse_from(["mzpeakslicer", "run.mzML", "-r", "5-1"]).is_err());
    }
}
