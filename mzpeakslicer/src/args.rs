use std::fmt::Display;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use mzpeakslice::{AcquisitionType, Polarity, SmoothingMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgSmoothingMethod {
    /// Use the raw chromatogram
    None,
    /// Equal weights over the window
    SimpleMovingAverage,
    #[default]
    /// Weights falling off linearly from the center of the window
    LinearWeightedMovingAverage,
    /// Gaussian weights with the window spanning two standard deviations
    Gaussian,
}

impl From<ArgSmoothingMethod> for SmoothingMethod {
    fn from(value: ArgSmoothingMethod) -> Self {
        match value {
            ArgSmoothingMethod::None => SmoothingMethod::None,
            ArgSmoothingMethod::SimpleMovingAverage => SmoothingMethod::SimpleMovingAverage,
            ArgSmoothingMethod::LinearWeightedMovingAverage => {
                SmoothingMethod::LinearWeightedMovingAverage
            }
            ArgSmoothingMethod::Gaussian => SmoothingMethod::Gaussian,
        }
    }
}

impl Display for ArgSmoothingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgAcquisitionType {
    #[default]
    /// Data-dependent acquisition, MS2 scans isolate a single precursor
    Dda,
    /// Sequential isolation windows covering the mass range
    Swath,
    /// All-ion fragmentation without isolation
    Aif,
}

impl From<ArgAcquisitionType> for AcquisitionType {
    fn from(value: ArgAcquisitionType) -> Self {
        match value {
            ArgAcquisitionType::Dda => AcquisitionType::DDA,
            ArgAcquisitionType::Swath => AcquisitionType::SWATH,
            ArgAcquisitionType::Aif => AcquisitionType::AIF,
        }
    }
}

impl Display for ArgAcquisitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgPolarity {
    #[default]
    Positive,
    Negative,
}

impl From<ArgPolarity> for Polarity {
    fn from(value: ArgPolarity) -> Self {
        match value {
            ArgPolarity::Positive => Polarity::Positive,
            ArgPolarity::Negative => Polarity::Negative,
        }
    }
}

impl Display for ArgPolarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
