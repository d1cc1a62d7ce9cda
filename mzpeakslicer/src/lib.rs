mod args;
mod convert;
mod driver;
mod progress;
mod time_range;
mod write;

pub use args::*;
pub use convert::restore_source_indices;
pub use driver::{MZPeakSlicer, MZPeakSlicerError, CONFIG_FILE, ENV_PREFIX};
pub use progress::ReadRecord;
pub use time_range::{TimeRange, TimeRangeParseError};
pub use write::{write_features, OutputFormat};
