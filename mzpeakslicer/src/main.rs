use std::fs;
use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mzpeakslicer::{MZPeakSlicer, MZPeakSlicerError};

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Log to STDERR, and to `--log-file` when one is given. The returned guard
/// flushes the file writer when dropped.
fn init_logging(args: &MZPeakSlicer) -> Result<Option<WorkerGuard>, MZPeakSlicerError> {
    let (file_layer, guard) = match args.log_file.as_ref() {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(fs::File::create(path)?);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).with_filter(
                EnvFilter::builder()
                    .with_default_directive(tracing::Level::DEBUG.into())
                    .from_env_lossy(),
            );
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer().compact().with_writer(io::stderr).with_filter(
                EnvFilter::builder()
                    .with_default_directive(tracing::Level::INFO.into())
                    .from_env_lossy(),
            ),
        )
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| MZPeakSlicerError::LoggingError(e.to_string()))?;
    // mzdata reports through `log`
    tracing_log::LogTracer::init().map_err(|e| MZPeakSlicerError::LoggingError(e.to_string()))?;
    Ok(guard)
}

fn main() -> Result<(), MZPeakSlicerError> {
    let args = MZPeakSlicer::from_command_line()?;
    let _guard = init_logging(&args)?;
    args.main()
}
