//! Shared pieces of the riffmatch command-line tools

pub mod output;
pub mod sidecar;

/// Initialise logging.
///
/// Default: no logs, so stdout stays clean JSON for parsing.
/// Verbose: Info level on stderr for debugging.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
