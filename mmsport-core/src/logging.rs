//! Shared logging setup for the mmsport binaries.

use tracing::Level;

use crate::Result;

/// Maps the CLI verbosity flags to a log level. Quiet wins over verbose.
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

/// Initializes structured logging for the whole process.
///
/// Output is a plain single-line format so that operators can paste runs
/// into support tickets. Fails if a subscriber is already set.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level_for(verbose, quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| {
            crate::error::MmsPortError::configuration(format!(
                "failed to initialize logging: {}",
                e
            ))
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Logging can only be initialized once per test process, so only the
    // level mapping is exercised here.

    #[test]
    fn quiet_overrides_any_verbosity() {
        assert_eq!(level_for(0, true), Level::ERROR);
        assert_eq!(level_for(5, true), Level::ERROR);
    }

    #[test]
    fn verbosity_escalates_the_level() {
        assert_eq!(level_for(0, false), Level::INFO);
        assert_eq!(level_for(1, false), Level::DEBUG);
        assert_eq!(level_for(2, false), Level::TRACE);
        assert_eq!(level_for(9, false), Level::TRACE);
    }
}
