use std::sync::Once;

use fast_log::Config;
use log::{info, warn, LevelFilter};

static INIT_LOGGER_ONCE: Once = Once::new();

/// Initializes `fast_log` for the process, later calls are ignored.
///
/// When `file` is `None` records go to the console.
pub fn init_logger(level: LevelFilter, file: Option<&str>) {
    INIT_LOGGER_ONCE.call_once(|| {
        assert!(
            level <= log::STATIC_MAX_LEVEL,
            "Should respect log::STATIC_MAX_LEVEL={:?}, which is done in compile time. level{:?}",
            log::STATIC_MAX_LEVEL,
            level
        );

        let mut config = Config::new().chan_len(Some(100)).level(level);

        config = match file {
            Some(path) => config.file(path),
            None => config.console(),
        };

        if let Err(error) = fast_log::init(config) {
            eprintln!("failed to initialize logger: {}", error);
            return;
        }

        info!("init_logger (inside 'once') finished");

        warn!(
            "init_logger finished, chosen level={:?} (deliberately output by warn level)",
            level
        );
    });
}
