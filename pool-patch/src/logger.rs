use std::{
    fs,
    path::Path,
    time::SystemTime,
};

pub use log::LevelFilter;
use parking_lot::Once;

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_NAME: &str = "pool-patch.log";
pub const ERROR_FILE_NAME: &str = "pool-patch-error.txt";

/// Process wide logger
/// Based on crate "fern"
pub struct GlobalLogger {}

static LOGGER_INITIALIZED: Once = Once::new();

impl GlobalLogger {
    /// Sets up logging into `logs/pool-patch.log`. Runs once per process; a
    /// failure lands in `logs/pool-patch-error.txt` and logging stays off.
    pub fn init() {
        LOGGER_INITIALIZED.call_once(|| {
            let dir = Path::new(LOG_DIR);

            if let Err(err) = GlobalLogger::setup(&dir.join(LOG_FILE_NAME), LevelFilter::Debug) {
                let _ = fs::create_dir_all(dir);
                let _ = fs::write(
                    dir.join(ERROR_FILE_NAME),
                    format!("Failed to initialize logger: {err:?}"),
                );
            }
        });
    }

    fn setup(log_path: &Path, level_filter: LevelFilter) -> Result<(), fern::InitError> {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if fs::exists(log_path)? {
            fs::remove_file(log_path)?;
        }

        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{} {} {}] {}",
                    humantime::format_rfc3339_seconds(SystemTime::now()),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .level(level_filter)
            .chain(std::io::stdout())
            .chain(fern::log_file(log_path)?)
            .apply()?;

        Ok(())
    }
}
