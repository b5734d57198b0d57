//! The `logger` module configures `env_logger`

use std::sync::{Arc, LazyLock, RwLock};

static LOGGER: LazyLock<Arc<RwLock<env_logger::Logger>>> =
    LazyLock::new(|| Arc::new(RwLock::new(env_logger::Logger::from_default_env())));

struct LoggerShim {}

impl log::Log for LoggerShim {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        LOGGER
            .read()
            .map(|logger| logger.enabled(metadata))
            .unwrap_or(false)
    }

    fn log(&self, record: &log::Record) {
        if let Ok(logger) = LOGGER.read() {
            logger.log(record);
        }
    }

    fn flush(&self) {}
}

fn replace_logger(logger: env_logger::Logger) {
    log::set_max_level(logger.filter());
    if let Ok(mut current) = LOGGER.write() {
        *current = logger;
    }
    // A second call only swaps the filter; the shim stays installed.
    let _ = log::set_boxed_logger(Box::new(LoggerShim {}));
}

/// Configures logging with a specific filter overriding RUST_LOG.
/// Filter syntax: `RUST_LOG="trv1_rpc_client=debug,trv1_block_stream=trace"`
pub fn setup_with(filter: &str) {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::new().filter_or("_RUST_LOG", filter))
            .format_timestamp_nanos()
            .build();
    replace_logger(logger);
}

/// Configures logging with a fallback filter used only when RUST_LOG is unset.
pub fn setup_with_default(filter: &str) {
    let logger = env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(filter))
        .format_timestamp_nanos()
        .build();
    replace_logger(logger);
}

/// Configures logging with the default filter "error" if RUST_LOG is not set.
pub fn setup() {
    setup_with_default("error");
}

/// Configures file logging with a default filter if RUST_LOG is not set.
///
/// All logs go to the given file when `logfile` is `Some`, to stderr otherwise.
pub fn setup_file_with_default(logfile: Option<&str>, filter: &str) -> std::io::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(filter));
    builder.format_timestamp_nanos();
    if let Some(path) = logfile {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    replace_logger(builder.build());
    Ok(())
}
