//! Logging setup for the parts-rs programs.
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{runtime::ConfigErrors, Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    Config,
};

/// Target of the per-deduction messages written by [`crate::dimensions`].
pub const DEDUCTION_TARGET: &str = "parts_rs::dimensions";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid logging configuration: {0}")]
    Config(#[from] ConfigErrors),
    #[error("A logger was already initialized")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}

/// The level for the dimension-tracking messages: debug when they were asked
/// for, otherwise no more verbose than info regardless of `level`.
pub fn deduction_level(level: LevelFilter, show_deductions: bool) -> LevelFilter {
    if show_deductions {
        level.max(LevelFilter::Debug)
    } else {
        level.min(LevelFilter::Info)
    }
}

/// Log to stderr at `level`.
///
/// Every recorded deduction is a debug message, which drowns out everything
/// else in a large setup, so those only appear with `show_deductions`.
pub fn init_logging(level: LevelFilter, show_deductions: bool) -> Result<(), LoggingError> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{h({d(%H:%M:%S)} {l:<5})} {t} - {m}{n}",
        )))
        .target(Target::Stderr)
        .build();

    let deductions = Logger::builder()
        .appender("stderr")
        .additive(false)
        .build(DEDUCTION_TARGET, deduction_level(level, show_deductions));

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .logger(deductions)
        .build(Root::builder().appender("stderr").build(level))?;

    log4rs::init_config(config)?;
    Ok(())
}
