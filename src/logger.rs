use std::error::Error;

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config as LogConfig, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::configure::AppConfig;

const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {l} [{t}] {m}{n}";

/// Stdout appender always; file appender when `log_to_file` is set.
/// The `audit` target gets its own logger pinned at Info so audit
/// facts are emitted even under a quieter root level.
fn build_log_config(config: &AppConfig) -> Result<LogConfig, Box<dyn Error>> {
    let level = config.log_level.parse().unwrap_or(LevelFilter::Info);

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let mut builder =
        LogConfig::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
    let mut root = Root::builder().appender("stdout");

    if config.log_to_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(&config.log_file)?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    Ok(builder
        .logger(Logger::builder().build("audit", LevelFilter::Info))
        .build(root.build(level))?)
}

pub fn setup_logger(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    log4rs::init_config(build_log_config(config)?)?;
    Ok(())
}
