use std::io::{self, Write};

use colored::Colorize;
use log::{Level, LevelFilter, Metadata, Record};

/// Stderr logger with colored level tags. Quiet mode keeps errors only,
/// verbose opens everything up to trace.
#[derive(Clone)]
pub struct ColorLogger {
    max_level: LevelFilter,
}

impl ColorLogger {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        let max_level = if quiet {
            LevelFilter::Error
        } else if verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        };
        Self { max_level }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    #[allow(dead_code)]
    pub fn init(self) {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self)).expect("logger already initialized");
        log::set_max_level(max_level);
    }
}

impl log::Log for ColorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Error => eprintln!(
                "{} {}",
                "[ERROR]".red().bold(),
                format!("{}", record.args()).red().bold()
            ),
            Level::Warn => eprintln!(
                "{} {}",
                "[WARN]".yellow().bold(),
                format!("{}", record.args()).yellow()
            ),
            _ => eprintln!("[{}] {}", record.level().to_string().blue(), record.args()),
        }
        self.flush();
    }

    fn flush(&self) {
        io::stderr().flush().ok();
    }
}
