use std::{
    io::{self, Write},
    sync::OnceLock,
    time::Instant,
};

use ansi_rgb::{Foreground, red, yellow};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use rgb::{RGB8, Rgb};

fn level_to_rgb(level: Level) -> RGB8 {
    match level {
        Level::Error => red(),
        Level::Warn => yellow(),
        Level::Info => Rgb::new(0x00, 0xBC, 0x12),
        Level::Debug => Rgb::new(0x16, 0x85, 0xA9),
        Level::Trace => Rgb::new(128, 128, 128),
    }
}

fn level_icon(level: Level) -> &'static str {
    match level {
        Level::Error => "💥",
        Level::Warn => "⚠️",
        Level::Info => "💡",
        Level::Debug => "🐛",
        Level::Trace => "🔍",
    }
}

/// Colored logger: level icon, time since start, `target:line`.
pub struct SimLogger {
    start: OnceLock<Instant>,
}

static LOGGER: SimLogger = SimLogger {
    start: OnceLock::new(),
};

impl SimLogger {
    /// Installs the logger. Fails if another logger is already set.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        LOGGER.start.get_or_init(Instant::now);
        log::set_logger(&LOGGER)?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for SimLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = self.start.get_or_init(Instant::now).elapsed();
        let line = format!(
            "{} {:.3?} [{}:{}] {}",
            level_icon(record.level()),
            elapsed,
            record.target(),
            record.line().unwrap_or(0),
            record.args()
        );
        let _ = writeln!(io::stderr(), "{}", line.fg(level_to_rgb(record.level())));
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}
