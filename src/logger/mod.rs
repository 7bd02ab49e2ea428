//! Event logging over a `ufmt` sink
//!
//! `core::fmt` does not fit next to a bootloader on 8 KiB parts, so log
//! lines are formatted with `ufmt` and written to whatever `uWrite` sink the
//! board provides. Boards without a spare UART use `NullWriter`.

use core::convert::Infallible;

use ufmt::derive::uDebug;
use ufmt::uWrite;

#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Level::Error => "[ERR] ",
            Level::Warn => "[WRN] ",
            Level::Info => "[INF] ",
            Level::Debug => "[DBG] ",
        }
    }
}

pub struct Logger<W> {
    out: W,
    level: Level,
}

impl<W: uWrite> Logger<W> {
    pub const fn new(out: W, level: Level) -> Self {
        Self { out, level }
    }

    /// Starts a line at `level`. `None` when the level is filtered out or the
    /// sink failed.
    pub fn begin(&mut self, level: Level) -> Option<&mut W> {
        if level > self.level {
            return None;
        }
        self.out.write_str(level.tag()).ok()?;
        Some(&mut self.out)
    }

    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn sink(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl Logger<NullWriter> {
    pub const fn disabled() -> Self {
        Self::new(NullWriter, Level::Error)
    }
}

impl Default for Logger<NullWriter> {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWriter;

impl uWrite for NullWriter {
    type Error = Infallible;

    fn write_str(&mut self, _s: &str) -> Result<(), Infallible> {
        Ok(())
    }
}

/// `log!(logger, Level::Info, "format", args..)`
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        if let Some(out) = $logger.begin($level) {
            let _ = ufmt::uwriteln!(out, $($arg)+);
        }
    };
}

pub(crate) use log;
