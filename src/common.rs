// Licensed under the Apache-2.0 license

//! Shared driver utilities: the logging sink used by the bus adapter.
//!
//! Drivers take a `L: Logger` type parameter that defaults to [`NoOpLogger`],
//! so logging costs nothing unless a sink is supplied. On target the usual
//! sink is a UART wrapped in [`WriterLogger`].

use core::fmt;

/// Severity of a log record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Destination for driver log records.
pub trait Logger {
    /// Emit one record. Implementations decide whether `level` is kept.
    fn log(&mut self, level: LogLevel, args: fmt::Arguments<'_>);

    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }

    fn info(&mut self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&mut self, _level: LogLevel, _args: fmt::Arguments<'_>) {}
}

/// Logger writing `[LEVEL] message\r\n` lines to an `embedded_io` sink.
///
/// Write errors are dropped: a failing log sink must never abort a bus
/// transfer.
pub struct WriterLogger<W: embedded_io::Write> {
    writer: W,
    min_level: LogLevel,
}

impl<W: embedded_io::Write> WriterLogger<W> {
    pub fn new(writer: W, min_level: LogLevel) -> Self {
        Self { writer, min_level }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: embedded_io::Write> Logger for WriterLogger<W> {
    fn log(&mut self, level: LogLevel, args: fmt::Arguments<'_>) {
        if level < self.min_level {
            return;
        }
        let _ = write!(self.writer, "[{}] ", level.as_str());
        let _ = self.writer.write_fmt(args);
        let _ = self.writer.write_all(b"\r\n");
    }
}

/// Displays a byte slice as space separated `0xNN` values.
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "0x{byte:02X}")?;
        }
        Ok(())
    }
}
