// Licensed under the Apache-2.0 license

//! Error type shared by the line controller, engine and adapter.

use crate::gpio::GpioError;
use core::fmt;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

const ENOMEM: i32 = 12;
const EIO: i32 = 5;
const ENXIO: i32 = 6;
const EBUSY: i32 = 16;
const EINVAL: i32 = 22;
const EPROTO: i32 = 71;
const ETIMEDOUT: i32 = 110;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A line or adapter slot is owned elsewhere.
    ResourceExhausted,
    /// Pin assignment or timing parameters are unusable.
    InvalidConfiguration,
    /// The caller asked for something the bus cannot express.
    InvalidRequest,
    /// The peripheral did not acknowledge.
    Nack(NoAcknowledgeSource),
    /// A peripheral held the clock low longer than the stretch timeout.
    BusTimeout,
    /// SDA stayed low after a STOP and nine recovery clocks.
    BusStuck,
    /// Another transfer is in flight on this bus.
    Busy,
    /// An SMBus block read reported a count outside 1..=32.
    InvalidBlockLength(u8),
    /// Reading or writing a GPIO line failed.
    Line(embedded_hal::digital::ErrorKind),
}

impl Error {
    /// Negative errno value, as a C bus framework expects it.
    #[must_use]
    pub const fn to_errno(self) -> i32 {
        let errno = match self {
            Error::ResourceExhausted => ENOMEM,
            Error::InvalidConfiguration | Error::InvalidRequest => EINVAL,
            Error::Nack(NoAcknowledgeSource::Address) => ENXIO,
            Error::Nack(_) | Error::BusStuck | Error::Line(_) => EIO,
            Error::BusTimeout => ETIMEDOUT,
            Error::Busy => EBUSY,
            Error::InvalidBlockLength(_) => EPROTO,
        };
        -errno
    }

    pub(crate) fn line<E: embedded_hal::digital::Error>(err: E) -> Self {
        Error::Line(err.kind())
    }
}

impl From<GpioError> for Error {
    fn from(err: GpioError) -> Self {
        match err {
            GpioError::InvalidPin(_) => Error::InvalidConfiguration,
            GpioError::AlreadyClaimed(_) => Error::ResourceExhausted,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ResourceExhausted => f.write_str("bus resources unavailable"),
            Error::InvalidConfiguration => f.write_str("invalid bus configuration"),
            Error::InvalidRequest => f.write_str("invalid transfer request"),
            Error::Nack(NoAcknowledgeSource::Address) => f.write_str("address not acknowledged"),
            Error::Nack(NoAcknowledgeSource::Data) => f.write_str("data not acknowledged"),
            Error::Nack(NoAcknowledgeSource::Unknown) => f.write_str("not acknowledged"),
            Error::BusTimeout => f.write_str("clock stretch timeout"),
            Error::BusStuck => f.write_str("data line stuck low"),
            Error::Busy => f.write_str("bus busy"),
            Error::InvalidBlockLength(len) => write!(f, "invalid block length {len}"),
            Error::Line(kind) => write!(f, "line fault ({kind})"),
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Nack(source) => ErrorKind::NoAcknowledge(*source),
            Error::BusTimeout | Error::BusStuck | Error::Line(_) => ErrorKind::Bus,
            _ => ErrorKind::Other,
        }
    }
}
