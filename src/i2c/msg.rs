// Licensed under the Apache-2.0 license

//! Bus messages and transfer results.

use crate::i2c::common::Direction;
use crate::i2c::error::Error;
use embedded_hal::i2c::SevenBitAddress;

/// Largest payload an SMBus block transfer carries.
pub const SMBUS_BLOCK_MAX: usize = 32;

pub enum MsgBuf<'a> {
    /// Payload to send.
    Write(&'a [u8]),
    /// Buffer filled completely from the peripheral.
    Read(&'a mut [u8]),
    /// SMBus block read: the peripheral sends a count byte first. On
    /// completion the buffer holds the count followed by that many bytes.
    ReadBlock(&'a mut [u8]),
}

/// One message of a transfer request.
///
/// Every message is framed by its own START (repeated START after the
/// first) and address byte unless `no_start` is set.
pub struct I2cMsg<'a> {
    pub addr: SevenBitAddress,
    pub buf: MsgBuf<'a>,
    /// Carry on the previous message's byte stream with no repeated START
    /// and no address byte. Ignored unless the previous message has the
    /// same address and direction.
    pub no_start: bool,
}

impl<'a> I2cMsg<'a> {
    #[must_use]
    pub fn write(addr: SevenBitAddress, bytes: &'a [u8]) -> Self {
        Self {
            addr,
            buf: MsgBuf::Write(bytes),
            no_start: false,
        }
    }

    #[must_use]
    pub fn read(addr: SevenBitAddress, buffer: &'a mut [u8]) -> Self {
        Self {
            addr,
            buf: MsgBuf::Read(buffer),
            no_start: false,
        }
    }

    /// `buffer` needs room for the count byte plus the largest block
    /// expected.
    #[must_use]
    pub fn read_block(addr: SevenBitAddress, buffer: &'a mut [u8]) -> Self {
        Self {
            addr,
            buf: MsgBuf::ReadBlock(buffer),
            no_start: false,
        }
    }

    /// Mark this message as continuing the previous one.
    #[must_use]
    pub fn without_start(mut self) -> Self {
        self.no_start = true;
        self
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        match self.buf {
            MsgBuf::Write(_) => Direction::Write,
            MsgBuf::Read(_) | MsgBuf::ReadBlock(_) => Direction::Read,
        }
    }

    /// Number of payload bytes requested or supplied.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.buf {
            MsgBuf::Write(bytes) => bytes.len(),
            MsgBuf::Read(buffer) | MsgBuf::ReadBlock(buffer) => buffer.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes sent, or the buffer as filled so far.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match &self.buf {
            MsgBuf::Write(bytes) => bytes,
            MsgBuf::Read(buffer) | MsgBuf::ReadBlock(buffer) => buffer,
        }
    }

    /// Whether this message carries on the byte stream of `prev` without a
    /// repeated START. Only messages flagged `no_start` do. Block reads and
    /// empty reads always stand alone.
    pub(crate) fn continues(&self, prev: &I2cMsg<'_>) -> bool {
        self.no_start
            && self.addr == prev.addr
            && self.direction() == prev.direction()
            && !self.stands_alone()
            && !prev.stands_alone()
    }

    fn stands_alone(&self) -> bool {
        match self.buf {
            MsgBuf::Read(ref buffer) => buffer.is_empty(),
            MsgBuf::ReadBlock(_) => true,
            MsgBuf::Write(_) => false,
        }
    }
}

/// Names the message a transfer stopped at. Messages before `index`
/// completed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransferFailure {
    pub index: usize,
    pub error: Error,
}

/// `Ok` carries the number of messages completed.
pub type TransferResult = Result<usize, TransferFailure>;
