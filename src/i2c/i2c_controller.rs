// Licensed under the Apache-2.0 license

//! Transfer adapter for the bit-banged bus.
//!
//! Turns an ordered list of [`I2cMsg`]s into engine operations under one bus
//! acquisition and reports how far it got. The same adapter backs the host
//! framework entry points ([`I2cAlgorithm`]) and `embedded_hal::i2c::I2c`.
//!
//! Every message opens with a START (repeated START after the first) and its
//! address byte, and every read message NACKs its own last byte. The only
//! exception is a message flagged `no_start`, which the `embedded-hal`
//! transaction impl sets on an operation following one of the same type.

use crate::common::{HexBytes, LogLevel, Logger, NoOpLogger};
use crate::i2c::bitbang::{address_byte, BitBangEngine};
use crate::i2c::common::{AckStatus, BusTiming, Direction, Functionality};
use crate::i2c::error::Error;
use crate::i2c::line::BusLines;
use crate::i2c::msg::{I2cMsg, MsgBuf, TransferFailure, TransferResult, SMBUS_BLOCK_MAX};
use crate::i2c::smbus::{self, SmbusData, SmbusSize};
use crate::i2c::traits::I2cAlgorithm;
use core::cell::{Cell, RefCell};
use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::{NoAcknowledgeSource, Operation, SevenBitAddress};

const MAX_ADDR: SevenBitAddress = 0x7F;

/// Most operations a single `embedded_hal` transaction may carry.
pub const MAX_OPERATIONS: usize = 16;

/// Capabilities this adapter advertises.
pub const FUNCTIONALITY: Functionality = Functionality::I2C
    .union(Functionality::SMBUS_QUICK)
    .union(Functionality::SMBUS_BYTE)
    .union(Functionality::SMBUS_BYTE_DATA)
    .union(Functionality::SMBUS_WORD_DATA)
    .union(Functionality::SMBUS_BLOCK_DATA);

/// Engine plus the busy flag guarding it.
struct BusContext<P, D> {
    busy: Cell<bool>,
    engine: RefCell<BitBangEngine<P, D>>,
}

/// Marks the bus busy for as long as it lives.
struct BusClaim<'a> {
    busy: &'a Cell<bool>,
}

impl Drop for BusClaim<'_> {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

impl<P, D> BusContext<P, D> {
    fn claim(&self) -> Option<BusClaim<'_>> {
        if self.busy.replace(true) {
            return None;
        }
        Some(BusClaim { busy: &self.busy })
    }
}

pub struct I2cController<P, D, L: Logger = NoOpLogger> {
    bus: BusContext<P, D>,
    logger: RefCell<L>,
}

impl<P, D> I2cController<P, D, NoOpLogger>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(lines: BusLines<P>, delay: D, timing: BusTiming) -> Self {
        Self::with_logger(lines, delay, timing, NoOpLogger)
    }
}

impl<P, D, L> I2cController<P, D, L>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    L: Logger,
{
    pub fn with_logger(lines: BusLines<P>, delay: D, timing: BusTiming, logger: L) -> Self {
        Self {
            bus: BusContext {
                busy: Cell::new(false),
                engine: RefCell::new(BitBangEngine::new(lines, delay, timing)),
            },
            logger: RefCell::new(logger),
        }
    }

    /// Whether a transfer is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.bus.busy.get()
    }

    /// Release both lines without any START/STOP sequencing.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] while a transfer is in flight, or a line fault.
    pub fn release_bus(&self) -> Result<(), Error> {
        let _claim = self.bus.claim().ok_or(Error::Busy)?;
        let mut engine = self.bus.engine.try_borrow_mut().map_err(|_| Error::Busy)?;
        engine.release_bus()
    }

    /// Tear the adapter down into its lines, delay and logger.
    pub fn into_parts(self) -> (BusLines<P>, D, L) {
        let (lines, delay) = self.bus.engine.into_inner().into_parts();
        (lines, delay, self.logger.into_inner())
    }

    /// Execute `msgs` back to back under one bus acquisition.
    ///
    /// `Ok(n)` means all `n` messages completed. On failure the messages
    /// before [`TransferFailure::index`] completed. A STOP ends every
    /// transfer that put anything on the wire.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] at index 0 while another transfer runs,
    /// [`Error::InvalidRequest`] for an address above 0x7F,
    /// [`Error::Nack`] when a peripheral declines an address or data byte,
    /// [`Error::BusTimeout`] on an over-long clock stretch,
    /// [`Error::BusStuck`] when SDA stays low through the STOP,
    /// [`Error::InvalidBlockLength`] for an unusable SMBus block count.
    pub fn transfer(&self, msgs: &mut [I2cMsg<'_>]) -> TransferResult {
        if msgs.is_empty() {
            return Ok(0);
        }
        let busy = TransferFailure {
            index: 0,
            error: Error::Busy,
        };
        let Some(_claim) = self.bus.claim() else {
            self.log_failure(&busy);
            return Err(busy);
        };
        let Ok(mut engine) = self.bus.engine.try_borrow_mut() else {
            self.log_failure(&busy);
            return Err(busy);
        };

        let mut result = Ok(msgs.len());
        for index in 0..msgs.len() {
            let new_segment = !continues_at(msgs, index);
            let last_of_segment = !continues_at(msgs, index + 1);
            let Some(msg) = msgs.get_mut(index) else {
                break;
            };
            if let Err(error) = exchange(&mut engine, msg, new_segment, last_of_segment) {
                result = Err(TransferFailure { index, error });
                break;
            }
            self.log_message(index, msg);
        }

        // An invalid first message never reaches the wire.
        let touched = !matches!(
            result,
            Err(TransferFailure {
                index: 0,
                error: Error::InvalidRequest
            })
        );
        if touched {
            if let Err(error) = engine.stop() {
                if let Ok(count) = result {
                    result = Err(TransferFailure {
                        index: count.saturating_sub(1),
                        error,
                    });
                }
            }
        }

        if let Err(failure) = &result {
            self.log_failure(failure);
        }
        result
    }

    pub(crate) fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if let Ok(mut logger) = self.logger.try_borrow_mut() {
            logger.log(level, args);
        }
    }

    fn log_message(&self, index: usize, msg: &I2cMsg<'_>) {
        self.log(
            LogLevel::Debug,
            format_args!(
                "msg {index}: addr 0x{:02X} {:?} len {} [{}]",
                msg.addr,
                msg.direction(),
                msg.len(),
                HexBytes(msg.payload())
            ),
        );
    }

    fn log_failure(&self, failure: &TransferFailure) {
        self.log(
            LogLevel::Error,
            format_args!("transfer failed at msg {}: {}", failure.index, failure.error),
        );
    }
}

/// Whether message `index` carries on the segment of the message before it.
fn continues_at(msgs: &[I2cMsg<'_>], index: usize) -> bool {
    let prev = index.checked_sub(1).and_then(|prev| msgs.get(prev));
    match (prev, msgs.get(index)) {
        (Some(prev), Some(msg)) => msg.continues(prev),
        _ => false,
    }
}

fn validate(msg: &I2cMsg<'_>) -> Result<(), Error> {
    if msg.addr > MAX_ADDR {
        return Err(Error::InvalidRequest);
    }
    if matches!(&msg.buf, MsgBuf::ReadBlock(buffer) if buffer.is_empty()) {
        return Err(Error::InvalidRequest);
    }
    Ok(())
}

fn exchange<P, D>(
    engine: &mut BitBangEngine<P, D>,
    msg: &mut I2cMsg<'_>,
    new_segment: bool,
    last_of_segment: bool,
) -> Result<(), Error>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    validate(msg)?;

    if new_segment {
        engine.start()?;
        if engine.write_byte(address_byte(msg.addr, msg.direction()))? == AckStatus::Nack {
            return Err(Error::Nack(NoAcknowledgeSource::Address));
        }
    }

    match &mut msg.buf {
        MsgBuf::Write(bytes) => {
            for &byte in bytes.iter() {
                if engine.write_byte(byte)? == AckStatus::Nack {
                    return Err(Error::Nack(NoAcknowledgeSource::Data));
                }
            }
        }
        // Nothing to keep, but the peripheral is already driving its first
        // bit. Take the byte and NACK it so SDA is free for the STOP.
        MsgBuf::Read(buffer) if buffer.is_empty() => {
            let _ = engine.read_byte(false)?;
        }
        MsgBuf::Read(buffer) => {
            let len = buffer.len();
            for (i, slot) in buffer.iter_mut().enumerate() {
                let last = last_of_segment && i + 1 == len;
                *slot = engine.read_byte(!last)?;
            }
        }
        MsgBuf::ReadBlock(buffer) => read_block(engine, buffer)?,
    }
    Ok(())
}

/// Count byte first, then that many data bytes. A count of zero, above
/// [`SMBUS_BLOCK_MAX`] or beyond the buffer is NACKed and rejected.
fn read_block<P, D>(engine: &mut BitBangEngine<P, D>, buffer: &mut [u8]) -> Result<(), Error>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    let Some((count_slot, data)) = buffer.split_first_mut() else {
        return Err(Error::InvalidRequest);
    };
    let capacity = data.len().min(SMBUS_BLOCK_MAX);
    let usable = |count: u8| count > 0 && usize::from(count) <= capacity;

    let count = engine.read_byte_with(usable)?;
    *count_slot = count;
    if !usable(count) {
        return Err(Error::InvalidBlockLength(count));
    }

    let len = usize::from(count);
    for (i, slot) in data.iter_mut().take(len).enumerate() {
        *slot = engine.read_byte(i + 1 < len)?;
    }
    Ok(())
}

impl<P, D, L> I2cAlgorithm for I2cController<P, D, L>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    L: Logger,
{
    fn master_xfer(&self, msgs: &mut [I2cMsg<'_>]) -> Result<usize, Error> {
        match self.transfer(msgs) {
            Ok(count) => Ok(count),
            Err(TransferFailure { index, .. }) if index > 0 => Ok(index),
            Err(TransferFailure { error, .. }) => Err(error),
        }
    }

    fn smbus_xfer(
        &self,
        addr: SevenBitAddress,
        direction: Direction,
        command: u8,
        size: SmbusSize,
        data: &mut SmbusData,
    ) -> Result<(), Error> {
        smbus::emulate(addr, direction, command, size, data, |msgs| {
            self.transfer(msgs)
        })
    }

    fn functionality(&self) -> Functionality {
        FUNCTIONALITY
    }
}

impl<P, D, L> embedded_hal::i2c::ErrorType for I2cController<P, D, L>
where
    L: Logger,
{
    type Error = Error;
}

impl<P, D, L> embedded_hal::i2c::I2c for I2cController<P, D, L>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    L: Logger,
{
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        // Adjacent operations of the same type share one START and address.
        let mut msgs: heapless::Vec<I2cMsg<'_>, MAX_OPERATIONS> = heapless::Vec::new();
        let mut prev_read = None;
        for op in operations.iter_mut() {
            let (msg, is_read) = match op {
                Operation::Read(buffer) => (I2cMsg::read(address, buffer), true),
                Operation::Write(bytes) => (I2cMsg::write(address, bytes), false),
            };
            let msg = if prev_read == Some(is_read) {
                msg.without_start()
            } else {
                msg
            };
            prev_read = Some(is_read);
            msgs.push(msg).map_err(|_| Error::InvalidRequest)?;
        }
        self.transfer(&mut msgs)
            .map(|_| ())
            .map_err(|failure| failure.error)
    }
}
