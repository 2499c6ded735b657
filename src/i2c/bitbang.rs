// Licensed under the Apache-2.0 license

//! Bit-level I2C protocol engine.
//!
//! Sequences START, STOP and byte transfers over a [`BusLines`] pair. All
//! timing goes through the injected `DelayNs`, so the same engine runs
//! against real pins and against the simulated bus in the tests.
//!
//! SDA only changes while SCL is low, except for the START edge (SDA
//! falling with SCL high) and the STOP edge (SDA rising with SCL high).

use crate::i2c::common::{AckStatus, BusTiming, Direction};
use crate::i2c::error::Error;
use crate::i2c::line::{BusLines, Line};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::SevenBitAddress;

/// Clock pulses a peripheral gets to finish the byte it is sending.
const RECOVERY_CLOCKS: usize = 9;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusState {
    Idle,
    Started,
}

/// First byte of every message: the address followed by the R/W bit.
#[must_use]
pub const fn address_byte(addr: SevenBitAddress, direction: Direction) -> u8 {
    (addr << 1) | direction as u8
}

pub struct BitBangEngine<P, D> {
    lines: BusLines<P>,
    delay: D,
    timing: BusTiming,
    state: BusState,
}

impl<P, D> BitBangEngine<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(lines: BusLines<P>, delay: D, timing: BusTiming) -> Self {
        Self {
            lines,
            delay,
            timing,
            state: BusState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> BusState {
        self.state
    }

    pub fn into_parts(self) -> (BusLines<P>, D) {
        (self.lines, self.delay)
    }

    /// Issue a START, or a repeated START when already started.
    ///
    /// Both cases produce the same edges: SDA released, SCL released, SDA
    /// pulled low while SCL is high, SCL pulled low.
    ///
    /// # Errors
    ///
    /// [`Error::BusTimeout`] if a peripheral keeps SCL low.
    pub fn start(&mut self) -> Result<(), Error> {
        self.lines.release_line(Line::Data)?;
        self.half_period();
        self.clock_high()?;
        self.lines.drive_low(Line::Data)?;
        self.half_period();
        self.lines.drive_low(Line::Clock)?;
        self.state = BusState::Started;
        Ok(())
    }

    /// Issue a STOP and return to idle.
    ///
    /// If a peripheral is still holding SDA low afterwards, SCL is pulsed
    /// until it lets go (at most nine times) and the STOP is sent again.
    /// Both lines end up released even when the clock release times out; in
    /// that case the error is still reported.
    ///
    /// # Errors
    ///
    /// [`Error::BusTimeout`] if a peripheral keeps SCL low,
    /// [`Error::BusStuck`] if SDA is still low after recovery.
    pub fn stop(&mut self) -> Result<(), Error> {
        self.state = BusState::Idle;
        self.stop_condition()?;
        if self.lines.sample(Line::Data)? {
            return Ok(());
        }
        self.recover()
    }

    fn stop_condition(&mut self) -> Result<(), Error> {
        self.lines.drive_low(Line::Clock)?;
        self.lines.drive_low(Line::Data)?;
        self.half_period();
        let raised = self.clock_high();
        self.lines.release_line(Line::Data)?;
        self.half_period();
        raised
    }

    /// Clock out whatever a peripheral is still sending, then STOP again.
    fn recover(&mut self) -> Result<(), Error> {
        for _ in 0..RECOVERY_CLOCKS {
            self.lines.drive_low(Line::Clock)?;
            self.half_period();
            self.clock_high()?;
            if self.lines.sample(Line::Data)? {
                break;
            }
        }
        self.stop_condition()?;
        if self.lines.sample(Line::Data)? {
            Ok(())
        } else {
            Err(Error::BusStuck)
        }
    }

    /// Clock out one byte MSB first and sample the acknowledge bit.
    ///
    /// # Errors
    ///
    /// [`Error::BusTimeout`] on an over-long clock stretch.
    pub fn write_byte(&mut self, byte: u8) -> Result<AckStatus, Error> {
        for bit in (0..8).rev() {
            self.set_data(byte & (1 << bit) != 0)?;
            self.half_period();
            self.clock_high()?;
            self.lines.drive_low(Line::Clock)?;
        }

        self.lines.release_line(Line::Data)?;
        self.half_period();
        self.clock_high()?;
        let nack = self.lines.sample(Line::Data)?;
        self.lines.drive_low(Line::Clock)?;

        Ok(if nack { AckStatus::Nack } else { AckStatus::Ack })
    }

    /// Clock in one byte and answer with ACK when `send_ack` is set.
    ///
    /// # Errors
    ///
    /// [`Error::BusTimeout`] on an over-long clock stretch.
    pub fn read_byte(&mut self, send_ack: bool) -> Result<u8, Error> {
        self.read_byte_with(|_| send_ack)
    }

    /// Clock in one byte and let `ack_if` decide the acknowledge from its
    /// value. Used where the byte itself says whether more data follows.
    ///
    /// # Errors
    ///
    /// [`Error::BusTimeout`] on an over-long clock stretch.
    pub fn read_byte_with<F>(&mut self, ack_if: F) -> Result<u8, Error>
    where
        F: FnOnce(u8) -> bool,
    {
        self.lines.release_line(Line::Data)?;
        let mut byte = 0u8;
        for _ in 0..8 {
            self.half_period();
            self.clock_high()?;
            byte = (byte << 1) | u8::from(self.lines.sample(Line::Data)?);
            self.lines.drive_low(Line::Clock)?;
        }

        self.set_data(!ack_if(byte))?;
        self.half_period();
        self.clock_high()?;
        self.lines.drive_low(Line::Clock)?;
        self.lines.release_line(Line::Data)?;

        Ok(byte)
    }

    /// Release both lines without any protocol sequencing.
    pub fn release_bus(&mut self) -> Result<(), Error> {
        self.state = BusState::Idle;
        self.lines.release_all()
    }

    fn set_data(&mut self, high: bool) -> Result<(), Error> {
        if high {
            self.lines.release_line(Line::Data)
        } else {
            self.lines.drive_low(Line::Data)
        }
    }

    /// Release SCL, wait out any clock stretching, then hold the high phase.
    fn clock_high(&mut self) -> Result<(), Error> {
        self.lines.release_line(Line::Clock)?;

        let limit_ns = u64::from(self.timing.stretch_timeout.ticks()) * 1_000;
        let step_ns = self.timing.poll_interval.ticks().max(1);
        let mut waited_ns = 0u64;
        while !self.lines.sample(Line::Clock)? {
            if waited_ns >= limit_ns {
                return Err(Error::BusTimeout);
            }
            self.delay.delay_ns(step_ns);
            waited_ns += u64::from(step_ns);
        }

        self.half_period();
        Ok(())
    }

    fn half_period(&mut self) {
        self.delay.delay_ns(self.timing.half_period.ticks());
    }
}
