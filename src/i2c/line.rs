// Licensed under the Apache-2.0 license

//! Line controller: ownership and level control of the SCL/SDA pair.
//!
//! Both lines are open-drain. A line is either driven low by us or released,
//! in which case the pull-up (or a peripheral) decides its level. Nothing
//! here waits; settling delays belong to the protocol engine.

use crate::gpio::{GpioController, PinId};
use crate::i2c::error::Error;
use embedded_hal::digital::{InputPin, OutputPin};

/// Which of the two bus lines an operation addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Clock,
    Data,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DriveState {
    DrivenLow,
    Released,
}

pub struct DigitalLine<P> {
    id: PinId,
    pin: P,
    state: DriveState,
}

impl<P: InputPin + OutputPin> DigitalLine<P> {
    fn new(id: PinId, pin: P) -> Self {
        Self {
            id,
            pin,
            state: DriveState::Released,
        }
    }

    #[must_use]
    pub fn id(&self) -> PinId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> DriveState {
        self.state
    }

    fn drive_low(&mut self) -> Result<(), Error> {
        self.pin.set_low().map_err(Error::line)?;
        self.state = DriveState::DrivenLow;
        Ok(())
    }

    fn release(&mut self) -> Result<(), Error> {
        self.pin.set_high().map_err(Error::line)?;
        self.state = DriveState::Released;
        Ok(())
    }

    fn sample(&mut self) -> Result<bool, Error> {
        self.pin.is_high().map_err(Error::line)
    }
}

/// Exclusive owner of the clock and data lines of one bus.
pub struct BusLines<P> {
    clock: DigitalLine<P>,
    data: DigitalLine<P>,
}

impl<P: InputPin + OutputPin> BusLines<P> {
    /// Claim both lines from the GPIO subsystem and release them.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if the pins coincide or do not exist,
    /// [`Error::ResourceExhausted`] if either is owned elsewhere. On failure no
    /// line stays claimed.
    pub fn acquire<G>(gpio: &mut G, clock_pin: PinId, data_pin: PinId) -> Result<Self, Error>
    where
        G: GpioController<Line = P>,
    {
        if clock_pin == data_pin {
            return Err(Error::InvalidConfiguration);
        }
        let clock = gpio.request(clock_pin)?;
        let data = match gpio.request(data_pin) {
            Ok(data) => data,
            Err(err) => {
                gpio.free(clock_pin, clock);
                return Err(err.into());
            }
        };

        let mut lines = Self {
            clock: DigitalLine::new(clock_pin, clock),
            data: DigitalLine::new(data_pin, data),
        };
        if let Err(err) = lines.release_all() {
            lines.release(gpio);
            return Err(err);
        }
        Ok(lines)
    }

    /// Hand both lines back, released.
    pub fn release<G>(mut self, gpio: &mut G)
    where
        G: GpioController<Line = P>,
    {
        // Best effort: the pins go back to the GPIO subsystem regardless.
        let _ = self.data.release();
        let _ = self.clock.release();
        gpio.free(self.clock.id, self.clock.pin);
        gpio.free(self.data.id, self.data.pin);
    }

    pub fn drive_low(&mut self, line: Line) -> Result<(), Error> {
        self.line_mut(line).drive_low()
    }

    pub fn release_line(&mut self, line: Line) -> Result<(), Error> {
        self.line_mut(line).release()
    }

    /// Instantaneous level of `line`, `true` for high.
    pub fn sample(&mut self, line: Line) -> Result<bool, Error> {
        self.line_mut(line).sample()
    }

    /// Release both lines. Data goes first so a low clock does not frame a
    /// STOP on the way out.
    pub fn release_all(&mut self) -> Result<(), Error> {
        let data = self.data.release();
        let clock = self.clock.release();
        data.and(clock)
    }

    #[must_use]
    pub fn line(&self, line: Line) -> &DigitalLine<P> {
        match line {
            Line::Clock => &self.clock,
            Line::Data => &self.data,
        }
    }

    fn line_mut(&mut self, line: Line) -> &mut DigitalLine<P> {
        match line {
            Line::Clock => &mut self.clock,
            Line::Data => &mut self.data,
        }
    }
}
