// Licensed under the Apache-2.0 license

//! GPIO subsystem interface.
//!
//! The bus driver never configures pin multiplexing itself. It asks a
//! [`GpioController`] for exclusive ownership of a line by logical pin number
//! and hands the line back when it is done. A line is any
//! `embedded_hal::digital` pin that is both readable and writable; it must be
//! configured open-drain with a pull-up, so `set_low` drives the wire and
//! `set_high` releases it.

use core::fmt;
use embedded_hal::digital::{InputPin, OutputPin};

/// Logical GPIO pin number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinId(pub u32);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpio{}", self.0)
    }
}

/// Reasons a pin request can be refused.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GpioError {
    /// The pin number does not exist on this controller.
    InvalidPin(PinId),
    /// The pin is already owned by another user.
    AlreadyClaimed(PinId),
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpioError::InvalidPin(pin) => write!(f, "{pin} does not exist"),
            GpioError::AlreadyClaimed(pin) => write!(f, "{pin} is already claimed"),
        }
    }
}

/// Hands out exclusive open-drain lines.
pub trait GpioController {
    type Line: InputPin + OutputPin;

    /// Claim a line for exclusive use.
    ///
    /// # Errors
    ///
    /// [`GpioError::InvalidPin`] if `pin` is unknown,
    /// [`GpioError::AlreadyClaimed`] if someone else owns it.
    fn request(&mut self, pin: PinId) -> Result<Self::Line, GpioError>;

    /// Return a previously claimed line.
    fn free(&mut self, pin: PinId, line: Self::Line);
}
