// Licensed under the Apache-2.0 license

//! Common types and configuration for the bit-banged I2C bus.

use crate::gpio::PinId;
use crate::i2c::error::Error;
use core::ops::BitOr;
use fugit::{MicrosDurationU32, NanosDurationU32};

/// Reference wiring: clock on GPIO 4, data on GPIO 17.
pub const DEFAULT_CLOCK_PIN: PinId = PinId(4);
pub const DEFAULT_DATA_PIN: PinId = PinId(17);
/// Adapter slot requested from the host bus framework.
pub const DEFAULT_ADAPTER_NR: u8 = 7;
pub const DEFAULT_ADAPTER_NAME: &str = "gpio-i2c-bitbang";
/// Longest adapter name the registry accepts.
pub const ADAPTER_NAME_MAX: usize = 32;
pub const DEFAULT_STRETCH_TIMEOUT: MicrosDurationU32 = MicrosDurationU32::millis(100);
pub const DEFAULT_POLL_INTERVAL: NanosDurationU32 = NanosDurationU32::micros(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast = 400_000,
}

impl I2cSpeed {
    #[must_use]
    pub const fn hz(self) -> u32 {
        self as u32
    }

    /// Half of one SCL period: 5 µs at 100 kHz.
    #[must_use]
    pub const fn half_period(self) -> NanosDurationU32 {
        NanosDurationU32::from_ticks(1_000_000_000 / (2 * self.hz()))
    }
}

/// Data direction, encoded in the R/W bit of the address byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Acknowledge bit observed after a byte the master sent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum AckStatus {
    Ack,
    Nack,
}

/// Host framework adapter class, used for device probing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AdapterClass {
    Hwmon = 1 << 0,
    Spd = 1 << 7,
}

/// Capability mask with the Linux `I2C_FUNC_*` bit layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Functionality(u32);

impl Functionality {
    pub const I2C: Self = Self(0x0000_0001);
    pub const SMBUS_QUICK: Self = Self(0x0001_0000);
    pub const SMBUS_BYTE: Self = Self(0x0006_0000);
    pub const SMBUS_BYTE_DATA: Self = Self(0x0018_0000);
    pub const SMBUS_WORD_DATA: Self = Self(0x0060_0000);
    pub const SMBUS_BLOCK_DATA: Self = Self(0x0300_0000);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Functionality {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Bus timing handed to the protocol engine.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BusTiming {
    /// Time SCL is held in each phase of a bit.
    pub half_period: NanosDurationU32,
    /// Longest a peripheral may stretch the clock.
    pub stretch_timeout: MicrosDurationU32,
    /// Delay between samples of a stretched clock.
    pub poll_interval: NanosDurationU32,
}

pub struct BitBangConfig {
    pub clock_pin: PinId,
    pub data_pin: PinId,
    pub speed: I2cSpeed,
    pub timing: BusTiming,
    pub adapter_nr: u8,
    pub adapter_name: &'static str,
    pub class: AdapterClass,
}

impl BitBangConfig {
    /// Reject pin and timing combinations the bus cannot run with.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] when both lines share a pin, a timing
    /// value is zero, or the adapter name is empty or too long.
    pub fn validate(&self) -> Result<(), Error> {
        if self.clock_pin == self.data_pin
            || self.timing.half_period.ticks() == 0
            || self.timing.poll_interval.ticks() == 0
            || self.adapter_name.is_empty()
            || self.adapter_name.len() > ADAPTER_NAME_MAX
        {
            return Err(Error::InvalidConfiguration);
        }
        Ok(())
    }
}

impl Default for BitBangConfig {
    fn default() -> Self {
        BitBangConfigBuilder::new().build()
    }
}

pub struct BitBangConfigBuilder {
    clock_pin: PinId,
    data_pin: PinId,
    speed: I2cSpeed,
    half_period: Option<NanosDurationU32>,
    stretch_timeout: MicrosDurationU32,
    poll_interval: NanosDurationU32,
    adapter_nr: u8,
    adapter_name: &'static str,
    class: AdapterClass,
}

impl Default for BitBangConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BitBangConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock_pin: DEFAULT_CLOCK_PIN,
            data_pin: DEFAULT_DATA_PIN,
            speed: I2cSpeed::Standard,
            half_period: None,
            stretch_timeout: DEFAULT_STRETCH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            adapter_nr: DEFAULT_ADAPTER_NR,
            adapter_name: DEFAULT_ADAPTER_NAME,
            class: AdapterClass::Hwmon,
        }
    }
    #[must_use]
    pub fn pins(mut self, clock: PinId, data: PinId) -> Self {
        self.clock_pin = clock;
        self.data_pin = data;
        self
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.speed = speed;
        self
    }
    /// Override the half-period derived from the speed.
    #[must_use]
    pub fn half_period(mut self, half_period: NanosDurationU32) -> Self {
        self.half_period = Some(half_period);
        self
    }
    #[must_use]
    pub fn stretch_timeout(mut self, timeout: MicrosDurationU32) -> Self {
        self.stretch_timeout = timeout;
        self
    }
    #[must_use]
    pub fn poll_interval(mut self, interval: NanosDurationU32) -> Self {
        self.poll_interval = interval;
        self
    }
    #[must_use]
    pub fn adapter(mut self, nr: u8, name: &'static str) -> Self {
        self.adapter_nr = nr;
        self.adapter_name = name;
        self
    }
    #[must_use]
    pub fn class(mut self, class: AdapterClass) -> Self {
        self.class = class;
        self
    }
    #[must_use]
    pub fn build(self) -> BitBangConfig {
        BitBangConfig {
            clock_pin: self.clock_pin,
            data_pin: self.data_pin,
            speed: self.speed,
            timing: BusTiming {
                half_period: self.half_period.unwrap_or(self.speed.half_period()),
                stretch_timeout: self.stretch_timeout,
                poll_interval: self.poll_interval,
            },
            adapter_nr: self.adapter_nr,
            adapter_name: self.adapter_name,
            class: self.class,
        }
    }
}
