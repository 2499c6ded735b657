// Licensed under the Apache-2.0 license

//! Bit-banged I2C master.
//!
//! Emulates the I2C bus protocol on two open-drain GPIO lines and exposes it
//! to a host bus framework. Layers, lowest first: [`line`] owns the pins,
//! [`bitbang`] sequences bits and bytes, [`i2c_controller`] runs message
//! transfers, [`smbus`] maps SMBus transactions onto them and
//! [`system_setup`] registers the result.

pub mod bitbang;
pub mod common;
pub mod error;
pub mod i2c_controller;
pub mod line;
pub mod msg;
pub mod smbus;
pub mod system_setup;
pub mod traits;

#[cfg(test)]
pub(crate) mod sim;

pub use common::{BitBangConfig, BitBangConfigBuilder, I2cSpeed};
pub use error::Error;
pub use i2c_controller::I2cController;
pub use msg::{I2cMsg, TransferFailure, TransferResult};
pub use system_setup::{AdapterRegistry, I2cSystemSetup};
pub use traits::I2cAlgorithm;
