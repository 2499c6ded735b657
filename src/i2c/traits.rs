// Licensed under the Apache-2.0 license

//! Host bus framework view of an adapter.
//!
//! ```text
//! I2cAlgorithm
//!     ├── master_xfer   (generic messages)
//!     ├── smbus_xfer    (single SMBus transaction)
//!     └── functionality (capability mask)
//! ```

use crate::i2c::common::{Direction, Functionality};
use crate::i2c::error::Error;
use crate::i2c::msg::I2cMsg;
use crate::i2c::smbus::{SmbusData, SmbusSize};
use embedded_hal::i2c::SevenBitAddress;

/// Entry points a host bus framework calls on a registered adapter.
///
/// Methods take `&self`: a second call while one is running is refused with
/// [`Error::Busy`] rather than interleaved on the wire.
pub trait I2cAlgorithm {
    /// Service `msgs` in order.
    ///
    /// Returns the number of messages fully serviced. A failure after at
    /// least one message completed is reported through that count alone.
    ///
    /// # Errors
    ///
    /// The failure of the first message, including [`Error::Busy`].
    fn master_xfer(&self, msgs: &mut [I2cMsg<'_>]) -> Result<usize, Error>;

    /// Run one SMBus transaction. For reads `data` is replaced with the
    /// value received; for writes it must match `size`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] if `data` does not fit `size`, otherwise
    /// whatever the underlying transfer reports.
    fn smbus_xfer(
        &self,
        addr: SevenBitAddress,
        direction: Direction,
        command: u8,
        size: SmbusSize,
        data: &mut SmbusData,
    ) -> Result<(), Error>;

    fn functionality(&self) -> Functionality;
}
