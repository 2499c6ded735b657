// Licensed under the Apache-2.0 license

//! I2C System Setup Helper
//!
//! Attaches a bit-banged adapter to the host bus framework and detaches it
//! again. The framework's adapter table is reached through
//! [`AdapterRegistry`], the pins through [`GpioController`], so both sides
//! can be replaced by in-memory fakes.

use crate::common::{LogLevel, Logger};
use crate::gpio::GpioController;
use crate::i2c::common::{AdapterClass, BitBangConfig, Functionality, ADAPTER_NAME_MAX};
use crate::i2c::error::Error;
use crate::i2c::i2c_controller::{I2cController, FUNCTIONALITY};
use crate::i2c::line::BusLines;
use core::fmt;
use embedded_hal::delay::DelayNs;

/// What the host framework records about a registered adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterInfo {
    pub nr: u8,
    pub name: heapless::String<ADAPTER_NAME_MAX>,
    pub class: AdapterClass,
    pub functionality: Functionality,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The requested adapter number is taken.
    SlotInUse(u8),
    /// No adapter is registered under this number.
    NotRegistered(u8),
    /// The registry cannot hold another adapter.
    Full,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::SlotInUse(nr) => write!(f, "adapter {nr} already registered"),
            RegistryError::NotRegistered(nr) => write!(f, "adapter {nr} not registered"),
            RegistryError::Full => f.write_str("adapter registry full"),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::SlotInUse(_) | RegistryError::Full => Error::ResourceExhausted,
            RegistryError::NotRegistered(_) => Error::InvalidRequest,
        }
    }
}

/// Adapter table of the host bus framework.
pub trait AdapterRegistry {
    /// Register an adapter under the exact number in `info`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::SlotInUse`] if the number is taken.
    fn add_numbered_adapter(&mut self, info: &AdapterInfo) -> Result<(), RegistryError>;

    /// Remove the adapter registered under `nr`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] if nothing is registered there.
    fn del_adapter(&mut self, nr: u8) -> Result<(), RegistryError>;
}

/// An adapter together with the registration that exposes it.
pub struct RegisteredAdapter<P, D, L: Logger> {
    info: AdapterInfo,
    adapter: I2cController<P, D, L>,
}

impl<P, D, L: Logger> RegisteredAdapter<P, D, L> {
    #[must_use]
    pub fn info(&self) -> &AdapterInfo {
        &self.info
    }

    #[must_use]
    pub fn adapter(&self) -> &I2cController<P, D, L> {
        &self.adapter
    }

    /// Mutable access, needed for the `embedded_hal::i2c::I2c` methods.
    pub fn adapter_mut(&mut self) -> &mut I2cController<P, D, L> {
        &mut self.adapter
    }
}

/// Helper for attaching and detaching the bit-banged adapter
pub struct I2cSystemSetup;

impl I2cSystemSetup {
    /// Bring up the bus and register it with the host framework
    ///
    /// Validates `config`, claims both lines, builds the adapter and
    /// registers it under the configured number and name. Nothing stays
    /// claimed when any step fails.
    ///
    /// # Arguments
    ///
    /// * `gpio` - GPIO subsystem the lines are claimed from
    /// * `registry` - Adapter table of the host framework
    /// * `config` - Pins, timing and adapter identity
    /// * `delay` - Delay source for the protocol engine
    /// * `logger` - Sink for attach and transfer logs
    ///
    /// # Returns
    ///
    /// * `Result<RegisteredAdapter<..>, Error>` - The live adapter, or why it
    ///   could not be attached
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] for a bad config or unknown pin,
    /// [`Error::ResourceExhausted`] if a line or the adapter number is taken.
    pub fn attach<G, R, D, L>(
        gpio: &mut G,
        registry: &mut R,
        config: &BitBangConfig,
        delay: D,
        mut logger: L,
    ) -> Result<RegisteredAdapter<G::Line, D, L>, Error>
    where
        G: GpioController,
        R: AdapterRegistry,
        D: DelayNs,
        L: Logger,
    {
        let info = match Self::adapter_info(config) {
            Ok(info) => info,
            Err(err) => {
                logger.error(format_args!("invalid adapter configuration: {err}"));
                return Err(err);
            }
        };

        let lines = match BusLines::acquire(gpio, config.clock_pin, config.data_pin) {
            Ok(lines) => lines,
            Err(err) => {
                logger.error(format_args!(
                    "cannot claim {} (scl) and {} (sda): {err}",
                    config.clock_pin, config.data_pin
                ));
                return Err(err);
            }
        };

        if let Err(err) = registry.add_numbered_adapter(&info) {
            lines.release(gpio);
            logger.error(format_args!("cannot register adapter: {err}"));
            return Err(err.into());
        }

        logger.info(format_args!(
            "adapter {} \"{}\" attached, scl {} sda {}, {} Hz",
            info.nr,
            info.name,
            config.clock_pin,
            config.data_pin,
            config.speed.hz()
        ));
        Ok(RegisteredAdapter {
            info,
            adapter: I2cController::with_logger(lines, delay, config.timing, logger),
        })
    }

    /// Unregister the adapter and hand its lines back
    ///
    /// The bus is forced released and both lines are returned to `gpio`
    /// even when unregistering fails.
    ///
    /// # Arguments
    ///
    /// * `registered` - Adapter returned by [`I2cSystemSetup::attach`]
    /// * `gpio` - GPIO subsystem the lines came from
    /// * `registry` - Adapter table it was registered in
    ///
    /// # Returns
    ///
    /// * `Result<(D, L), Error>` - The delay and logger, or the unregister
    ///   failure
    ///
    /// # Errors
    ///
    /// Whatever [`AdapterRegistry::del_adapter`] reports.
    pub fn detach<G, R, D, L>(
        registered: RegisteredAdapter<G::Line, D, L>,
        gpio: &mut G,
        registry: &mut R,
    ) -> Result<(D, L), Error>
    where
        G: GpioController,
        R: AdapterRegistry,
        D: DelayNs,
        L: Logger,
    {
        let RegisteredAdapter { info, adapter } = registered;
        let unregistered = registry.del_adapter(info.nr);

        // Lines go back released even if the bus was left mid-transfer.
        let _ = adapter.release_bus();
        match unregistered {
            Ok(()) => adapter.log(LogLevel::Info, format_args!("adapter {} detached", info.nr)),
            Err(err) => adapter.log(
                LogLevel::Error,
                format_args!("adapter {} unregister failed: {err}", info.nr),
            ),
        }

        let (lines, delay, logger) = adapter.into_parts();
        lines.release(gpio);
        unregistered.map_err(Error::from)?;
        Ok((delay, logger))
    }

    /// Registry entry for `config`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `config` fails validation.
    pub fn adapter_info(config: &BitBangConfig) -> Result<AdapterInfo, Error> {
        config.validate()?;
        let mut name = heapless::String::new();
        name.push_str(config.adapter_name)
            .map_err(|()| Error::InvalidConfiguration)?;
        Ok(AdapterInfo {
            nr: config.adapter_nr,
            name,
            class: config.class,
            functionality: FUNCTIONALITY,
        })
    }
}
