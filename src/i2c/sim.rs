// Licensed under the Apache-2.0 license

//! Simulated open-drain I2C bus used by the unit tests.
//!
//! Line levels are the wired-AND of every driver: the master pins handed
//! out by [`SimGpio`], the attached [`SimDevice`]s and an optional clock
//! stretch. Every level change is recorded, and a passive monitor decodes
//! START, STOP and acknowledged bytes from the edges, so tests assert on
//! what actually appeared on the wire.

use crate::gpio::{GpioController, GpioError, PinId};
use crate::i2c::line::Line;
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::vec::Vec;

pub type SharedBus = Rc<RefCell<SimBus>>;

/// What the monitor decoded from the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    Stop,
    /// Eight data bits followed by the ninth-clock acknowledge.
    Byte { value: u8, ack: bool },
}

#[derive(Default)]
struct Monitor {
    active: bool,
    shift: u8,
    bits: u8,
    events: Vec<BusEvent>,
}

impl Monitor {
    fn start(&mut self) {
        self.events.push(BusEvent::Start);
        self.active = true;
        self.shift = 0;
        self.bits = 0;
    }

    fn stop(&mut self) {
        self.events.push(BusEvent::Stop);
        self.active = false;
    }

    fn rising(&mut self, sda: bool) {
        if !self.active {
            return;
        }
        if self.bits < 8 {
            self.shift = (self.shift << 1) | u8::from(sda);
            self.bits += 1;
        } else {
            self.events.push(BusEvent::Byte {
                value: self.shift,
                ack: !sda,
            });
            self.shift = 0;
            self.bits = 0;
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AfterAck {
    Receive,
    Transmit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Address { shift: u8, bits: u8 },
    /// Ninth clock of a byte this device received and acknowledged.
    AckWindow(AfterAck),
    Receive { shift: u8, bits: u8 },
    /// `bits` counts bits already clocked out of `byte`.
    Transmit { byte: u8, bits: u8 },
    MasterAck { acked: Option<bool> },
    Ignore,
}

/// EEPROM-like target: the first byte written sets the register pointer,
/// later written bytes are stored there, reads stream out from the pointer.
pub struct SimDevice {
    addr: u8,
    memory: Vec<u8>,
    pointer: u8,
    nack_address: bool,
    nack_write_at: Option<usize>,
    writes_seen: usize,
    phase: Phase,
    drive_low: bool,
    received: Vec<u8>,
    sent: Vec<u8>,
}

impl SimDevice {
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            memory: vec![0; 256],
            pointer: 0,
            nack_address: false,
            nack_write_at: None,
            writes_seen: 0,
            phase: Phase::Idle,
            drive_low: false,
            received: Vec::new(),
            sent: Vec::new(),
        }
    }

    pub fn with_memory(mut self, offset: u8, bytes: &[u8]) -> Self {
        let start = usize::from(offset);
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Refuse every address match.
    pub fn nacking_address(mut self) -> Self {
        self.nack_address = true;
        self
    }

    /// Refuse the `index`-th byte written after an address match.
    pub fn nacking_write(mut self, index: usize) -> Self {
        self.nack_write_at = Some(index);
        self
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }

    pub fn memory(&self, offset: u8, len: usize) -> &[u8] {
        let start = usize::from(offset);
        &self.memory[start..start + len]
    }

    /// Bytes received since creation, pointer bytes included.
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    /// Bytes this device started to transmit.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    fn on_start(&mut self) {
        self.phase = Phase::Address { shift: 0, bits: 0 };
        self.drive_low = false;
    }

    fn on_stop(&mut self) {
        self.phase = Phase::Idle;
        self.drive_low = false;
    }

    fn on_rising(&mut self, sda: bool) {
        self.phase = match self.phase {
            Phase::Address { shift, bits } if bits < 8 => Phase::Address {
                shift: (shift << 1) | u8::from(sda),
                bits: bits + 1,
            },
            Phase::Receive { shift, bits } if bits < 8 => Phase::Receive {
                shift: (shift << 1) | u8::from(sda),
                bits: bits + 1,
            },
            Phase::Transmit { byte, bits } => Phase::Transmit {
                byte,
                bits: bits + 1,
            },
            Phase::MasterAck { .. } => Phase::MasterAck { acked: Some(!sda) },
            other => other,
        };
    }

    fn on_falling(&mut self) {
        match self.phase {
            Phase::Address { shift, bits: 8 } => {
                let read = shift & 1 == 1;
                if shift >> 1 == self.addr && !self.nack_address {
                    self.drive_low = true;
                    self.writes_seen = 0;
                    self.phase = Phase::AckWindow(if read {
                        AfterAck::Transmit
                    } else {
                        AfterAck::Receive
                    });
                } else {
                    self.phase = Phase::Ignore;
                }
            }
            Phase::Receive { shift, bits: 8 } => {
                let index = self.writes_seen;
                self.writes_seen += 1;
                if self.nack_write_at == Some(index) {
                    self.phase = Phase::Ignore;
                    return;
                }
                self.received.push(shift);
                if index == 0 {
                    self.pointer = shift;
                } else {
                    self.memory[usize::from(self.pointer)] = shift;
                    self.pointer = self.pointer.wrapping_add(1);
                }
                self.drive_low = true;
                self.phase = Phase::AckWindow(AfterAck::Receive);
            }
            Phase::AckWindow(next) => {
                self.drive_low = false;
                match next {
                    AfterAck::Receive => self.phase = Phase::Receive { shift: 0, bits: 0 },
                    AfterAck::Transmit => self.load_next(),
                }
            }
            Phase::Transmit { byte, bits } if bits < 8 => {
                self.drive_low = byte & (0x80 >> bits) == 0;
            }
            Phase::Transmit { .. } => {
                self.drive_low = false;
                self.phase = Phase::MasterAck { acked: None };
            }
            Phase::MasterAck { acked: Some(true) } => self.load_next(),
            Phase::MasterAck { .. } => {
                self.drive_low = false;
                self.phase = Phase::Ignore;
            }
            _ => {}
        }
    }

    fn load_next(&mut self) {
        let byte = self.memory[usize::from(self.pointer)];
        self.pointer = self.pointer.wrapping_add(1);
        self.sent.push(byte);
        self.drive_low = byte & 0x80 == 0;
        self.phase = Phase::Transmit { byte, bits: 0 };
    }
}

struct Stretch {
    at_release: usize,
    polls: u32,
}

pub struct SimBus {
    master_scl_low: bool,
    master_sda_low: bool,
    stretch_scl_low: bool,
    stuck_sda_low: bool,
    stretch_remaining: u32,
    stretch: Option<Stretch>,
    scl_releases: usize,
    levels: (bool, bool),
    trace: Vec<(bool, bool)>,
    monitor: Monitor,
    devices: Vec<SimDevice>,
}

impl SimBus {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> SharedBus {
        Rc::new(RefCell::new(Self {
            master_scl_low: false,
            master_sda_low: false,
            stretch_scl_low: false,
            stuck_sda_low: false,
            stretch_remaining: 0,
            stretch: None,
            scl_releases: 0,
            levels: (true, true),
            trace: Vec::new(),
            monitor: Monitor::default(),
            devices: Vec::new(),
        }))
    }

    pub fn with_devices(devices: impl IntoIterator<Item = SimDevice>) -> SharedBus {
        let bus = Self::new();
        bus.borrow_mut().devices.extend(devices);
        bus
    }

    pub fn device(&self, addr: u8) -> &SimDevice {
        self.devices
            .iter()
            .find(|dev| dev.addr() == addr)
            .expect("no simulated device at that address")
    }

    /// Hold SCL low for `polls` samples when the master releases it for the
    /// `nth` time from now (1-based).
    pub fn stretch_clock(&mut self, nth: usize, polls: u32) {
        self.stretch = Some(Stretch {
            at_release: self.scl_releases + nth,
            polls,
        });
    }

    /// Hold SDA low regardless of every driver, like a wedged peripheral.
    pub fn hold_data_low(&mut self, low: bool) {
        self.stuck_sda_low = low;
        self.settle();
    }

    /// Current `(scl, sda)` levels.
    pub fn levels(&self) -> (bool, bool) {
        self.levels
    }

    pub fn master_released(&self) -> bool {
        !self.master_scl_low && !self.master_sda_low
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.monitor.events
    }

    pub fn clear_events(&mut self) {
        self.monitor.events.clear();
        self.trace.clear();
    }

    /// Every `(scl, sda)` level pair the bus went through.
    pub fn trace(&self) -> &[(bool, bool)] {
        &self.trace
    }

    fn drive(&mut self, line: Line, low: bool) {
        match line {
            Line::Clock => {
                if self.master_scl_low && !low {
                    self.scl_releases += 1;
                    if self
                        .stretch
                        .as_ref()
                        .is_some_and(|s| s.at_release == self.scl_releases)
                    {
                        let stretch = self.stretch.take().expect("checked above");
                        self.stretch_scl_low = true;
                        self.stretch_remaining = stretch.polls;
                    }
                }
                self.master_scl_low = low;
            }
            Line::Data => self.master_sda_low = low,
        }
        self.settle();
    }

    fn sample(&mut self, line: Line) -> bool {
        if line == Line::Clock && self.stretch_scl_low {
            if self.stretch_remaining > 0 {
                self.stretch_remaining -= 1;
            } else {
                self.stretch_scl_low = false;
                self.settle();
            }
        }
        match line {
            Line::Clock => self.levels.0,
            Line::Data => self.levels.1,
        }
    }

    fn scl_level(&self) -> bool {
        !(self.master_scl_low || self.stretch_scl_low)
    }

    fn sda_level(&self) -> bool {
        !(self.master_sda_low
            || self.stuck_sda_low
            || self.devices.iter().any(|dev| dev.drive_low))
    }

    fn record(&mut self, levels: (bool, bool)) {
        self.levels = levels;
        self.trace.push(levels);
    }

    fn settle(&mut self) {
        let (prev_scl, prev_sda) = self.levels;
        let (scl, sda) = (self.scl_level(), self.sda_level());
        if (scl, sda) == (prev_scl, prev_sda) {
            return;
        }
        self.record((scl, sda));

        if prev_scl && scl {
            if sda {
                self.monitor.stop();
                self.devices.iter_mut().for_each(SimDevice::on_stop);
            } else {
                self.monitor.start();
                self.devices.iter_mut().for_each(SimDevice::on_start);
            }
        } else if !prev_scl && scl {
            self.monitor.rising(sda);
            for dev in &mut self.devices {
                dev.on_rising(sda);
            }
        } else if prev_scl && !scl {
            self.devices.iter_mut().for_each(SimDevice::on_falling);
            let settled = self.sda_level();
            if settled != sda {
                self.record((scl, settled));
            }
        }
    }
}

/// A master-side GPIO line on the simulated bus.
pub struct SimPin {
    bus: SharedBus,
    line: Line,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.bus.borrow_mut().drive(self.line, true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.bus.borrow_mut().drive(self.line, false);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.bus.borrow_mut().sample(self.line))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// GPIO controller exposing exactly the two bus pins.
pub struct SimGpio {
    bus: SharedBus,
    clock: PinId,
    data: PinId,
    claimed: HashSet<PinId>,
}

impl SimGpio {
    pub fn new(bus: SharedBus, clock: PinId, data: PinId) -> Self {
        Self {
            bus,
            clock,
            data,
            claimed: HashSet::new(),
        }
    }

    pub fn is_claimed(&self, pin: PinId) -> bool {
        self.claimed.contains(&pin)
    }

    /// Mark `pin` as owned by some other driver.
    pub fn claim_elsewhere(&mut self, pin: PinId) {
        self.claimed.insert(pin);
    }
}

impl GpioController for SimGpio {
    type Line = SimPin;

    fn request(&mut self, pin: PinId) -> Result<SimPin, GpioError> {
        let line = if pin == self.clock {
            Line::Clock
        } else if pin == self.data {
            Line::Data
        } else {
            return Err(GpioError::InvalidPin(pin));
        };
        if !self.claimed.insert(pin) {
            return Err(GpioError::AlreadyClaimed(pin));
        }
        Ok(SimPin {
            bus: self.bus.clone(),
            line,
        })
    }

    fn free(&mut self, pin: PinId, _line: SimPin) {
        self.claimed.remove(&pin);
    }
}

/// Delay that only accumulates the requested time.
#[derive(Clone, Default)]
pub struct SimDelay {
    elapsed: Rc<Cell<u64>>,
}

impl SimDelay {
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed.get()
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed.set(self.elapsed.get() + u64::from(ns));
    }
}

/// Number of SDA transitions in `trace` made while SCL stayed high.
pub fn sda_edges_while_scl_high(trace: &[(bool, bool)]) -> usize {
    trace
        .windows(2)
        .filter(|pair| pair[0].0 && pair[1].0 && pair[0].1 != pair[1].1)
        .count()
}
