#![allow(dead_code)]

use bme280_mux::cache::Clock;
use core::convert::Infallible;
use core::time::Duration;
use eh1::spi::{ErrorKind, Operation};
use ehm::eh1::i2c::Transaction;
use std::cell::Cell;
use std::rc::Rc;

pub const ADDR: u8 = 0x76;

/// Calibration registers `0x88..=0xA1` of the datasheet example sensor.
pub const CAL_TP: [u8; 26] = [
    0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27, 0x0B, 0x8C,
    0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17, 0x00, 0x4B,
];

/// Calibration registers `0xE1..=0xE7`.
pub const CAL_H: [u8; 7] = [0x72, 0x01, 0x00, 0x13, 0x29, 0x03, 0x1E];

/// 1006.53 hPa, 25.1 °C, 39.9 %RH.
pub const DATA_A: [u8; 8] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x6A, 0x00];

/// 1048.68 hPa, 27.7 °C, 48.7 %RH.
pub const DATA_B: [u8; 8] = [0x60, 0x00, 0x00, 0x81, 0x00, 0x00, 0x70, 0x00];

/// Chip ID through the calibration-ready poll, with default options.
pub fn init_transactions() -> Vec<Transaction> {
    init_transactions_with(0x25)
}

pub fn init_transactions_with(ctrl_meas: u8) -> Vec<Transaction> {
    vec![
        Transaction::write_read(ADDR, vec![0xD0], vec![0x60]),
        Transaction::write(ADDR, vec![0xE0, 0xB6]),
        Transaction::write_read(ADDR, vec![0x88], CAL_TP.to_vec()),
        Transaction::write_read(ADDR, vec![0xE1], CAL_H.to_vec()),
        Transaction::write(ADDR, vec![0xF2, 0x01]),
        Transaction::write(ADDR, vec![0xF5, 0xA0]),
        Transaction::write(ADDR, vec![0xF4, ctrl_meas]),
        Transaction::write_read(ADDR, vec![0xF3], vec![0x00]),
    ]
}

/// Forced measurement trigger followed by the data burst.
pub fn fetch_transactions(data: [u8; 8]) -> Vec<Transaction> {
    vec![
        Transaction::write(ADDR, vec![0xF4, 0x25]),
        Transaction::write_read(ADDR, vec![0xF3], vec![0x00]),
        Transaction::write_read(ADDR, vec![0xF7], data.to_vec()),
    ]
}

/// Delay that records its calls instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct Delays {
    calls: Rc<Cell<u32>>,
    total_ns: Rc<Cell<u64>>,
}

impl Delays {
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_ns.get())
    }
}

impl eh1::delay::DelayNs for Delays {
    fn delay_ns(&mut self, ns: u32) {
        self.calls.set(self.calls.get() + 1);
        self.total_ns.set(self.total_ns.get() + u64::from(ns));
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<Duration>>);

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> Duration {
        self.0.get()
    }
}

/// GPIO line shared by every clone, like a wire between two processes.
#[derive(Debug, Clone, Default)]
pub struct Line(Rc<Cell<bool>>);

impl Line {
    pub fn new(high: bool) -> Self {
        Line(Rc::new(Cell::new(high)))
    }

    pub fn is_set(&self) -> bool {
        self.0.get()
    }

    pub fn drive(&self, high: bool) {
        self.0.set(high)
    }
}

impl eh1::digital::ErrorType for Line {
    type Error = Infallible;
}

impl eh1::digital::InputPin for Line {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.get())
    }
}

impl eh1::digital::OutputPin for Line {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

/// Decoder address currently driven on the select lines.
pub fn address_of(select: &[Line; 3]) -> u8 {
    select
        .iter()
        .enumerate()
        .map(|(n, line)| u8::from(line.is_set()) << n)
        .sum()
}

pub fn select_lines() -> [Line; 3] {
    [Line::new(false), Line::new(false), Line::new(false)]
}

/// SPI device whose transactions always fail.
#[derive(Debug, Default)]
pub struct FailingSpi {
    pub transactions: u32,
}

impl eh1::spi::ErrorType for FailingSpi {
    type Error = ErrorKind;
}

impl eh1::spi::SpiDevice for FailingSpi {
    fn transaction(&mut self, _: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.transactions += 1;
        Err(ErrorKind::Other)
    }
}
