//! BME280 driver for I2C and SPI buses, with measurement caching and
//! arbitration of multiplexed SPI sensors.
//!
//! The driver brings the sensor from an unknown state into a known
//! measurement configuration, converts the raw ADC codes to hPa, °C, and %RH,
//! and only talks to the sensor again once the cached values are stale.
//!
//! # Example
//!
//! ```
//! # use ehm::eh1::i2c::{Mock, Transaction};
//! # let i2c = Mock::new(&[
//! #   Transaction::write_read(0x76, vec![0xD0], vec![0x60]),
//! #   Transaction::write(0x76, vec![0xE0, 0xB6]),
//! #   Transaction::write_read(0x76, vec![0x88], vec![0; 26]),
//! #   Transaction::write_read(0x76, vec![0xE1], vec![0; 7]),
//! #   Transaction::write(0x76, vec![0xF2, 0x01]),
//! #   Transaction::write(0x76, vec![0xF5, 0xA0]),
//! #   Transaction::write(0x76, vec![0xF4, 0x25]),
//! #   Transaction::write_read(0x76, vec![0xF3], vec![0x00]),
//! # ]);
//! # struct Uptime;
//! # impl bme280_mux::cache::Clock for Uptime {
//! #     fn now(&mut self) -> core::time::Duration { core::time::Duration::ZERO }
//! # }
//! # let clock = Uptime;
//! use bme280_mux::{Address, Bme280, Options, State};
//! use ehm::eh1::delay::NoopDelay;
//!
//! let mut bme: Bme280<_, _, _> =
//!     Bme280::from_i2c1(i2c, Address::SdoGnd, NoopDelay::new(), clock, Options::DEFAULT);
//! bme.init()?;
//! assert_eq!(bme.state(), State::Active);
//! assert_eq!(bme.name_at(0)?, "pressure");
//! # bme.free().free().done();
//! # Ok::<(), bme280_mux::Error<bme280_mux::eh1::i2c::ErrorKind>>(())
//! ```
//!
//! # Features
//!
//! * `std`: Enable [`cache::MonotonicClock`], backed by `std::time::Instant`.
//! * `serde`: Implement `Serialize` and `Deserialize` for `Sample`.
#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "std")]
extern crate std;

use core::time::Duration;
use eh1::delay::DelayNs;

pub use eh0;
pub use eh1;

pub mod cache;
mod calibration;
pub mod compensation;
/// BME280 I2C bus implementation with embedded-hal version 0.2
pub mod i2c0;
/// BME280 I2C bus implementation with embedded-hal version 1
pub mod i2c1;
pub mod mux;
mod options;
/// BME280 SPI bus implementation with embedded-hal version 0.2
pub mod spi0;
/// BME280 SPI bus implementation with embedded-hal version 1
pub mod spi1;

pub use calibration::{Calibration, NUM_CALIB_H_REG, NUM_CALIB_REG, NUM_CALIB_TP_REG};
pub use options::{Options, Poll};

use cache::{Clock, Staleness};
use compensation::Raw;
use mux::MuxAddress;

/// BME280 chip ID.
pub const CHIP_ID: u8 = 0x60;

/// Number of data registers read in one burst, pressure through humidity.
pub const NUM_MEAS_REG: usize = 8;

/// Number of measured channels.
pub const NUM_CHANNELS: usize = 3;

/// Driver version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum SPI bus frequency in hertz.
pub const SPI_MAX_FREQ: u32 = 10_000_000;

const RESET_MAGIC: u8 = 0xB6;

/// Register addresses.
///
/// from Table 18: Memory Map
pub mod reg {
    #![allow(missing_docs)]
    pub const DIG_T1: u8 = 0x88;
    pub const DIG_T2: u8 = 0x8A;
    pub const DIG_T3: u8 = 0x8C;
    pub const DIG_P1: u8 = 0x8E;
    pub const DIG_P2: u8 = 0x90;
    pub const DIG_P3: u8 = 0x92;
    pub const DIG_P4: u8 = 0x94;
    pub const DIG_P5: u8 = 0x96;
    pub const DIG_P6: u8 = 0x98;
    pub const DIG_P7: u8 = 0x9A;
    pub const DIG_P8: u8 = 0x9C;
    pub const DIG_P9: u8 = 0x9E;
    pub const DIG_H1: u8 = 0xA1;
    pub const CHIP_ID: u8 = 0xD0;
    pub const SOFTRESET: u8 = 0xE0;
    pub const DIG_H2: u8 = 0xE1;
    pub const DIG_H3: u8 = 0xE3;
    pub const DIG_H4: u8 = 0xE4;
    pub const DIG_H5: u8 = 0xE5;
    pub const DIG_H6: u8 = 0xE7;
    pub const CTRL_HUM: u8 = 0xF2;
    pub const STATUS: u8 = 0xF3;
    pub const CTRL_MEAS: u8 = 0xF4;
    pub const CONFIG: u8 = 0xF5;
    /// Start of the pressure, temperature, and humidity burst.
    pub const DATA: u8 = 0xF7;
}

/// SPI address byte of a register read.
pub(crate) const fn spi_read_addr(reg: u8) -> u8 {
    (reg & 0x7F) | 0x80
}

/// SPI address byte of a register write.
pub(crate) const fn spi_write_addr(reg: u8) -> u8 {
    reg & 0x7F
}

/// Oversampling settings for temperature, pressure, and humidity data.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Oversampling {
    /// Skipped, output set to `0x80000`.
    #[default]
    Skip = 0b000,
    /// Oversampling × 1
    X1 = 0b001,
    /// Oversampling × 2
    X2 = 0b010,
    /// Oversampling × 4
    X4 = 0b011,
    /// Oversampling × 8
    X8 = 0b100,
    /// Oversampling × 16
    X16 = 0b101,
}

impl Oversampling {
    /// Reset value of the osrs fields.
    pub const RESET: Self = Self::Skip;

    const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => Oversampling::Skip,
            0b001 => Oversampling::X1,
            0b010 => Oversampling::X2,
            0b011 => Oversampling::X4,
            0b100 => Oversampling::X8,
            _ => Oversampling::X16,
        }
    }
}

impl From<Oversampling> for u8 {
    fn from(x: Oversampling) -> Self {
        x as u8
    }
}

/// Sensor mode.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[repr(u8)]
pub enum Mode {
    /// Sleep mode, no measurements are performed.
    #[default]
    Sleep = 0b00,
    /// Forced mode, one measurement is performed and the sensor returns to
    /// sleep mode.
    Forced = 0b01,
    /// Normal mode, measurements alternate with standby periods.
    Normal = 0b11,
}

impl Mode {
    /// Reset value of the mode field in the [`CtrlMeas`] register.
    pub const RESET: Self = Mode::Sleep;

    /// Returns `true` for the modes that perform a single measurement when
    /// triggered.
    ///
    /// # Example
    ///
    /// ```
    /// use bme280_mux::Mode;
    ///
    /// assert!(Mode::Sleep.is_one_shot());
    /// assert!(Mode::Forced.is_one_shot());
    /// assert!(!Mode::Normal.is_one_shot());
    /// ```
    pub const fn is_one_shot(&self) -> bool {
        !matches!(self, Mode::Normal)
    }
}

impl From<Mode> for u8 {
    fn from(x: Mode) -> Self {
        x as u8
    }
}

/// t<sub>standby</sub> settings.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[repr(u8)]
pub enum Standby {
    /// 0.5 ms
    #[default]
    Micros500 = 0b000,
    /// 62.5 ms
    Micros62500 = 0b001,
    /// 125 ms
    Millis125 = 0b010,
    /// 250 ms
    Millis250 = 0b011,
    /// 500 ms
    Millis500 = 0b100,
    /// 1000 ms
    Millis1000 = 0b101,
    /// 10 ms
    Millis10 = 0b110,
    /// 20 ms
    Millis20 = 0b111,
}

impl Standby {
    /// Reset value of the standby field in the [`Config`] register.
    pub const RESET: Self = Standby::Micros500;

    /// Convert the standby enumeration to a duration.
    ///
    /// # Example
    ///
    /// ```
    /// use bme280_mux::Standby;
    /// use core::time::Duration;
    ///
    /// assert_eq!(Standby::Micros62500.duration(), Duration::from_micros(62500));
    /// assert_eq!(Standby::Millis1000.duration(), Duration::from_secs(1));
    /// ```
    pub const fn duration(&self) -> Duration {
        match self {
            Standby::Micros500 => Duration::from_micros(500),
            Standby::Micros62500 => Duration::from_micros(62500),
            Standby::Millis125 => Duration::from_millis(125),
            Standby::Millis250 => Duration::from_millis(250),
            Standby::Millis500 => Duration::from_millis(500),
            Standby::Millis1000 => Duration::from_millis(1000),
            Standby::Millis10 => Duration::from_millis(10),
            Standby::Millis20 => Duration::from_millis(20),
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => Standby::Micros500,
            0b001 => Standby::Micros62500,
            0b010 => Standby::Millis125,
            0b011 => Standby::Millis250,
            0b100 => Standby::Millis500,
            0b101 => Standby::Millis1000,
            0b110 => Standby::Millis10,
            _ => Standby::Millis20,
        }
    }
}

impl From<Standby> for Duration {
    fn from(s: Standby) -> Self {
        s.duration()
    }
}

impl PartialOrd for Standby {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Standby {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.duration().cmp(&other.duration())
    }
}

/// IIR filter settings.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Default)]
#[repr(u8)]
pub enum Filter {
    /// Filter off.
    #[default]
    Off = 0b000,
    /// Filter coefficient of 2.
    X2 = 0b001,
    /// Filter coefficient of 4.
    X4 = 0b010,
    /// Filter coefficient of 8.
    X8 = 0b011,
    /// Filter coefficient of 16.
    X16 = 0b100,
}

impl Filter {
    /// Reset value of the filter field in the [`Config`] register.
    pub const RESET: Self = Filter::Off;

    const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => Filter::Off,
            0b001 => Filter::X2,
            0b010 => Filter::X4,
            0b011 => Filter::X8,
            _ => Filter::X16,
        }
    }
}

impl From<Filter> for u8 {
    fn from(x: Filter) -> Self {
        x as u8
    }
}

/// Config register.
///
/// ```text
/// | 7 6 5  | 4 3 2  | 1 | 0        |
/// | t_sb   | filter | - | spi3w_en |
/// ```
///
/// Writes to the config register in normal mode may be ignored, the driver
/// writes it while the sensor sleeps after a soft reset.
///
/// # Example
///
/// ```
/// use bme280_mux::{Config, Filter, Standby};
///
/// const CONFIG: Config = Config::RESET
///     .set_standby_time(Standby::Millis1000)
///     .set_filter(Filter::X16);
/// assert_eq!(u8::from(CONFIG), 0b101_100_0_0);
/// assert_eq!(CONFIG.filter(), Filter::X16);
/// assert_eq!(CONFIG.standby_time(), Standby::Millis1000);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub struct Config(u8);

impl Config {
    /// Reset value of the config register.
    pub const RESET: Self = Config(0x00);

    /// Set the inactive duration t<sub>standby</sub> in normal mode.
    #[must_use = "set_standby_time returns a modified Config"]
    pub const fn set_standby_time(self, s: Standby) -> Config {
        Config((self.0 & 0x1F) | ((s as u8) << 5))
    }

    /// Get the standby time.
    pub const fn standby_time(&self) -> Standby {
        Standby::from_bits(self.0 >> 5)
    }

    /// Set the time constant of the IIR filter.
    #[must_use = "set_filter returns a modified Config"]
    pub const fn set_filter(self, f: Filter) -> Config {
        Config((self.0 & 0b1110_0011) | ((f as u8) << 2))
    }

    /// Get the filter coefficient.
    pub const fn filter(&self) -> Filter {
        Filter::from_bits(self.0 >> 2)
    }

    /// Enable the 3-wire SPI interface.
    #[must_use = "set_spi3w_en returns a modified Config"]
    pub const fn set_spi3w_en(self, en: bool) -> Config {
        if en {
            Config(self.0 | 0b1)
        } else {
            Config(self.0 & !0b1)
        }
    }

    /// Returns `true` if 3-wire SPI is enabled.
    pub const fn spi3w_en(&self) -> bool {
        self.0 & 0b1 == 0b1
    }
}

impl From<Config> for u8 {
    fn from(x: Config) -> Self {
        x.0
    }
}

/// Measurement control register.
///
/// ```text
/// | 7 6 5  | 4 3 2  | 1 0  |
/// | osrs_t | osrs_p | mode |
/// ```
///
/// # Example
///
/// ```
/// use bme280_mux::{CtrlMeas, Mode, Oversampling};
///
/// const CTRL_MEAS: CtrlMeas = CtrlMeas::RESET
///     .set_osrs_t(Oversampling::X2)
///     .set_osrs_p(Oversampling::X16)
///     .set_mode(Mode::Normal);
/// assert_eq!(u8::from(CTRL_MEAS), 0b010_101_11);
/// assert_eq!(CTRL_MEAS.osrs_t(), Oversampling::X2);
/// assert_eq!(CTRL_MEAS.osrs_p(), Oversampling::X16);
/// assert_eq!(CTRL_MEAS.set_mode(Mode::Forced).mode(), Mode::Forced);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub struct CtrlMeas(u8);

impl CtrlMeas {
    /// Reset value of the ctrl_meas register.
    pub const RESET: Self = CtrlMeas(0x00);

    /// Set the oversampling for temperature data.
    #[must_use = "set_osrs_t returns a modified CtrlMeas"]
    pub const fn set_osrs_t(self, os: Oversampling) -> CtrlMeas {
        CtrlMeas((self.0 & 0b0001_1111) | ((os as u8) << 5))
    }

    /// Get the temperature data oversampling.
    pub const fn osrs_t(&self) -> Oversampling {
        Oversampling::from_bits(self.0 >> 5)
    }

    /// Set the oversampling for pressure data.
    #[must_use = "set_osrs_p returns a modified CtrlMeas"]
    pub const fn set_osrs_p(self, os: Oversampling) -> CtrlMeas {
        CtrlMeas((self.0 & 0b1110_0011) | ((os as u8) << 2))
    }

    /// Get the pressure data oversampling.
    pub const fn osrs_p(&self) -> Oversampling {
        Oversampling::from_bits(self.0 >> 2)
    }

    /// Set the sensor mode.
    #[must_use = "set_mode returns a modified CtrlMeas"]
    pub const fn set_mode(self, m: Mode) -> CtrlMeas {
        CtrlMeas((self.0 & 0xFC) | (m as u8))
    }

    /// Get the mode.
    pub const fn mode(&self) -> Mode {
        match self.0 & 0b11 {
            0b00 => Mode::Sleep,
            0b11 => Mode::Normal,
            _ => Mode::Forced,
        }
    }
}

impl From<CtrlMeas> for u8 {
    fn from(x: CtrlMeas) -> Self {
        x.0
    }
}

/// Status register.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub struct Status(u8);

impl Status {
    /// Reset value of the status register.
    pub const RESET: Self = Status(0x00);

    /// Measuring field.
    ///
    /// Set whenever a conversion is running and cleared when the results have
    /// been transferred to the data registers.
    ///
    /// # Example
    ///
    /// ```
    /// use bme280_mux::Status;
    ///
    /// assert!(Status::from(0x08).measuring());
    /// assert!(!Status::from(0x01).measuring());
    /// ```
    pub const fn measuring(&self) -> bool {
        self.0 & (1 << 3) != 0
    }

    /// im_update field.
    ///
    /// Set while the NVM calibration data is copied to the image registers.
    /// The data is copied at power-on-reset and before every conversion.
    pub const fn im_update(&self) -> bool {
        self.0 & 1 != 0
    }
}

impl From<u8> for Status {
    fn from(x: u8) -> Self {
        Status(x)
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Status")
            .field("measuring", &self.measuring())
            .field("im_update", &self.im_update())
            .finish()
    }
}

/// BME280 register settings.
///
/// The registers are written in the order `ctrl_hum`, `config`, `ctrl_meas`,
/// because changes to `ctrl_hum` only become effective after a write to
/// `ctrl_meas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Settings {
    /// `config` register value.
    pub config: Config,
    /// `ctrl_meas` register value.
    pub ctrl_meas: CtrlMeas,
    /// `ctrl_hum` register value.
    pub ctrl_hum: Oversampling,
}

impl Settings {
    /// Reset values of all three registers.
    pub const RESET: Self = Settings {
        config: Config::RESET,
        ctrl_meas: CtrlMeas::RESET,
        ctrl_hum: Oversampling::RESET,
    };
}

/// Compensated values of one measurement cycle.
///
/// Channels that were skipped or not measured yet are NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Temperature in degrees celsius.
    pub temperature: f32,
    /// Pressure in hectopascal, reduced to sea level for a positive elevation.
    pub pressure: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

impl Sample {
    /// Sample without any measured value.
    pub const NAN: Self = Sample {
        temperature: f32::NAN,
        pressure: f32::NAN,
        humidity: f32::NAN,
    };

    /// Value of a single channel.
    pub const fn get(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Pressure => self.pressure,
            Channel::Temperature => self.temperature,
            Channel::Humidity => self.humidity,
        }
    }
}

/// Measured channel, in parameter table order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Channel {
    /// Pressure in hPa.
    Pressure = 0,
    /// Temperature in °C.
    Temperature = 1,
    /// Relative humidity in %RH.
    Humidity = 2,
}

impl Channel {
    /// All channels in parameter table order.
    pub const ALL: [Channel; NUM_CHANNELS] =
        [Channel::Pressure, Channel::Temperature, Channel::Humidity];

    /// Channel at a parameter table index.
    ///
    /// # Example
    ///
    /// ```
    /// use bme280_mux::Channel;
    ///
    /// assert_eq!(Channel::from_index(1), Some(Channel::Temperature));
    /// assert_eq!(Channel::from_index(3), None);
    /// ```
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < NUM_CHANNELS {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Channel with the given parameter name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Parameter name.
    pub const fn name(&self) -> &'static str {
        match self {
            Channel::Pressure => "pressure",
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
        }
    }

    /// Parameter type, all channels are floating point.
    pub const fn kind(&self) -> &'static str {
        "float"
    }

    /// Unit of measurement.
    pub const fn unit(&self) -> &'static str {
        match self {
            Channel::Pressure => "hPa",
            Channel::Temperature => "°C",
            Channel::Humidity => "%RH",
        }
    }
}

/// I2C device address.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[repr(u8)]
pub enum Address {
    /// SDO pin is connected to GND.
    SdoGnd = 0x76,
    /// SDO pin is connected to V<sub>DDIO</sub>
    SdoVddio = 0x77,
}

/// Bus type of a transport.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Interface {
    /// I2C bus.
    I2c,
    /// SPI bus.
    Spi,
}

/// Position in the initialization state machine.
///
/// ```text
/// Unverified -> IdVerified -> Resetting -> CalibrationLoading
///     -> SamplingConfigured -> CalibrationWaiting -> Active
/// ```
///
/// Any failure leads to `Failed`, which is only left by a reset.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum State {
    /// Chip ID not checked yet.
    Unverified,
    /// Chip ID matched.
    IdVerified,
    /// Soft reset issued, waiting for the sensor to start up.
    Resetting,
    /// Reading the calibration registers.
    CalibrationLoading,
    /// Oversampling, filter, standby, and mode written.
    SamplingConfigured,
    /// Waiting for the NVM copy to finish.
    CalibrationWaiting,
    /// Ready for measurements.
    Active,
    /// Initialization failed.
    Failed,
}

/// BME280 error.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error<B> {
    /// Bus error.
    Bus(B),
    /// The chip ID register did not read [`CHIP_ID`].
    ChipId(u8),
    /// Parameter index out of range.
    IndexOutOfRange(usize),
    /// Unknown parameter name.
    UnknownParameter,
    /// The driver is not initialized.
    NotActive,
    /// A status bit did not clear within the poll bound.
    Timeout,
}

impl<B: core::fmt::Debug> core::fmt::Display for Error<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {e:?}"),
            Error::ChipId(id) => write!(f, "unexpected chip ID 0x{id:02X}, expected 0x{CHIP_ID:02X}"),
            Error::IndexOutOfRange(i) => write!(f, "parameter index {i} out of range"),
            Error::UnknownParameter => f.write_str("unknown parameter name"),
            Error::NotActive => f.write_str("device is not active"),
            Error::Timeout => f.write_str("timed out waiting for the device"),
        }
    }
}

/// BME280 bus.
pub trait Bme280Bus {
    /// BME280 bus error.
    type Error;

    /// Bus type.
    const INTERFACE: Interface;

    /// Read from the BME280.
    ///
    /// # I2C
    ///
    /// ```text
    /// Read example (BME280 Datasheet Figure 10: I2C multiple byte read)
    /// +-------+---------------+----+------+------------------+------+
    /// | Start | Slave Address | RW | ACKS | Register Address | ACKS |
    /// +-------+---------------+----+------+------------------+------+
    /// | S     | 111011x       |  0 |      | xxxxxxxx         |      |
    /// +-------+---------------+----+------+------------------+------+
    ///
    ///     +-------+---------------+----+------+---------------+--------+------+
    /// ... | Start | Slave Address | RW | ACKS | Register Data | NOACKM | Stop |
    ///     +-------+---------------+----+------+---------------+--------+------+
    /// ... | S     | 111011x       |  1 |      | xxxxxxxx      |        | P    |
    ///     +-------+---------------+----+------+---------------+--------+------+
    /// ```
    ///
    /// # SPI
    ///
    /// ```text
    /// Read example (BME280 Datasheet Figure 13: SPI multiple byte read)
    /// +-------+----+------------------+---------------+-----+-------+
    /// | Start | RW | Register Address | Register Data | ... | Stop  |
    /// +-------+----+------------------+---------------+-----+-------+
    /// | CSB=0 |  1 | xxxxxxx          | xxxxxxxx      |     | CSB=1 |
    /// +-------+----+------------------+---------------+-----+-------+
    /// ```
    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write a single register to the BME280.
    ///
    /// # SPI
    ///
    /// ```text
    /// Write example (BME280 Datasheet Figure 12: SPI multiple byte write)
    /// +-------+----+------------------+---------------+-------+
    /// | Start | RW | Register Address | Register Data | Stop  |
    /// +-------+----+------------------+---------------+-------+
    /// | CSB=0 |  0 | xxxxxxx          | xxxxxxxx      | CSB=1 |
    /// +-------+----+------------------+---------------+-------+
    /// ```
    fn write_reg(&mut self, reg: u8, data: u8) -> Result<(), Self::Error>;

    /// Decoder address when the sensor is behind an SPI multiplexer.
    fn mux_address(&self) -> Option<MuxAddress> {
        None
    }

    /// Read the calibration from the chip.
    fn calibration(&mut self) -> Result<Calibration, Self::Error> {
        let mut tp: [u8; NUM_CALIB_TP_REG] = [0; NUM_CALIB_TP_REG];
        let mut h: [u8; NUM_CALIB_H_REG] = [0; NUM_CALIB_H_REG];
        self.read_regs(reg::DIG_T1, &mut tp)?;
        self.read_regs(reg::DIG_H2, &mut h)?;
        Ok(Calibration::from_registers(&tp, &h))
    }
}

fn micros(d: Duration) -> u32 {
    u32::try_from(d.as_micros()).unwrap_or(u32::MAX)
}

/// BME280 driver.
#[derive(Debug)]
pub struct Bme280<B, D, C> {
    bus: B,
    delay: D,
    clock: C,
    options: Options,
    settings: Settings,
    state: State,
    cal: Option<Calibration>,
    values: Sample,
    cache: Staleness,
}

impl<I2C, D, C, E> Bme280<i2c0::Bme280Bus<I2C>, D, C>
where
    I2C: eh0::blocking::i2c::Write<Error = E> + eh0::blocking::i2c::WriteRead<Error = E>,
{
    /// Creates a new `Bme280` driver from an embedded-hal version 0.2 I2C
    /// peripheral and an I2C device address.
    ///
    /// The sensor is not accessed until [`Bme280::init`].
    pub fn from_i2c0(i2c: I2C, address: Address, delay: D, clock: C, options: Options) -> Self {
        let bus = i2c0::Bme280Bus::new(i2c, address);
        Self::new(bus, delay, clock, options.set_address(address as u8))
    }
}

impl<I2C, D, C, E> Bme280<i2c1::Bme280Bus<I2C>, D, C>
where
    I2C: eh1::i2c::I2c<Error = E>,
{
    /// Creates a new `Bme280` driver from an embedded-hal version 1 I2C
    /// peripheral and an I2C device address.
    ///
    /// The sensor is not accessed until [`Bme280::init`].
    pub fn from_i2c1(i2c: I2C, address: Address, delay: D, clock: C, options: Options) -> Self {
        let bus = i2c1::Bme280Bus::new(i2c, address);
        Self::new(bus, delay, clock, options.set_address(address as u8))
    }
}

impl<SPI, CS, D, C, SpiError, PinError> Bme280<spi0::Bme280Bus<SPI, CS>, D, C>
where
    SPI: eh0::blocking::spi::Transfer<u8, Error = SpiError>
        + eh0::blocking::spi::Write<u8, Error = SpiError>,
    CS: eh0::digital::v2::OutputPin<Error = PinError>,
{
    /// Creates a new `Bme280` driver from an embedded-hal version 0.2 SPI
    /// peripheral and a chip select digital I/O pin.
    ///
    /// The chip select pin must be high before being passed to this function.
    /// Use [`spi0::Bme280Bus::with_arbiter`] and [`Bme280::new`] for a sensor
    /// behind a multiplexer.
    pub fn from_spi0(spi: SPI, cs: CS, delay: D, clock: C, options: Options) -> Self {
        Self::new(spi0::Bme280Bus::new(spi, cs), delay, clock, options)
    }
}

impl<SPI, D, C, E> Bme280<spi1::Bme280Bus<SPI>, D, C>
where
    SPI: eh1::spi::SpiDevice<Error = E>,
{
    /// Creates a new `Bme280` driver from an embedded-hal version 1 SPI device.
    ///
    /// Use [`spi1::Bme280Bus::with_arbiter`] and [`Bme280::new`] for a sensor
    /// behind a multiplexer.
    pub fn from_spi1(spi: SPI, delay: D, clock: C, options: Options) -> Self {
        Self::new(spi1::Bme280Bus::new(spi), delay, clock, options)
    }
}

impl<B, D, C> Bme280<B, D, C> {
    /// Create a new, inactive BME280 driver.
    ///
    /// Invalid options are replaced by their defaults, see
    /// [`Options::validated`].
    pub fn new(bus: B, delay: D, clock: C, options: Options) -> Self {
        let options: Options = options.validated();
        Self {
            bus,
            delay,
            clock,
            settings: options.settings,
            state: State::Unverified,
            cal: None,
            values: Sample::NAN,
            cache: Staleness::new(options.refresh),
            options,
        }
    }

    /// Free the bus from the BME280.
    #[inline]
    pub fn free(self) -> B {
        self.bus
    }

    /// Mutable access to the bus.
    ///
    /// A shutdown hook can reach the arbiter of a live driver this way, for
    /// example `bme.bus_mut().arbiter_mut().force_release()` on a
    /// multiplexed SPI bus.
    #[inline]
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Device name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.options.name
    }

    /// Device type.
    #[inline]
    pub const fn kind(&self) -> &'static str {
        "sensor"
    }

    /// Driver version.
    #[inline]
    pub const fn version(&self) -> &'static str {
        VERSION
    }

    /// Bus index.
    #[inline]
    pub fn bus_index(&self) -> u8 {
        self.options.bus
    }

    /// I2C address or SPI chip select index.
    #[inline]
    pub fn address(&self) -> u8 {
        self.options.address
    }

    /// Options the driver was created with.
    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Number of parameters.
    #[inline]
    pub const fn num_values(&self) -> usize {
        NUM_CHANNELS
    }

    /// Position in the initialization state machine.
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns `true` once initialization succeeded.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Current sensor mode.
    #[inline]
    pub fn mode(&self) -> Mode {
        self.settings.ctrl_meas.mode()
    }

    /// Elevation in meters used for the sea-level correction.
    #[inline]
    pub fn elevation(&self) -> f32 {
        self.options.elevation
    }

    /// Calibration read during the last initialization.
    #[inline]
    pub fn calibration(&self) -> Option<&Calibration> {
        self.cal.as_ref()
    }

    /// Values of the last read without bus access, stale or not.
    ///
    /// All channels are NaN until the first measurement after an
    /// initialization.
    #[inline]
    pub fn cached(&self) -> Sample {
        self.values
    }
}

impl<B, D, C, E> Bme280<B, D, C>
where
    B: Bme280Bus<Error = E>,
    D: DelayNs,
    C: Clock,
{
    /// Bus type.
    #[inline]
    pub fn interface(&self) -> Interface {
        B::INTERFACE
    }

    /// Multiplexer address, if the sensor is behind an SPI multiplexer.
    #[inline]
    pub fn mux_address(&self) -> Option<MuxAddress> {
        self.bus.mux_address()
    }

    /// Name of the parameter at `index`.
    pub fn name_at(&self, index: usize) -> Result<&'static str, Error<E>> {
        Channel::from_index(index)
            .map(|c| c.name())
            .ok_or(Error::IndexOutOfRange(index))
    }

    /// Type of the parameter at `index`.
    pub fn type_at(&self, index: usize) -> Result<&'static str, Error<E>> {
        Channel::from_index(index)
            .map(|c| c.kind())
            .ok_or(Error::IndexOutOfRange(index))
    }

    /// Initialize the sensor.
    ///
    /// Verifies the chip ID, issues a soft reset, reads the calibration,
    /// writes the register settings, and waits for the NVM copy to finish.
    /// Cached values are discarded.
    ///
    /// On failure the driver stays in [`State::Failed`] until `init` or
    /// [`reset`](Self::reset) is called again.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.cache.invalidate();
        self.values = Sample::NAN;
        self.cal = None;
        self.enter(State::Unverified);

        match self.initialize() {
            Ok(()) => {
                self.enter(State::Active);
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "{}: initialization failed in state {:?}",
                    self.options.name,
                    self.state
                );
                self.enter(State::Failed);
                Err(e)
            }
        }
    }

    /// Reinitialize the sensor from scratch.
    ///
    /// The driver is inactive and all values are NaN until initialization
    /// completes.
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        log::debug!("{}: reset requested", self.options.name);
        self.init()
    }

    fn enter(&mut self, state: State) {
        log::debug!("{}: {:?} -> {:?}", self.options.name, self.state, state);
        self.state = state;
    }

    fn initialize(&mut self) -> Result<(), Error<E>> {
        let poll: Poll = self.options.poll;

        self.verify_chip_id()?;
        self.enter(State::IdVerified);

        self.enter(State::Resetting);
        self.soft_reset().map_err(Error::Bus)?;
        self.delay.delay_us(micros(poll.reset_settle));

        self.enter(State::CalibrationLoading);
        self.cal = Some(self.bus.calibration().map_err(Error::Bus)?);

        let settings: Settings = self.settings;
        self.settings(&settings).map_err(Error::Bus)?;
        self.enter(State::SamplingConfigured);

        self.enter(State::CalibrationWaiting);
        self.wait_while(
            Status::im_update,
            poll.calibration_interval,
            poll.calibration_polls,
        )
    }

    fn verify_chip_id(&mut self) -> Result<(), Error<E>> {
        let poll: Poll = self.options.poll;
        let mut attempt: u8 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let result: Result<(), Error<E>> = match self.chip_id() {
                Ok(CHIP_ID) => return Ok(()),
                Ok(id) => Err(Error::ChipId(id)),
                Err(e) => Err(Error::Bus(e)),
            };
            if attempt >= poll.chip_id_attempts {
                return result;
            }
            log::debug!(
                "{}: chip ID attempt {} of {} failed",
                self.options.name,
                attempt,
                poll.chip_id_attempts
            );
            self.delay.delay_us(micros(poll.chip_id_backoff));
        }
    }

    fn wait_while(
        &mut self,
        busy: fn(&Status) -> bool,
        interval: Duration,
        polls: u16,
    ) -> Result<(), Error<E>> {
        let mut remaining: u16 = polls;
        loop {
            let status: Status = self.status().map_err(Error::Bus)?;
            if !busy(&status) {
                return Ok(());
            }
            if remaining == 0 {
                log::warn!(
                    "{}: still busy after {} polls, {}",
                    self.options.name,
                    polls,
                    status
                );
                return Err(Error::Timeout);
            }
            remaining -= 1;
            self.delay.delay_us(micros(interval));
        }
    }

    /// BME280 chip ID.
    ///
    /// The expected value is [`CHIP_ID`].
    pub fn chip_id(&mut self) -> Result<u8, E> {
        let mut buf: [u8; 1] = [0];
        self.bus.read_regs(reg::CHIP_ID, &mut buf)?;
        Ok(buf[0])
    }

    /// Issue a soft reset.
    ///
    /// This only writes the reset register, the driver state is unchanged.
    /// Use [`reset`](Self::reset) to reinitialize the sensor.
    pub fn soft_reset(&mut self) -> Result<(), E> {
        self.bus.write_reg(reg::SOFTRESET, RESET_MAGIC)
    }

    /// Get the status of the device.
    pub fn status(&mut self) -> Result<Status, E> {
        let mut buf: [u8; 1] = [0];
        self.bus.read_regs(reg::STATUS, &mut buf)?;
        Ok(Status(buf[0]))
    }

    /// Write the register settings.
    ///
    /// The mode in `settings.ctrl_meas` becomes the current mode.
    pub fn settings(&mut self, settings: &Settings) -> Result<(), E> {
        self.bus.write_reg(reg::CTRL_HUM, settings.ctrl_hum.into())?;
        self.bus.write_reg(reg::CONFIG, settings.config.into())?;
        self.bus.write_reg(reg::CTRL_MEAS, settings.ctrl_meas.into())?;
        self.settings = *settings;
        Ok(())
    }

    /// Change the sensor mode and wait for a triggered measurement to finish.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error<E>> {
        let ctrl_meas: CtrlMeas = self.settings.ctrl_meas.set_mode(mode);
        self.settings.ctrl_meas = ctrl_meas;
        self.bus
            .write_reg(reg::CTRL_MEAS, ctrl_meas.into())
            .map_err(Error::Bus)?;
        let poll: Poll = self.options.poll;
        self.wait_while(
            Status::measuring,
            poll.measuring_interval,
            poll.measuring_polls,
        )
    }

    /// Set the elevation in meters used for the sea-level correction.
    ///
    /// Cached values are discarded, the next fetch reads the sensor again.
    pub fn set_elevation(&mut self, elevation: f32) {
        self.options = self.options.set_elevation(elevation).validated();
        self.cache.invalidate();
    }

    /// Read all channels from the sensor regardless of the cache.
    ///
    /// In sleep and forced mode a forced measurement is triggered first.
    /// A failure to trigger it is logged and the data registers are read
    /// anyway.
    pub fn refresh(&mut self) -> Result<Sample, Error<E>> {
        let cal: Calibration = match (self.state, self.cal) {
            (State::Active, Some(cal)) => cal,
            _ => return Err(Error::NotActive),
        };

        if self.mode().is_one_shot() && self.set_mode(Mode::Forced).is_err() {
            log::warn!(
                "{}: failed to trigger a forced measurement, values may be stale",
                self.options.name
            );
        }

        let mut buf: [u8; NUM_MEAS_REG] = [0; NUM_MEAS_REG];
        self.bus
            .read_regs(reg::DATA, &mut buf)
            .map_err(Error::Bus)?;

        self.values = compensation::compensate(&cal, &Raw::from(&buf), self.options.elevation);
        let now: Duration = self.clock.now();
        self.cache.mark_fresh(now);
        Ok(self.values)
    }

    fn fetch(&mut self) -> Result<Sample, Error<E>> {
        if !self.is_active() {
            return Err(Error::NotActive);
        }
        let now: Duration = self.clock.now();
        if self.cache.is_stale(now) {
            log::debug!("{}: cached values are stale", self.options.name);
            self.refresh()
        } else {
            Ok(self.values)
        }
    }

    /// Value of a channel, read from the sensor if the cache is stale.
    pub fn value(&mut self, channel: Channel) -> Result<f32, Error<E>> {
        self.fetch().map(|sample| sample.get(channel))
    }

    /// Value of the parameter at `index`.
    ///
    /// An index out of range is rejected without bus access.
    pub fn value_at(&mut self, index: usize) -> Result<f32, Error<E>> {
        let channel: Channel = Channel::from_index(index).ok_or(Error::IndexOutOfRange(index))?;
        self.value(channel)
    }

    /// Value of the parameter called `name`.
    ///
    /// An unknown name is rejected without bus access.
    pub fn value_by_name(&mut self, name: &str) -> Result<f32, Error<E>> {
        let channel: Channel = Channel::from_name(name).ok_or(Error::UnknownParameter)?;
        self.value(channel)
    }

    /// All channels, read from the sensor if the cache is stale.
    pub fn sample(&mut self) -> Result<Sample, Error<E>> {
        self.fetch()
    }
}
