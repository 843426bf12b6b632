//! Driver configuration.

use crate::{Config, CtrlMeas, Filter, Mode, Oversampling, Settings, Standby};
use core::time::Duration;

/// Bounds and intervals of the blocking waits performed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Poll {
    /// Chip ID reads before initialization gives up.
    pub chip_id_attempts: u8,
    /// Delay between two chip ID reads.
    pub chip_id_backoff: Duration,
    /// Delay after a soft reset before the next register access.
    ///
    /// The datasheet start-up time is 2 ms.
    pub reset_settle: Duration,
    /// Interval between two polls of the `im_update` status bit.
    pub calibration_interval: Duration,
    /// Polls of the `im_update` status bit before initialization times out.
    pub calibration_polls: u16,
    /// Interval between two polls of the `measuring` status bit.
    pub measuring_interval: Duration,
    /// Polls of the `measuring` status bit before a mode change times out.
    pub measuring_polls: u16,
}

impl Poll {
    /// Default poll policy.
    pub const DEFAULT: Self = Poll {
        chip_id_attempts: 3,
        chip_id_backoff: Duration::from_millis(10),
        reset_settle: Duration::from_millis(4),
        calibration_interval: Duration::from_millis(112),
        calibration_polls: 10,
        measuring_interval: Duration::from_millis(4),
        measuring_polls: 100,
    };
}

impl Default for Poll {
    fn default() -> Self {
        Poll::DEFAULT
    }
}

/// Driver options.
///
/// All methods are constant so that options can be created at compile time.
///
/// # Example
///
/// ```
/// use bme280_mux::{Filter, Mode, Options, Oversampling};
/// use core::time::Duration;
///
/// const OPTIONS: Options = Options::DEFAULT
///     .set_name("rooftop")
///     .set_elevation(412.0)
///     .set_mode(Mode::Normal)
///     .set_refresh(Duration::from_secs(60))
///     .set_oversampling(Oversampling::X4)
///     .set_filter(Filter::X4);
///
/// assert_eq!(OPTIONS.mode(), Mode::Normal);
/// assert_eq!(OPTIONS.settings.ctrl_hum, Oversampling::X4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    /// Device name, used in log messages.
    pub name: &'static str,
    /// Bus index, informational.
    pub bus: u8,
    /// I2C address or SPI chip select index, informational.
    pub address: u8,
    /// Elevation above sea level in meters.
    ///
    /// Pressure is reduced to sea level when this is positive.
    pub elevation: f32,
    /// Interval after which cached values are read again.
    pub refresh: Duration,
    /// Register values written during initialization.
    pub settings: Settings,
    /// Poll policy.
    pub poll: Poll,
}

impl Options {
    /// Default options.
    ///
    /// # Example
    ///
    /// ```
    /// use bme280_mux::{Mode, Options};
    ///
    /// assert_eq!(Options::DEFAULT.name, "Bme280");
    /// assert_eq!(Options::DEFAULT.mode(), Mode::Forced);
    /// assert_eq!(u8::from(Options::DEFAULT.settings.config), 0xA0);
    /// assert_eq!(u8::from(Options::DEFAULT.settings.ctrl_meas), 0x25);
    /// ```
    pub const DEFAULT: Self = Options {
        name: "Bme280",
        bus: 1,
        address: 0x76,
        elevation: 0.0,
        refresh: Duration::from_secs(10),
        settings: Settings {
            config: Config::RESET
                .set_standby_time(Standby::Millis1000)
                .set_filter(Filter::Off),
            ctrl_meas: CtrlMeas::RESET
                .set_osrs_t(Oversampling::X1)
                .set_osrs_p(Oversampling::X1)
                .set_mode(Mode::Forced),
            ctrl_hum: Oversampling::X1,
        },
        poll: Poll::DEFAULT,
    };

    /// Set the device name.
    #[must_use = "set_name returns modified Options"]
    pub const fn set_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Set the bus index.
    #[must_use = "set_bus returns modified Options"]
    pub const fn set_bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }

    /// Set the I2C address or SPI chip select index.
    #[must_use = "set_address returns modified Options"]
    pub const fn set_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Set the elevation in meters, `0.0` disables the sea-level correction.
    #[must_use = "set_elevation returns modified Options"]
    pub const fn set_elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation;
        self
    }

    /// Set the initial sensor mode.
    #[must_use = "set_mode returns modified Options"]
    pub const fn set_mode(mut self, mode: Mode) -> Self {
        self.settings.ctrl_meas = self.settings.ctrl_meas.set_mode(mode);
        self
    }

    /// Initial sensor mode.
    pub const fn mode(&self) -> Mode {
        self.settings.ctrl_meas.mode()
    }

    /// Set the refresh interval of cached values.
    #[must_use = "set_refresh returns modified Options"]
    pub const fn set_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    /// Set the oversampling of all three channels.
    #[must_use = "set_oversampling returns modified Options"]
    pub const fn set_oversampling(mut self, os: Oversampling) -> Self {
        self.settings.ctrl_hum = os;
        self.settings.ctrl_meas = self.settings.ctrl_meas.set_osrs_t(os).set_osrs_p(os);
        self
    }

    /// Set the IIR filter coefficient.
    #[must_use = "set_filter returns modified Options"]
    pub const fn set_filter(mut self, filter: Filter) -> Self {
        self.settings.config = self.settings.config.set_filter(filter);
        self
    }

    /// Set the standby time in normal mode.
    #[must_use = "set_standby_time returns modified Options"]
    pub const fn set_standby_time(mut self, standby: Standby) -> Self {
        self.settings.config = self.settings.config.set_standby_time(standby);
        self
    }

    /// Set all register values at once.
    #[must_use = "set_settings returns modified Options"]
    pub const fn set_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the poll policy.
    #[must_use = "set_poll returns modified Options"]
    pub const fn set_poll(mut self, poll: Poll) -> Self {
        self.poll = poll;
        self
    }

    /// Replace invalid values with their defaults.
    ///
    /// A non-finite or negative elevation becomes `0.0` and a zero refresh
    /// interval becomes the default interval.
    ///
    /// # Example
    ///
    /// ```
    /// use bme280_mux::Options;
    /// use core::time::Duration;
    ///
    /// let options = Options::DEFAULT
    ///     .set_elevation(f32::NAN)
    ///     .set_refresh(Duration::ZERO)
    ///     .validated();
    /// assert_eq!(options.elevation, 0.0);
    /// assert_eq!(options.refresh, Options::DEFAULT.refresh);
    /// ```
    #[must_use = "validated returns modified Options"]
    pub fn validated(mut self) -> Self {
        if !self.elevation.is_finite() || self.elevation < 0.0 {
            log::warn!(
                "{}: ignoring invalid elevation {}, sea-level correction disabled",
                self.name,
                self.elevation
            );
            self.elevation = Options::DEFAULT.elevation;
        }
        if self.refresh.is_zero() {
            log::warn!(
                "{}: refresh interval must not be zero, using {:?}",
                self.name,
                Options::DEFAULT.refresh
            );
            self.refresh = Options::DEFAULT.refresh;
        }
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversampling_applies_to_all_channels() {
        let options = Options::DEFAULT.set_oversampling(Oversampling::X16);
        assert_eq!(options.settings.ctrl_hum, Oversampling::X16);
        assert_eq!(options.settings.ctrl_meas.osrs_t(), Oversampling::X16);
        assert_eq!(options.settings.ctrl_meas.osrs_p(), Oversampling::X16);
        assert_eq!(options.mode(), Mode::Forced);
    }

    #[test]
    fn valid_options_are_unchanged() {
        let options = Options::DEFAULT
            .set_elevation(1500.0)
            .set_refresh(Duration::from_millis(250));
        assert_eq!(options.validated(), options);
    }

    #[test]
    fn negative_elevation_is_rejected() {
        let options = Options::DEFAULT.set_elevation(-20.0).validated();
        assert_eq!(options.elevation, 0.0);
    }
}
