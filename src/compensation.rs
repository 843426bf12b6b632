//! Raw ADC code to physical unit conversion.
//!
//! Every function in this module is pure. The temperature stage produces the
//! fine temperature that the pressure and humidity stages consume, so a
//! measurement cycle always decodes temperature first and threads the result
//! through explicitly.

use crate::Calibration;

/// Raw 20-bit value of a skipped pressure or temperature measurement.
pub const SKIPPED_20: u32 = 0x80000;

/// Raw 16-bit value of a skipped humidity measurement.
pub const SKIPPED_16: u16 = 0x8000;

const KELVIN: f64 = 273.15;
const LAPSE_RATE: f64 = 0.0065;
const BAROMETRIC_EXPONENT: f64 = 5.257;

/// Uncompensated ADC codes from one burst read of the data registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raw {
    /// 20-bit pressure code.
    pub pressure: u32,
    /// 20-bit temperature code.
    pub temperature: u32,
    /// 16-bit humidity code.
    pub humidity: u16,
}

impl From<&[u8; crate::NUM_MEAS_REG]> for Raw {
    fn from(buf: &[u8; crate::NUM_MEAS_REG]) -> Self {
        Raw {
            pressure: uint20(buf[0], buf[1], buf[2]),
            temperature: uint20(buf[3], buf[4], buf[5]),
            humidity: u16::from_be_bytes([buf[6], buf[7]]),
        }
    }
}

// msb [7:0] = v[19:12]
// lsb [7:0] = v[11:4]
// xlsb[7:4] = v[3:0]
const fn uint20(msb: u8, lsb: u8, xlsb: u8) -> u32 {
    ((msb as u32) << 12) | ((lsb as u32) << 4) | ((xlsb as u32) >> 4)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale: f64 = libm::pow(10.0, decimals as f64);
    libm::round(value * scale) / scale
}

/// Compute the fine temperature from a raw temperature code.
///
/// This is the fixed point formula from the datasheet, the result is the
/// input for [`temperature`], [`pressure`], and [`humidity`].
///
/// # Example
///
/// ```
/// use bme280_mux::{compensation, Calibration};
///
/// let cal = Calibration {
///     t1: 27504,
///     t2: 26435,
///     t3: -1000,
///     ..Calibration::default()
/// };
/// assert_eq!(compensation::fine_temperature(&cal, 519888), 128422);
/// ```
pub fn fine_temperature(cal: &Calibration, adc_t: u32) -> i32 {
    let adc_t: i64 = adc_t as i64;
    let t1: i64 = cal.t1 as i64;

    let var1: i64 = (((adc_t >> 3) - (t1 << 1)) * (cal.t2 as i64)) >> 11;
    let var2: i64 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * (cal.t3 as i64)) >> 14;

    (var1 + var2) as i32
}

/// Temperature in °C, rounded to 0.1 °C.
pub fn temperature(t_fine: i32) -> f32 {
    // centi-degrees, (t_fine * 5 + 128) / 256
    let centi: i32 = (t_fine * 5 + 128) >> 8;
    (libm::round(f64::from(centi) / 10.0) / 10.0) as f32
}

fn pressure_hpa(cal: &Calibration, adc_p: u32, t_fine: i32) -> f64 {
    let var1: f64 = f64::from(t_fine) / 2.0 - 64000.0;
    let var2: f64 = var1 * var1 * f64::from(cal.p6) / 32768.0;
    let var2: f64 = var2 + var1 * f64::from(cal.p5) * 2.0;
    let var2: f64 = var2 / 4.0 + f64::from(cal.p4) * 65536.0;
    let var1: f64 =
        (f64::from(cal.p3) * var1 * var1 / 524288.0 + f64::from(cal.p2) * var1) / 524288.0;
    let var1: f64 = (1.0 + var1 / 32768.0) * f64::from(cal.p1);

    if var1 == 0.0 {
        // the sensor cannot report a pressure without a divisor
        return f64::NAN;
    }

    let p: f64 = 1048576.0 - f64::from(adc_p);
    let p: f64 = ((p - var2 / 4096.0) * 6250.0) / var1;
    let var1: f64 = f64::from(cal.p9) * p * p / 2147483648.0;
    let var2: f64 = p * f64::from(cal.p8) / 32768.0;

    (p + (var1 + var2 + f64::from(cal.p7)) / 16.0) / 100.0
}

/// Pressure in hPa, rounded to 0.01 hPa.
///
/// Returns NaN when the intermediate divisor is zero.
///
/// # Example
///
/// ```
/// use bme280_mux::{compensation, Calibration};
///
/// let cal = Calibration {
///     p1: 0,
///     ..Calibration::default()
/// };
/// assert!(compensation::pressure(&cal, 415148, 128422).is_nan());
/// ```
pub fn pressure(cal: &Calibration, adc_p: u32, t_fine: i32) -> f32 {
    round_to(pressure_hpa(cal, adc_p, t_fine), 2) as f32
}

fn sea_level_hpa(pressure: f64, temperature: f64, elevation: f64) -> f64 {
    let drop: f64 = LAPSE_RATE * elevation;
    pressure * libm::pow(1.0 - drop / (temperature + drop + KELVIN), -BAROMETRIC_EXPONENT)
}

/// Reduce a station pressure in hPa to sea level.
///
/// `temperature` is the station temperature in °C, `elevation` is the
/// station height above sea level in meters.
/// An elevation of zero or less returns the pressure unchanged.
///
/// [`compensate`] applies the same correction to the unrounded station
/// pressure, so its result can differ from this one by 0.01 hPa.
///
/// # Example
///
/// ```
/// use bme280_mux::compensation::sea_level;
///
/// assert_eq!(sea_level(1006.53, 25.1, 0.0), 1006.53);
/// assert!(sea_level(1006.53, 25.1, 500.0) > 1006.53);
/// ```
pub fn sea_level(pressure: f32, temperature: f32, elevation: f32) -> f32 {
    if elevation <= 0.0 || pressure.is_nan() {
        return pressure;
    }
    round_to(
        sea_level_hpa(
            f64::from(pressure),
            f64::from(temperature),
            f64::from(elevation),
        ),
        2,
    ) as f32
}

/// Relative humidity in %RH, clamped to `0..=100` and rounded to 0.1 %RH.
pub fn humidity(cal: &Calibration, adc_h: u16, t_fine: i32) -> f32 {
    let var1: f64 = f64::from(t_fine) - 76800.0;
    let var1: f64 = (f64::from(adc_h)
        - (f64::from(cal.h4) * 64.0 + f64::from(cal.h5) / 16384.0 * var1))
        * (f64::from(cal.h2) / 65536.0
            * (1.0
                + f64::from(cal.h6) / 67108864.0
                    * var1
                    * (1.0 + f64::from(cal.h3) / 67108864.0 * var1)));
    let var1: f64 = var1 * (1.0 - f64::from(cal.h1) * var1 / 524288.0);

    round_to(var1.clamp(0.0, 100.0), 1) as f32
}

/// Altitude in meters for a station pressure, using the hypsometric formula.
///
/// `sea_level` and `pressure` are in hPa, `temperature` is in °C.
pub fn altitude(pressure: f32, sea_level: f32, temperature: f32) -> f32 {
    let ratio: f64 = f64::from(sea_level) / f64::from(pressure);
    ((libm::pow(ratio, 1.0 / BAROMETRIC_EXPONENT) - 1.0) * (f64::from(temperature) + KELVIN)
        / LAPSE_RATE) as f32
}

/// Compensate all three channels of one measurement cycle.
///
/// Skipped channels decode to NaN.
/// A positive `elevation` reduces the pressure to sea level using the
/// temperature of the same cycle.
pub fn compensate(cal: &Calibration, raw: &Raw, elevation: f32) -> crate::Sample {
    if raw.temperature == SKIPPED_20 {
        // pressure and humidity cannot be compensated without t_fine
        return crate::Sample::NAN;
    }

    let t_fine: i32 = fine_temperature(cal, raw.temperature);
    let temperature: f32 = temperature(t_fine);

    let pressure: f32 = if raw.pressure == SKIPPED_20 {
        f32::NAN
    } else {
        let station: f64 = pressure_hpa(cal, raw.pressure, t_fine);
        let reduced: f64 = if elevation > 0.0 {
            sea_level_hpa(station, f64::from(temperature), f64::from(elevation))
        } else {
            station
        };
        // rounded once, after the correction
        round_to(reduced, 2) as f32
    };

    let humidity: f32 = if raw.humidity == SKIPPED_16 {
        f32::NAN
    } else {
        humidity(cal, raw.humidity, t_fine)
    };

    crate::Sample {
        pressure,
        temperature,
        humidity,
    }
}
