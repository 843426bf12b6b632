use crate::reg;

/// Number of calibration registers in the `0x88..=0xA1` block.
pub const NUM_CALIB_TP_REG: usize = (reg::DIG_H1 - reg::DIG_T1 + 1) as usize;

/// Number of calibration registers in the `0xE1..=0xE7` block.
pub const NUM_CALIB_H_REG: usize = (reg::DIG_H6 - reg::DIG_H2 + 1) as usize;

/// Total number of calibration registers.
pub const NUM_CALIB_REG: usize = NUM_CALIB_TP_REG + NUM_CALIB_H_REG;

/// BME280 calibration data.
///
/// The trimming coefficients are burned into the sensor NVM at the factory.
/// They are read once during initialization and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct Calibration {
    pub t1: u16, // 0x88..0x89 buf[00:01]
    pub t2: i16, // 0x8A..0x8B buf[02:03]
    pub t3: i16, // 0x8C..0x8D buf[04:05]
    pub p1: u16, // 0x8E..0x8F buf[06:07]
    pub p2: i16, // 0x90..0x91 buf[08:09]
    pub p3: i16, // 0x92..0x93 buf[10:11]
    pub p4: i16, // 0x94..0x95 buf[12:13]
    pub p5: i16, // 0x96..0x97 buf[14:15]
    pub p6: i16, // 0x98..0x99 buf[16:17]
    pub p7: i16, // 0x9A..0x9B buf[18:19]
    pub p8: i16, // 0x9C..0x9D buf[20:21]
    pub p9: i16, // 0x9E..0x9F buf[22:23]
    // INTENTIONAL ONE BYTE GAP (see datasheet)
    pub h1: u8,  // 0xA1       buf[25]
    pub h2: i16, // 0xE1..0xE2 buf[26:27]
    pub h3: u8,  // 0xE3       buf[28]
    pub h4: i16, // 0xE4..0xE5[3:0] = H4 [11:4]..[3:0]
    pub h5: i16, // 0xE5[7:4]..0xE6 = H5 [3:0]..[11:4]
    pub h6: i8,  // 0xE7       buf[32]
}

impl Calibration {
    /// Assemble the calibration from the two register blocks.
    ///
    /// `tp` holds registers `0x88..=0xA1`, `h` holds registers `0xE1..=0xE7`.
    ///
    /// # Example
    ///
    /// ```
    /// use bme280_mux::Calibration;
    ///
    /// let mut h = [0u8; 7];
    /// h[3] = 0x1E; // 0xE4
    /// h[4] = 0x0F; // 0xE5
    /// h[5] = 0x02; // 0xE6
    ///
    /// let cal = Calibration::from_registers(&[0; 26], &h);
    /// assert_eq!(cal.h4, 0x1EF);
    /// assert_eq!(cal.h5, 0x020);
    /// ```
    pub fn from_registers(tp: &[u8; NUM_CALIB_TP_REG], h: &[u8; NUM_CALIB_H_REG]) -> Self {
        let mut buf: [u8; NUM_CALIB_REG] = [0; NUM_CALIB_REG];
        buf[..NUM_CALIB_TP_REG].copy_from_slice(tp);
        buf[NUM_CALIB_TP_REG..].copy_from_slice(h);
        buf.into()
    }
}

impl From<[u8; NUM_CALIB_REG]> for Calibration {
    fn from(buf: [u8; NUM_CALIB_REG]) -> Self {
        Calibration {
            t1: u16::from_le_bytes([buf[0], buf[1]]),
            t2: i16::from_le_bytes([buf[2], buf[3]]),
            t3: i16::from_le_bytes([buf[4], buf[5]]),
            p1: u16::from_le_bytes([buf[6], buf[7]]),
            p2: i16::from_le_bytes([buf[8], buf[9]]),
            p3: i16::from_le_bytes([buf[10], buf[11]]),
            p4: i16::from_le_bytes([buf[12], buf[13]]),
            p5: i16::from_le_bytes([buf[14], buf[15]]),
            p6: i16::from_le_bytes([buf[16], buf[17]]),
            p7: i16::from_le_bytes([buf[18], buf[19]]),
            p8: i16::from_le_bytes([buf[20], buf[21]]),
            p9: i16::from_le_bytes([buf[22], buf[23]]),
            h1: buf[25],
            h2: i16::from_le_bytes([buf[26], buf[27]]),
            h3: buf[28],
            // H4 = 0xE4 << 4 | 0xE5[3:0]
            h4: ((buf[29] as i8 as i16) << 4) | ((buf[30] as i16) & 0x0F),
            // H5 = 0xE6 << 4 | 0xE5[7:4]
            h5: ((buf[31] as i8 as i16) << 4) | ((buf[30] as i16) >> 4),
            h6: buf[32] as i8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn humidity_nibbles() {
        let mut h: [u8; NUM_CALIB_H_REG] = [0; NUM_CALIB_H_REG];
        h[3] = 0x13;
        h[4] = 0x29;
        h[5] = 0x03;
        let cal = Calibration::from_registers(&[0; NUM_CALIB_TP_REG], &h);
        assert_eq!(cal.h4, 313);
        assert_eq!(cal.h5, 50);
    }

    #[test]
    fn humidity_sign_extension() {
        let mut h: [u8; NUM_CALIB_H_REG] = [0; NUM_CALIB_H_REG];
        h[3] = 0xFF;
        h[4] = 0xF1;
        h[5] = 0xFF;
        let cal = Calibration::from_registers(&[0; NUM_CALIB_TP_REG], &h);
        assert_eq!(cal.h4, -15);
        assert_eq!(cal.h5, -1);
    }

    #[test]
    fn little_endian_words() {
        let mut tp: [u8; NUM_CALIB_TP_REG] = [0; NUM_CALIB_TP_REG];
        tp[0] = 0x70;
        tp[1] = 0x6B;
        tp[4] = 0x18;
        tp[5] = 0xFC;
        tp[25] = 75;
        let cal = Calibration::from_registers(&tp, &[0; NUM_CALIB_H_REG]);
        assert_eq!(cal.t1, 27504);
        assert_eq!(cal.t3, -1000);
        assert_eq!(cal.h1, 75);
    }
}
