pub use crate::Address;
use crate::Interface;

/// BME280 bus.
#[derive(Debug)]
pub struct Bme280Bus<I2C> {
    address: u8,
    bus: I2C,
}

impl<I2C, E> Bme280Bus<I2C>
where
    I2C: eh1::i2c::I2c<Error = E>,
{
    /// Creates a new `Bme280Bus` from an I2C peripheral, and an I2C
    /// device address.
    ///
    /// # Example
    ///
    /// ```
    /// # let i2c = ehm::eh1::i2c::Mock::new(&[]);
    /// use bme280_mux::i2c1::{Address, Bme280Bus};
    ///
    /// let bus: Bme280Bus<_> = Bme280Bus::new(i2c, Address::SdoVddio);
    /// # bus.free().done();
    /// ```
    #[inline]
    pub fn new(bus: I2C, address: Address) -> Self {
        Self {
            bus,
            address: address as u8,
        }
    }

    /// Free the I2C bus from the BME280.
    #[inline]
    pub fn free(self) -> I2C {
        self.bus
    }
}

impl<I2C, E> crate::Bme280Bus for Bme280Bus<I2C>
where
    I2C: eh1::i2c::I2c<Error = E>,
{
    type Error = E;

    const INTERFACE: Interface = Interface::I2c;

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.write_read(self.address, &[reg], buf)
    }

    fn write_reg(&mut self, reg: u8, data: u8) -> Result<(), Self::Error> {
        self.bus.write(self.address, &[reg, data])
    }
}
