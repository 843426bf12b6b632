use crate::mux::{Arbiter, Lock, MuxAddress, Unguarded};
use crate::{spi_read_addr, spi_write_addr, Interface};
use core::convert::Infallible;

/// BME280 bus.
///
/// Every frame is wrapped in an acquisition of the arbiter `A`, which is a
/// no-op for [`Unguarded`].
#[derive(Debug)]
pub struct Bme280Bus<SPI, CS, A = Unguarded> {
    bus: SPI,
    cs: CS,
    gate: A,
}

/// SPI mode for the BME280.
///
/// The BME280 also supports mode 3.
pub const MODE: eh0::spi::Mode = eh0::spi::MODE_0;

/// BME280 SPI error type.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error<SpiError, PinError, GateError = Infallible> {
    /// SPI bus error wrapper.
    Spi(SpiError),
    /// Chip select pin error wrapper.
    Pin(PinError),
    /// Arbitration error wrapper.
    Gate(GateError),
}

impl<SPI, CS> Bme280Bus<SPI, CS> {
    /// Creates a new `Bme280Bus` from a SPI peripheral and a chip select
    /// digital I/O pin.
    ///
    /// The chip select pin must be high before being passed to this function.
    ///
    /// # Example
    ///
    /// ```
    /// # let spi = ehm::eh0::spi::Mock::new(&[
    /// #   ehm::eh0::spi::Transaction::write(vec![0xD0]),
    /// #   ehm::eh0::spi::Transaction::transfer(vec![0], vec![0x60]),
    /// # ]);
    /// # let mut pin = ehm::eh0::digital::Mock::new(&[
    /// #    ehm::eh0::digital::Transaction::set(ehm::eh0::digital::State::High),
    /// #    ehm::eh0::digital::Transaction::set(ehm::eh0::digital::State::Low),
    /// #    ehm::eh0::digital::Transaction::set(ehm::eh0::digital::State::High),
    /// # ]);
    /// use bme280_mux::spi0::Bme280Bus;
    /// use bme280_mux::{reg, Bme280Bus as _};
    /// use eh0::digital::v2::OutputPin;
    ///
    /// pin.set_high().unwrap();
    /// let mut bus: Bme280Bus<_, _> = Bme280Bus::new(spi, pin);
    /// let mut id: [u8; 1] = [0];
    /// bus.read_regs(reg::CHIP_ID, &mut id).unwrap();
    /// assert_eq!(id, [bme280_mux::CHIP_ID]);
    /// # let (mut spi, mut pin) = bus.free();
    /// # spi.done(); pin.done();
    /// ```
    #[inline]
    pub fn new(bus: SPI, cs: CS) -> Self {
        Self::with_arbiter(bus, cs, Unguarded)
    }
}

impl<SPI, CS, A> Bme280Bus<SPI, CS, A> {
    /// Creates a new `Bme280Bus` that shares the SPI peripheral with other
    /// sensors through an arbiter, usually a [`crate::mux::Gate`].
    #[inline]
    pub fn with_arbiter(bus: SPI, cs: CS, gate: A) -> Self {
        Bme280Bus { bus, cs, gate }
    }

    /// Arbiter of this bus.
    #[inline]
    pub fn arbiter_mut(&mut self) -> &mut A {
        &mut self.gate
    }

    /// Free the SPI bus and CS pin from the BME280.
    #[inline]
    pub fn free(self) -> (SPI, CS) {
        (self.bus, self.cs)
    }

    /// Free the SPI bus, CS pin, and arbiter from the BME280.
    #[inline]
    pub fn into_parts(self) -> (SPI, CS, A) {
        (self.bus, self.cs, self.gate)
    }
}

impl<SPI, CS, A, PinError> Bme280Bus<SPI, CS, A>
where
    CS: eh0::digital::v2::OutputPin<Error = PinError>,
    A: Arbiter,
{
    fn with_chip_enable<T, SpiError, F>(
        &mut self,
        f: F,
    ) -> Result<T, Error<SpiError, PinError, A::Error>>
    where
        F: FnOnce(&mut SPI) -> Result<T, SpiError>,
    {
        let lock: Lock<'_, A> = Lock::acquire(&mut self.gate).map_err(Error::Gate)?;
        self.cs.set_low().map_err(Error::Pin)?;
        let result: Result<T, _> = f(&mut self.bus).map_err(Error::Spi);
        let deselect: Result<(), _> = self.cs.set_high().map_err(Error::Pin);
        lock.release().map_err(Error::Gate)?;
        deselect?;
        result
    }
}

impl<SPI, CS, A, SpiError, PinError> crate::Bme280Bus for Bme280Bus<SPI, CS, A>
where
    SPI: eh0::blocking::spi::Transfer<u8, Error = SpiError>
        + eh0::blocking::spi::Write<u8, Error = SpiError>,
    CS: eh0::digital::v2::OutputPin<Error = PinError>,
    A: Arbiter,
{
    type Error = Error<SpiError, PinError, A::Error>;

    const INTERFACE: Interface = Interface::Spi;

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.with_chip_enable(|spi| {
            spi.write(&[spi_read_addr(reg)])?;
            spi.transfer(buf)?;
            Ok(())
        })
    }

    fn write_reg(&mut self, reg: u8, data: u8) -> Result<(), Self::Error> {
        self.with_chip_enable(|spi| spi.write(&[spi_write_addr(reg), data]))
    }

    fn mux_address(&self) -> Option<MuxAddress> {
        self.gate.mux_address()
    }
}
