use crate::mux::{Arbiter, Lock, MuxAddress, Unguarded};
use crate::{spi_read_addr, spi_write_addr, Interface};
use core::convert::Infallible;
use eh1::spi::Operation;

/// BME280 bus.
///
/// Every transaction is wrapped in an acquisition of the arbiter `A`, which
/// is a no-op for [`Unguarded`].
#[derive(Debug)]
pub struct Bme280Bus<SPI, A = Unguarded> {
    spi: SPI,
    gate: A,
}

/// SPI mode for the BME280.
///
/// The BME280 also supports mode 3.
pub const MODE: eh1::spi::Mode = eh1::spi::MODE_0;

/// BME280 SPI error type.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error<SpiError, GateError = Infallible> {
    /// SPI device error wrapper.
    Spi(SpiError),
    /// Arbitration error wrapper.
    Gate(GateError),
}

impl<SPI> Bme280Bus<SPI> {
    /// Creates a new `Bme280Bus` from a SPI device.
    ///
    /// # Example
    ///
    /// ```
    /// # let spi = ehm::eh1::spi::Mock::new(&[
    /// #   ehm::eh1::spi::Transaction::transaction_start(),
    /// #   ehm::eh1::spi::Transaction::write(0xD0),
    /// #   ehm::eh1::spi::Transaction::read_vec(vec![0x60]),
    /// #   ehm::eh1::spi::Transaction::transaction_end(),
    /// # ]);
    /// use bme280_mux::spi1::Bme280Bus;
    /// use bme280_mux::{reg, Bme280Bus as _};
    ///
    /// let mut bus: Bme280Bus<_> = Bme280Bus::new(spi);
    /// let mut id: [u8; 1] = [0];
    /// bus.read_regs(reg::CHIP_ID, &mut id)?;
    /// assert_eq!(id, [bme280_mux::CHIP_ID]);
    /// # bus.free().done();
    /// # Ok::<(), bme280_mux::spi1::Error<bme280_mux::eh1::spi::ErrorKind>>(())
    /// ```
    #[inline]
    pub fn new(spi: SPI) -> Self {
        Self::with_arbiter(spi, Unguarded)
    }
}

impl<SPI, A> Bme280Bus<SPI, A> {
    /// Creates a new `Bme280Bus` that shares the SPI controller with other
    /// sensors through an arbiter, usually a [`crate::mux::Gate`].
    #[inline]
    pub fn with_arbiter(spi: SPI, gate: A) -> Self {
        Bme280Bus { spi, gate }
    }

    /// Arbiter of this bus.
    #[inline]
    pub fn arbiter_mut(&mut self) -> &mut A {
        &mut self.gate
    }

    /// Free the SPI device from the BME280.
    #[inline]
    pub fn free(self) -> SPI {
        self.spi
    }

    /// Free the SPI device and the arbiter from the BME280.
    #[inline]
    pub fn into_parts(self) -> (SPI, A) {
        (self.spi, self.gate)
    }
}

impl<SPI, A> Bme280Bus<SPI, A>
where
    SPI: eh1::spi::SpiDevice,
    A: Arbiter,
{
    fn transact(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Error<SPI::Error, A::Error>> {
        let lock: Lock<'_, A> = Lock::acquire(&mut self.gate).map_err(Error::Gate)?;
        let result: Result<(), _> = self.spi.transaction(operations).map_err(Error::Spi);
        lock.release().map_err(Error::Gate)?;
        result
    }
}

impl<SPI, A> crate::Bme280Bus for Bme280Bus<SPI, A>
where
    SPI: eh1::spi::SpiDevice,
    A: Arbiter,
{
    type Error = Error<SPI::Error, A::Error>;

    const INTERFACE: Interface = Interface::Spi;

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.transact(&mut [
            Operation::Write(&[spi_read_addr(reg)]),
            Operation::Read(buf),
        ])
    }

    fn write_reg(&mut self, reg: u8, data: u8) -> Result<(), Self::Error> {
        self.transact(&mut [Operation::Write(&[spi_write_addr(reg), data])])
    }

    fn mux_address(&self) -> Option<MuxAddress> {
        self.gate.mux_address()
    }
}
