//! Arbitration for several BME280s sharing one SPI controller.
//!
//! The chip selects of up to eight sensors are driven by a 3-to-8 line
//! decoder (74HC138 or similar).
//! A shared GPIO acts as a hardware mutex: it enables the decoder, and every
//! instance, possibly in another process, must see it low before taking it.
//!
//! ```text
//!            +-----------+
//! A0 ------->| A0     Y0 |---> CSB sensor 0
//! A1 ------->| A1     .. |
//! A2 ------->| A2     Y7 |---> CSB sensor 7
//! LOCK ----->| E3        |
//!            +-----------+
//! ```
//!
//! The address lines only carry a meaningful value while the lock line is
//! held by the instance that drove them.

use core::convert::Infallible;
use core::time::Duration;
use eh1::delay::DelayNs;
use eh1::digital::{InputPin, OutputPin, PinState};

/// Default interval between two polls of a held lock line.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default number of polls of a held lock line before giving up.
pub const MAX_POLLS: u32 = 50;

/// Decoder output that selects a sensor, `0..=7`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct MuxAddress(u8);

impl MuxAddress {
    /// Create a new multiplexer address.
    ///
    /// Returns `None` if `addr` does not fit in three bits.
    ///
    /// # Example
    ///
    /// ```
    /// use bme280_mux::mux::MuxAddress;
    ///
    /// assert_eq!(MuxAddress::new(5).map(|a| a.get()), Some(5));
    /// assert_eq!(MuxAddress::new(8), None);
    /// ```
    pub const fn new(addr: u8) -> Option<Self> {
        if addr < 8 {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// Address value.
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// Level of address line `n`.
    pub const fn bit(&self, n: usize) -> PinState {
        if (self.0 >> n) & 1 == 1 {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

/// Multiplexer error.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error<P> {
    /// GPIO pin error wrapper.
    Pin(P),
    /// The lock line was still held after the maximum number of polls.
    Timeout,
}

/// Exclusive access to a shared bus.
pub trait Arbiter {
    /// Arbitration error.
    type Error;

    /// Block until the bus is owned by this instance.
    fn acquire(&mut self) -> Result<(), Self::Error>;

    /// Give up ownership of the bus.
    fn release(&mut self) -> Result<(), Self::Error>;

    /// Decoder address of this instance, if any.
    fn mux_address(&self) -> Option<MuxAddress> {
        None
    }
}

/// Arbiter for a sensor that has the SPI controller to itself.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Unguarded;

impl Arbiter for Unguarded {
    type Error = Infallible;

    #[inline]
    fn acquire(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    #[inline]
    fn release(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Scoped ownership of an [`Arbiter`].
///
/// Dropping the guard releases the bus, use [`Lock::release`] to observe
/// release errors.
#[derive(Debug)]
pub struct Lock<'a, A: Arbiter> {
    arbiter: Option<&'a mut A>,
}

impl<'a, A: Arbiter> Lock<'a, A> {
    /// Acquire the arbiter.
    pub fn acquire(arbiter: &'a mut A) -> Result<Self, A::Error> {
        arbiter.acquire()?;
        Ok(Self {
            arbiter: Some(arbiter),
        })
    }

    /// Release the arbiter.
    pub fn release(mut self) -> Result<(), A::Error> {
        match self.arbiter.take() {
            Some(arbiter) => arbiter.release(),
            None => Ok(()),
        }
    }
}

impl<A: Arbiter> Drop for Lock<'_, A> {
    fn drop(&mut self) {
        if let Some(arbiter) = self.arbiter.take() {
            if arbiter.release().is_err() {
                log::warn!("failed to release the multiplexer lock line");
            }
        }
    }
}

/// Lock line, address lines, and the decoder address of one sensor.
#[derive(Debug)]
pub struct Multiplexer<LOCK, SEL, D> {
    lock: LOCK,
    select: [SEL; 3],
    address: MuxAddress,
    delay: D,
    interval: Duration,
    max_polls: u32,
    held: bool,
}

impl<LOCK, SEL, D, E> Multiplexer<LOCK, SEL, D>
where
    LOCK: InputPin<Error = E> + OutputPin<Error = E>,
    SEL: OutputPin<Error = E>,
    D: DelayNs,
{
    /// Create a new multiplexer.
    ///
    /// `select` holds the address lines A0, A1, and A2 of the decoder.
    #[inline]
    pub fn new(lock: LOCK, select: [SEL; 3], address: MuxAddress, delay: D) -> Self {
        Self {
            lock,
            select,
            address,
            delay,
            interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
            held: false,
        }
    }

    /// Set the interval and the maximum number of polls of a held lock line.
    #[must_use = "set_polling returns a modified Multiplexer"]
    pub fn set_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Returns `true` while this instance holds the lock line.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Drive the lock line low if this instance holds it.
    ///
    /// Intended for shutdown hooks, so that a process terminated in the
    /// middle of a transfer does not leave the bus locked.
    pub fn force_release(&mut self) -> Result<(), Error<E>> {
        if self.held {
            self.release()
        } else {
            Ok(())
        }
    }

    /// Free the pins and the delay.
    pub fn free(self) -> (LOCK, [SEL; 3], D) {
        (self.lock, self.select, self.delay)
    }
}

impl<LOCK, SEL, D, E> Arbiter for Multiplexer<LOCK, SEL, D>
where
    LOCK: InputPin<Error = E> + OutputPin<Error = E>,
    SEL: OutputPin<Error = E>,
    D: DelayNs,
{
    type Error = Error<E>;

    fn acquire(&mut self) -> Result<(), Self::Error> {
        let interval: u32 = u32::try_from(self.interval.as_micros()).unwrap_or(u32::MAX);
        let mut polls: u32 = 0;
        while self.lock.is_high().map_err(Error::Pin)? {
            if polls >= self.max_polls {
                log::warn!(
                    "multiplexer lock still held after {} polls, giving up on address {}",
                    polls,
                    self.address.get()
                );
                return Err(Error::Timeout);
            }
            polls += 1;
            self.delay.delay_us(interval);
        }

        for (n, pin) in self.select.iter_mut().enumerate() {
            pin.set_state(self.address.bit(n)).map_err(Error::Pin)?;
        }
        self.lock.set_high().map_err(Error::Pin)?;
        self.held = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.lock.set_low().map_err(Error::Pin)?;
        self.held = false;
        Ok(())
    }

    fn mux_address(&self) -> Option<MuxAddress> {
        Some(self.address)
    }
}

/// Possibly incomplete multiplexer wiring.
#[derive(Debug)]
pub struct Wiring<LOCK, SEL> {
    /// Shared lock line.
    pub lock: Option<LOCK>,
    /// Decoder address lines A0, A1, and A2.
    pub select: [Option<SEL>; 3],
}

/// Arbitration gate built from a [`Wiring`].
#[derive(Debug)]
pub enum Gate<LOCK, SEL, D> {
    /// Fully wired, every transfer is arbitrated.
    Multiplexed(Multiplexer<LOCK, SEL, D>),
    /// Partially wired, transfers are not arbitrated.
    ///
    /// This is unsafe when other instances on the same controller do use
    /// arbitration.
    Misconfigured(MuxAddress),
}

impl<LOCK, SEL, D, E> Gate<LOCK, SEL, D>
where
    LOCK: InputPin<Error = E> + OutputPin<Error = E>,
    SEL: OutputPin<Error = E>,
    D: DelayNs,
{
    /// Create a gate, falling back to unguarded access with a warning when
    /// the lock line or any address line is missing.
    pub fn from_wiring(wiring: Wiring<LOCK, SEL>, address: MuxAddress, delay: D) -> Self {
        match wiring {
            Wiring {
                lock: Some(lock),
                select: [Some(a0), Some(a1), Some(a2)],
            } => Gate::Multiplexed(Multiplexer::new(lock, [a0, a1, a2], address, delay)),
            Wiring { lock: None, .. } => {
                log::warn!(
                    "multiplexed SPI disabled for address {}: lock line is not wired",
                    address.get()
                );
                Gate::Misconfigured(address)
            }
            Wiring { .. } => {
                log::warn!(
                    "multiplexed SPI disabled for address {}: address lines are not wired",
                    address.get()
                );
                Gate::Misconfigured(address)
            }
        }
    }

    /// Returns `true` if the wiring was incomplete and arbitration is off.
    #[inline]
    pub fn is_misconfigured(&self) -> bool {
        matches!(self, Gate::Misconfigured(_))
    }

    /// Drive the lock line low if this instance holds it.
    ///
    /// See [`Multiplexer::force_release`].
    pub fn force_release(&mut self) -> Result<(), Error<E>> {
        match self {
            Gate::Multiplexed(mux) => mux.force_release(),
            Gate::Misconfigured(_) => Ok(()),
        }
    }
}

impl<LOCK, SEL, D, E> Arbiter for Gate<LOCK, SEL, D>
where
    LOCK: InputPin<Error = E> + OutputPin<Error = E>,
    SEL: OutputPin<Error = E>,
    D: DelayNs,
{
    type Error = Error<E>;

    fn acquire(&mut self) -> Result<(), Self::Error> {
        match self {
            Gate::Multiplexed(mux) => mux.acquire(),
            Gate::Misconfigured(_) => Ok(()),
        }
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        match self {
            Gate::Multiplexed(mux) => mux.release(),
            Gate::Misconfigured(_) => Ok(()),
        }
    }

    fn mux_address(&self) -> Option<MuxAddress> {
        match self {
            Gate::Multiplexed(mux) => mux.mux_address(),
            Gate::Misconfigured(address) => Some(*address),
        }
    }
}
