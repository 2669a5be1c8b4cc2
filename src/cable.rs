//! Implementations for the different ways of driving the four debug lines live here.  Anything
//! that can drive TCK, TMS and TDI and sample TDO should implement the `Cable` trait.
//!
//! `Cable` is primitive: one line change or one sample per call.  All timing is
//! decided by the caller through `delay_us`, because the target only tolerates the exact
//! sequences the protocol layer emits.
pub mod gpio;
pub mod sim;
#[cfg(feature = "std")]
pub mod ft232r;

/// The lines driven by the host.  TDO is the only input and is read through `Cable::read_tdo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line {
    /// Clock
    Tck,
    /// Mode select
    Tms,
    /// Data into the target
    Tdi,
}

pub trait Cable {
    type Error: core::fmt::Debug;

    /// Drive `line` high or low.  Takes effect immediately, settling is the caller's business.
    fn set_line(&mut self, line: Line, high: bool) -> Result<(), Self::Error>;

    /// Sample the TDO line.
    fn read_tdo(&mut self) -> Result<bool, Self::Error>;

    /// Busy-wait for `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Drive `line` high then wait `us` microseconds
    fn set(&mut self, line: Line, us: u32) -> Result<(), Self::Error> {
        self.set_line(line, true)?;
        self.delay_us(us);
        Ok(())
    }

    /// Drive `line` low then wait `us` microseconds
    fn clear(&mut self, line: Line, us: u32) -> Result<(), Self::Error> {
        self.set_line(line, false)?;
        self.delay_us(us);
        Ok(())
    }

    /// Low then high, `us` microseconds after each edge.  Used by the wake-up handshake.
    fn pulse_low(&mut self, line: Line, us: u32) -> Result<(), Self::Error> {
        self.clear(line, us)?;
        self.set(line, us)
    }
}

impl<T: Cable + ?Sized> Cable for &mut T {
    type Error = T::Error;

    fn set_line(&mut self, line: Line, high: bool) -> Result<(), Self::Error> {
        (**self).set_line(line, high)
    }

    fn read_tdo(&mut self) -> Result<bool, Self::Error> {
        (**self).read_tdo()
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
