//! This crate dumps the flash of SinoWealth 8051 microcontrollers through their debug pins.  The
//! target speaks two undocumented protocols over the same four lines: a JTAG TAP variant and a
//! proprietary In-Circuit Programming (ICP) serial protocol.  Both were worked out by watching
//! the vendor's programmer, so the timings, bit orders and magic sequences used here are exactly
//! the ones that were observed to work and should not be tidied up.
//!
//! At the lowest level, the `Cable` trait drives TCK, TMS and TDI and samples TDO.  `Gpio` does
//! that with `embedded-hal` pins on a microcontroller, `Ft232r` (feature `std`) from a PC, and
//! `SimTarget` against a simulated chip for testing.
//!
//! `JtagSM` walks the TAP one transition at a time, and the `icp` module frames ICP bytes.
//! `Dumper` sits on top of both: it wakes the target up, switches between the READY, ICP and JTAG
//! modes, checks the session is alive and reads flash in chunks by either path.
//!
//! # Example
//! ```
//! use sinowealth_dumper::cable::sim::SimTarget;
//! use sinowealth_dumper::chip::ChipConfig;
//! use sinowealth_dumper::dumper::{Dumper, CHUNK_SIZE};
//!
//! let target = SimTarget::with_flash((0..32768u32).map(|x| x as u8).collect());
//! let mut dumper = Dumper::new(target, ChipConfig::default()).unwrap();
//! dumper.connect().unwrap();
//! assert!(dumper.check_icp().unwrap());
//!
//! let mut chunk = [0; CHUNK_SIZE];
//! dumper.read_flash_icp(&mut chunk, 0x1230, false).unwrap();
//! assert_eq!(chunk[0], 0x30);
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

use core::fmt;

pub mod bits;
pub mod cable;
pub mod chip;
pub mod dump;
pub mod dumper;
pub mod icp;
pub mod keil;
pub mod statemachine;

#[doc(inline)]
pub use crate::cable::Cable;
#[doc(inline)]
pub use crate::chip::ChipConfig;
#[doc(inline)]
pub use crate::dumper::{Dumper, Mode};

/// Error type used by `Dumper`.  `E` is the error type of the underlying `Cable`.
///
/// A target that answers with garbage is not an error at this level: the protocols have no
/// checksums, so bad timing shows up as wrong data or as a failed `check_icp` / `check_jtag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// Driving or sampling a line failed.  The target is left in an unknown state and the
    /// session is dropped to `Mode::Error`.
    Cable(E),

    /// The requested operation cannot be done by this path, for instance reading the custom
    /// block over JTAG.
    Unsupported,

    /// The liveness check before a dump failed, so nothing read afterwards could be trusted.
    NoSession,

    /// There is no debug session.  Either `connect()` was never called or an earlier failure
    /// dropped the session; power cycle the target and connect again.
    Disconnected,
}

impl<E> Error<E> {
    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::Cable(_) => "Cable Error",
            Error::Unsupported => "Unsupported Operation",
            Error::NoSession => "No Debug Session",
            Error::Disconnected => "Disconnected",
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Cable(e) => write!(f, "{}: {e:?}", self.as_str()),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::Cable(error)
    }
}
