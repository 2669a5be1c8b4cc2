//! Implement the `Cable` trait for FTDI FT232R-based adapters in asynchronous bit-bang mode, so
//! a dump can be driven from a PC instead of a microcontroller.  Each line change costs one USB
//! write, which is slow but keeps the timing at or above what the target asks for.
use std::thread;
use std::time::Duration;

use libftd2xx::{BitMode, FtStatus, Ftdi, FtdiCommon};

use crate::cable::{Cable, Line};

pub struct Ft232r {
    ft: Ftdi,
    tdi: u8,
    tdo: u8,
    tms: u8,
    clk: u8,
    state: u8,
}

impl Ft232r {
    /// Create a new Ft232r.  `description` is the value passed to `Ftdi::with_description` to
    /// select which hardware to use; the remaining arguments are bit numbers on the ADBUS port.
    pub fn new(description: &str, baud: u32, tdi: u8, tdo: u8, tms: u8, clk: u8) -> Result<Self, FtStatus> {
        let mut ft = Ftdi::with_description(description)?;
        ft.set_baud_rate(baud)?;
        ft.set_bit_mode(1 << tdi | 1 << tms | 1 << clk, BitMode::AsyncBitbang)?;
        ft.purge_all()?;

        let mut cable = Self {
            ft,
            tdi,
            tdo,
            tms,
            clk,
            state: 0,
        };
        cable.flush()?;
        Ok(cable)
    }

    fn flush(&mut self) -> Result<(), FtStatus> {
        self.ft.write(&[self.state])?;
        Ok(())
    }
}

impl Cable for Ft232r {
    type Error = FtStatus;

    fn set_line(&mut self, line: Line, high: bool) -> Result<(), FtStatus> {
        let bit = match line {
            Line::Tck => self.clk,
            Line::Tms => self.tms,
            Line::Tdi => self.tdi,
        };
        if high {
            self.state |= 1 << bit;
        } else {
            self.state &= !(1 << bit);
        }
        self.flush()
    }

    fn read_tdo(&mut self) -> Result<bool, FtStatus> {
        let pins = self.ft.bit_mode()?;
        Ok(pins & (1 << self.tdo) != 0)
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }
}
