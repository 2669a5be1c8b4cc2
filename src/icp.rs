//! ICP (In-Circuit Programming) framing.
//!
//! ICP bytes go out MSB first on TDI and come back LSB first on TDO.  Every byte in either
//! direction is followed by one extra clock pulse that acts as a delimiter.  None of this touches
//! TMS, so it is independent of the TAP state.
#[allow(unused_imports)]
use log::{debug, trace};

use crate::bits::{self, BitOrder};
use crate::cable::{Cable, Line};

/// ICP command opcodes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IcpCommand {
    SetOffsetLow = 0x40,
    SetOffsetHigh = 0x41,
    GetOffset = 0x43,
    ReadFlash = 0x44,
    /// Unlock sequence required before addressing flash on everything but type 1 chips.
    /// Followed by `PRELUDE_ARGS`.
    Prelude = 0x46,
    Ping = 0x49,
    ReadCustomBlock = 0x4A,
    SetXPage = 0x4C,
}

pub const PRELUDE_ARGS: [u8; 2] = [0xFE, 0xFF];

/// Argument following `IcpCommand::Ping`
pub const PING_ARG: u8 = 0xFF;

/// Wait 1 us, raise TCK, wait 1 us, lower TCK
pub fn pulse_clock<C: Cable>(cable: &mut C) -> Result<(), C::Error> {
    cable.delay_us(1);
    cable.set(Line::Tck, 1)?;
    cable.set_line(Line::Tck, false)
}

pub fn send_byte<C: Cable>(cable: &mut C, value: u8) -> Result<(), C::Error> {
    bits::shift::<C::Error>(8, BitOrder::MsbFirst, value as u32, |bit, _| {
        cable.set_line(Line::Tdi, bit)?;
        pulse_clock(cable)?;
        Ok(false)
    })?;
    pulse_clock(cable)?;
    cable.set_line(Line::Tdi, false)
}

pub fn receive_byte<C: Cable>(cable: &mut C) -> Result<u8, C::Error> {
    let value = bits::shift(8, BitOrder::LsbFirst, 0, |_, _| {
        pulse_clock(cable)?;
        cable.read_tdo()
    })?;
    pulse_clock(cable)?;
    Ok(value as u8)
}

pub fn send_command<C: Cable>(cable: &mut C, command: IcpCommand, arg: u8) -> Result<(), C::Error> {
    trace!("ICP {command:?} 0x{arg:02X}");
    send_byte(cable, command as u8)?;
    send_byte(cable, arg)
}

/// Send a mode select byte, MSB first, followed by two priming clocks.  The clock must be low on
/// entry.
pub fn send_mode<C: Cable>(cable: &mut C, mode: u8) -> Result<(), C::Error> {
    debug!("Selecting mode 0x{mode:02X}");
    bits::shift::<C::Error>(8, BitOrder::MsbFirst, mode as u32, |bit, _| {
        cable.set_line(Line::Tdi, bit)?;
        cable.set(Line::Tck, 2)?;
        cable.clear(Line::Tck, 2)?;
        Ok(false)
    })?;

    for _ in 0..2 {
        cable.set(Line::Tck, 2)?;
        cable.clear(Line::Tck, 2)?;
    }
    Ok(())
}
