//! The protocol engine.  `Dumper` owns the cable for its whole life, keeps track of which mode
//! the target is in and implements the connect handshake, mode switching and both flash read
//! paths.
//!
//! There is no way to ask the target which mode it is in, so the recorded `Mode` is only right
//! as long as nothing else touches the lines.
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::cable::{Cable, Line};
use crate::chip::{ChipConfig, BANK_SIZE};
use crate::icp::{self, IcpCommand};
use crate::statemachine::JtagSM;
use crate::Error;

/// Bytes returned by one read call from the dump loop
pub const CHUNK_SIZE: usize = 16;

/// Instruction register values
const IR_CONTROL: u8 = 2;
const IR_CONFIG: u8 = 3;
const IR_EXEC: u8 = 4;
const IR_READ: u8 = 12;
const IR_IDCODE: u8 = 14;

/// Width of the configuration and flash read data registers
const DR_WIDE: u8 = 23;

/// Written through `IR_CONFIG` after the control register is set up
const CONFIG_INIT: [u32; 3] = [0x403000, 0x402000, 0x400000];

/// Follows `CONFIG_INIT`.  Most likely clears the hardware breakpoints; some parts work without
/// it, others may not.
const BREAKPOINT_INIT: [u32; 8] = [
    0x630000, 0x670000, 0x6B0000, 0x6F0000, 0x730000, 0x770000, 0x7B0000, 0x7F0000,
];

/// Low bits shifted in after the address on every flash read cycle
const READ_MARKER: u32 = 0x0A;

/// 8051 code executed through `IR_EXEC` to switch banks: `MOV A,#bank` then `MOV 0xB7,A`.  The
/// target takes these bytes bit-reversed.
const BANK_SELECT: [u8; 4] = [0x74, 0x00, 0xF5, 0xB7];

/// Sentinel written to and read back from the ICP offset register
const ICP_SENTINEL: u8 = 0x69;

/// Wake-up handshake pulse counts
const WAKE_TMS_PULSES: u16 = 165;
const WAKE_TDI_PULSES: u16 = 105;
const WAKE_TCK_PULSES: u16 = 90;
const WAKE_LONG_PULSES: u16 = 25600;

/// TMS-high transitions used to leave JTAG mode
const JTAG_EXIT_CLOCKS: u8 = 35;

/// TMS-high transitions used to reset the TAP on entering JTAG mode
const JTAG_ENTRY_CLOCKS: u8 = 8;

/// The debug mode the target is in.  Exactly one is current; `Error` is where a `Dumper` starts
/// and where it ends up after anything goes wrong on the lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Error,
    Ready,
    Icp,
    Jtag,
}

impl Mode {
    const ICP_SELECT: u8 = 0x96;
    const JTAG_SELECT: u8 = 0xA5;

    /// Byte sent on TDI to select this mode, for the modes that can be selected
    pub const fn wire_byte(self) -> Option<u8> {
        match self {
            Mode::Icp => Some(Self::ICP_SELECT),
            Mode::Jtag => Some(Self::JTAG_SELECT),
            Mode::Error | Mode::Ready => None,
        }
    }
}

pub struct Dumper<C: Cable> {
    sm: JtagSM<C>,
    chip: ChipConfig,
    mode: Mode,
}

impl<C: Cable> Dumper<C> {
    /// Take over `cable` and drive all outputs low.  No session exists until `connect`.
    pub fn new(cable: C, chip: ChipConfig) -> Result<Self, Error<C::Error>> {
        let mut sm = JtagSM::new(cable);
        sm.cable.set_line(Line::Tck, false)?;
        sm.cable.set_line(Line::Tdi, false)?;
        sm.cable.set_line(Line::Tms, false)?;

        Ok(Self {
            sm,
            chip,
            mode: Mode::Error,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn chip(&self) -> &ChipConfig {
        &self.chip
    }

    pub fn cable(&self) -> &C {
        &self.sm.cable
    }

    /// Direct access to the lines.  Anything done through this invalidates the recorded mode.
    pub fn cable_mut(&mut self) -> &mut C {
        &mut self.sm.cable
    }

    /// Give up the cable, leaving the target in whatever mode it is in
    pub fn release(self) -> C {
        self.sm.cable
    }

    /// Wake the target up and start a debug session, ending in `Mode::Ready`.
    ///
    /// The pulse counts and delays are what the vendor programmer does and have to be reproduced
    /// exactly; if any of it is off the target never enters debug mode and nothing afterwards
    /// will make sense.
    pub fn connect(&mut self) -> Result<(), Error<C::Error>> {
        info!("Connecting to target");
        let result = self.wake_up();
        self.check_lines(result)?;
        self.mode = Mode::Ready;
        debug!("Target in READY mode");
        Ok(())
    }

    fn wake_up(&mut self) -> Result<(), Error<C::Error>> {
        let cable = &mut self.sm.cable;

        cable.set_line(Line::Tck, true)?;
        cable.set_line(Line::Tdi, true)?;
        cable.set_line(Line::Tms, true)?;
        cable.delay_us(500);

        cable.clear(Line::Tck, 1)?;
        cable.set(Line::Tck, 50)?;

        for _ in 0..WAKE_TMS_PULSES {
            cable.pulse_low(Line::Tms, 2)?;
        }
        for _ in 0..WAKE_TDI_PULSES {
            cable.pulse_low(Line::Tdi, 2)?;
        }
        for _ in 0..WAKE_TCK_PULSES {
            cable.pulse_low(Line::Tck, 2)?;
        }
        for _ in 0..WAKE_LONG_PULSES {
            cable.pulse_low(Line::Tms, 2)?;
        }
        cable.delay_us(8);

        cable.set_line(Line::Tms, false)?;
        cable.clear(Line::Tck, 2)?;

        icp::send_mode(cable, Mode::ICP_SELECT)?;

        cable.set(Line::Tck, 2)?;
        for _ in 0..WAKE_LONG_PULSES {
            cable.pulse_low(Line::Tck, 2)?;
        }

        cable.set(Line::Tms, 5)?;
        cable.clear(Line::Tms, 5)?;
        Ok(())
    }

    /// Leave the target parked in ICP mode.  ICP holds TCK high, which survives the host being
    /// reset or reflashed without losing the session, so the next run can skip `connect`.
    pub fn disconnect(&mut self) -> Result<(), Error<C::Error>> {
        self.switch_mode(Mode::Icp)
    }

    /// Bring the target back to `Mode::Ready` from either sub-protocol.  Does nothing once the
    /// session is in `Mode::Error`.
    pub fn reset(&mut self) -> Result<(), Error<C::Error>> {
        let result = self.reset_lines();
        self.check_lines(result)
    }

    fn reset_lines(&mut self) -> Result<(), Error<C::Error>> {
        match self.mode {
            Mode::Error => return Ok(()),
            Mode::Jtag => {
                self.sm.mode_reset(JTAG_EXIT_CLOCKS)?;
                self.sm.cable.set_line(Line::Tck, true)?;
                self.sm.cable.set_line(Line::Tms, false)?;
            }
            Mode::Ready | Mode::Icp => {
                let cable = &mut self.sm.cable;
                cable.set_line(Line::Tck, true)?;
                cable.set(Line::Tms, 2)?;
                cable.clear(Line::Tms, 2)?;
            }
        }

        trace!("{:?} -> Ready", self.mode);
        self.mode = Mode::Ready;
        Ok(())
    }

    /// Put the target into `mode`.  Does nothing if it is already there.
    ///
    /// Switching to `Mode::Ready` is a `reset`, and switching to `Mode::Error` abandons the
    /// session without touching the lines.
    pub fn switch_mode(&mut self, mode: Mode) -> Result<(), Error<C::Error>> {
        if self.mode == mode {
            return Ok(());
        }

        let select = match (self.mode, mode.wire_byte()) {
            (_, None) if mode == Mode::Error => {
                warn!("Abandoning debug session");
                self.mode = Mode::Error;
                return Ok(());
            }
            (Mode::Error, _) => return Err(Error::Disconnected),
            (_, None) => return self.reset(),
            (_, Some(select)) => select,
        };

        let result = self.enter_mode(mode, select);
        self.check_lines(result)
    }

    fn enter_mode(&mut self, mode: Mode, select: u8) -> Result<(), Error<C::Error>> {
        if self.mode != Mode::Ready {
            self.reset_lines()?;
        }

        debug!("Switching to {mode:?}");
        self.mode = mode;

        self.sm.cable.clear(Line::Tck, 2)?;
        icp::send_mode(&mut self.sm.cable, select)?;

        match mode {
            Mode::Icp => {
                self.sm.cable.delay_us(800);
                self.sm.cable.set(Line::Tck, 2)?;
                icp::send_command(&mut self.sm.cable, IcpCommand::Ping, icp::PING_ARG)?;
            }
            Mode::Jtag => self.init_jtag()?,
            Mode::Error | Mode::Ready => {}
        }
        Ok(())
    }

    fn init_jtag(&mut self) -> Result<(), Error<C::Error>> {
        let sm = &mut self.sm;
        sm.mode_reset(JTAG_ENTRY_CLOCKS)?;

        sm.write_ir(IR_CONTROL)?;
        sm.write_dr(4, 4)?;

        sm.write_ir(IR_CONFIG)?;
        sm.write_dr(DR_WIDE, CONFIG_INIT[0])?;
        sm.cable.delay_us(50);
        sm.write_dr(DR_WIDE, CONFIG_INIT[1])?;
        sm.write_dr(DR_WIDE, CONFIG_INIT[2])?;

        for value in BREAKPOINT_INIT {
            sm.write_dr(DR_WIDE, value)?;
        }

        sm.write_ir(IR_CONTROL)?;
        sm.write_dr(4, 1)?;

        sm.write_ir(IR_READ)?;
        Ok(())
    }

    /// Keep an ICP session from timing out.  Does nothing outside ICP mode.
    pub fn ping_icp(&mut self) -> Result<(), Error<C::Error>> {
        if self.mode != Mode::Icp {
            return Ok(());
        }
        let result = icp::send_command(&mut self.sm.cable, IcpCommand::Ping, icp::PING_ARG);
        self.check_lines(result.map_err(Error::Cable))
    }

    /// Check the ICP session works by writing a sentinel into the offset register and reading it
    /// back.  A dump must not be trusted if this returns false.
    pub fn check_icp(&mut self) -> Result<bool, Error<C::Error>> {
        self.switch_mode(Mode::Icp)?;

        let result = self.icp_echo();
        let echo = self.check_lines(result)?;

        let alive = echo == ICP_SENTINEL;
        if alive {
            debug!("ICP session alive");
        } else {
            warn!("ICP check failed: wrote 0x{ICP_SENTINEL:02X}, read 0x{echo:02X}");
        }
        Ok(alive)
    }

    /// Read the 16 bit JTAG identifier
    pub fn get_id(&mut self) -> Result<u16, Error<C::Error>> {
        self.switch_mode(Mode::Jtag)?;

        let result = self.read_id();
        let id = self.check_lines(result)?;
        debug!("JTAG ID 0x{id:04X}");
        Ok(id)
    }

    /// Check the JTAG session works.  All zeros or all ones means nothing is driving TDO.
    pub fn check_jtag(&mut self) -> Result<bool, Error<C::Error>> {
        let id = self.get_id()?;
        let alive = id != 0x0000 && id != 0xFFFF;
        if !alive {
            warn!("JTAG check failed: ID 0x{id:04X}");
        }
        Ok(alive)
    }

    // Sentinel into the offset register, then read back its low byte
    fn icp_echo(&mut self) -> Result<u8, Error<C::Error>> {
        let cable = &mut self.sm.cable;
        icp::send_command(cable, IcpCommand::SetOffsetLow, ICP_SENTINEL)?;
        icp::send_command(cable, IcpCommand::SetOffsetHigh, 0xFF)?;

        icp::send_byte(cable, IcpCommand::GetOffset as u8)?;
        let echo = icp::receive_byte(cable)?;
        let _high = icp::receive_byte(cable)?;
        Ok(echo)
    }

    fn read_id(&mut self) -> Result<u16, Error<C::Error>> {
        self.sm.write_ir(IR_IDCODE)?;
        Ok(self.sm.read_dr(16)? as u16)
    }

    /// Fill `buffer` with flash (or custom block) contents starting at `address`, over ICP.
    ///
    /// Nothing is verified: call `check_icp` once before dumping, otherwise the data may be
    /// garbage.  The session is back in `Mode::Ready` afterwards.
    pub fn read_flash_icp(
        &mut self,
        buffer: &mut [u8],
        address: u32,
        custom_block: bool,
    ) -> Result<(), Error<C::Error>> {
        self.reset()?;
        self.switch_mode(Mode::Icp)?;

        let result = self.icp_read(buffer, address, custom_block);
        self.check_lines(result)?;
        self.reset()
    }

    fn icp_read(
        &mut self,
        buffer: &mut [u8],
        address: u32,
        custom_block: bool,
    ) -> Result<(), Error<C::Error>> {
        let cable = &mut self.sm.cable;

        if self.chip.needs_icp_prelude() {
            icp::send_byte(cable, IcpCommand::Prelude as u8)?;
            for arg in icp::PRELUDE_ARGS {
                icp::send_byte(cable, arg)?;
            }
        }

        icp::send_command(cable, IcpCommand::SetOffsetLow, address as u8)?;
        icp::send_command(cable, IcpCommand::SetOffsetHigh, (address >> 8) as u8)?;
        if self.chip.has_xpage() {
            icp::send_command(cable, IcpCommand::SetXPage, (address >> 16) as u8)?;
        }

        let command = if custom_block {
            IcpCommand::ReadCustomBlock
        } else {
            IcpCommand::ReadFlash
        };
        icp::send_byte(cable, command as u8)?;

        for byte in buffer.iter_mut() {
            *byte = icp::receive_byte(cable)?;
        }
        trace!("ICP read {} bytes at 0x{address:06X}", buffer.len());
        Ok(())
    }

    /// Fill `buffer` with flash contents starting at `address`, over JTAG.
    ///
    /// The custom block has no JTAG address and is refused with `Error::Unsupported`.
    pub fn read_flash_jtag(
        &mut self,
        buffer: &mut [u8],
        address: u32,
        custom_block: bool,
    ) -> Result<(), Error<C::Error>> {
        if custom_block {
            return Err(Error::Unsupported);
        }

        self.switch_mode(Mode::Jtag)?;

        let result = self.jtag_read(buffer, address);
        self.check_lines(result)
    }

    fn jtag_read(&mut self, buffer: &mut [u8], address: u32) -> Result<(), Error<C::Error>> {
        if !self.chip.is_banked() {
            return self.jtag_read_window(buffer, address as u16);
        }

        // The read register only reaches one bank, so a chunk crossing a bank edge is read in
        // two pieces with a bank switch in between
        let mut done = 0;
        while done < buffer.len() {
            let (bank, offset) = self.chip.bank_of(address + done as u32);
            let len = (BANK_SIZE - offset as u32).min((buffer.len() - done) as u32) as usize;
            self.select_bank(bank)?;
            self.jtag_read_window(&mut buffer[done..done + len], offset)?;
            done += len;
        }
        Ok(())
    }

    fn jtag_read_window(
        &mut self,
        buffer: &mut [u8],
        address: u16,
    ) -> Result<(), Error<C::Error>> {
        self.sm.write_ir(IR_READ)?;

        // Data for the address shifted in on one cycle comes out on the next, so run one cycle
        // more than there are bytes and drop what the first one returns.
        for n in 0..=buffer.len() {
            let target = address.wrapping_add(n as u16) as u32;
            let captured = self.sm.shift_dr(DR_WIDE, target << 7 | READ_MARKER)?;
            if n > 0 {
                buffer[n - 1] = (captured >> 15) as u8;
            }
        }
        trace!("JTAG read {} bytes at 0x{address:04X}", buffer.len());
        Ok(())
    }

    fn select_bank(&mut self, bank: u8) -> Result<(), Error<C::Error>> {
        trace!("Selecting bank {bank}");
        let mut code = BANK_SELECT;
        code[1] = bank;

        self.sm.write_ir(IR_EXEC)?;
        for byte in code {
            self.sm.write_dr(8, byte.reverse_bits() as u32)?;
        }
        Ok(())
    }

    // A failure on the lines leaves the target somewhere we can't know, so drop the session
    fn check_lines<T>(
        &mut self,
        result: Result<T, Error<C::Error>>,
    ) -> Result<T, Error<C::Error>> {
        if let Err(Error::Cable(e)) = &result {
            error!("Cable error in {:?} mode: {e:?}", self.mode);
            self.mode = Mode::Error;
        }
        result
    }
}
