//! This provides the TAP navigator.  `JtagSM` keeps track of the state of the JTAG state machine
//! while it clocks the target through it one transition at a time.
//!
//! The target is picky about the exact transitions it sees, so unlike a general purpose JTAG
//! driver nothing here searches for the shortest path.  Every register access walks the same
//! fixed route from Run-Test/Idle and back.
use crate::bits::{self, BitOrder};
use crate::cable::{Cable, Line};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

impl JtagState {
    /// The state reached from `self` after one clock with TMS at `tms`
    pub fn next(self, tms: bool) -> JtagState {
        use JtagState::*;

        // [tms = 0, tms = 1]
        let edges = match self {
            Reset     => [Idle, Reset],
            Idle      => [Idle, SelectDR],
            SelectDR  => [CaptureDR, SelectIR],
            CaptureDR => [ShiftDR, Exit1DR],
            ShiftDR   => [ShiftDR, Exit1DR],
            Exit1DR   => [PauseDR, UpdateDR],
            PauseDR   => [PauseDR, Exit2DR],
            Exit2DR   => [ShiftDR, UpdateDR],
            UpdateDR  => [Idle, SelectDR],
            SelectIR  => [CaptureIR, Reset],
            CaptureIR => [ShiftIR, Exit1IR],
            ShiftIR   => [ShiftIR, Exit1IR],
            Exit1IR   => [PauseIR, UpdateIR],
            PauseIR   => [PauseIR, Exit2IR],
            Exit2IR   => [ShiftIR, UpdateIR],
            UpdateIR  => [Idle, SelectIR],
        };
        edges[tms as usize]
    }
}

pub struct JtagSM<C> {
    pub cable: C,
    state: JtagState,
}

impl<C: Cable> JtagSM<C> {
    /// Wrap an existing `Cable`.  The state is only a guess until the first `mode_reset`.
    pub fn new(cable: C) -> Self {
        Self {
            cable,
            state: JtagState::Reset,
        }
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// One TAP transition: set TMS, raise TCK, sample TDO while the clock is high, lower TCK.
    pub fn next_state(&mut self, tms: bool) -> Result<bool, C::Error> {
        self.cable.set_line(Line::Tms, tms)?;

        self.cable.set(Line::Tck, 2)?;
        let tdo = self.cable.read_tdo()?;
        self.cable.clear(Line::Tck, 2)?;

        self.state = self.state.next(tms);
        Ok(tdo)
    }

    /// Like `next_state`, presenting `tdi` on the data line first
    pub fn next_state_tdi(&mut self, tms: bool, tdi: bool) -> Result<bool, C::Error> {
        self.cable.set_line(Line::Tdi, tdi)?;
        self.next_state(tms)
    }

    /// Hold TMS high for `count` clocks, which ends in Test-Logic-Reset for any `count` >= 5
    pub fn mode_reset(&mut self, count: u8) -> Result<(), C::Error> {
        for _ in 0..count {
            self.next_state(true)?;
        }
        Ok(())
    }

    /// Shift a 4-bit instruction into the instruction register
    pub fn write_ir(&mut self, value: u8) -> Result<(), C::Error> {
        self.next_state(false)?; // Idle
        self.next_state(true)?; // Select-DR
        self.next_state(true)?; // Select-IR
        self.next_state(false)?; // Capture-IR
        self.next_state(false)?; // Shift-IR
        self.shift_bits(4, value as u32)?; // Exit1-IR
        self.next_state(true)?; // Update-IR
        self.next_state(false)?; // Idle
        Ok(())
    }

    /// Exchange `width` bits with the data register, MSB first both ways.  Returns the captured
    /// bits that were shifted out while `value` went in.
    pub fn shift_dr(&mut self, width: u8, value: u32) -> Result<u32, C::Error> {
        self.next_state(false)?; // Idle
        self.next_state(true)?; // Select-DR
        self.next_state(false)?; // Capture-DR
        self.next_state(false)?; // Shift-DR
        let captured = self.shift_bits(width, value)?; // Exit1-DR
        self.next_state(true)?; // Update-DR
        self.next_state(false)?; // Idle

        // Two extra idle clocks.  Not understood, but the target needs them
        self.next_state(false)?;
        self.next_state(false)?;

        Ok(captured)
    }

    pub fn write_dr(&mut self, width: u8, value: u32) -> Result<(), C::Error> {
        self.shift_dr(width, value).map(|_| ())
    }

    pub fn read_dr(&mut self, width: u8) -> Result<u32, C::Error> {
        self.shift_dr(width, 0)
    }

    // Shift out of the Shift-IR or Shift-DR state, raising TMS on the last bit
    fn shift_bits(&mut self, width: u8, value: u32) -> Result<u32, C::Error> {
        bits::shift(width, BitOrder::MsbFirst, value, |tdi, last| self.next_state_tdi(last, tdi))
    }
}
