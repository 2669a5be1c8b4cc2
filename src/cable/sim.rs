//! A simulated target behind a `Cable`, for testing the protocol layer without hardware.
//!
//! `SimTarget` watches the line edges the way the real chip does: it waits for the wake-up
//! handshake, decodes mode select bytes, answers ICP commands and runs a JTAG TAP with the
//! registers the dumper uses.  It also counts every level change so tests can check how much
//! traffic an operation produced.
//!
//! ICP bits are taken on the falling clock edge, mode select bits on the rising edge and TAP
//! transitions happen on the rising edge with TDO updated on the falling one.
use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use crate::cable::{Cable, Line};
use crate::statemachine::JtagState;

/// Instruction register values understood by the simulated TAP
const IR_CONTROL: u8 = 2;
const IR_CONFIG: u8 = 3;
const IR_EXEC: u8 = 4;
const IR_READ: u8 = 12;
const IR_IDCODE: u8 = 14;

/// Opening runs of low pulses the chip needs to see before it wakes
const WAKE_PHASES: [(Line, u32); 5] = [
    (Line::Tck, 1),
    (Line::Tms, 165),
    (Line::Tdi, 105),
    (Line::Tck, 90),
    (Line::Tms, 25600),
];

/// Closing run of TCK low pulses before the TMS pulse that wakes the chip.  The two priming
/// clocks of the select byte and the raise of TCK ahead of the long run are part of it.
const WAKE_TAIL: (Line, u32) = (Line::Tck, 25600 + 3);

/// Clocks with TMS held high after which dropping TMS leaves JTAG mode
const JTAG_EXIT_RUN: u32 = 32;

/// Which protocol the simulated chip is listening to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimMode {
    Off,
    Ready,
    Icp,
    Jtag,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Expect {
    Command,
    Arg(u8),
    Prelude(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Offset,
    Flash(u32),
    Custom(u32),
}

#[derive(Clone, Copy, Debug)]
struct Transmit {
    source: Source,
    index: u32,
    edge: u8,
}

/// A data register update seen by the simulated TAP
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrWrite {
    pub instruction: u8,
    pub width: u8,
    pub value: u32,
}

pub struct SimTarget {
    /// Main flash contents, indexed by absolute flash address
    pub flash: Vec<u8>,
    /// Contents of the custom block, readable over ICP only
    pub custom_block: Vec<u8>,
    /// Value returned by the IDCODE instruction.  0xFFFF behaves like an unpowered bus.
    pub id_code: u16,
    /// Answer the offset readback with a value other than the one written
    pub echo_fault: bool,

    /// Every byte received over ICP, commands and arguments
    pub icp_bytes: Vec<u8>,
    /// Every instruction latched by Update-IR
    pub instructions: Vec<u8>,
    /// Every data register update
    pub dr_writes: Vec<DrWrite>,
    /// Addresses latched by the flash read register, in order
    pub latched: Vec<u16>,
    /// Mode select bytes seen, in order
    pub modes: Vec<u8>,
    /// Runs of low pulses seen while asleep, as (line, pulses in a row)
    pub wake_pulses: Vec<(Line, u32)>,
    /// Lengths of every run of TMS-high clocks in JTAG mode, including the one that leaves it
    pub tms_runs: Vec<u32>,

    tck: bool,
    tms: bool,
    tdi: bool,
    tdo: bool,
    transitions: u64,
    clocks: u64,

    mode: SimMode,
    pulse_run: Option<(Line, u32)>,
    falling: Option<Line>,
    select: u8,
    select_clocks: u8,

    expect: Expect,
    rx: u8,
    rx_edges: u8,
    tx: Option<Transmit>,
    offset: u16,
    xpage: u8,
    pings: u32,

    tap: JtagState,
    ir: u8,
    ir_shift: u8,
    dr: u32,
    tms_run: u32,
    address: u16,
    bank: u8,
    exec: Vec<u8>,
}

impl Default for SimTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTarget {
    /// A powered target with 32 KiB of erased flash and a valid ID
    pub fn new() -> Self {
        Self {
            flash: vec![0xFF; 0x8000],
            custom_block: vec![0xFF; 0x100],
            id_code: 0x1234,
            echo_fault: false,
            icp_bytes: Vec::new(),
            instructions: Vec::new(),
            dr_writes: Vec::new(),
            latched: Vec::new(),
            modes: Vec::new(),
            wake_pulses: Vec::new(),
            tms_runs: Vec::new(),
            tck: false,
            tms: false,
            tdi: false,
            tdo: false,
            transitions: 0,
            clocks: 0,
            mode: SimMode::Off,
            pulse_run: None,
            falling: None,
            select: 0,
            select_clocks: 0,
            expect: Expect::Command,
            rx: 0,
            rx_edges: 0,
            tx: None,
            offset: 0,
            xpage: 0,
            pings: 0,
            tap: JtagState::Reset,
            ir: IR_IDCODE,
            ir_shift: 0,
            dr: 0,
            tms_run: 0,
            address: 0,
            bank: 0,
            exec: Vec::new(),
        }
    }

    /// A target whose flash holds `flash`
    pub fn with_flash(flash: Vec<u8>) -> Self {
        Self {
            flash,
            ..Self::new()
        }
    }

    pub fn mode(&self) -> SimMode {
        self.mode
    }

    /// Number of level changes on TCK, TMS and TDI so far
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Number of rising clock edges so far
    pub fn clocks(&self) -> u64 {
        self.clocks
    }

    /// Currently selected 32 KiB bank
    pub fn bank(&self) -> u8 {
        self.bank
    }

    /// ICP keep-alives received
    pub fn pings(&self) -> u32 {
        self.pings
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    fn enter(&mut self, mode: SimMode) {
        self.mode = mode;
        self.select = 0;
        self.select_clocks = 0;
        self.expect = Expect::Command;
        self.rx = 0;
        self.rx_edges = 0;
        self.tx = None;
        self.tap = JtagState::Reset;
        self.tms_run = 0;
    }

    fn flash_byte(&self, address: u32) -> u8 {
        self.flash.get(address as usize).copied().unwrap_or(0xFF)
    }

    // A low pulse is a fall directly followed by a rise of the same line.  Consecutive pulses on
    // one line form a run, and anything else on the lines ends the run.
    fn asleep_edge(&mut self, line: Line, high: bool) {
        match (self.falling, high) {
            (Some(falling), true) if falling == line => {
                self.pulse_run = match self.pulse_run {
                    Some((run_line, count)) if run_line == line => Some((line, count + 1)),
                    run => {
                        self.wake_pulses.extend(run);
                        Some((line, 1))
                    }
                };
                self.falling = None;
            }
            (None, false) => self.falling = Some(line),
            (_, high) => {
                self.wake_pulses.extend(self.pulse_run.take());
                self.falling = if high { None } else { Some(line) };
            }
        }
    }

    fn tck_rising(&mut self) {
        self.clocks += 1;
        match self.mode {
            SimMode::Off => {}
            SimMode::Ready => {
                if self.select_clocks < 8 {
                    self.select = self.select << 1 | self.tdi as u8;
                }
                self.select_clocks = self.select_clocks.saturating_add(1);
            }
            SimMode::Icp => {}
            SimMode::Jtag => self.tap_clock(),
        }
    }

    fn tck_falling(&mut self) {
        match self.mode {
            SimMode::Off => {}
            SimMode::Ready => {
                if self.select_clocks >= 10 {
                    let byte = self.select;
                    self.modes.push(byte);
                    match byte {
                        0x96 => self.enter(SimMode::Icp),
                        0xA5 => self.enter(SimMode::Jtag),
                        _ => self.enter(SimMode::Ready),
                    }
                }
            }
            SimMode::Icp => self.icp_clock(),
            SimMode::Jtag => {
                self.tdo = match self.tap {
                    JtagState::ShiftDR => {
                        let width = dr_width(self.ir);
                        (self.dr >> (width - 1)) & 1 == 1
                    }
                    JtagState::ShiftIR => (self.ir_shift >> 3) & 1 == 1,
                    _ => self.tdo,
                };
            }
        }
    }

    fn tms_edge(&mut self, high: bool) {
        match self.mode {
            SimMode::Off => {
                if !high
                    && self.wake_pulses.starts_with(&WAKE_PHASES)
                    && self.wake_pulses.last() == Some(&WAKE_TAIL)
                {
                    self.enter(SimMode::Ready);
                }
            }
            SimMode::Ready | SimMode::Icp => {
                if high {
                    self.enter(SimMode::Ready);
                }
            }
            SimMode::Jtag => {
                if !high && self.tms_run >= JTAG_EXIT_RUN {
                    self.tms_runs.push(self.tms_run);
                    self.enter(SimMode::Ready);
                }
            }
        }
    }

    fn icp_clock(&mut self) {
        if let Some(mut tx) = self.tx {
            if tx.edge < 8 {
                let byte = self.tx_byte(tx.source, tx.index);
                self.tdo = (byte >> tx.edge) & 1 == 1;
                tx.edge += 1;
                self.tx = Some(tx);
            } else {
                tx.edge = 0;
                tx.index += 1;
                self.tx = match tx.source {
                    Source::Offset if tx.index >= 2 => None,
                    _ => Some(tx),
                };
            }
            return;
        }

        if self.rx_edges < 8 {
            self.rx = self.rx << 1 | self.tdi as u8;
            self.rx_edges += 1;
        } else {
            let byte = self.rx;
            self.rx = 0;
            self.rx_edges = 0;
            self.icp_byte(byte);
        }
    }

    fn tx_byte(&self, source: Source, index: u32) -> u8 {
        match source {
            Source::Offset => {
                let [low, high] = self.offset.to_le_bytes();
                match (index, self.echo_fault) {
                    (0, false) => low,
                    (0, true) => low.wrapping_add(1),
                    _ => high,
                }
            }
            Source::Flash(start) => self.flash_byte(start + index),
            Source::Custom(start) => self
                .custom_block
                .get((start + index) as usize)
                .copied()
                .unwrap_or(0xFF),
        }
    }

    fn icp_byte(&mut self, byte: u8) {
        self.icp_bytes.push(byte);
        match self.expect {
            Expect::Command => {
                let address = (self.xpage as u32) << 16 | self.offset as u32;
                let source = match byte {
                    0x40 | 0x41 | 0x49 | 0x4C => {
                        self.expect = Expect::Arg(byte);
                        None
                    }
                    0x46 => {
                        self.expect = Expect::Prelude(2);
                        None
                    }
                    0x43 => Some(Source::Offset),
                    0x44 => Some(Source::Flash(address)),
                    0x4A => Some(Source::Custom(address)),
                    _ => None,
                };
                self.tx = source.map(|source| Transmit { source, index: 0, edge: 0 });
            }
            Expect::Arg(command) => {
                match command {
                    0x40 => self.offset = self.offset & 0xFF00 | byte as u16,
                    0x41 => self.offset = self.offset & 0x00FF | (byte as u16) << 8,
                    0x4C => self.xpage = byte,
                    _ => self.pings += 1,
                }
                self.expect = Expect::Command;
            }
            Expect::Prelude(left) => {
                self.expect = if left > 1 {
                    Expect::Prelude(left - 1)
                } else {
                    Expect::Command
                };
            }
        }
    }

    fn tap_clock(&mut self) {
        if self.tms {
            self.tms_run += 1;
        } else if self.tms_run > 0 {
            self.tms_runs.push(self.tms_run);
            self.tms_run = 0;
        }

        match self.tap {
            JtagState::CaptureIR => self.ir_shift = 0b0001,
            JtagState::ShiftIR => self.ir_shift = (self.ir_shift << 1 | self.tdi as u8) & 0xF,
            JtagState::UpdateIR => {
                self.ir = self.ir_shift;
                self.instructions.push(self.ir);
            }
            JtagState::CaptureDR => self.dr = self.capture(),
            JtagState::ShiftDR => {
                let width = dr_width(self.ir);
                self.dr = (self.dr << 1 | self.tdi as u32) & mask(width);
            }
            JtagState::UpdateDR => self.update(),
            _ => {}
        }

        self.tap = self.tap.next(self.tms);
    }

    fn capture(&self) -> u32 {
        match self.ir {
            IR_IDCODE => self.id_code as u32,
            IR_READ => {
                // the read register carries a 15 bit offset into the selected bank
                let address = (self.bank as u32) * 0x8000 + (self.address & 0x7FFF) as u32;
                (self.flash_byte(address) as u32) << 15
            }
            _ => 0,
        }
    }

    fn update(&mut self) {
        let width = dr_width(self.ir);
        self.dr_writes.push(DrWrite {
            instruction: self.ir,
            width,
            value: self.dr,
        });

        match self.ir {
            IR_READ => {
                if self.dr & 0x7F == 0x0A {
                    self.address = (self.dr >> 7) as u16;
                    self.latched.push(self.address);
                }
            }
            IR_EXEC => {
                self.exec.push((self.dr as u8).reverse_bits());
                if let [0x74, bank, 0xF5, 0xB7] = self.exec.as_slice() {
                    self.bank = *bank;
                }
                if self.exec.len() == 4 {
                    self.exec.clear();
                }
            }
            _ => {}
        }
    }
}

fn dr_width(ir: u8) -> u8 {
    match ir {
        IR_IDCODE => 16,
        IR_READ | IR_CONFIG => 23,
        IR_CONTROL => 4,
        IR_EXEC => 8,
        _ => 1,
    }
}

fn mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

impl Cable for SimTarget {
    type Error = Infallible;

    fn set_line(&mut self, line: Line, high: bool) -> Result<(), Infallible> {
        let level = match line {
            Line::Tck => &mut self.tck,
            Line::Tms => &mut self.tms,
            Line::Tdi => &mut self.tdi,
        };
        if *level == high {
            return Ok(());
        }
        *level = high;
        self.transitions += 1;

        if self.mode == SimMode::Off {
            self.asleep_edge(line, high);
        }

        match (line, high) {
            (Line::Tck, true) => self.tck_rising(),
            (Line::Tck, false) => self.tck_falling(),
            (Line::Tms, _) => self.tms_edge(high),
            (Line::Tdi, _) => {}
        }
        Ok(())
    }

    fn read_tdo(&mut self) -> Result<bool, Infallible> {
        Ok(self.tdo)
    }

    fn delay_us(&mut self, _us: u32) {}
}
