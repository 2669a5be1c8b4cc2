//! Per-family parameters of the target chip.
//!
//! These are fixed for a session.  Values for a given part can be read out of the Keil C51 chip
//! definition files, see [`crate::keil`].

/// Size of the window the JTAG read path can address at once
pub const BANK_SIZE: u32 = 0x8000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChipConfig {
    /// Family number from the Keil definition file
    pub chip_type: u8,
    /// Total flash size in bytes
    pub flash_size: u32,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self::new(2, 32768)
    }
}

impl ChipConfig {
    pub const fn new(chip_type: u8, flash_size: u32) -> Self {
        Self { chip_type, flash_size }
    }

    /// Everything but type 1 wants an unlock command before the address is set over ICP
    pub fn needs_icp_prelude(&self) -> bool {
        self.chip_type != 1
    }

    /// Types 4 and 7 address more than 64 KiB and take an extra page byte over ICP
    pub fn has_xpage(&self) -> bool {
        matches!(self.chip_type, 4 | 7)
    }

    /// Flash larger than one bank needs a bank switch before JTAG reads
    pub fn is_banked(&self) -> bool {
        self.flash_size > BANK_SIZE
    }

    /// Split `address` into its bank number and the offset inside that bank
    pub fn bank_of(&self, address: u32) -> (u8, u16) {
        ((address / BANK_SIZE) as u8, (address % BANK_SIZE) as u16)
    }
}
