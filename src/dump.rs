//! Walking the whole flash, and formatting what comes out of it for the host link.
use core::fmt;
use core::ops::ControlFlow;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::cable::Cable;
use crate::dumper::{Dumper, CHUNK_SIZE};
use crate::Error;

/// Which protocol to read flash with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Icp,
    Jtag,
}

impl<C: Cable> Dumper<C> {
    /// Check the session and read the whole flash in `CHUNK_SIZE` pieces, handing each one to
    /// `sink` with its address.  `sink` can stop the dump early by returning `Break`.
    ///
    /// Returns the number of bytes handed to `sink`.  The target is left in `Mode::Ready` after
    /// an ICP dump and in `Mode::Jtag` after a JTAG one.
    pub fn dump(
        &mut self,
        method: Method,
        mut sink: impl FnMut(u32, &[u8]) -> ControlFlow<()>,
    ) -> Result<u32, Error<C::Error>> {
        let alive = match method {
            Method::Icp => self.check_icp()?,
            Method::Jtag => self.check_jtag()?,
        };
        if !alive {
            return Err(Error::NoSession);
        }

        let size = self.chip().flash_size;
        info!("Dumping {size} bytes over {method:?}");

        let mut chunk = [0; CHUNK_SIZE];
        let mut address = 0;
        while address < size {
            let len = CHUNK_SIZE.min((size - address) as usize);
            let chunk = &mut chunk[..len];
            match method {
                Method::Icp => self.read_flash_icp(chunk, address, false)?,
                Method::Jtag => self.read_flash_jtag(chunk, address, false)?,
            }

            address += len as u32;
            if sink(address - len as u32, chunk).is_break() {
                debug!("Dump stopped at 0x{address:06X}");
                break;
            }
        }
        Ok(address)
    }
}

/// Write `bytes` as uppercase hex, two digits per byte and no separators
pub fn write_hex<W: fmt::Write>(out: &mut W, bytes: &[u8]) -> fmt::Result {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for byte in bytes {
        out.write_char(HEX[(byte >> 4) as usize] as char)?;
        out.write_char(HEX[(byte & 0x0F) as usize] as char)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn hex_is_uppercase_and_padded() {
        let mut out = String::new();
        write_hex(&mut out, &[0x00, 0x0A, 0xBE, 0xEF]).unwrap();
        assert_eq!(out, "000ABEEF");
    }

    #[test]
    fn empty_hex() {
        let mut out = String::new();
        write_hex(&mut out, &[]).unwrap();
        assert!(out.is_empty());
    }
}
