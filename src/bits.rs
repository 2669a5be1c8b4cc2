//! Bit-level shifting shared by the ICP codec and the TAP navigator.

/// Order in which the bits of a value go over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// Shift `width` bits of `value` one at a time in `order`.
///
/// `f` is handed each outgoing bit and returns the bit sampled during the same clock.  Sampled
/// bits are stored at the position of the bit that was sent, so an MSB-first exchange
/// accumulates MSB-first and an LSB-first one accumulates LSB-first.  `f` also gets a flag telling
/// it whether this is the last bit, which the TAP needs to leave the shift state.
pub fn shift<E>(
    width: u8,
    order: BitOrder,
    value: u32,
    mut f: impl FnMut(bool, bool) -> Result<bool, E>,
) -> Result<u32, E> {
    debug_assert!(width >= 1 && width <= 32);

    let mut sampled = 0;
    for n in 0..width {
        let pos = match order {
            BitOrder::MsbFirst => width - 1 - n,
            BitOrder::LsbFirst => n,
        };
        let last = n == width - 1;
        if f((value >> pos) & 1 == 1, last)? {
            sampled |= 1 << pos;
        }
    }
    Ok(sampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::convert::Infallible;

    #[test]
    fn msb_first_order() {
        let mut sent = Vec::new();
        shift::<Infallible>(4, BitOrder::MsbFirst, 0b1100, |b, _| {
            sent.push(b);
            Ok(false)
        })
        .unwrap();
        assert_eq!(sent, [true, true, false, false]);
    }

    #[test]
    fn lsb_first_accumulation() {
        // Target answers 1, 0, 0, 0, 0, 0, 1, 0 on successive clocks
        let answers = [true, false, false, false, false, false, true, false];
        let mut n = 0;
        let value = shift::<Infallible>(8, BitOrder::LsbFirst, 0, |_, _| {
            n += 1;
            Ok(answers[n - 1])
        })
        .unwrap();
        assert_eq!(value, 0x41);
    }

    #[test]
    fn last_flag_only_on_final_bit() {
        let mut flags = Vec::new();
        shift::<Infallible>(23, BitOrder::MsbFirst, 0x403000, |_, last| {
            flags.push(last);
            Ok(false)
        })
        .unwrap();
        assert_eq!(flags.iter().filter(|l| **l).count(), 1);
        assert_eq!(flags.last(), Some(&true));
    }

    #[test]
    fn errors_stop_the_shift() {
        let mut clocks = 0;
        let result = shift(8, BitOrder::MsbFirst, 0xFF, |_, _| {
            clocks += 1;
            if clocks == 3 { Err("pin") } else { Ok(true) }
        });
        assert_eq!(result, Err("pin"));
        assert_eq!(clocks, 3);
    }
}
