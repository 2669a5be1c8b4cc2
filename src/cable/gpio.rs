//! Drive the debug lines straight from microcontroller GPIOs through `embedded-hal`.
use embedded_hal::{delay::DelayNs, digital::{InputPin, OutputPin, PinState}};

use crate::cable::{Cable, Line};

/// Error from one of the four pins.  Most HALs report `Infallible` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError<O, I> {
    Output(O),
    Input(I),
}

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    /// Pins must already be configured: TDO as input, the others as push-pull outputs.
    pub fn new(clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Gpio<Clk, Tdi, Tdo, Tms, Delay> {
        Gpio { clock, tdi, tdo, tms, delay }
    }

    /// Give the pins back, for instance to float them after a dump.
    pub fn release(self) -> (Clk, Tdi, Tdo, Tms, Delay) {
        (self.clock, self.tdi, self.tdo, self.tms, self.delay)
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay, E> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay>
    where Clk: OutputPin<Error = E>, Tdi: OutputPin<Error = E>, Tdo: InputPin, Tms: OutputPin<Error = E>, Delay: DelayNs,
          E: core::fmt::Debug
{
    type Error = GpioError<E, Tdo::Error>;

    fn set_line(&mut self, line: Line, high: bool) -> Result<(), Self::Error> {
        let state = PinState::from(high);
        let result = match line {
            Line::Tck => self.clock.set_state(state),
            Line::Tms => self.tms.set_state(state),
            Line::Tdi => self.tdi.set_state(state),
        };
        result.map_err(GpioError::Output)
    }

    fn read_tdo(&mut self) -> Result<bool, Self::Error> {
        self.tdo.is_high().map_err(GpioError::Input)
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    type Log = Rc<RefCell<Vec<(&'static str, bool)>>>;

    struct Pin {
        name: &'static str,
        log: Log,
    }

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.log.borrow_mut().push((self.name, false));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.log.borrow_mut().push((self.name, true));
            Ok(())
        }
    }

    struct Input(bool);

    impl ErrorType for Input {
        type Error = Infallible;
    }

    impl InputPin for Input {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0)
        }
    }

    struct Delay(Rc<RefCell<u64>>);

    impl DelayNs for Delay {
        fn delay_ns(&mut self, ns: u32) {
            *self.0.borrow_mut() += ns as u64;
        }
    }

    #[test]
    fn routes_lines_to_pins() {
        let log: Log = Rc::default();
        let waited = Rc::new(RefCell::new(0));
        let pin = |name| Pin { name, log: log.clone() };
        let mut gpio = Gpio::new(pin("tck"), pin("tdi"), Input(true), pin("tms"), Delay(waited.clone()));

        gpio.set(Line::Tck, 2).unwrap();
        gpio.clear(Line::Tms, 1).unwrap();
        gpio.set_line(Line::Tdi, true).unwrap();

        assert_eq!(*log.borrow(), [("tck", true), ("tms", false), ("tdi", true)]);
        assert_eq!(*waited.borrow(), 3_000);
        assert!(gpio.read_tdo().unwrap());
    }
}
