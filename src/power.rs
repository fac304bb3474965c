//! Power control of the modem module.
//!
//! The protocol engine never touches these; [`crate::Modem`] only calls them
//! around initialisation and teardown.

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Low time of the `ON/OFF` line that switches the module on
pub fn pwr_on_time() -> Duration {
    Duration::from_millis(150)
}

/// Low time of the `ON/OFF` line that triggers a graceful switch off
pub fn pwr_off_time() -> Duration {
    Duration::from_millis(1_000)
}

pub trait OnOff {
    fn on(&mut self);
    fn off(&mut self);
    fn is_on(&mut self) -> bool;
}

/// For boards where the modem is permanently powered.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOn;

impl OnOff for AlwaysOn {
    fn on(&mut self) {}

    fn off(&mut self) {}

    fn is_on(&mut self) -> bool {
        true
    }
}

/// Bee-socket power control: a 3.3V enable line, the module's `ON/OFF`
/// input and an optional status line that reads high while the module runs.
pub struct BeeOnOff<V, O, S, D> {
    vcc33: V,
    onoff: O,
    status: Option<S>,
    delay: D,
    powered: bool,
}

impl<V, O, S, D> BeeOnOff<V, O, S, D>
where
    V: OutputPin,
    O: OutputPin,
    S: InputPin,
    D: DelayNs,
{
    pub fn new(vcc33: V, onoff: O, status: Option<S>, delay: D) -> Self {
        Self {
            vcc33,
            onoff,
            status,
            delay,
            powered: false,
        }
    }

    fn pulse_onoff(&mut self, low_time: Duration) {
        if self.onoff.set_low().is_err() {
            log::error!("Failed to drive ON/OFF line low");
        }
        self.delay.delay_ms(low_time.as_millis() as u32);
        if self.onoff.set_high().is_err() {
            log::error!("Failed to release ON/OFF line");
        }
    }
}

impl<V, O, S, D> OnOff for BeeOnOff<V, O, S, D>
where
    V: OutputPin,
    O: OutputPin,
    S: InputPin,
    D: DelayNs,
{
    fn on(&mut self) {
        if self.is_on() {
            return;
        }
        if self.vcc33.set_high().is_err() {
            log::error!("Failed to enable modem supply");
        }
        self.pulse_onoff(pwr_on_time());
        self.powered = true;
    }

    fn off(&mut self) {
        self.pulse_onoff(pwr_off_time());
        if self.vcc33.set_low().is_err() {
            log::error!("Failed to disable modem supply");
        }
        self.powered = false;
    }

    fn is_on(&mut self) -> bool {
        match self.status.as_mut() {
            Some(status) => status.is_high().unwrap_or(self.powered),
            None => self.powered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    #[derive(Clone, Default)]
    struct Pin(Rc<RefCell<alloc::vec::Vec<bool>>>);

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().push(true);
            Ok(())
        }
    }

    struct NoStatus;

    impl ErrorType for NoStatus {
        type Error = Infallible;
    }

    impl InputPin for NoStatus {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(false)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct CountingDelay(Rc<Cell<u32>>);

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.set(self.0.get() + ns / 1_000_000);
        }

        fn delay_ms(&mut self, ms: u32) {
            self.0.set(self.0.get() + ms);
        }
    }

    #[test]
    fn on_enables_supply_then_pulses() {
        let vcc = Pin::default();
        let onoff = Pin::default();
        let waited = Rc::new(Cell::new(0));
        let mut power = BeeOnOff::new(
            vcc.clone(),
            onoff.clone(),
            None::<NoStatus>,
            CountingDelay(waited.clone()),
        );

        assert!(!power.is_on());
        power.on();
        assert!(power.is_on());
        assert_eq!(*vcc.0.borrow(), [true]);
        assert_eq!(*onoff.0.borrow(), [false, true]);
        assert_eq!(waited.get(), 150);

        // already on: nothing toggles
        power.on();
        assert_eq!(onoff.0.borrow().len(), 2);

        power.off();
        assert!(!power.is_on());
        assert_eq!(*vcc.0.borrow(), [true, false]);
    }

    #[test]
    fn status_line_wins_over_bookkeeping() {
        let mut power = BeeOnOff::new(
            Pin::default(),
            Pin::default(),
            Some(NoStatus),
            CountingDelay::default(),
        );
        power.on();
        assert!(!power.is_on());
    }
}
