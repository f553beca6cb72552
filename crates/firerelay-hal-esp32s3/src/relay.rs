use embedded_hal::digital::OutputPin;

use firerelay_core::relay::RelayDriver;

/// Pin level that energises the relay coil.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelayPolarity {
    ActiveHigh,
    ActiveLow,
}

/// Relay driven directly from a GPIO output.
#[derive(Debug)]
pub struct GpioRelay<P> {
    pin: P,
    polarity: RelayPolarity,
}

impl<P: OutputPin> GpioRelay<P> {
    pub const fn new(pin: P, polarity: RelayPolarity) -> Self {
        Self { pin, polarity }
    }
}

impl<P: OutputPin> RelayDriver for GpioRelay<P> {
    type Error = P::Error;

    fn set_energized(&mut self, energized: bool) -> Result<(), Self::Error> {
        let drive_high = match self.polarity {
            RelayPolarity::ActiveHigh => energized,
            RelayPolarity::ActiveLow => !energized,
        };
        if drive_high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }
}
