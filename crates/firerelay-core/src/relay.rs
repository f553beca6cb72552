//! Relay output abstraction and last-known state.

use log::info;

/// Digital output that energises the relay coil.
pub trait RelayDriver {
    type Error: core::fmt::Debug;

    fn set_energized(&mut self, energized: bool) -> Result<(), Self::Error>;
}

/// Drives the relay and remembers the last value written.
#[derive(Debug)]
pub struct RelayController<D> {
    driver: D,
    state: bool,
}

impl<D: RelayDriver> RelayController<D> {
    /// Forces the output off; remote state is only applied once a read arrives.
    pub fn new(mut driver: D) -> Result<Self, D::Error> {
        driver.set_energized(false)?;
        Ok(Self {
            driver,
            state: false,
        })
    }

    /// Writes the output and records the new state. The state is left untouched
    /// if the driver rejects the write.
    pub fn set_relay(&mut self, on: bool) -> Result<(), D::Error> {
        self.driver.set_energized(on)?;
        self.state = on;
        info!("relay updated to {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    pub fn state(&self) -> bool {
        self.state
    }

    #[cfg(test)]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[cfg(test)]
    pub(crate) fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
