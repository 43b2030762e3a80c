//! Wired remote release cameras.

use std::thread;
use std::time::Duration;

use shared::config::{CameraKind, RigConfig};
use shared::rig_interface::{RigResult, Shutter};
use tracing::{debug, warn};

use crate::gpio::{lock, Level, SharedPins};

/// Focus/shutter remote on a 3-pin connector (Nikon MC-DC1 style).
///
/// Both lines idle high; pulling a line low closes the contact.
pub struct NikonRemote {
    gpio: SharedPins,
    focus_pin: u32,
    shutter_pin: u32,
    focus_delay: Duration,
    shutter_delay: Duration,
}

impl NikonRemote {
    /// Claim both lines, released (high).
    pub fn new(
        gpio: SharedPins,
        focus_pin: u32,
        shutter_pin: u32,
        focus_delay: Duration,
        shutter_delay: Duration,
    ) -> RigResult<Self> {
        {
            let mut driver = lock(&gpio);
            driver.setup_output(focus_pin, Level::High)?;
            driver.setup_output(shutter_pin, Level::High)?;
        }
        debug!("remote release: FOCUS {focus_pin} SHUTTER {shutter_pin}");

        Ok(Self {
            gpio,
            focus_pin,
            shutter_pin,
            focus_delay,
            shutter_delay,
        })
    }

    /// Drive one line. The driver lock is released before this returns.
    fn write(&self, pin: u32, level: Level) -> RigResult<()> {
        lock(&self.gpio).write(pin, level)
    }

    fn release_focus(&self) {
        if let Err(e) = self.write(self.focus_pin, Level::High) {
            warn!("failed to release focus line: {e}");
        }
    }
}

impl Shutter for NikonRemote {
    fn trigger(&mut self) -> RigResult<()> {
        self.write(self.focus_pin, Level::Low)?;
        thread::sleep(self.focus_delay);

        let pressed = self.write(self.shutter_pin, Level::Low);
        if let Err(e) = pressed {
            self.release_focus();
            return Err(e);
        }
        thread::sleep(self.shutter_delay);

        let released = self.write(self.shutter_pin, Level::High);
        if let Err(e) = released {
            self.release_focus();
            return Err(e);
        }
        self.write(self.focus_pin, Level::High)?;
        debug!("shutter released");
        Ok(())
    }
}

/// Camera implementations selectable from config.
pub enum RigCamera {
    NikonD90Gpio(NikonRemote),
}

impl RigCamera {
    pub fn from_config(config: &RigConfig, gpio: SharedPins) -> RigResult<Self> {
        let camera = &config.camera;
        match camera.kind {
            CameraKind::NikonD90Gpio => Ok(RigCamera::NikonD90Gpio(NikonRemote::new(
                gpio,
                camera.focus_pin,
                camera.shutter_pin,
                config.focus_delay(),
                config.shutter_delay(),
            )?)),
        }
    }
}

impl Shutter for RigCamera {
    fn trigger(&mut self) -> RigResult<()> {
        match self {
            RigCamera::NikonD90Gpio(remote) => remote.trigger(),
        }
    }
}
