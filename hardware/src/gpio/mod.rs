//! GPIO output lines.
//!
//! Pins are identified by their line offset on the configured chip; on a
//! Raspberry Pi `gpiochip0` line offsets equal BCM numbers.

#[cfg(target_os = "linux")]
pub mod chardev;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use shared::rig_interface::{RigError, RigResult};
use tracing::trace;

/// Output level of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Something that can drive GPIO output lines.
pub trait PinDriver: Send {
    /// Claim `pin` as an output, starting at `initial`.
    fn setup_output(&mut self, pin: u32, initial: Level) -> RigResult<()>;

    /// Drive a claimed output line.
    fn write(&mut self, pin: u32, level: Level) -> RigResult<()>;

    /// Release every claimed line.
    fn close(&mut self) -> RigResult<()>;
}

/// A line write seen by [`MockPins`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: u32,
    pub level: Level,
}

/// Shared log of line writes made through a [`MockPins`].
#[derive(Debug, Clone, Default)]
pub struct PinJournal {
    writes: Arc<Mutex<Vec<PinWrite>>>,
}

impl PinJournal {
    fn push(&self, write: PinWrite) {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(write);
    }

    pub fn writes(&self) -> Vec<PinWrite> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn writes_to(&self, pin: u32) -> Vec<Level> {
        self.writes()
            .into_iter()
            .filter(|w| w.pin == pin)
            .map(|w| w.level)
            .collect()
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// In-memory GPIO for dry runs and tests.
#[derive(Debug, Default)]
pub struct MockPins {
    lines: HashMap<u32, Level>,
    journal: Option<PinJournal>,
    failing_pin: Option<u32>,
}

impl MockPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that records every write (including initial levels) to the returned journal.
    pub fn with_journal() -> (Self, PinJournal) {
        let journal = PinJournal::default();
        let pins = Self {
            journal: Some(journal.clone()),
            ..Self::default()
        };
        (pins, journal)
    }

    /// Make every write to `pin` fail.
    pub fn failing_on(mut self, pin: u32) -> Self {
        self.failing_pin = Some(pin);
        self
    }

    pub fn level(&self, pin: u32) -> Option<Level> {
        self.lines.get(&pin).copied()
    }
}

impl PinDriver for MockPins {
    fn setup_output(&mut self, pin: u32, initial: Level) -> RigResult<()> {
        trace!("mock GPIO {pin}: output, initial {initial:?}");
        self.lines.insert(pin, initial);
        if let Some(journal) = &self.journal {
            journal.push(PinWrite {
                pin,
                level: initial,
            });
        }
        Ok(())
    }

    fn write(&mut self, pin: u32, level: Level) -> RigResult<()> {
        if self.failing_pin == Some(pin) {
            return Err(RigError::Gpio {
                pin,
                message: "simulated write failure".to_string(),
            });
        }
        let line = self.lines.get_mut(&pin).ok_or_else(|| RigError::Gpio {
            pin,
            message: "line not configured as output".to_string(),
        })?;
        trace!("mock GPIO {pin} -> {level:?}");
        *line = level;
        if let Some(journal) = &self.journal {
            journal.push(PinWrite { pin, level });
        }
        Ok(())
    }

    fn close(&mut self) -> RigResult<()> {
        self.lines.clear();
        Ok(())
    }
}

/// GPIO implementation chosen once at startup.
pub enum GpioBackend {
    Mock(MockPins),
    #[cfg(target_os = "linux")]
    Gpiod(chardev::GpiodPins),
}

impl GpioBackend {
    /// Open the mock backend, or the character device `chip`.
    pub fn open(mock: bool, chip: &str) -> RigResult<Self> {
        if mock {
            return Ok(GpioBackend::Mock(MockPins::new()));
        }
        Self::open_chip(chip)
    }

    #[cfg(target_os = "linux")]
    fn open_chip(chip: &str) -> RigResult<Self> {
        Ok(GpioBackend::Gpiod(chardev::GpiodPins::open(chip)?))
    }

    #[cfg(not(target_os = "linux"))]
    fn open_chip(chip: &str) -> RigResult<Self> {
        Err(RigError::GpioChip {
            chip: chip.to_string(),
            message: "GPIO character devices are only available on Linux".to_string(),
        })
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, GpioBackend::Mock(_))
    }
}

impl PinDriver for GpioBackend {
    fn setup_output(&mut self, pin: u32, initial: Level) -> RigResult<()> {
        match self {
            GpioBackend::Mock(pins) => pins.setup_output(pin, initial),
            #[cfg(target_os = "linux")]
            GpioBackend::Gpiod(pins) => pins.setup_output(pin, initial),
        }
    }

    fn write(&mut self, pin: u32, level: Level) -> RigResult<()> {
        match self {
            GpioBackend::Mock(pins) => pins.write(pin, level),
            #[cfg(target_os = "linux")]
            GpioBackend::Gpiod(pins) => pins.write(pin, level),
        }
    }

    fn close(&mut self) -> RigResult<()> {
        match self {
            GpioBackend::Mock(pins) => pins.close(),
            #[cfg(target_os = "linux")]
            GpioBackend::Gpiod(pins) => pins.close(),
        }
    }
}

/// One pin driver shared by every device on the rig.
pub type SharedPins = Arc<Mutex<dyn PinDriver>>;

pub fn share<P: PinDriver + 'static>(pins: P) -> SharedPins {
    Arc::new(Mutex::new(pins))
}

/// Lock a shared driver, recovering from a poisoned lock.
pub fn lock(pins: &SharedPins) -> MutexGuard<'_, dyn PinDriver + 'static> {
    pins.lock().unwrap_or_else(|e| e.into_inner())
}
