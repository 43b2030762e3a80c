//! STEP/DIR stepper driver (A4988 and compatibles).
//!
//! DIR high moves in the positive direction. Each microstep is one STEP pulse:
//! high for half the step period, low for the other half. The optional ENABLE
//! line is active low and is asserted at construction.

use std::thread;
use std::time::Duration;

use shared::config::StepperConfig;
use shared::rig_interface::{RigResult, Stepper};
use tracing::debug;

use crate::gpio::{lock, Level, SharedPins};

/// Half-period used when no step period is configured.
const DEFAULT_HALF_PERIOD: Duration = Duration::from_millis(1);

/// Lines wired to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDirPins {
    pub step: u32,
    pub dir: u32,
    pub enable: Option<u32>,
}

impl From<&StepperConfig> for StepDirPins {
    fn from(config: &StepperConfig) -> Self {
        Self {
            step: config.step_pin,
            dir: config.dir_pin,
            enable: config.enable_line(),
        }
    }
}

pub struct StepDirStepper {
    name: String,
    pins: StepDirPins,
    gpio: SharedPins,
    half_period: Duration,
}

impl StepDirStepper {
    /// Claim the driver lines and enable the driver.
    ///
    /// `step_period` is the full STEP period; zero selects a 2 ms period.
    pub fn new(
        name: impl Into<String>,
        gpio: SharedPins,
        pins: StepDirPins,
        step_period: Duration,
    ) -> RigResult<Self> {
        let half_period = if step_period.is_zero() {
            DEFAULT_HALF_PERIOD
        } else {
            step_period / 2
        };

        {
            let mut driver = lock(&gpio);
            driver.setup_output(pins.step, Level::Low)?;
            driver.setup_output(pins.dir, Level::Low)?;
            if let Some(enable) = pins.enable {
                driver.setup_output(enable, Level::Low)?;
            }
        }

        let name = name.into();
        debug!(
            "{name} stepper: STEP {} DIR {} ENABLE {:?}, {:?} per edge",
            pins.step, pins.dir, pins.enable, half_period
        );

        Ok(Self {
            name,
            pins,
            gpio,
            half_period,
        })
    }

    pub fn from_config(
        name: impl Into<String>,
        gpio: SharedPins,
        config: &StepperConfig,
        step_period: Duration,
    ) -> RigResult<Self> {
        Self::new(name, gpio, StepDirPins::from(config), step_period)
    }

    pub fn half_period(&self) -> Duration {
        self.half_period
    }

    fn write_enable(&mut self, level: Level) -> RigResult<()> {
        match self.pins.enable {
            Some(pin) => lock(&self.gpio).write(pin, level),
            None => Ok(()),
        }
    }
}

impl Stepper for StepDirStepper {
    fn move_steps(&mut self, steps: i64) -> RigResult<()> {
        if steps == 0 {
            return Ok(());
        }
        debug!("{} stepper: {steps:+} microsteps", self.name);

        let mut driver = lock(&self.gpio);
        driver.write(self.pins.dir, Level::from(steps > 0))?;
        for _ in 0..steps.unsigned_abs() {
            driver.write(self.pins.step, Level::High)?;
            thread::sleep(self.half_period);
            driver.write(self.pins.step, Level::Low)?;
            thread::sleep(self.half_period);
        }
        Ok(())
    }

    fn enable(&mut self) -> RigResult<()> {
        self.write_enable(Level::Low)
    }

    fn disable(&mut self) -> RigResult<()> {
        self.write_enable(Level::High)
    }
}
