//! Angle to microstep conversion.

use crate::config::{RigConfig, StepperConfig};

/// Microstep resolution of a single axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSteps {
    microsteps_per_degree: f64,
}

impl AxisSteps {
    pub fn new(steps_per_rev: u32, microstepping: u32) -> Self {
        Self {
            microsteps_per_degree: f64::from(steps_per_rev) * f64::from(microstepping) / 360.0,
        }
    }

    pub fn from_config(stepper: &StepperConfig) -> Self {
        Self::new(stepper.steps_per_rev, stepper.microstepping)
    }

    pub fn microsteps_per_degree(&self) -> f64 {
        self.microsteps_per_degree
    }

    /// Microsteps for `angle_deg`, truncated toward zero.
    ///
    /// Truncation is zero-ward on both sides, so `-x` maps to exactly the
    /// negation of `x` and neither is floored.
    pub fn steps_from_angle(&self, angle_deg: f64) -> i64 {
        (angle_deg * self.microsteps_per_degree) as i64
    }

    /// Angle covered by `steps` microsteps.
    pub fn angle_from_steps(&self, steps: i64) -> f64 {
        steps as f64 / self.microsteps_per_degree
    }
}

/// Independent pan and tilt resolutions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepConverter {
    pub pan: AxisSteps,
    pub tilt: AxisSteps,
}

impl StepConverter {
    pub fn new(pan: AxisSteps, tilt: AxisSteps) -> Self {
        Self { pan, tilt }
    }

    pub fn from_config(config: &RigConfig) -> Self {
        Self {
            pan: AxisSteps::from_config(&config.pan_stepper),
            tilt: AxisSteps::from_config(&config.tilt_stepper),
        }
    }

    pub fn pan_steps_from_angle(&self, angle_deg: f64) -> i64 {
        self.pan.steps_from_angle(angle_deg)
    }

    pub fn tilt_steps_from_angle(&self, angle_deg: f64) -> i64 {
        self.tilt.steps_from_angle(angle_deg)
    }
}
