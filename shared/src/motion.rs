//! Two-axis motion control.
//!
//! A thin layer over the pan and tilt [`Stepper`]s. Exactly one thread issues
//! motion commands for a run, so no locking happens here.

use tracing::debug;

use crate::rig_interface::{RigResult, Stepper};

/// Pan and tilt steppers of the rig.
pub struct MotionController<S: Stepper> {
    pan: S,
    tilt: S,
}

impl<S: Stepper> MotionController<S> {
    pub fn new(pan: S, tilt: S) -> Self {
        Self { pan, tilt }
    }

    pub fn move_pan(&mut self, steps: i64) -> RigResult<()> {
        debug!("pan {steps:+} steps");
        self.pan.move_steps(steps)
    }

    pub fn move_tilt(&mut self, steps: i64) -> RigResult<()> {
        debug!("tilt {steps:+} steps");
        self.tilt.move_steps(steps)
    }

    /// Pan then tilt. Tilt is not attempted if the pan move fails.
    pub fn move_pan_tilt(&mut self, pan_steps: i64, tilt_steps: i64) -> RigResult<()> {
        self.move_pan(pan_steps)?;
        self.move_tilt(tilt_steps)
    }

    /// Apply holding torque on both axes.
    ///
    /// Both axes are attempted; the first error is returned.
    pub fn enable_motors(&mut self) -> RigResult<()> {
        let pan = self.pan.enable();
        let tilt = self.tilt.enable();
        pan.and(tilt)
    }

    /// Release holding torque on both axes.
    ///
    /// Both axes are attempted; the first error is returned.
    pub fn disable_motors(&mut self) -> RigResult<()> {
        let pan = self.pan.disable();
        let tilt = self.tilt.disable();
        pan.and(tilt)
    }

    pub fn into_inner(self) -> (S, S) {
        (self.pan, self.tilt)
    }
}
