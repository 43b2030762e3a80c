//! Capability contracts for the rig hardware.
//!
//! The capture core drives exactly two kinds of device: a stepper per axis and
//! a shutter. Concrete GPIO implementations live in the `hardware` crate; the
//! [`mock`] module provides recording stand-ins for tests and dry runs.

pub mod mock;

use thiserror::Error;

/// Errors reported by rig devices
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RigError {
    #[error("GPIO line {pin}: {message}")]
    Gpio { pin: u32, message: String },

    #[error("GPIO chip {chip}: {message}")]
    GpioChip { chip: String, message: String },

    #[error("motor error: {0}")]
    Motor(String),

    #[error("camera error: {0}")]
    Camera(String),
}

pub type RigResult<T> = Result<T, RigError>;

/// A stepper motor driver on one axis.
pub trait Stepper: Send {
    /// Move by `steps` microsteps; the sign selects the direction.
    /// Zero performs no I/O.
    fn move_steps(&mut self, steps: i64) -> RigResult<()>;

    /// Apply holding torque. No-op without an enable line.
    fn enable(&mut self) -> RigResult<()>;

    /// Release holding torque. No-op without an enable line.
    fn disable(&mut self) -> RigResult<()>;
}

/// A camera that can take one exposure on request.
///
/// Focus and exposure timing are internal to the implementation.
pub trait Shutter: Send {
    fn trigger(&mut self) -> RigResult<()>;
}

impl<S: Stepper + ?Sized> Stepper for Box<S> {
    fn move_steps(&mut self, steps: i64) -> RigResult<()> {
        (**self).move_steps(steps)
    }

    fn enable(&mut self) -> RigResult<()> {
        (**self).enable()
    }

    fn disable(&mut self) -> RigResult<()> {
        (**self).disable()
    }
}

impl<C: Shutter + ?Sized> Shutter for Box<C> {
    fn trigger(&mut self) -> RigResult<()> {
        (**self).trigger()
    }
}
