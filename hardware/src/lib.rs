//! Device drivers for the pan/tilt rig.
//!
//! Implements the `shared::rig_interface` capabilities on top of GPIO lines:
//! STEP/DIR stepper drivers for both axes and a wired remote release for the
//! camera. Lines are driven either by the Linux GPIO character device or by an
//! in-memory mock for dry runs and tests.

pub mod camera;
pub mod gpio;
pub mod stepper;
