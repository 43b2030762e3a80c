//! Capture geometry: lens field of view, angle to microstep conversion and
//! grid planning.
//!
//! Angles are in degrees throughout. Positive pan is to the right and positive
//! tilt is up, with the rig's home position at the angular centre of the scan.

pub mod fov;
pub mod grid;
pub mod steps;

pub use fov::{FovCalculator, FovError, LensSensorParams};
pub use grid::{build_plan, plan_for_config, GridPlan};
pub use steps::{AxisSteps, StepConverter};

/// One of the two rig axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Pan,
    Tilt,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Pan => write!(f, "pan"),
            Axis::Tilt => write!(f, "tilt"),
        }
    }
}

/// Fraction of each frame shared with its neighbour, in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct OverlapRatio(f64);

impl OverlapRatio {
    /// Ratio from a percentage. Range checking happens when the config loads.
    pub fn from_percent(percent: f64) -> Self {
        Self(percent / 100.0)
    }

    pub fn from_ratio(ratio: f64) -> Self {
        Self(ratio)
    }

    pub fn ratio(&self) -> f64 {
        self.0
    }

    pub fn percent(&self) -> f64 {
        self.0 * 100.0
    }
}
