//! Lens/sensor field of view and per-shot rotation angles.

use thiserror::Error;

use super::{Axis, OverlapRatio};
use crate::config::{RigConfig, SensorConfig};

/// Errors raised while deriving the field of view
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FovError {
    #[error("sensor dimensions not configured, field of view cannot be computed")]
    MissingSensorInfo,
}

/// Optical parameters needed for one plan computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensSensorParams {
    pub focal_length_mm: f64,
    pub sensor: Option<SensorConfig>,
}

impl LensSensorParams {
    pub fn new(focal_length_mm: f64, sensor_width_mm: f64, sensor_height_mm: f64) -> Self {
        Self {
            focal_length_mm,
            sensor: Some(SensorConfig {
                width_mm: sensor_width_mm,
                height_mm: sensor_height_mm,
            }),
        }
    }

    pub fn from_config(config: &RigConfig) -> Self {
        Self {
            focal_length_mm: config.lens.focal_length_mm,
            sensor: config.sensor,
        }
    }
}

/// Angular view of a rectilinear lens across a sensor dimension, in degrees.
fn angle_of_view(dimension_mm: f64, focal_length_mm: f64) -> f64 {
    2.0 * (dimension_mm / (2.0 * focal_length_mm)).atan().to_degrees()
}

/// Computes field of view and grid rotation angles for a lens, sensor and overlap.
#[derive(Debug, Clone, Copy)]
pub struct FovCalculator {
    params: LensSensorParams,
    overlap: OverlapRatio,
}

impl FovCalculator {
    pub fn new(params: LensSensorParams, overlap: OverlapRatio) -> Self {
        Self { params, overlap }
    }

    /// Calculator for a (possibly overridden) rig config.
    pub fn from_config(config: &RigConfig) -> Self {
        Self::new(
            LensSensorParams::from_config(config),
            OverlapRatio::from_ratio(config.overlap_ratio()),
        )
    }

    fn sensor(&self) -> Result<SensorConfig, FovError> {
        self.params.sensor.ok_or(FovError::MissingSensorInfo)
    }

    /// Horizontal field of view in degrees.
    pub fn horizontal_fov(&self) -> Result<f64, FovError> {
        let sensor = self.sensor()?;
        Ok(angle_of_view(sensor.width_mm, self.params.focal_length_mm))
    }

    /// Vertical field of view in degrees.
    pub fn vertical_fov(&self) -> Result<f64, FovError> {
        let sensor = self.sensor()?;
        Ok(angle_of_view(sensor.height_mm, self.params.focal_length_mm))
    }

    pub fn fov(&self, axis: Axis) -> Result<f64, FovError> {
        match axis {
            Axis::Pan => self.horizontal_fov(),
            Axis::Tilt => self.vertical_fov(),
        }
    }

    /// Angle between neighbouring shots on an axis: `fov * (1 - overlap)`.
    pub fn rotation_angle(&self, axis: Axis) -> Result<f64, FovError> {
        Ok(self.fov(axis)? * (1.0 - self.overlap.ratio()))
    }

    pub fn horizontal_rotation_angle(&self) -> Result<f64, FovError> {
        self.rotation_angle(Axis::Pan)
    }

    pub fn vertical_rotation_angle(&self) -> Result<f64, FovError> {
        self.rotation_angle(Axis::Tilt)
    }
}
