//! Grid planning for a panorama capture.
//!
//! A [`GridPlan`] is computed once at the start of a run and consumed
//! read-only by the sequencer. The scan starts at the top-left corner of the
//! requested area: pan `-H/2`, tilt `+V/2` from the home position.

use super::fov::{FovCalculator, FovError};
use super::steps::StepConverter;
use crate::config::RigConfig;

/// Discrete pan/tilt grid covering the requested sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPlan {
    /// Number of pan positions, at least 1
    pub pan_columns: u32,
    /// Number of tilt positions per column, at least 1
    pub tilt_rows: u32,
    /// Microsteps between neighbouring columns
    pub pan_step_size: i64,
    /// Microsteps between neighbouring rows
    pub tilt_step_size: i64,
    /// Pan angle of the first column relative to home, degrees
    pub start_pan_angle: f64,
    /// Tilt angle of the first row relative to home, degrees
    pub start_tilt_angle: f64,
    /// Microsteps from home to the first column
    pub start_pan_steps: i64,
    /// Microsteps from home to the first row
    pub start_tilt_steps: i64,
    pub horizontal_fov: f64,
    pub vertical_fov: f64,
    pub pan_rotation_angle: f64,
    pub tilt_rotation_angle: f64,
}

impl GridPlan {
    /// Shots the sequencer will take for this plan.
    pub fn total_shots(&self) -> u64 {
        u64::from(self.pan_columns) * u64::from(self.tilt_rows)
    }
}

/// Positions needed to cover `total_deg` in increments of `rotation_deg`.
///
/// A vanishing rotation angle gives a saturated count rather than a fault;
/// keeping the overlap below 100% is the config loader's job.
fn positions(total_deg: f64, rotation_deg: f64) -> u32 {
    ((total_deg / rotation_deg).ceil() as u32).max(1)
}

/// Build the capture grid for a total pan and tilt sweep.
///
/// Fails only when the field of view cannot be computed.
pub fn build_plan(
    total_pan_deg: f64,
    total_tilt_deg: f64,
    fov: &FovCalculator,
    steps: &StepConverter,
) -> Result<GridPlan, FovError> {
    let horizontal_fov = fov.horizontal_fov()?;
    let vertical_fov = fov.vertical_fov()?;
    let pan_rotation_angle = fov.horizontal_rotation_angle()?;
    let tilt_rotation_angle = fov.vertical_rotation_angle()?;

    let start_pan_angle = -total_pan_deg / 2.0;
    let start_tilt_angle = total_tilt_deg / 2.0;

    Ok(GridPlan {
        pan_columns: positions(total_pan_deg, pan_rotation_angle),
        tilt_rows: positions(total_tilt_deg, tilt_rotation_angle),
        pan_step_size: steps.pan_steps_from_angle(pan_rotation_angle),
        tilt_step_size: steps.tilt_steps_from_angle(tilt_rotation_angle),
        start_pan_angle,
        start_tilt_angle,
        start_pan_steps: steps.pan_steps_from_angle(start_pan_angle),
        start_tilt_steps: steps.tilt_steps_from_angle(start_tilt_angle),
        horizontal_fov,
        vertical_fov,
        pan_rotation_angle,
        tilt_rotation_angle,
    })
}

/// Plan for the sweep, lens and steppers of `config`.
pub fn plan_for_config(config: &RigConfig) -> Result<GridPlan, FovError> {
    build_plan(
        config.horizontal_angle_deg(),
        config.vertical_angle_deg(),
        &FovCalculator::from_config(config),
        &StepConverter::from_config(config),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::geometry::{AxisSteps, LensSensorParams, OverlapRatio};
    use approx::assert_relative_eq;

    fn fov(focal_length_mm: f64, overlap_percent: f64) -> FovCalculator {
        FovCalculator::new(
            LensSensorParams::new(focal_length_mm, 23.6, 15.8),
            OverlapRatio::from_percent(overlap_percent),
        )
    }

    fn converter() -> StepConverter {
        StepConverter::new(AxisSteps::new(200, 16), AxisSteps::new(200, 16))
    }

    #[test]
    fn test_plan_for_default_sweep() {
        let plan = build_plan(180.0, 30.0, &fov(35.0, 30.0), &converter()).unwrap();

        // rotation 37.26 * 0.7 = 26.08 deg -> ceil(180 / 26.08) = 7
        assert_eq!(plan.pan_columns, 7);
        // rotation 25.44 * 0.7 = 17.81 deg -> ceil(30 / 17.81) = 2
        assert_eq!(plan.tilt_rows, 2);
        assert_eq!(plan.total_shots(), 14);

        assert_eq!(plan.pan_step_size, (plan.pan_rotation_angle * 3200.0 / 360.0) as i64);
        assert_eq!(plan.start_pan_steps, -800);
        assert_eq!(plan.start_tilt_steps, 133);
    }

    #[test]
    fn test_start_offsets_are_half_sweep() {
        for (h, v) in [(180.0, 30.0), (360.0, 180.0), (1.0, 1.0), (95.5, 47.25)] {
            let plan = build_plan(h, v, &fov(50.0, 30.0), &converter()).unwrap();
            assert_eq!(plan.start_pan_angle, -h / 2.0);
            assert_eq!(plan.start_tilt_angle, v / 2.0);
            assert!(plan.start_pan_steps <= 0);
            assert!(plan.start_tilt_steps >= 0);
        }
    }

    #[test]
    fn test_sweep_smaller_than_fov_gives_one_shot() {
        let plan = build_plan(1.0, 1.0, &fov(18.0, 0.0), &converter()).unwrap();
        assert_eq!(plan.pan_columns, 1);
        assert_eq!(plan.tilt_rows, 1);
        assert_eq!(plan.total_shots(), 1);

        let plan = build_plan(0.0, 0.0, &fov(18.0, 0.0), &converter()).unwrap();
        assert_eq!(plan.pan_columns, 1);
        assert_eq!(plan.tilt_rows, 1);
    }

    #[test]
    fn test_rotation_equals_fov_without_overlap() {
        let plan = build_plan(180.0, 30.0, &fov(35.0, 0.0), &converter()).unwrap();
        assert_relative_eq!(plan.pan_rotation_angle, plan.horizontal_fov, epsilon = 1e-12);
        assert_relative_eq!(plan.tilt_rotation_angle, plan.vertical_fov, epsilon = 1e-12);
    }

    #[test]
    fn test_more_overlap_more_positions() {
        let low = build_plan(180.0, 90.0, &fov(35.0, 5.0), &converter()).unwrap();
        let high = build_plan(180.0, 90.0, &fov(35.0, 90.0), &converter()).unwrap();
        assert!(high.pan_columns > low.pan_columns);
        assert!(high.tilt_rows > low.tilt_rows);
    }

    #[test]
    fn test_near_total_overlap_is_large_but_finite() {
        let plan = build_plan(
            360.0,
            180.0,
            &FovCalculator::new(
                LensSensorParams::new(35.0, 23.6, 15.8),
                OverlapRatio::from_ratio(0.999_999),
            ),
            &converter(),
        )
        .unwrap();
        assert!(plan.pan_columns > 1_000_000);
        assert!(plan.tilt_rows > 1_000_000);
        assert_eq!(plan.pan_step_size, 0);
    }

    #[test]
    fn test_missing_sensor_fails_plan() {
        let calc = FovCalculator::new(
            LensSensorParams {
                focal_length_mm: 35.0,
                sensor: None,
            },
            OverlapRatio::from_percent(30.0),
        );
        assert_eq!(
            build_plan(180.0, 30.0, &calc, &converter()),
            Err(FovError::MissingSensorInfo)
        );
    }

    #[test]
    fn test_plan_for_config_uses_axis_resolutions() {
        // sample config: pan 200 x 16, tilt 200 x 8
        let config = sample_config();
        let plan = plan_for_config(&config).unwrap();
        assert_eq!(plan.start_pan_steps, -800);
        assert_eq!(plan.start_tilt_steps, 66);
    }
}
