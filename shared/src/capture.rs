//! Grid capture sequencing.
//!
//! [`CaptureSequencer`] walks a [`GridPlan`] column by column in a serpentine
//! pattern: even columns run top to bottom, odd columns bottom to top, with a
//! single pan shift between columns. Holding torque is released for every
//! exposure and re-applied before the next move.
//!
//! Cancellation is checked at the top of every column and every row. A move or
//! trigger that has started always runs to completion.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancellation::CancelToken;
use crate::config::{CaptureOverrides, ConfigError, RigConfig};
use crate::geometry::{plan_for_config, FovError, GridPlan};
use crate::motion::MotionController;
use crate::orchestrator::CaptureRunner;
use crate::rig_interface::{RigError, Shutter, Stepper};

/// Why a capture run did not complete
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture cancelled after {shots_taken} shots")]
    Cancelled { shots_taken: u64 },

    #[error(transparent)]
    Hardware(#[from] RigError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CaptureError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CaptureError::Cancelled { .. })
    }
}

impl From<FovError> for CaptureError {
    fn from(err: FovError) -> Self {
        CaptureError::Config(err.to_string())
    }
}

impl From<ConfigError> for CaptureError {
    fn from(err: ConfigError) -> Self {
        CaptureError::Config(err.to_string())
    }
}

/// Where the sequencer is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Idle,
    Initializing,
    Moving,
    Shooting,
    Complete,
    Cancelled,
    Failed,
}

/// Waits inserted around grid moves and exposures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    /// After every tilt or pan move
    pub settle_delay: Duration,
    /// Between releasing torque and triggering
    pub pre_shot_delay: Duration,
    /// Between the trigger and re-applying torque
    pub post_shot_delay: Duration,
}

impl CaptureTiming {
    pub fn from_config(config: &RigConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            pre_shot_delay: config.pre_shot_delay(),
            post_shot_delay: config.post_shot_delay(),
        }
    }

    /// No waits at all.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            pre_shot_delay: Duration::ZERO,
            post_shot_delay: Duration::ZERO,
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    pub columns: u32,
    pub rows: u32,
    pub shots: u64,
}

/// Drives the motion controller and shutter through a grid plan.
pub struct CaptureSequencer<S: Stepper, C: Shutter> {
    motion: MotionController<S>,
    shutter: C,
    timing: CaptureTiming,
    state: SequenceState,
}

impl<S: Stepper, C: Shutter> CaptureSequencer<S, C> {
    pub fn new(motion: MotionController<S>, shutter: C, timing: CaptureTiming) -> Self {
        Self {
            motion,
            shutter,
            timing,
            state: SequenceState::Idle,
        }
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// Move from home to the top-left corner of the grid: pan first, then tilt.
    /// An axis with a zero offset is not moved.
    pub fn initialize_position(
        &mut self,
        plan: &GridPlan,
        cancel: &CancelToken,
    ) -> Result<(), CaptureError> {
        if cancel.is_cancelled() {
            return Err(CaptureError::Cancelled { shots_taken: 0 });
        }
        self.state = SequenceState::Initializing;
        debug!(
            "moving to start position (pan {:+} steps, tilt {:+} steps)",
            plan.start_pan_steps, plan.start_tilt_steps
        );

        if plan.start_pan_steps != 0 {
            self.motion.move_pan(plan.start_pan_steps)?;
        }
        if plan.start_tilt_steps != 0 {
            self.motion.move_tilt(plan.start_tilt_steps)?;
        }
        Ok(())
    }

    /// Take one exposure with holding torque released.
    ///
    /// Torque is re-applied whether or not the trigger succeeds.
    pub fn take_shot(&mut self) -> Result<(), CaptureError> {
        self.state = SequenceState::Shooting;
        if let Err(e) = self.motion.disable_motors() {
            warn!("failed to release holding torque: {e}");
        }
        pause(self.timing.pre_shot_delay);

        if let Err(e) = self.shutter.trigger() {
            self.reapply_torque();
            return Err(e.into());
        }

        pause(self.timing.post_shot_delay);
        self.reapply_torque();
        Ok(())
    }

    fn reapply_torque(&mut self) {
        if let Err(e) = self.motion.enable_motors() {
            warn!("failed to re-apply holding torque: {e}");
        }
    }

    /// Capture every position of `plan`.
    pub fn run_grid(
        &mut self,
        plan: &GridPlan,
        cancel: &CancelToken,
    ) -> Result<CaptureSummary, CaptureError> {
        let mut shots = 0u64;
        let result = self.walk(plan, cancel, &mut shots);

        self.state = match &result {
            Ok(()) => SequenceState::Complete,
            Err(e) if e.is_cancelled() => SequenceState::Cancelled,
            Err(_) => SequenceState::Failed,
        };

        result.map(|()| CaptureSummary {
            columns: plan.pan_columns,
            rows: plan.tilt_rows,
            shots,
        })
    }

    fn walk(
        &mut self,
        plan: &GridPlan,
        cancel: &CancelToken,
        shots: &mut u64,
    ) -> Result<(), CaptureError> {
        self.reapply_torque();
        self.initialize_position(plan, cancel)?;
        info!("at start position");

        for column in 0..plan.pan_columns {
            if cancel.is_cancelled() {
                return Err(CaptureError::Cancelled { shots_taken: *shots });
            }

            let going_down = column % 2 == 0;
            let tilt_move = if going_down {
                -plan.tilt_step_size
            } else {
                plan.tilt_step_size
            };
            debug!(
                "column {}/{} ({})",
                column + 1,
                plan.pan_columns,
                if going_down { "down" } else { "up" }
            );

            for row in 0..plan.tilt_rows {
                if cancel.is_cancelled() {
                    return Err(CaptureError::Cancelled { shots_taken: *shots });
                }

                if row > 0 {
                    self.state = SequenceState::Moving;
                    self.motion.move_tilt(tilt_move)?;
                    pause(self.timing.settle_delay);
                }

                self.take_shot()?;
                *shots += 1;
                info!(
                    "shot {}/{} taken at column {}, row {}",
                    shots,
                    plan.total_shots(),
                    column + 1,
                    row + 1
                );
            }

            if column + 1 < plan.pan_columns {
                self.state = SequenceState::Moving;
                self.motion.move_pan(plan.pan_step_size)?;
                pause(self.timing.settle_delay);
            }
        }

        Ok(())
    }
}

/// Plans and runs a grid capture for each request, against one set of devices.
///
/// The base config is never modified: each run applies its overrides to a
/// copy before planning.
pub struct GridCapture<S: Stepper, C: Shutter> {
    config: RigConfig,
    sequencer: Mutex<CaptureSequencer<S, C>>,
}

impl<S: Stepper, C: Shutter> GridCapture<S, C> {
    pub fn new(config: RigConfig, motion: MotionController<S>, shutter: C) -> Self {
        let timing = CaptureTiming::from_config(&config);
        Self::with_timing(config, motion, shutter, timing)
    }

    pub fn with_timing(
        config: RigConfig,
        motion: MotionController<S>,
        shutter: C,
        timing: CaptureTiming,
    ) -> Self {
        Self {
            config,
            sequencer: Mutex::new(CaptureSequencer::new(motion, shutter, timing)),
        }
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Plan that a run with `overrides` would execute.
    pub fn plan(&self, overrides: &CaptureOverrides) -> Result<GridPlan, CaptureError> {
        overrides.validate()?;
        Ok(plan_for_config(&self.config.with_overrides(overrides))?)
    }
}

impl<S: Stepper, C: Shutter> CaptureRunner for GridCapture<S, C> {
    fn run(
        &self,
        overrides: &CaptureOverrides,
        cancel: &CancelToken,
    ) -> Result<CaptureSummary, CaptureError> {
        let plan = self.plan(overrides)?;
        info!(
            "grid: {} columns x {} rows = {} photos (FOV {:.2}x{:.2} deg, step {:.2}x{:.2} deg)",
            plan.pan_columns,
            plan.tilt_rows,
            plan.total_shots(),
            plan.horizontal_fov,
            plan.vertical_fov,
            plan.pan_rotation_angle,
            plan.tilt_rotation_angle
        );
        debug!("{plan:?}");

        let mut sequencer = self.sequencer.lock().unwrap_or_else(|e| e.into_inner());
        sequencer.run_grid(&plan, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancelSource;
    use crate::config::tests::sample_config;
    use crate::geometry::Axis;
    use crate::rig_interface::mock::{mock_rig, CallJournal, MockShutter, MockStepper, RigCall};

    fn grid(columns: u32, rows: u32) -> GridPlan {
        GridPlan {
            pan_columns: columns,
            tilt_rows: rows,
            pan_step_size: 100,
            tilt_step_size: 40,
            start_pan_angle: -10.0,
            start_tilt_angle: 5.0,
            start_pan_steps: -500,
            start_tilt_steps: 200,
            horizontal_fov: 20.0,
            vertical_fov: 10.0,
            pan_rotation_angle: 14.0,
            tilt_rotation_angle: 7.0,
        }
    }

    fn sequencer() -> (CaptureSequencer<MockStepper, MockShutter>, CallJournal) {
        let (pan, tilt, shutter, journal) = mock_rig();
        let seq = CaptureSequencer::new(
            MotionController::new(pan, tilt),
            shutter,
            CaptureTiming::immediate(),
        );
        (seq, journal)
    }

    #[test]
    fn test_shot_count_is_columns_times_rows() {
        for (columns, rows) in [(3, 4), (5, 7), (1, 1), (1, 6), (6, 1)] {
            let (mut seq, journal) = sequencer();
            let summary = seq.run_grid(&grid(columns, rows), &CancelToken::never()).unwrap();
            assert_eq!(summary.shots, u64::from(columns * rows));
            assert_eq!(journal.trigger_count() as u32, columns * rows);
            assert_eq!(seq.state(), SequenceState::Complete);
        }
    }

    #[test]
    fn test_serpentine_moves() {
        let (mut seq, journal) = sequencer();
        seq.run_grid(&grid(3, 3), &CancelToken::never()).unwrap();

        // Start offset, then down, down | up, up | down, down
        assert_eq!(journal.moves(Axis::Tilt), vec![200, -40, -40, 40, 40, -40, -40]);
        // Start offset, then one shift between each pair of columns
        assert_eq!(journal.moves(Axis::Pan), vec![-500, 100, 100]);
    }

    #[test]
    fn test_start_position_skips_zero_axes() {
        let (mut seq, journal) = sequencer();
        let mut plan = grid(1, 1);
        plan.start_pan_steps = 0;
        seq.run_grid(&plan, &CancelToken::never()).unwrap();
        assert!(journal.moves(Axis::Pan).is_empty());
        assert_eq!(journal.moves(Axis::Tilt), vec![200]);

        let (mut seq, journal) = sequencer();
        let mut plan = grid(1, 1);
        plan.start_tilt_steps = 0;
        seq.run_grid(&plan, &CancelToken::never()).unwrap();
        assert_eq!(journal.moves(Axis::Pan), vec![-500]);
        assert!(journal.moves(Axis::Tilt).is_empty());
    }

    #[test]
    fn test_start_position_pan_before_tilt() {
        let (mut seq, journal) = sequencer();
        seq.initialize_position(&grid(2, 2), &CancelToken::never())
            .unwrap();
        assert_eq!(
            journal.calls(),
            vec![
                RigCall::Move { axis: Axis::Pan, steps: -500 },
                RigCall::Move { axis: Axis::Tilt, steps: 200 },
            ]
        );
    }

    #[test]
    fn test_torque_released_around_every_trigger() {
        let (mut seq, journal) = sequencer();
        seq.run_grid(&grid(2, 2), &CancelToken::never()).unwrap();

        let calls = journal.calls();
        for (i, call) in calls.iter().enumerate() {
            if *call == RigCall::Trigger {
                assert_eq!(calls[i - 2], RigCall::Disable(Axis::Pan));
                assert_eq!(calls[i - 1], RigCall::Disable(Axis::Tilt));
                assert_eq!(calls[i + 1], RigCall::Enable(Axis::Pan));
                assert_eq!(calls[i + 2], RigCall::Enable(Axis::Tilt));
            }
        }

        // Motors end the run holding
        assert_eq!(calls.last(), Some(&RigCall::Enable(Axis::Tilt)));
    }

    #[test]
    fn test_trigger_failure_reapplies_torque() {
        let journal = CallJournal::new();
        let mut seq = CaptureSequencer::new(
            MotionController::new(
                MockStepper::new(Axis::Pan, journal.clone()),
                MockStepper::new(Axis::Tilt, journal.clone()),
            ),
            MockShutter::new(journal.clone()).failing_on_shot(2),
            CaptureTiming::immediate(),
        );

        let err = seq.run_grid(&grid(3, 3), &CancelToken::never()).unwrap_err();
        assert!(matches!(err, CaptureError::Hardware(RigError::Camera(_))));
        assert!(!err.is_cancelled());
        assert_eq!(seq.state(), SequenceState::Failed);
        assert_eq!(journal.trigger_count(), 2);

        let calls = journal.calls();
        assert_eq!(
            &calls[calls.len() - 4..],
            &[
                RigCall::Disable(Axis::Pan),
                RigCall::Disable(Axis::Tilt),
                RigCall::Enable(Axis::Pan),
                RigCall::Enable(Axis::Tilt),
            ]
        );
    }

    #[test]
    fn test_motor_failure_aborts_run() {
        let journal = CallJournal::new();
        let mut seq = CaptureSequencer::new(
            MotionController::new(
                MockStepper::new(Axis::Pan, journal.clone()),
                MockStepper::new(Axis::Tilt, journal.clone()).failing_after(2),
            ),
            MockShutter::new(journal.clone()),
            CaptureTiming::immediate(),
        );

        // Tilt: start offset, one row move, then failure
        let err = seq.run_grid(&grid(2, 4), &CancelToken::never()).unwrap_err();
        assert!(matches!(err, CaptureError::Hardware(RigError::Motor(_))));
        assert_eq!(journal.trigger_count(), 2);
    }

    #[test]
    fn test_start_move_failure_is_fatal() {
        let journal = CallJournal::new();
        let mut seq = CaptureSequencer::new(
            MotionController::new(
                MockStepper::new(Axis::Pan, journal.clone()).failing_after(0),
                MockStepper::new(Axis::Tilt, journal.clone()),
            ),
            MockShutter::new(journal.clone()),
            CaptureTiming::immediate(),
        );
        assert!(seq.run_grid(&grid(2, 2), &CancelToken::never()).is_err());
        assert_eq!(journal.trigger_count(), 0);
        assert!(journal.moves(Axis::Tilt).is_empty());
    }

    #[test]
    fn test_torque_failure_is_not_fatal() {
        let journal = CallJournal::new();
        let mut seq = CaptureSequencer::new(
            MotionController::new(
                MockStepper::new(Axis::Pan, journal.clone()).failing_torque(),
                MockStepper::new(Axis::Tilt, journal.clone()).failing_torque(),
            ),
            MockShutter::new(journal.clone()),
            CaptureTiming::immediate(),
        );
        let summary = seq.run_grid(&grid(2, 2), &CancelToken::never()).unwrap();
        assert_eq!(summary.shots, 4);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (mut seq, journal) = sequencer();
        let source = CancelSource::new();
        source.cancel();

        let err = seq.run_grid(&grid(3, 4), &source.token()).unwrap_err();
        assert!(matches!(err, CaptureError::Cancelled { shots_taken: 0 }));
        assert_eq!(seq.state(), SequenceState::Cancelled);
        assert_eq!(journal.trigger_count(), 0);
        assert!(journal.moves(Axis::Pan).is_empty());
    }

    #[test]
    fn test_cancelled_mid_sequence() {
        let journal = CallJournal::new();
        let mut seq = CaptureSequencer::new(
            MotionController::new(
                MockStepper::new(Axis::Pan, journal.clone()),
                MockStepper::new(Axis::Tilt, journal.clone()),
            ),
            MockShutter::new(journal.clone()).with_latency(Duration::from_millis(5)),
            CaptureTiming::immediate(),
        );

        let source = CancelSource::new();
        let token = source.token();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            source.cancel();
        });

        let err = seq.run_grid(&grid(10, 10), &token).unwrap_err();
        canceller.join().unwrap();

        let shots_taken = match err {
            CaptureError::Cancelled { shots_taken } => shots_taken,
            other => panic!("expected cancellation, got {other}"),
        };
        assert!(shots_taken > 0 && shots_taken < 100, "shots: {shots_taken}");
        assert_eq!(shots_taken, journal.trigger_count() as u64);
    }

    #[test]
    fn test_grid_capture_applies_overrides_to_copy() {
        let (pan, tilt, shutter, journal) = mock_rig();
        let capture = GridCapture::with_timing(
            sample_config(),
            MotionController::new(pan, tilt),
            shutter,
            CaptureTiming::immediate(),
        );

        let overrides = CaptureOverrides {
            horizontal_angle_deg: 40.0,
            vertical_angle_deg: 10.0,
            focal_length_mm: 0.0,
        };
        let expected = capture.plan(&overrides).unwrap();
        let summary = capture.run(&overrides, &CancelToken::never()).unwrap();

        assert_eq!(summary.shots, expected.total_shots());
        assert_eq!(journal.trigger_count() as u64, expected.total_shots());
        assert_eq!(capture.config().horizontal_angle_deg(), 180.0);
    }

    #[test]
    fn test_grid_capture_missing_sensor_is_config_error() {
        let mut config = sample_config();
        config.sensor = None;
        let (pan, tilt, shutter, journal) = mock_rig();
        let capture = GridCapture::new(config, MotionController::new(pan, tilt), shutter);

        let err = capture
            .run(&CaptureOverrides::default(), &CancelToken::never())
            .unwrap_err();
        assert!(matches!(err, CaptureError::Config(_)));
        assert!(journal.calls().is_empty());
    }

    #[test]
    fn test_grid_capture_rejects_invalid_overrides() {
        let (pan, tilt, shutter, _) = mock_rig();
        let capture = GridCapture::new(sample_config(), MotionController::new(pan, tilt), shutter);
        let overrides = CaptureOverrides {
            vertical_angle_deg: 500.0,
            ..Default::default()
        };
        assert!(matches!(
            capture.run(&overrides, &CancelToken::never()),
            Err(CaptureError::Config(_))
        ));
    }
}
