//! Common fixtures for capture integration tests

use std::sync::Arc;
use std::time::Duration;

use shared::capture::{CaptureTiming, GridCapture};
use shared::config::RigConfig;
use shared::geometry::Axis;
use shared::motion::MotionController;
use shared::orchestrator::{CaptureOrchestrator, CaptureRunner};
use shared::rig_interface::mock::{CallJournal, MockShutter, MockStepper};
use shared::status::{StatusBroadcaster, StatusEvent, StatusSubscription};

pub const RIG_YAML: &str = r#"
pan_stepper:
  step_pin: 17
  dir_pin: 27
  enable_pin: 22
  steps_per_rev: 200
  microstepping: 16
tilt_stepper:
  step_pin: 23
  dir_pin: 24
  enable_pin: 25
  steps_per_rev: 200
  microstepping: 16
camera:
  type: nikon_d90_gpio
  focus_pin: 5
  shutter_pin: 6
lens:
  name: "Nikkor 35mm f/1.8"
  focal_length_mm: 35
sensor:
  width_mm: 23.6
  height_mm: 15.8
defaults:
  overlap_percent: 30
  horizontal_angle_deg: 180
  vertical_angle_deg: 30
  mock_gpio: true
"#;

pub type MockCapture = GridCapture<MockStepper, MockShutter>;

pub fn rig_config() -> RigConfig {
    RigConfig::from_yaml_str(RIG_YAML).expect("fixture config must load")
}

/// Grid capture on mock devices with no waits except `shot_latency` per trigger.
pub fn mock_capture(shot_latency: Duration) -> (MockCapture, CallJournal) {
    let journal = CallJournal::new();
    let motion = MotionController::new(
        MockStepper::new(Axis::Pan, journal.clone()),
        MockStepper::new(Axis::Tilt, journal.clone()),
    );
    let shutter = MockShutter::new(journal.clone()).with_latency(shot_latency);
    let capture =
        GridCapture::with_timing(rig_config(), motion, shutter, CaptureTiming::immediate());
    (capture, journal)
}

pub fn orchestrator_for(
    runner: Arc<dyn CaptureRunner>,
    min_interval: Duration,
) -> CaptureOrchestrator {
    CaptureOrchestrator::new(Some(runner), StatusBroadcaster::default(), min_interval)
}

/// Next status event. Without a status layer installed only terminal events
/// are published.
pub async fn next_event(sub: &mut StatusSubscription) -> StatusEvent {
    tokio::time::timeout(Duration::from_secs(10), sub.recv())
        .await
        .expect("timed out waiting for status event")
        .expect("status stream closed")
}
