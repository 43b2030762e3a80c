//! Rig configuration loaded from YAML.
//!
//! Mirrors the layout of `configs/default.yaml`. Loading applies the defaults
//! and range checks the capture path depends on, so the planner and sequencer
//! only ever see an already-validated parameter set.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Maximum total horizontal sweep in degrees.
pub const MAX_HORIZONTAL_ANGLE_DEG: f64 = 360.0;

/// Maximum total vertical sweep in degrees.
pub const MAX_VERTICAL_ANGLE_DEG: f64 = 180.0;

/// Maximum focal length accepted as a per-run override, in mm.
pub const MAX_FOCAL_LENGTH_MM: f64 = 500.0;

/// Errors raised while loading or overriding configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid override: {0}")]
    InvalidOverride(String),
}

/// STEP/DIR driver wiring and resolution for one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepperConfig {
    /// STEP line (BCM numbering)
    pub step_pin: u32,
    /// DIR line (BCM numbering)
    pub dir_pin: u32,
    /// ENABLE line, active low. 0 = not wired.
    #[serde(default)]
    pub enable_pin: u32,
    /// Full steps per motor revolution
    pub steps_per_rev: u32,
    /// Microstep divisor configured on the driver
    pub microstepping: u32,
}

impl StepperConfig {
    /// ENABLE line if one is wired.
    pub fn enable_line(&self) -> Option<u32> {
        (self.enable_pin > 0).then_some(self.enable_pin)
    }

    /// Microsteps for one full output revolution.
    pub fn microsteps_per_rev(&self) -> f64 {
        f64::from(self.steps_per_rev) * f64::from(self.microstepping)
    }

    fn validate(&self, axis: &str) -> Result<(), ConfigError> {
        if self.steps_per_rev == 0 {
            return Err(ConfigError::Invalid(format!(
                "{axis}.steps_per_rev must be > 0"
            )));
        }
        if self.microstepping == 0 {
            return Err(ConfigError::Invalid(format!(
                "{axis}.microstepping must be > 0"
            )));
        }
        if self.step_pin == self.dir_pin {
            return Err(ConfigError::Invalid(format!(
                "{axis}.step_pin and {axis}.dir_pin must differ (both {})",
                self.step_pin
            )));
        }
        Ok(())
    }
}

/// Supported camera trigger implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraKind {
    /// Nikon D90 driven through the 3-pin remote connector
    #[serde(rename = "nikon_d90_gpio")]
    NikonD90Gpio,
}

/// Camera trigger wiring and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(rename = "type")]
    pub kind: CameraKind,
    pub focus_pin: u32,
    pub shutter_pin: u32,
    /// Autofocus wait before the shutter line is pulled low
    #[serde(default)]
    pub focus_delay_ms: u64,
    /// How long the shutter line is held low
    #[serde(default)]
    pub shutter_delay_ms: u64,
    /// Settle time after a shot before the next move
    #[serde(default)]
    pub post_shot_delay_ms: u64,
}

/// Mounted lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensConfig {
    #[serde(default)]
    pub name: String,
    pub focal_length_mm: f64,
}

/// Physical sensor size. Required for any field-of-view computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub width_mm: f64,
    pub height_mm: f64,
}

/// Image resolution, informational only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    pub width_px: u32,
    pub height_px: u32,
}

/// Log verbosity selected by `defaults.debug_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Off,
    /// Grid summary, shots and run outcome
    Info,
    /// Individual moves
    Live,
    /// Calculation details from every crate
    Verbose,
    /// GPIO line writes
    Trace,
}

impl Verbosity {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Off,
            1 => Verbosity::Info,
            2 => Verbosity::Live,
            3 => Verbosity::Verbose,
            _ => Verbosity::Trace,
        }
    }

    /// `EnvFilter` directive for this verbosity.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Verbosity::Off => "off",
            Verbosity::Info => "info",
            Verbosity::Live => "info,shared=debug",
            Verbosity::Verbose => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

/// Run defaults and process-level switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Full STEP period in ms (each edge waits half of it)
    pub move_speed_ms: u64,
    /// Desired overlap between neighbouring shots, percent
    pub overlap_percent: f64,
    /// Total horizontal sweep in degrees
    pub horizontal_angle_deg: f64,
    /// Total vertical sweep in degrees
    pub vertical_angle_deg: f64,
    /// Wait after each grid move
    pub settle_delay_ms: u64,
    /// Stabilisation wait before each trigger
    pub pre_shot_delay_ms: u64,
    /// Cool-down between two capture starts
    pub min_capture_interval_ms: u64,
    /// 0 = off, 1 = info, 2 = live, 3 = verbose, 4 = trace
    pub debug_level: u8,
    /// Use the in-memory GPIO driver instead of the character device
    pub mock_gpio: bool,
    /// GPIO character device, e.g. `gpiochip0`
    pub gpio_chip: String,
}

/// Complete rig configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    pub pan_stepper: StepperConfig,
    pub tilt_stepper: StepperConfig,
    pub camera: CameraConfig,
    pub lens: LensConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<SensorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl RigConfig {
    /// Read, parse and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: RigConfig = serde_yaml::from_str(text)?;
        config.normalize()?;
        Ok(config)
    }

    /// Fill defaults and reject out-of-range values.
    fn normalize(&mut self) -> Result<(), ConfigError> {
        if !(self.lens.focal_length_mm > 0.0) || !self.lens.focal_length_mm.is_finite() {
            return Err(ConfigError::Invalid(
                "lens.focal_length_mm must be > 0".to_string(),
            ));
        }
        if let Some(sensor) = &self.sensor {
            if !(sensor.width_mm > 0.0) || !(sensor.height_mm > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "sensor dimensions must be > 0, got {}x{} mm",
                    sensor.width_mm, sensor.height_mm
                )));
            }
        }

        self.pan_stepper.validate("pan_stepper")?;
        self.tilt_stepper.validate("tilt_stepper")?;

        let d = &mut self.defaults;
        if d.move_speed_ms == 0 {
            d.move_speed_ms = 2;
        }

        // ratio < 1 keeps the planner's rotation angle strictly positive
        if !(0.0..100.0).contains(&d.overlap_percent) {
            return Err(ConfigError::Invalid(format!(
                "overlap_percent must be >= 0 and < 100, got {:.2}",
                d.overlap_percent
            )));
        }
        if d.overlap_percent == 0.0 {
            d.overlap_percent = 30.0;
        }

        if !(d.horizontal_angle_deg > 0.0) {
            d.horizontal_angle_deg = 180.0;
        }
        if !(d.vertical_angle_deg > 0.0) {
            d.vertical_angle_deg = 30.0;
        }
        if d.horizontal_angle_deg > MAX_HORIZONTAL_ANGLE_DEG {
            return Err(ConfigError::Invalid(format!(
                "horizontal_angle_deg must be <= {MAX_HORIZONTAL_ANGLE_DEG}, got {:.2}",
                d.horizontal_angle_deg
            )));
        }
        if d.vertical_angle_deg > MAX_VERTICAL_ANGLE_DEG {
            return Err(ConfigError::Invalid(format!(
                "vertical_angle_deg must be <= {MAX_VERTICAL_ANGLE_DEG}, got {:.2}",
                d.vertical_angle_deg
            )));
        }

        if d.settle_delay_ms == 0 {
            d.settle_delay_ms = 500;
        }
        if d.pre_shot_delay_ms == 0 {
            d.pre_shot_delay_ms = 300;
        }
        if d.min_capture_interval_ms == 0 {
            d.min_capture_interval_ms = 5000;
        }
        if d.gpio_chip.is_empty() {
            d.gpio_chip = "gpiochip0".to_string();
        }

        let cam = &mut self.camera;
        if cam.focus_delay_ms == 0 {
            cam.focus_delay_ms = 500;
        }
        if cam.shutter_delay_ms == 0 {
            cam.shutter_delay_ms = 200;
        }
        if cam.post_shot_delay_ms == 0 {
            cam.post_shot_delay_ms = 300;
        }

        Ok(())
    }

    /// Copy of this config with the non-zero override fields applied.
    ///
    /// The receiver is never modified, so a long-lived base config can serve
    /// any number of runs with different overrides.
    pub fn with_overrides(&self, overrides: &CaptureOverrides) -> RigConfig {
        let mut config = self.clone();
        if overrides.horizontal_angle_deg > 0.0 {
            config.defaults.horizontal_angle_deg = overrides.horizontal_angle_deg;
        }
        if overrides.vertical_angle_deg > 0.0 {
            config.defaults.vertical_angle_deg = overrides.vertical_angle_deg;
        }
        if overrides.focal_length_mm > 0.0 {
            config.lens.focal_length_mm = overrides.focal_length_mm;
        }
        config
    }

    /// Overlap as a ratio in [0, 1).
    pub fn overlap_ratio(&self) -> f64 {
        self.defaults.overlap_percent / 100.0
    }

    pub fn horizontal_angle_deg(&self) -> f64 {
        self.defaults.horizontal_angle_deg
    }

    pub fn vertical_angle_deg(&self) -> f64 {
        self.defaults.vertical_angle_deg
    }

    /// Full STEP period.
    pub fn move_speed(&self) -> Duration {
        Duration::from_millis(self.defaults.move_speed_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.defaults.settle_delay_ms)
    }

    pub fn pre_shot_delay(&self) -> Duration {
        Duration::from_millis(self.defaults.pre_shot_delay_ms)
    }

    pub fn post_shot_delay(&self) -> Duration {
        Duration::from_millis(self.camera.post_shot_delay_ms)
    }

    pub fn focus_delay(&self) -> Duration {
        Duration::from_millis(self.camera.focus_delay_ms)
    }

    pub fn shutter_delay(&self) -> Duration {
        Duration::from_millis(self.camera.shutter_delay_ms)
    }

    pub fn min_capture_interval(&self) -> Duration {
        Duration::from_millis(self.defaults.min_capture_interval_ms)
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_level(self.defaults.debug_level)
    }
}

/// Per-run parameters that replace config defaults.
///
/// A zero field means "use the configured default", never an explicit zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureOverrides {
    #[serde(default)]
    pub horizontal_angle_deg: f64,
    #[serde(default)]
    pub vertical_angle_deg: f64,
    #[serde(default)]
    pub focal_length_mm: f64,
}

impl CaptureOverrides {
    /// Reject non-finite or out-of-range values. Zero fields are skipped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_override(
            "horizontal_angle_deg",
            self.horizontal_angle_deg,
            MAX_HORIZONTAL_ANGLE_DEG,
        )?;
        check_override(
            "vertical_angle_deg",
            self.vertical_angle_deg,
            MAX_VERTICAL_ANGLE_DEG,
        )?;
        check_override("focal_length_mm", self.focal_length_mm, MAX_FOCAL_LENGTH_MM)
    }

    pub fn is_empty(&self) -> bool {
        *self == CaptureOverrides::default()
    }
}

fn check_override(name: &str, value: f64, max: f64) -> Result<(), ConfigError> {
    if value == 0.0 {
        return Ok(());
    }
    if !value.is_finite() {
        return Err(ConfigError::InvalidOverride(format!(
            "{name} must be a finite number"
        )));
    }
    if !(1.0..=max).contains(&value) {
        return Err(ConfigError::InvalidOverride(format!(
            "{name} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE_CONFIG: &str = r#"
pan_stepper:
  step_pin: 17
  dir_pin: 27
  enable_pin: 22
  steps_per_rev: 200
  microstepping: 16
tilt_stepper:
  step_pin: 23
  dir_pin: 24
  steps_per_rev: 200
  microstepping: 8
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
  mock_gpio: true
"#;

    pub(crate) fn sample_config() -> RigConfig {
        RigConfig::from_yaml_str(SAMPLE_CONFIG).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = sample_config();
        assert_eq!(config.defaults.move_speed_ms, 2);
        assert_eq!(config.defaults.horizontal_angle_deg, 180.0);
        assert_eq!(config.defaults.vertical_angle_deg, 30.0);
        assert_eq!(config.defaults.settle_delay_ms, 500);
        assert_eq!(config.defaults.pre_shot_delay_ms, 300);
        assert_eq!(config.defaults.min_capture_interval_ms, 5000);
        assert_eq!(config.defaults.gpio_chip, "gpiochip0");
        assert_eq!(config.camera.focus_delay_ms, 500);
        assert_eq!(config.camera.shutter_delay_ms, 200);
        assert_eq!(config.camera.post_shot_delay_ms, 300);
        assert_eq!(config.camera.kind, CameraKind::NikonD90Gpio);
    }

    #[test]
    fn test_zero_overlap_defaults_to_thirty_percent() {
        let text = SAMPLE_CONFIG.replace("overlap_percent: 30", "overlap_percent: 0");
        let config = RigConfig::from_yaml_str(&text).unwrap();
        assert_eq!(config.defaults.overlap_percent, 30.0);
        assert!((config.overlap_ratio() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_overlap_out_of_range_rejected() {
        for bad in ["-5", "100", "150"] {
            let text =
                SAMPLE_CONFIG.replace("overlap_percent: 30", &format!("overlap_percent: {bad}"));
            let err = RigConfig::from_yaml_str(&text).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "overlap {bad}: {err}");
        }
    }

    #[test]
    fn test_angles_above_limits_rejected() {
        let text = SAMPLE_CONFIG.replace(
            "overlap_percent: 30",
            "overlap_percent: 30\n  horizontal_angle_deg: 361",
        );
        assert!(RigConfig::from_yaml_str(&text).is_err());

        let text = SAMPLE_CONFIG.replace(
            "overlap_percent: 30",
            "overlap_percent: 30\n  vertical_angle_deg: 181",
        );
        assert!(RigConfig::from_yaml_str(&text).is_err());
    }

    #[test]
    fn test_zero_focal_length_rejected() {
        let text = SAMPLE_CONFIG.replace("focal_length_mm: 35", "focal_length_mm: 0");
        let err = RigConfig::from_yaml_str(&text).unwrap_err();
        assert!(err.to_string().contains("focal_length_mm"));
    }

    #[test]
    fn test_unknown_camera_type_rejected() {
        let text = SAMPLE_CONFIG.replace("nikon_d90_gpio", "canon_usb");
        assert!(matches!(
            RigConfig::from_yaml_str(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_camera_section_rejected() {
        let text = SAMPLE_CONFIG.replace(
            "camera:\n  type: nikon_d90_gpio\n  focus_pin: 5\n  shutter_pin: 6\n",
            "",
        );
        assert!(RigConfig::from_yaml_str(&text).is_err());
    }

    #[test]
    fn test_sensor_is_optional() {
        let text = SAMPLE_CONFIG.replace("sensor:\n  width_mm: 23.6\n  height_mm: 15.8\n", "");
        let config = RigConfig::from_yaml_str(&text).unwrap();
        assert!(config.sensor.is_none());
    }

    #[test]
    fn test_zero_microstepping_rejected() {
        let text = SAMPLE_CONFIG.replace("microstepping: 8", "microstepping: 0");
        let err = RigConfig::from_yaml_str(&text).unwrap_err();
        assert!(err.to_string().contains("tilt_stepper.microstepping"));
    }

    #[test]
    fn test_enable_line() {
        let config = sample_config();
        assert_eq!(config.pan_stepper.enable_line(), Some(22));
        assert_eq!(config.tilt_stepper.enable_line(), None);
        assert_eq!(config.pan_stepper.microsteps_per_rev(), 3200.0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

        let config = RigConfig::load(file.path()).unwrap();
        assert_eq!(config.lens.focal_length_mm, 35.0);
        assert_eq!(config.lens.name, "Nikkor 35mm f/1.8");
    }

    #[test]
    fn test_load_missing_file() {
        let err = RigConfig::load(Path::new("/nonexistent/rig.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_with_overrides_copies() {
        let base = sample_config();
        let overrides = CaptureOverrides {
            horizontal_angle_deg: 90.0,
            vertical_angle_deg: 0.0,
            focal_length_mm: 50.0,
        };

        let config = base.with_overrides(&overrides);
        assert_eq!(config.horizontal_angle_deg(), 90.0);
        assert_eq!(config.vertical_angle_deg(), base.vertical_angle_deg());
        assert_eq!(config.lens.focal_length_mm, 50.0);

        // Base untouched
        assert_eq!(base.horizontal_angle_deg(), 180.0);
        assert_eq!(base.lens.focal_length_mm, 35.0);
    }

    #[test]
    fn test_override_validation() {
        assert!(CaptureOverrides::default().validate().is_ok());
        assert!(CaptureOverrides {
            horizontal_angle_deg: 360.0,
            vertical_angle_deg: 180.0,
            focal_length_mm: 500.0,
        }
        .validate()
        .is_ok());

        let cases = [
            CaptureOverrides { horizontal_angle_deg: f64::NAN, ..Default::default() },
            CaptureOverrides { horizontal_angle_deg: f64::INFINITY, ..Default::default() },
            CaptureOverrides { horizontal_angle_deg: -10.0, ..Default::default() },
            CaptureOverrides { horizontal_angle_deg: 0.5, ..Default::default() },
            CaptureOverrides { horizontal_angle_deg: 361.0, ..Default::default() },
            CaptureOverrides { vertical_angle_deg: 181.0, ..Default::default() },
            CaptureOverrides { vertical_angle_deg: f64::NEG_INFINITY, ..Default::default() },
            CaptureOverrides { focal_length_mm: 501.0, ..Default::default() },
            CaptureOverrides { focal_length_mm: f64::NAN, ..Default::default() },
        ];
        for overrides in cases {
            assert!(
                matches!(overrides.validate(), Err(ConfigError::InvalidOverride(_))),
                "{overrides:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_overrides_deserialize_with_missing_fields() {
        let overrides: CaptureOverrides =
            serde_json::from_str(r#"{"horizontal_angle_deg": 120}"#).unwrap();
        assert_eq!(overrides.horizontal_angle_deg, 120.0);
        assert_eq!(overrides.vertical_angle_deg, 0.0);
        assert!(!overrides.is_empty());
        assert!(CaptureOverrides::default().is_empty());
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Verbosity::from_level(0), Verbosity::Off);
        assert_eq!(Verbosity::from_level(2), Verbosity::Live);
        assert_eq!(Verbosity::from_level(9), Verbosity::Trace);
        assert!(Verbosity::Trace > Verbosity::Info);
        assert_eq!(Verbosity::Off.filter_directive(), "off");
    }
}
