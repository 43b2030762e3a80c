//! Rig initialisation shared by the capture binaries.
//!
//! Loads the YAML config, applies command-line overrides and builds the
//! steppers and camera on the configured GPIO backend.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use hardware::camera::RigCamera;
use hardware::gpio::{lock, share, GpioBackend, SharedPins};
use hardware::stepper::StepDirStepper;
use shared::capture::GridCapture;
use shared::config::{CaptureOverrides, RigConfig};
use shared::motion::MotionController;
use tracing::{info, warn};

/// Grid capture on the real (or mock) GPIO devices.
pub type RigCapture = GridCapture<StepDirStepper, RigCamera>;

/// Per-run parameter overrides from the command line.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    #[arg(
        long,
        default_value = "0",
        help = "Total horizontal sweep in degrees (1-360, 0 = config default)"
    )]
    pub horizontal_angle_deg: f64,

    #[arg(
        long,
        default_value = "0",
        help = "Total vertical sweep in degrees (1-180, 0 = config default)"
    )]
    pub vertical_angle_deg: f64,

    #[arg(
        long,
        default_value = "0",
        help = "Focal length in mm (1-500, 0 = config default)"
    )]
    pub focal_length_mm: f64,
}

impl OverrideArgs {
    pub fn to_overrides(&self) -> CaptureOverrides {
        CaptureOverrides {
            horizontal_angle_deg: self.horizontal_angle_deg,
            vertical_angle_deg: self.vertical_angle_deg,
            focal_length_mm: self.focal_length_mm,
        }
    }
}

/// Config file and override arguments common to the capture binaries.
#[derive(Args, Debug, Clone)]
pub struct RigArgs {
    #[arg(
        short = 'c',
        long,
        default_value = "configs/default.yaml",
        help = "Path to the rig config file",
        long_help = "YAML file describing stepper wiring, camera trigger, lens, sensor and \
            run defaults. Values given as command-line overrides replace the matching \
            defaults for every capture started by this process."
    )]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Load the config and apply validated command-line overrides to it.
pub fn load_config(args: &RigArgs) -> anyhow::Result<RigConfig> {
    let config = RigConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let overrides = args.overrides.to_overrides();
    overrides.validate().context("Invalid command-line override")?;
    Ok(config.with_overrides(&overrides))
}

/// Initialised devices. The GPIO handle is kept to release lines on shutdown.
pub struct Rig {
    pub capture: RigCapture,
    pub gpio: SharedPins,
}

/// Open the GPIO backend and build steppers and camera from `config`.
pub fn initialize_rig(config: &RigConfig) -> anyhow::Result<Rig> {
    let backend = GpioBackend::open(config.defaults.mock_gpio, &config.defaults.gpio_chip)
        .context("Failed to initialize GPIO")?;
    if backend.is_mock() {
        info!("Using mock GPIO");
    } else {
        info!("Using GPIO chip {}", config.defaults.gpio_chip);
    }
    let gpio = share(backend);

    let step_period = config.move_speed();
    let pan = StepDirStepper::from_config("pan", gpio.clone(), &config.pan_stepper, step_period)
        .context("Failed to initialize pan stepper")?;
    let tilt =
        StepDirStepper::from_config("tilt", gpio.clone(), &config.tilt_stepper, step_period)
            .context("Failed to initialize tilt stepper")?;
    let camera = RigCamera::from_config(config, gpio.clone())
        .context("Failed to initialize camera trigger")?;

    info!(
        "Rig ready: lens {} ({} mm), overlap {}%",
        config.lens.name, config.lens.focal_length_mm, config.defaults.overlap_percent
    );

    Ok(Rig {
        capture: GridCapture::new(config.clone(), MotionController::new(pan, tilt), camera),
        gpio,
    })
}

/// Release every GPIO line held by the rig.
pub fn release_gpio(gpio: &SharedPins) {
    let closed = lock(gpio).close();
    if let Err(e) = closed {
        warn!("Closing GPIO failed: {e}");
    }
}
