//! Linux GPIO character device lines via `gpiod`.

use std::collections::HashMap;

use gpiod::{Chip, Lines, Options, Output};
use shared::rig_interface::{RigError, RigResult};
use tracing::{debug, trace};

use super::{Level, PinDriver};

const CONSUMER: &str = "pan-tilt-rig";

/// Output lines requested from one GPIO chip, one request per pin.
pub struct GpiodPins {
    chip: Chip,
    chip_name: String,
    lines: HashMap<u32, Lines<Output>>,
}

impl GpiodPins {
    pub fn open(chip_name: &str) -> RigResult<Self> {
        let chip = Chip::new(chip_name).map_err(|e| RigError::GpioChip {
            chip: chip_name.to_string(),
            message: format!("failed to open: {e}"),
        })?;
        debug!("opened GPIO chip {chip_name}");

        Ok(Self {
            chip,
            chip_name: chip_name.to_string(),
            lines: HashMap::new(),
        })
    }
}

impl PinDriver for GpiodPins {
    fn setup_output(&mut self, pin: u32, initial: Level) -> RigResult<()> {
        // Re-requesting a line we already hold would fail with EBUSY
        self.lines.remove(&pin);

        let options = Options::output([pin])
            .values([initial.is_high()])
            .consumer(CONSUMER);
        let request = self
            .chip
            .request_lines(options)
            .map_err(|e| RigError::Gpio {
                pin,
                message: format!("failed to request output on {}: {e}", self.chip_name),
            })?;

        self.lines.insert(pin, request);
        Ok(())
    }

    fn write(&mut self, pin: u32, level: Level) -> RigResult<()> {
        let request = self.lines.get_mut(&pin).ok_or_else(|| RigError::Gpio {
            pin,
            message: "line not requested as output".to_string(),
        })?;
        trace!("GPIO {pin} -> {level:?}");
        request
            .set_values([level.is_high()])
            .map_err(|e| RigError::Gpio {
                pin,
                message: format!("failed to set value: {e}"),
            })
    }

    fn close(&mut self) -> RigResult<()> {
        // Dropping a request releases its line
        self.lines.clear();
        Ok(())
    }
}
