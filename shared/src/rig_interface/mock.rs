//! Recording mock devices.
//!
//! All mocks created from one [`CallJournal`] append to the same log, so tests
//! can assert the interleaving of moves, torque changes and triggers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{RigError, RigResult, Shutter, Stepper};
use crate::geometry::Axis;

/// A single device call seen by a mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigCall {
    Move { axis: Axis, steps: i64 },
    Enable(Axis),
    Disable(Axis),
    Trigger,
}

/// Shared, ordered log of device calls.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<RigCall>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RigCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, call: RigCall) {
        self.lock().push(call);
    }

    pub fn calls(&self) -> Vec<RigCall> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn trigger_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|c| matches!(c, RigCall::Trigger))
            .count()
    }

    /// Moves on `axis`, in order.
    pub fn moves(&self, axis: Axis) -> Vec<i64> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                RigCall::Move { axis: a, steps } if *a == axis => Some(*steps),
                _ => None,
            })
            .collect()
    }

    /// Net microsteps moved on `axis` since the journal was created.
    pub fn position(&self, axis: Axis) -> i64 {
        self.moves(axis).iter().sum()
    }
}

/// Stepper that records calls and can be told to fail.
#[derive(Debug)]
pub struct MockStepper {
    axis: Axis,
    journal: CallJournal,
    latency: Duration,
    fail_after_moves: Option<usize>,
    fail_torque: bool,
    moves: usize,
}

impl MockStepper {
    pub fn new(axis: Axis, journal: CallJournal) -> Self {
        Self {
            axis,
            journal,
            latency: Duration::ZERO,
            fail_after_moves: None,
            fail_torque: false,
            moves: 0,
        }
    }

    /// Sleep this long inside every move.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Succeed for `moves` moves, then fail every move after that.
    pub fn failing_after(mut self, moves: usize) -> Self {
        self.fail_after_moves = Some(moves);
        self
    }

    /// Fail every enable and disable call.
    pub fn failing_torque(mut self) -> Self {
        self.fail_torque = true;
        self
    }
}

impl Stepper for MockStepper {
    fn move_steps(&mut self, steps: i64) -> RigResult<()> {
        if let Some(limit) = self.fail_after_moves {
            if self.moves >= limit {
                return Err(RigError::Motor(format!(
                    "{} driver not responding after {} moves",
                    self.axis, self.moves
                )));
            }
        }
        self.moves += 1;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        self.journal.record(RigCall::Move {
            axis: self.axis,
            steps,
        });
        Ok(())
    }

    fn enable(&mut self) -> RigResult<()> {
        if self.fail_torque {
            return Err(RigError::Motor(format!("{} enable line stuck", self.axis)));
        }
        self.journal.record(RigCall::Enable(self.axis));
        Ok(())
    }

    fn disable(&mut self) -> RigResult<()> {
        if self.fail_torque {
            return Err(RigError::Motor(format!("{} enable line stuck", self.axis)));
        }
        self.journal.record(RigCall::Disable(self.axis));
        Ok(())
    }
}

/// Shutter that records triggers and can be told to fail.
#[derive(Debug)]
pub struct MockShutter {
    journal: CallJournal,
    latency: Duration,
    fail_on_shot: Option<usize>,
    shots: usize,
}

impl MockShutter {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            latency: Duration::ZERO,
            fail_on_shot: None,
            shots: 0,
        }
    }

    /// Sleep this long inside every trigger.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the trigger with zero-based index `shot`.
    pub fn failing_on_shot(mut self, shot: usize) -> Self {
        self.fail_on_shot = Some(shot);
        self
    }
}

impl Shutter for MockShutter {
    fn trigger(&mut self) -> RigResult<()> {
        let shot = self.shots;
        self.shots += 1;
        if self.fail_on_shot == Some(shot) {
            return Err(RigError::Camera(format!("shutter did not fire on shot {shot}")));
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        self.journal.record(RigCall::Trigger);
        Ok(())
    }
}

/// Pan stepper, tilt stepper and shutter all sharing one journal.
pub fn mock_rig() -> (MockStepper, MockStepper, MockShutter, CallJournal) {
    let journal = CallJournal::new();
    (
        MockStepper::new(Axis::Pan, journal.clone()),
        MockStepper::new(Axis::Tilt, journal.clone()),
        MockShutter::new(journal.clone()),
        journal,
    )
}
