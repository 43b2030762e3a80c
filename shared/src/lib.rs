//! Core of the pan/tilt panorama rig.
//!
//! Everything here is hardware independent: configuration, capture geometry,
//! the capability traits the drivers in the `hardware` crate implement, the
//! grid sequencer and the run orchestrator used by both the one-shot CLI and
//! the HTTP server.

pub mod cancellation;
pub mod capture;
pub mod config;
pub mod geometry;
pub mod motion;
pub mod orchestrator;
pub mod rig_interface;
pub mod status;
