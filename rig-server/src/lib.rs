//! Process wiring for the pan/tilt rig: rig initialisation from config,
//! tracing setup and the HTTP control server.

pub mod capture_server;
pub mod rig_init;
pub mod status_layer;
