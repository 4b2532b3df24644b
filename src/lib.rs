/// Rig Panel Library
///
/// Shared modules for the motor test rig control and telemetry panel

pub mod config_loader;
pub mod gui;
pub mod history;
pub mod rig_connection;
pub mod telemetry;
pub mod telemetry_logger;
