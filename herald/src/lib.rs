pub mod control_handler;
pub mod controller;

pub use control_handler::HeraldControlHandler;
pub use controller::{CONFIG_ENV, ControlConfig, Herald, SHUTDOWN_BROADCAST};
