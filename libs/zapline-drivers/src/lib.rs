//! Device Drivers for Zapline
//!
//! Typed clients over the Modbus RTU master for the slave devices on the
//! actuator bus. Each driver owns one slave address and nothing else; the
//! bus and the master session are shared by reference and outlive every
//! driver.

pub mod mightyzap;

pub use mightyzap::{
    ActuatorStatus, GoalError, GoalStep, MightyZap, Register, DEFAULT_CURRENT_LIMIT,
    DEFAULT_SPEED_LIMIT,
};
