//! Calibration endpoint drivers and contracts.
//!
//! [`capabilities`] defines the traits the sweep controller is written
//! against. [`keysight`] and [`particle`] are the bench drivers; [`mock`]
//! provides hardware-free stand-ins for tests and dry runs.

pub mod capabilities;
pub mod keysight;
pub mod mock;
pub mod particle;

pub use capabilities::{InverterSensor, OutputTransition, PowerSupply};
pub use keysight::{KeysightSupply, SupplyModel, SupplyProfile};
pub use mock::{MockSensor, MockSupply};
pub use particle::ParticleSensor;
