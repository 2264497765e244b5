/*!
 * Breadboard Devices
 *
 * This crate provides the device contract, the hardware ports devices are
 * built on, the built-in peripheral kinds and the table that builds them
 * from a configuration document.
 */

#![warn(missing_docs)]

// Re-export core types
pub use breadboard_core::prelude;

pub mod device;
pub mod devices;
pub mod factory;
pub mod hal;
pub mod heartbeat;
pub mod params;
pub mod registry;

#[cfg(feature = "gpio")]
pub mod rpi;

pub use device::{
    ActionDescriptor, ActionError, Device, ObserverId, ParameterDescriptor, ParameterKind,
    StateCell, StateChange, StatefulDevice,
};
pub use factory::{BuildContext, DeviceDefinition, FactoryTable};
pub use hal::{Board, SimulatedBoard};
pub use heartbeat::Heartbeat;
pub use registry::DeviceTable;

#[cfg(feature = "gpio")]
pub use rpi::RaspberryPiBoard;

/// Breadboard devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hardware backends compiled into this build
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = vec!["simulated"];

    #[cfg(feature = "gpio")]
    backends.push("gpio");

    backends
}
