//! Device subsystem backends.
//!
//! The traits describe the native layer; `memory` is a complete in-process
//! implementation and `udev` binds the host's libudev.

/// In-process device table.
pub mod memory;
mod traits;
#[cfg(all(feature = "udev", target_os = "linux"))]
/// libudev-backed subsystem.
pub mod udev;

pub use memory::InMemorySubsystem;
pub use traits::{DeviceSubsystem, EventSource};
#[cfg(all(feature = "udev", target_os = "linux"))]
pub use self::udev::UdevSubsystem;
