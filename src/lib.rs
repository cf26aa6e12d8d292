//! # udevkit - Host device enumeration, ancestry and hotplug monitoring
//!
//! udevkit layers two pieces of logic over the kernel device subsystem:
//!
//! - **Hierarchy resolution**: walk a device's parent links to the root,
//!   merging every node's system attributes, and fold the chain into one
//!   denormalized summary.
//! - **Monitoring**: turn the native uevent stream into typed `add`, `remove`
//!   and `change` notifications with an explicit, idempotent close.
//!
//! ## Core Concepts
//!
//! - **DeviceNode**: a flat record keyed by `syspath`
//! - **AncestorChain**: a device and its ancestors, self first
//! - **AggregatedSummary**: per-field values from root to self
//! - **Monitor**: an observable wrapper around one native event source
//!
//! ## Usage
//!
//! ```rust,ignore
//! use udevkit::{Channel, DeviceNode, Devices};
//!
//! let devices = Devices::udev();
//! for device in devices.list_subsystem("input")? {
//!     println!("{}", serde_json::to_string(&devices.summarize(&device)?)?);
//! }
//!
//! let monitor = devices.monitor(Some("input"))?;
//! let handle = monitor.handle();
//! monitor.on(Channel::Add, move |device| {
//!     println!("added {device}");
//!     handle.close();
//! });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod device;
pub mod devices;
pub mod error;
pub mod hierarchy;
pub mod monitor;
pub mod subsystem;

// Re-export primary types at crate root for convenience
pub use device::{AttributeMap, DeviceNode};
pub use devices::{Devices, DevicesConfig};
pub use error::{
    ConstructionError, DeviceError, DeviceResult, LookupError, SourceError, StreamError,
};
pub use hierarchy::{AggregatedSummary, AncestorChain, ResolverConfig, SummaryPadding};
pub use monitor::{
    Action, Channel, DeviceEvent, EventStream, HandlerId, Monitor, MonitorConfig, MonitorFilter,
    MonitorHandle, MonitorState,
};
pub use subsystem::{DeviceSubsystem, EventSource, InMemorySubsystem};
#[cfg(all(feature = "udev", target_os = "linux"))]
pub use subsystem::UdevSubsystem;
