//! Abstract device subsystem traits.
//!
//! These traits define the contract the native device layer must implement.
//! By using traits, the resolver and monitor can run against:
//! - libudev on Linux hosts
//! - an in-memory device table for tests and embedded use

use std::time::Duration;

use crate::device::{AttributeMap, DeviceNode};
use crate::error::{ConstructionError, LookupError, SourceError};
use crate::monitor::{DeviceEvent, MonitorFilter};

/// Enumeration, attribute and parent lookup against the host device table.
///
/// Implementations must be safe to call concurrently from several threads.
pub trait DeviceSubsystem: Send + Sync {
    /// List current devices, optionally restricted to one subsystem.
    fn list(&self, subsystem: Option<&str>) -> Result<Vec<DeviceNode>, LookupError>;

    /// System attributes of the device at `syspath`.
    ///
    /// # Errors
    /// - `DeviceNotFound`: if no device exists at `syspath`
    fn sysattrs(&self, syspath: &str) -> Result<AttributeMap, LookupError>;

    /// Immediate parent of the device at `syspath`, or `None` at the root.
    ///
    /// # Errors
    /// - `DeviceNotFound`: if no device exists at `syspath`
    fn parent(&self, syspath: &str) -> Result<Option<DeviceNode>, LookupError>;

    /// Open a native event source scoped to `filter`.
    ///
    /// The source starts receiving immediately. Dropping it releases the
    /// native handle.
    fn open_monitor(&self, filter: &MonitorFilter) -> Result<Box<dyn EventSource>, ConstructionError>;
}

/// A native stream of device events, exclusively owned by one monitor.
pub trait EventSource: Send {
    /// Wait up to `timeout` for the next event. `Ok(None)` on timeout.
    ///
    /// # Errors
    /// - `Closed`: the source terminated and will never deliver again
    /// - `Io`: a transient read failure; the caller may keep polling
    fn next_event(&mut self, timeout: Duration) -> Result<Option<DeviceEvent>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_subsystem_object_safe(_: &dyn DeviceSubsystem) {}
    fn _assert_source_object_safe(_: &dyn EventSource) {}

    #[test]
    fn test_lookup_error_display() {
        let err = LookupError::DeviceNotFound {
            syspath: "/sys/devices/gone".to_string(),
        };
        assert!(err.to_string().contains("/sys/devices/gone"));
    }
}
