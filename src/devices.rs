//! Entry point bundling a device subsystem with configuration.

use std::sync::Arc;

use tracing::debug;

use crate::device::{AttributeMap, DeviceNode};
use crate::error::DeviceResult;
use crate::hierarchy::{self, AggregatedSummary, AncestorChain, ResolverConfig};
use crate::monitor::{Monitor, MonitorConfig, MonitorFilter};
use crate::subsystem::DeviceSubsystem;

/// Configuration consumed by [`Devices`].
#[derive(Debug, Clone, Default)]
pub struct DevicesConfig {
    /// Chain resolution and summary settings.
    pub resolver: ResolverConfig,
    /// Settings for monitors opened through the facade.
    pub monitor: MonitorConfig,
}

/// Device enumeration, hierarchy resolution and monitoring.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use udevkit::{AttributeMap, DeviceNode, Devices, InMemorySubsystem};
///
/// let table = Arc::new(InMemorySubsystem::new());
/// let mut attrs = AttributeMap::new();
/// attrs.insert("vendor".to_string(), Some("V0".to_string()));
/// table.insert_device(DeviceNode::new("/devices/pci0"), None, attrs)?;
///
/// let devices = Devices::new(table);
/// let summary = devices.summarize(&DeviceNode::new("/devices/pci0"))?;
/// assert_eq!(summary.values("vendor"), vec!["V0"]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct Devices {
    subsystem: Arc<dyn DeviceSubsystem>,
    config: DevicesConfig,
}

impl std::fmt::Debug for Devices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Devices")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Devices {
    /// Facade over `subsystem` with default configuration.
    #[must_use]
    pub fn new(subsystem: Arc<dyn DeviceSubsystem>) -> Self {
        Self::with_config(subsystem, DevicesConfig::default())
    }

    /// Facade over `subsystem` with explicit configuration.
    #[must_use]
    pub fn with_config(subsystem: Arc<dyn DeviceSubsystem>, config: DevicesConfig) -> Self {
        Self { subsystem, config }
    }

    /// Devices backed by the host's libudev.
    #[cfg(all(feature = "udev", target_os = "linux"))]
    #[must_use]
    pub fn udev() -> Self {
        Self::new(Arc::new(crate::subsystem::UdevSubsystem::new()))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DevicesConfig {
        &self.config
    }

    /// The underlying device subsystem.
    #[must_use]
    pub fn subsystem(&self) -> &Arc<dyn DeviceSubsystem> {
        &self.subsystem
    }

    /// Every device currently known to the subsystem.
    pub fn list(&self) -> DeviceResult<Vec<DeviceNode>> {
        Ok(self.subsystem.list(None)?)
    }

    /// Devices of one subsystem.
    pub fn list_subsystem(&self, subsystem: &str) -> DeviceResult<Vec<DeviceNode>> {
        Ok(self.subsystem.list(Some(subsystem))?)
    }

    /// Immediate parent of the device at `syspath`, or `None` at the root.
    pub fn get_node_parent_by_syspath(&self, syspath: &str) -> DeviceResult<Option<DeviceNode>> {
        Ok(self.subsystem.parent(syspath)?)
    }

    /// System attributes of the device at `syspath`.
    pub fn get_sysattr_by_syspath(&self, syspath: &str) -> DeviceResult<AttributeMap> {
        Ok(self.subsystem.sysattrs(syspath)?)
    }

    /// Open a monitor for every subsystem (`None`) or exactly one.
    pub fn monitor(&self, subsystem: Option<&str>) -> DeviceResult<Monitor> {
        let filter = MonitorFilter::from_option(subsystem)?;
        debug!(subsystem = ?filter.subsystem_name(), "opening monitor");
        Ok(Monitor::open(self.subsystem.as_ref(), filter, self.config.monitor.clone())?)
    }

    /// Ancestor chain of `node`, self first. Accepts `&DeviceNode` or `None`.
    pub fn resolve_chain<'n>(&self, node: impl Into<Option<&'n DeviceNode>>) -> DeviceResult<AncestorChain> {
        Ok(hierarchy::resolve_chain(
            self.subsystem.as_ref(),
            node.into(),
            &self.config.resolver,
        )?)
    }

    /// Aggregated summary of `node`'s chain, root first.
    pub fn summarize<'n>(&self, node: impl Into<Option<&'n DeviceNode>>) -> DeviceResult<AggregatedSummary> {
        Ok(hierarchy::summarize(
            self.subsystem.as_ref(),
            node.into(),
            &self.config.resolver,
        )?)
    }
}
