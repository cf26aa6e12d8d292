use serde::{Deserialize, Serialize};

use crate::device::DeviceNode;
use crate::error::ConstructionError;

/// Subsystem scope of a monitor: everything, or exactly one subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorFilter {
    subsystem: Option<String>,
}

impl MonitorFilter {
    /// Match devices of every subsystem.
    #[must_use]
    pub const fn all() -> Self {
        Self { subsystem: None }
    }

    /// Match devices of a single subsystem (e.g. `"input"`, `"block"`).
    pub fn subsystem(name: impl Into<String>) -> Result<Self, ConstructionError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("subsystem name is empty")
        } else if name.chars().any(char::is_whitespace) {
            Some("subsystem name contains whitespace")
        } else if name.contains('/') {
            Some("subsystem name contains '/'")
        } else if name.contains('\0') {
            Some("subsystem name contains NUL")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(ConstructionError::InvalidFilter {
                subsystem: name,
                reason: reason.to_string(),
            });
        }

        Ok(Self {
            subsystem: Some(name),
        })
    }

    /// Build from an optional subsystem name.
    pub fn from_option(subsystem: Option<&str>) -> Result<Self, ConstructionError> {
        match subsystem {
            Some(name) => Self::subsystem(name),
            None => Ok(Self::all()),
        }
    }

    /// The subsystem this filter is scoped to, if any.
    #[must_use]
    pub fn subsystem_name(&self) -> Option<&str> {
        self.subsystem.as_deref()
    }

    /// Whether a device passes this filter.
    ///
    /// Native sources apply the filter in the kernel; this is used by
    /// backends that deliver events themselves.
    #[must_use]
    pub fn matches(&self, device: &DeviceNode) -> bool {
        match &self.subsystem {
            None => true,
            Some(wanted) => device.subsystem() == Some(wanted.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_matches_everything() {
        let filter = MonitorFilter::all();
        assert!(filter.matches(&DeviceNode::new("/sys/a")));
        assert!(filter.matches(&DeviceNode::new("/sys/b").with_field("SUBSYSTEM", "block")));
    }

    #[test]
    fn subsystem_filter_matches_only_that_subsystem() {
        let filter = MonitorFilter::subsystem("input").unwrap();
        assert!(filter.matches(&DeviceNode::new("/sys/a").with_field("SUBSYSTEM", "input")));
        assert!(!filter.matches(&DeviceNode::new("/sys/b").with_field("SUBSYSTEM", "block")));
        assert!(!filter.matches(&DeviceNode::new("/sys/c")));
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["", "in put", "a/b", "nul\0"] {
            let err = MonitorFilter::subsystem(bad).unwrap_err();
            assert!(matches!(err, ConstructionError::InvalidFilter { .. }), "{bad:?}");
        }
    }

    #[test]
    fn from_option() {
        assert_eq!(MonitorFilter::from_option(None).unwrap(), MonitorFilter::all());
        assert_eq!(
            MonitorFilter::from_option(Some("usb")).unwrap().subsystem_name(),
            Some("usb")
        );
    }
}
