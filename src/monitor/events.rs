//! Event, channel and identifier types for the monitor.
//!
//! These types are serializable so events can be logged or forwarded as JSON.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceNode;

/// Unique identifier for a registered handler.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(Uuid);

impl HandlerId {
    /// Create a new random handler id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a monitor instance.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(Uuid);

impl MonitorId {
    /// Create a new random monitor id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MonitorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Subscriber channels a monitor dispatches to.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Add,
    Remove,
    Change,
}

impl Channel {
    /// All dispatchable channels.
    pub const ALL: [Self; 3] = [Self::Add, Self::Remove, Self::Change];

    /// Lowercase channel name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Change => "change",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name that is not one of `add`, `remove`, `change`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChannel(pub String);

impl fmt::Display for UnknownChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown monitor channel '{}'", self.0)
    }
}

impl std::error::Error for UnknownChannel {}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            "change" => Ok(Self::Change),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// Action reported by the kernel for a uevent.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Add,
    Remove,
    Change,
    Bind,
    Unbind,
    Move,
    Online,
    Offline,
    Other(String),
}

impl Action {
    /// Parse a kernel action string. Never fails; unknown actions are kept verbatim.
    #[must_use]
    pub fn parse(action: &str) -> Self {
        match action {
            "add" => Self::Add,
            "remove" => Self::Remove,
            "change" => Self::Change,
            "bind" => Self::Bind,
            "unbind" => Self::Unbind,
            "move" => Self::Move,
            "online" => Self::Online,
            "offline" => Self::Offline,
            other => Self::Other(other.to_string()),
        }
    }

    /// The channel this action is dispatched on, if any.
    #[must_use]
    pub const fn channel(&self) -> Option<Channel> {
        match self {
            Self::Add => Some(Channel::Add),
            Self::Remove => Some(Channel::Remove),
            Self::Change => Some(Channel::Change),
            _ => None,
        }
    }

    /// The kernel action string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Change => "change",
            Self::Bind => "bind",
            Self::Unbind => "unbind",
            Self::Move => "move",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Other(s) => s,
        }
    }
}

impl From<Channel> for Action {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Add => Self::Add,
            Channel::Remove => Self::Remove,
            Channel::Change => Self::Change,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device change reported by an event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    /// What happened to the device.
    pub action: Action,
    /// The affected device: syspath plus native properties.
    pub device: DeviceNode,
    /// When the event was read from the source.
    pub received_at: DateTime<Utc>,
}

impl DeviceEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(action: Action, device: DeviceNode) -> Self {
        Self {
            action,
            device,
            received_at: Utc::now(),
        }
    }

    /// The channel this event is dispatched on, if any.
    #[must_use]
    pub const fn channel(&self) -> Option<Channel> {
        self.action.channel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parses_known_names_only() {
        assert_eq!("add".parse::<Channel>(), Ok(Channel::Add));
        assert_eq!("remove".parse::<Channel>(), Ok(Channel::Remove));
        assert_eq!("change".parse::<Channel>(), Ok(Channel::Change));
        assert_eq!(
            "bind".parse::<Channel>(),
            Err(UnknownChannel("bind".to_string()))
        );
    }

    #[test]
    fn only_add_remove_change_map_to_channels() {
        assert_eq!(Action::parse("add").channel(), Some(Channel::Add));
        assert_eq!(Action::parse("remove").channel(), Some(Channel::Remove));
        assert_eq!(Action::parse("change").channel(), Some(Channel::Change));
        assert_eq!(Action::parse("bind").channel(), None);
        assert_eq!(Action::parse("offline").channel(), None);
        assert_eq!(
            Action::parse("frobnicate"),
            Action::Other("frobnicate".to_string())
        );
    }

    #[test]
    fn action_round_trips_through_display() {
        for name in ["add", "remove", "change", "bind", "unbind", "move", "online", "offline", "x"] {
            assert_eq!(Action::parse(name).to_string(), name);
        }
    }

    #[test]
    fn event_serializes_with_device_fields() {
        let ev = DeviceEvent::new(
            Action::Add,
            DeviceNode::new("/sys/devices/x").with_field("SUBSYSTEM", "input"),
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["action"], "add");
        assert_eq!(json["device"]["SUBSYSTEM"], "input");
        assert!(json.get("received_at").is_some());
    }
}
