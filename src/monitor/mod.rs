//! Device change monitoring.
//!
//! A [`Monitor`] wraps one native event source. Handlers subscribe to the
//! `add`, `remove` and `change` channels; a worker thread reads the source and
//! dispatches each event, serialized per monitor, until the monitor is closed.

/// Monitor lifecycle and the dispatch worker.
pub mod dispatcher;
/// Event, channel and identifier types.
pub mod events;
/// Subsystem filter.
pub mod filter;
mod registry;
/// Pull-style subscriber stream.
pub mod stream;

pub use dispatcher::{Monitor, MonitorConfig, MonitorHandle, MonitorState};
pub use events::{Action, Channel, DeviceEvent, HandlerId, MonitorId, UnknownChannel};
pub use filter::MonitorFilter;
pub use stream::EventStream;
