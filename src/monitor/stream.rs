use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::device::DeviceNode;
use crate::error::StreamError;

use super::dispatcher::MonitorHandle;
use super::events::{Channel, HandlerId};

/// A pull-style subscription to one monitor channel.
///
/// Dropping this stream unregisters it.
#[derive(Debug)]
pub struct EventStream {
    handler_id: HandlerId,
    channel: Channel,
    rx: Receiver<DeviceNode>,
    monitor: MonitorHandle,
    unregistered: AtomicBool,
}

impl EventStream {
    pub(crate) fn new(
        handler_id: HandlerId,
        channel: Channel,
        rx: Receiver<DeviceNode>,
        monitor: MonitorHandle,
    ) -> Self {
        Self {
            handler_id,
            channel,
            rx,
            monitor,
            unregistered: AtomicBool::new(false),
        }
    }

    /// The handler id backing this stream.
    #[must_use]
    pub const fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    /// The channel this stream listens on.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Explicit unregistration. Idempotent; buffered events can still be read.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        self.monitor.off(self.handler_id);
    }

    /// Receive the next device (blocking).
    pub fn recv(&self) -> Result<DeviceNode, StreamError> {
        self.rx.recv().map_err(|_| StreamError::Disconnected)
    }

    /// Receive the next device with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<DeviceNode, StreamError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StreamError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => StreamError::Disconnected,
        })
    }

    /// Receive a buffered device without blocking.
    pub fn try_recv(&self) -> Result<Option<DeviceNode>, StreamError> {
        match self.rx.try_recv() {
            Ok(device) => Ok(Some(device)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(StreamError::Disconnected),
        }
    }

    /// Blocking iterator that ends when the monitor closes.
    pub fn iter(&self) -> impl Iterator<Item = DeviceNode> + '_ {
        self.rx.iter()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
