//! libudev-backed device subsystem.
//!
//! Every lookup opens its own udev context, mirroring how the kernel
//! interface is meant to be used: no device state is cached between calls.
//! Monitors receive uevents from the `udev` netlink group and are polled with
//! a timeout so the owning worker can notice `close()`.

use std::ffi::OsStr;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, trace};

use crate::device::{AttributeMap, DeviceNode, SYSPATH};
use crate::error::{ConstructionError, LookupError, SourceError};
use crate::monitor::{Action, DeviceEvent, MonitorFilter};
use crate::subsystem::traits::{DeviceSubsystem, EventSource};

fn os_to_string(value: &OsStr) -> String {
    value.to_string_lossy().into_owned()
}

fn backend_err(context: &str, err: &IoError) -> LookupError {
    LookupError::Backend {
        message: format!("{context}: {err}"),
    }
}

/// Properties of `device` plus its syspath.
fn node_from_device(device: &udev::Device) -> DeviceNode {
    let mut node = DeviceNode::from_fields(
        device
            .properties()
            .map(|entry| (os_to_string(entry.name()), Some(os_to_string(entry.value())))),
    );
    node.insert(SYSPATH, Some(os_to_string(device.syspath().as_os_str())));
    node
}

fn open_device(syspath: &str) -> Result<udev::Device, LookupError> {
    udev::Device::from_syspath(Path::new(syspath)).map_err(|err| {
        trace!(syspath, error = %err, "udev device lookup failed");
        LookupError::DeviceNotFound {
            syspath: syspath.to_string(),
        }
    })
}

/// The host's udev device table.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdevSubsystem;

impl UdevSubsystem {
    /// Bind the host's udev.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DeviceSubsystem for UdevSubsystem {
    fn list(&self, subsystem: Option<&str>) -> Result<Vec<DeviceNode>, LookupError> {
        let mut enumerator =
            udev::Enumerator::new().map_err(|e| backend_err("creating enumerator", &e))?;
        if let Some(subsystem) = subsystem {
            enumerator
                .match_subsystem(subsystem)
                .map_err(|e| backend_err("adding subsystem match", &e))?;
        }

        let devices = enumerator
            .scan_devices()
            .map_err(|e| backend_err("scanning devices", &e))?;
        Ok(devices.map(|device| node_from_device(&device)).collect())
    }

    fn sysattrs(&self, syspath: &str) -> Result<AttributeMap, LookupError> {
        let device = open_device(syspath)?;

        let mut attrs = AttributeMap::new();
        for entry in device.attributes() {
            let name = entry.name();
            let value = device.attribute_value(name).map(os_to_string);
            attrs.insert(os_to_string(name), value);
        }
        attrs.insert(SYSPATH.to_string(), Some(syspath.to_string()));
        Ok(attrs)
    }

    fn parent(&self, syspath: &str) -> Result<Option<DeviceNode>, LookupError> {
        let device = open_device(syspath)?;
        let Some(parent) = device.parent() else {
            return Ok(None);
        };

        let node = node_from_device(&parent);
        if node.syspath().map_or(true, str::is_empty) {
            return Err(LookupError::MissingSyspath {
                context: format!("parent of {syspath}"),
            });
        }
        Ok(Some(node))
    }

    fn open_monitor(&self, filter: &MonitorFilter) -> Result<Box<dyn EventSource>, ConstructionError> {
        let native = |err: IoError| ConstructionError::Native {
            message: err.to_string(),
        };

        let mut builder = udev::MonitorBuilder::new().map_err(native)?;
        if let Some(subsystem) = filter.subsystem_name() {
            builder = builder
                .match_subsystem(subsystem)
                .map_err(|_| ConstructionError::InvalidFilter {
                    subsystem: subsystem.to_string(),
                    reason: "adding subsystem filter failed".to_string(),
                })?;
        }
        let socket = builder.listen().map_err(native)?;

        debug!(subsystem = ?filter.subsystem_name(), fd = socket.as_raw_fd(), "opened udev monitor socket");
        Ok(Box::new(UdevEventSource { socket }))
    }
}

/// Netlink monitor socket; dropping it releases the native handle.
pub struct UdevEventSource {
    socket: udev::MonitorSocket,
}

impl UdevEventSource {
    fn receive(&self) -> Option<DeviceEvent> {
        let event = self.socket.iter().next()?;
        let device = event.device();
        let action = device
            .action()
            .map_or(Action::Change, |a| Action::parse(&a.to_string_lossy()));
        Some(DeviceEvent::new(action, node_from_device(&device)))
    }
}

impl EventSource for UdevEventSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<DeviceEvent>, SourceError> {
        if let Some(event) = self.receive() {
            return Ok(Some(event));
        }

        match wait_readable(self.socket.as_raw_fd(), timeout) {
            Ok(true) => Ok(self.receive()),
            Ok(false) => Ok(None),
            Err(err) if err.kind() == ErrorKind::BrokenPipe => Err(SourceError::Closed),
            Err(err) => Err(SourceError::Io {
                message: err.to_string(),
            }),
        }
    }
}

/// Wait until `fd` is readable or `timeout` passes.
fn wait_readable(fd: RawFd, timeout: Duration) -> IoResult<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    let result = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if result < 0 {
        let errno = IoError::last_os_error();
        if errno.kind() == ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(errno);
    }
    if pfd.revents & (libc::POLLHUP | libc::POLLNVAL) != 0 {
        return Err(IoError::new(ErrorKind::BrokenPipe, "udev monitor socket hung up"));
    }
    if pfd.revents & libc::POLLERR != 0 {
        return Err(IoError::new(ErrorKind::Other, "udev monitor socket error"));
    }
    Ok(result > 0 && pfd.revents & libc::POLLIN != 0)
}
