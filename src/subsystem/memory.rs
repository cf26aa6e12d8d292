//! In-memory device subsystem.
//!
//! A thread-safe device table with parent links and attributes, plus event
//! injection for monitors. It is intended for embedded usage, tests, and as a
//! reference implementation of the [`DeviceSubsystem`] contract.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, trace};

use crate::device::{AttributeMap, DeviceNode, SYSPATH};
use crate::error::{ConstructionError, LookupError, SourceError};
use crate::monitor::{Action, DeviceEvent, MonitorFilter};
use crate::subsystem::traits::{DeviceSubsystem, EventSource};

fn lock_err(context: &'static str) -> LookupError {
    LookupError::Backend {
        message: format!("poisoned lock: {context}"),
    }
}

#[derive(Debug, Clone)]
struct DeviceRecord {
    properties: DeviceNode,
    parent: Option<String>,
    attributes: AttributeMap,
}

#[derive(Debug)]
struct Tap {
    filter: MonitorFilter,
    tx: Sender<DeviceEvent>,
    alive: Arc<AtomicBool>,
}

/// Thread-safe in-memory device table.
#[derive(Debug)]
pub struct InMemorySubsystem {
    devices: RwLock<BTreeMap<String, DeviceRecord>>,
    taps: Mutex<Vec<Tap>>,
    queue_capacity: usize,
    monitor_limit: Option<usize>,
    dropped_events: AtomicU64,
}

impl Default for InMemorySubsystem {
    fn default() -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            taps: Mutex::new(Vec::new()),
            queue_capacity: 1024,
            monitor_limit: None,
            dropped_events: AtomicU64::new(0),
        }
    }
}

impl InMemorySubsystem {
    /// An empty device table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-source event buffer size. Events beyond it are dropped.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Refuse to open more than `limit` concurrent monitors.
    #[must_use]
    pub fn with_monitor_limit(mut self, limit: usize) -> Self {
        self.monitor_limit = Some(limit);
        self
    }

    /// Insert or replace a device.
    ///
    /// `properties` must carry a syspath. `parent`, when given, must already
    /// be present.
    pub fn insert_device(
        &self,
        properties: DeviceNode,
        parent: Option<&str>,
        attributes: AttributeMap,
    ) -> Result<(), LookupError> {
        let syspath = properties
            .syspath()
            .ok_or_else(|| LookupError::MissingSyspath {
                context: "insert_device".to_string(),
            })?
            .to_string();

        let mut devices = self.devices.write().map_err(|_| lock_err("devices"))?;
        if let Some(parent) = parent {
            if !devices.contains_key(parent) {
                return Err(LookupError::DeviceNotFound {
                    syspath: parent.to_string(),
                });
            }
        }

        devices.insert(
            syspath,
            DeviceRecord {
                properties,
                parent: parent.map(str::to_string),
                attributes,
            },
        );
        Ok(())
    }

    /// Remove a device and every device below it. Returns the removed syspaths.
    pub fn remove_device(&self, syspath: &str) -> Result<Vec<String>, LookupError> {
        let mut devices = self.devices.write().map_err(|_| lock_err("devices"))?;
        if !devices.contains_key(syspath) {
            return Err(LookupError::DeviceNotFound {
                syspath: syspath.to_string(),
            });
        }

        let mut doomed = BTreeSet::new();
        doomed.insert(syspath.to_string());
        loop {
            let before = doomed.len();
            for (path, record) in devices.iter() {
                if record.parent.as_ref().is_some_and(|p| doomed.contains(p)) {
                    doomed.insert(path.clone());
                }
            }
            if doomed.len() == before {
                break;
            }
        }

        for path in &doomed {
            devices.remove(path);
        }
        Ok(doomed.into_iter().collect())
    }

    /// Number of devices currently in the table.
    pub fn device_count(&self) -> Result<usize, LookupError> {
        Ok(self.devices.read().map_err(|_| lock_err("devices"))?.len())
    }

    /// Deliver an event to every open monitor whose filter matches the device.
    ///
    /// Returns the number of monitors the event was queued for.
    pub fn emit(&self, event: &DeviceEvent) -> usize {
        let mut taps = self.taps.lock().unwrap_or_else(PoisonError::into_inner);
        taps.retain(|t| t.alive.load(Ordering::Acquire));

        let mut delivered = 0;
        for tap in taps.iter() {
            if !tap.filter.matches(&event.device) {
                continue;
            }
            match tap.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    self.dropped_events.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        trace!(
            action = %event.action,
            device = %event.device,
            delivered,
            "emitted device event"
        );
        delivered
    }

    /// Emit `action` for a device in the table, carrying its stored properties.
    pub fn notify(&self, action: Action, syspath: &str) -> Result<usize, LookupError> {
        let device = {
            let devices = self.devices.read().map_err(|_| lock_err("devices"))?;
            devices
                .get(syspath)
                .map(|r| r.properties.clone())
                .ok_or_else(|| LookupError::DeviceNotFound {
                    syspath: syspath.to_string(),
                })?
        };
        Ok(self.emit(&DeviceEvent::new(action, device)))
    }

    /// Terminate every open source, as if the native layer had gone away.
    pub fn close_sources(&self) {
        let mut taps = self.taps.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(sources = taps.len(), "closing in-memory event sources");
        taps.clear();
    }

    /// Number of event sources not yet released by their monitors.
    #[must_use]
    pub fn open_monitors(&self) -> usize {
        let taps = self.taps.lock().unwrap_or_else(PoisonError::into_inner);
        taps.iter().filter(|t| t.alive.load(Ordering::Acquire)).count()
    }

    /// Events lost because a source buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn record(&self, syspath: &str) -> Result<DeviceRecord, LookupError> {
        let devices = self.devices.read().map_err(|_| lock_err("devices"))?;
        devices
            .get(syspath)
            .cloned()
            .ok_or_else(|| LookupError::DeviceNotFound {
                syspath: syspath.to_string(),
            })
    }
}

impl DeviceSubsystem for InMemorySubsystem {
    fn list(&self, subsystem: Option<&str>) -> Result<Vec<DeviceNode>, LookupError> {
        let devices = self.devices.read().map_err(|_| lock_err("devices"))?;
        Ok(devices
            .values()
            .filter(|r| subsystem.map_or(true, |s| r.properties.subsystem() == Some(s)))
            .map(|r| r.properties.clone())
            .collect())
    }

    fn sysattrs(&self, syspath: &str) -> Result<AttributeMap, LookupError> {
        let mut attrs = self.record(syspath)?.attributes;
        attrs.insert(SYSPATH.to_string(), Some(syspath.to_string()));
        Ok(attrs)
    }

    fn parent(&self, syspath: &str) -> Result<Option<DeviceNode>, LookupError> {
        let record = self.record(syspath)?;
        let Some(parent) = record.parent else {
            return Ok(None);
        };
        Ok(Some(self.record(&parent)?.properties))
    }

    fn open_monitor(&self, filter: &MonitorFilter) -> Result<Box<dyn EventSource>, ConstructionError> {
        let mut taps = self.taps.lock().unwrap_or_else(PoisonError::into_inner);
        taps.retain(|t| t.alive.load(Ordering::Acquire));

        if let Some(limit) = self.monitor_limit {
            if taps.len() >= limit {
                return Err(ConstructionError::ResourceExhausted { limit });
            }
        }

        let (tx, rx) = bounded(self.queue_capacity);
        let alive = Arc::new(AtomicBool::new(true));
        taps.push(Tap {
            filter: filter.clone(),
            tx,
            alive: Arc::clone(&alive),
        });

        debug!(subsystem = ?filter.subsystem_name(), "opened in-memory event source");
        Ok(Box::new(MemoryEventSource { rx, alive }))
    }
}

/// Event source handed out by [`InMemorySubsystem::open_monitor`].
#[derive(Debug)]
pub struct MemoryEventSource {
    rx: Receiver<DeviceEvent>,
    alive: Arc<AtomicBool>,
}

impl EventSource for MemoryEventSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<DeviceEvent>, SourceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Closed),
        }
    }
}

impl Drop for MemoryEventSource {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}
