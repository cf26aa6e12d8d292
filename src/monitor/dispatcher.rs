//! Monitor lifecycle and event dispatch.
//!
//! Each [`Monitor`] owns one native [`EventSource`] and a dedicated worker
//! thread that reads it and invokes handlers. Dispatch of one event happens
//! under a per-monitor lock, so handlers never run concurrently with each
//! other and `close()` can wait for an in-flight dispatch to finish.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, TrySendError};
use tracing::{debug, error, info, trace, warn};

use crate::device::DeviceNode;
use crate::error::{ConstructionError, SourceError};
use crate::subsystem::{DeviceSubsystem, EventSource};

use super::events::{Channel, DeviceEvent, HandlerId, MonitorId};
use super::filter::MonitorFilter;
use super::registry::{Handler, HandlerRegistry};
use super::stream::EventStream;

/// Worker and stream settings for a monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Longest wait on the native source before re-checking for close.
    pub poll_interval: Duration,
    /// Per-stream buffer capacity.
    pub stream_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stream_capacity: 1024,
        }
    }
}

/// Lifecycle state of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Delivering events.
    Open,
    /// Terminal; entered once via `close`.
    Closed,
}

thread_local! {
    static MONITOR_WORKER: Cell<bool> = const { Cell::new(false) };
}

fn on_any_monitor_worker() -> bool {
    MONITOR_WORKER.with(Cell::get)
}

#[derive(Debug)]
struct Shared {
    id: MonitorId,
    filter: MonitorFilter,
    stream_capacity: usize,
    closed: AtomicBool,
    registry: Mutex<HandlerRegistry>,
    dispatch: Mutex<()>,
    delivered: AtomicU64,
    dropped_events: Arc<AtomicU64>,
    read_errors: AtomicU64,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn dispatch(&self, event: &DeviceEvent) {
        let Some(channel) = event.channel() else {
            trace!(monitor = %self.id, action = %event.action, "skipping undispatched action");
            return;
        };

        let _guard = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return;
        }

        let handlers = self.registry().handlers(channel);
        for handler in handlers {
            if self.is_closed() {
                break;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event.device))) {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    error!(monitor = %self.id, %channel, device = %event.device, "monitor handler panicked");
                }
            }
        }
    }

    fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);

        // Handlers run under their own monitor's dispatch lock. Waiting from
        // any worker could deadlock two monitors closing each other.
        if !on_any_monitor_worker() {
            drop(self.dispatch.lock().unwrap_or_else(PoisonError::into_inner));
        }

        if first {
            // Handlers (and stream senders) are dropped outside the registry lock.
            let removed = std::mem::take(&mut *self.registry());
            drop(removed);
            info!(monitor = %self.id, subsystem = ?self.filter.subsystem_name(), "monitor closed");
        }
        first
    }
}

fn worker_loop(shared: Arc<Shared>, mut source: Box<dyn EventSource>, poll_interval: Duration) {
    MONITOR_WORKER.with(|w| w.set(true));
    debug!(monitor = %shared.id, "monitor worker started");

    while !shared.is_closed() {
        match source.next_event(poll_interval) {
            Ok(None) => {}
            Ok(Some(event)) => shared.dispatch(&event),
            Err(SourceError::Closed) => {
                warn!(monitor = %shared.id, "native event source terminated");
                break;
            }
            Err(err) => {
                shared.read_errors.fetch_add(1, Ordering::Relaxed);
                warn!(monitor = %shared.id, error = %err, "failed to read device event");
                thread::sleep(poll_interval);
            }
        }
    }

    drop(source);
    debug!(monitor = %shared.id, "native event source released");
}

/// Cloneable handle to a monitor, usable from inside handlers.
///
/// A handle can subscribe and close but does not keep the worker alive.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    /// Unique id of the monitor.
    #[must_use]
    pub fn id(&self) -> MonitorId {
        self.shared.id
    }

    /// The subsystem filter the monitor was opened with.
    #[must_use]
    pub fn filter(&self) -> &MonitorFilter {
        &self.shared.filter
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        if self.shared.is_closed() {
            MonitorState::Closed
        } else {
            MonitorState::Open
        }
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Register `handler` on `channel`. Handlers of one channel run in
    /// registration order. Registering on a closed monitor is inert.
    pub fn on<F>(&self, channel: Channel, handler: F) -> HandlerId
    where
        F: Fn(&DeviceNode) + Send + Sync + 'static,
    {
        self.register(channel, Arc::new(handler))
    }

    /// Register by channel name. Unknown names register nothing.
    pub fn on_named<F>(&self, channel: &str, handler: F) -> Option<HandlerId>
    where
        F: Fn(&DeviceNode) + Send + Sync + 'static,
    {
        match channel.parse::<Channel>() {
            Ok(channel) => Some(self.on(channel, handler)),
            Err(err) => {
                debug!(monitor = %self.shared.id, %err, "ignoring subscription");
                None
            }
        }
    }

    /// Unregister a handler. Returns whether it was registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let removed = self.shared.registry().remove(id);
        removed.is_some()
    }

    /// Pull-style subscription to one channel.
    ///
    /// Events that do not fit in the stream buffer are dropped and counted.
    /// The stream disconnects when the monitor closes.
    #[must_use]
    pub fn stream(&self, channel: Channel) -> EventStream {
        let (tx, rx) = bounded::<DeviceNode>(self.shared.stream_capacity.max(1));
        let dropped = Arc::clone(&self.shared.dropped_events);
        let id = self.on(channel, move |device| match tx.try_send(device.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        });
        EventStream::new(id, channel, rx, self.clone())
    }

    /// Close the monitor. Idempotent.
    ///
    /// Outside a handler this waits for any in-flight dispatch, so no handler
    /// runs once it returns. From inside a handler (of this or any other
    /// monitor) it only marks the monitor closed without waiting; later
    /// handlers and events are skipped, but a handler of the closed monitor
    /// may still be finishing when this returns.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Handler invocations that completed.
    #[must_use]
    pub fn delivered_events(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Events lost because a stream buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }

    /// Transient read failures reported by the native source.
    #[must_use]
    pub fn read_errors(&self) -> u64 {
        self.shared.read_errors.load(Ordering::Relaxed)
    }

    fn register(&self, channel: Channel, handler: Handler) -> HandlerId {
        if self.shared.is_closed() {
            debug!(monitor = %self.shared.id, %channel, "subscription on closed monitor is inert");
            return HandlerId::new();
        }
        self.shared.registry().insert(channel, handler)
    }
}

/// Observable wrapper around one native device event source.
///
/// Events are delivered from a background worker as soon as the monitor is
/// opened. Dropping the monitor closes it.
#[derive(Debug)]
pub struct Monitor {
    handle: MonitorHandle,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Open a native source scoped to `filter` and start delivering.
    ///
    /// # Errors
    /// Returns the backend's `ConstructionError`, or `Spawn` if the worker
    /// thread could not be started. No events are delivered on failure.
    pub fn open(
        subsystem: &dyn DeviceSubsystem,
        filter: MonitorFilter,
        config: MonitorConfig,
    ) -> Result<Self, ConstructionError> {
        let source = subsystem.open_monitor(&filter)?;

        let shared = Arc::new(Shared {
            id: MonitorId::new(),
            filter,
            stream_capacity: config.stream_capacity,
            closed: AtomicBool::new(false),
            registry: Mutex::new(HandlerRegistry::default()),
            dispatch: Mutex::new(()),
            delivered: AtomicU64::new(0),
            dropped_events: Arc::new(AtomicU64::new(0)),
            read_errors: AtomicU64::new(0),
        });

        let thread_shared = Arc::clone(&shared);
        let poll_interval = config.poll_interval;
        let join = thread::Builder::new()
            .name("udevkit-monitor".to_string())
            .spawn(move || worker_loop(thread_shared, source, poll_interval))
            .map_err(|e| ConstructionError::Spawn {
                message: e.to_string(),
            })?;

        info!(monitor = %shared.id, subsystem = ?shared.filter.subsystem_name(), "monitor opened");

        Ok(Self {
            handle: MonitorHandle { shared },
            join: Mutex::new(Some(join)),
        })
    }

    /// A cloneable handle for use inside handlers.
    #[must_use]
    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// See [`MonitorHandle::id`].
    #[must_use]
    pub fn id(&self) -> MonitorId {
        self.handle.id()
    }

    /// See [`MonitorHandle::filter`].
    #[must_use]
    pub fn filter(&self) -> &MonitorFilter {
        self.handle.filter()
    }

    /// See [`MonitorHandle::state`].
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.handle.state()
    }

    /// See [`MonitorHandle::is_closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// See [`MonitorHandle::on`].
    pub fn on<F>(&self, channel: Channel, handler: F) -> HandlerId
    where
        F: Fn(&DeviceNode) + Send + Sync + 'static,
    {
        self.handle.on(channel, handler)
    }

    /// See [`MonitorHandle::on_named`].
    pub fn on_named<F>(&self, channel: &str, handler: F) -> Option<HandlerId>
    where
        F: Fn(&DeviceNode) + Send + Sync + 'static,
    {
        self.handle.on_named(channel, handler)
    }

    /// See [`MonitorHandle::off`].
    pub fn off(&self, id: HandlerId) -> bool {
        self.handle.off(id)
    }

    /// See [`MonitorHandle::stream`].
    #[must_use]
    pub fn stream(&self, channel: Channel) -> EventStream {
        self.handle.stream(channel)
    }

    /// See [`MonitorHandle::delivered_events`].
    #[must_use]
    pub fn delivered_events(&self) -> u64 {
        self.handle.delivered_events()
    }

    /// See [`MonitorHandle::dropped_events`].
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.handle.dropped_events()
    }

    /// See [`MonitorHandle::read_errors`].
    #[must_use]
    pub fn read_errors(&self) -> u64 {
        self.handle.read_errors()
    }

    /// Close the monitor and release the native source. Idempotent.
    ///
    /// Outside a handler this also waits for the worker to exit, so the
    /// native handle is released when it returns. From a handler the worker
    /// releases the source on its own.
    pub fn close(&self) {
        self.handle.close();

        if on_any_monitor_worker() {
            return;
        }
        let join = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join) = join {
            if join.join().is_err() {
                error!(monitor = %self.handle.id(), "monitor worker panicked");
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::Instant;

    use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

    use crate::device::AttributeMap;
    use crate::error::LookupError;
    use crate::monitor::Action;
    use crate::subsystem::InMemorySubsystem;

    type Scripted = Result<DeviceEvent, SourceError>;

    /// Hands out one source that replays whatever the test sends it.
    struct ScriptedSubsystem {
        rx: Mutex<Option<Receiver<Scripted>>>,
    }

    impl ScriptedSubsystem {
        fn new() -> (Self, Sender<Scripted>) {
            let (tx, rx) = bounded(16);
            (Self { rx: Mutex::new(Some(rx)) }, tx)
        }
    }

    struct ScriptedSource {
        rx: Receiver<Scripted>,
    }

    impl EventSource for ScriptedSource {
        fn next_event(&mut self, timeout: Duration) -> Result<Option<DeviceEvent>, SourceError> {
            match self.rx.recv_timeout(timeout) {
                Ok(Ok(event)) => Ok(Some(event)),
                Ok(Err(err)) => Err(err),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(SourceError::Closed),
            }
        }
    }

    impl DeviceSubsystem for ScriptedSubsystem {
        fn list(&self, _subsystem: Option<&str>) -> Result<Vec<DeviceNode>, LookupError> {
            Ok(Vec::new())
        }

        fn sysattrs(&self, syspath: &str) -> Result<AttributeMap, LookupError> {
            Err(LookupError::DeviceNotFound {
                syspath: syspath.to_string(),
            })
        }

        fn parent(&self, _syspath: &str) -> Result<Option<DeviceNode>, LookupError> {
            Ok(None)
        }

        fn open_monitor(&self, _filter: &MonitorFilter) -> Result<Box<dyn EventSource>, ConstructionError> {
            let rx = self.rx.lock().unwrap().take().ok_or_else(|| ConstructionError::Native {
                message: "source already taken".to_string(),
            })?;
            Ok(Box::new(ScriptedSource { rx }))
        }
    }

    fn fast() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(10),
            ..MonitorConfig::default()
        }
    }

    fn input_device(n: usize) -> DeviceNode {
        DeviceNode::new(format!("/devices/input{n}")).with_field("SUBSYSTEM", "input")
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn dispatches_to_matching_channel_in_order() {
        let sys = InMemorySubsystem::new();
        let monitor = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            monitor.on(Channel::Add, move |d| {
                seen.lock().unwrap().push(format!("{tag}:{}", d.syspath().unwrap_or("")));
            });
        }

        sys.emit(&DeviceEvent::new(Action::Add, input_device(0)));
        assert!(wait_until(|| seen.lock().unwrap().len() == 2));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:/devices/input0", "second:/devices/input0"]
        );
        assert_eq!(monitor.delivered_events(), 2);
    }

    #[test]
    fn unknown_channel_name_is_inert() {
        let sys = InMemorySubsystem::new();
        let monitor = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        assert!(monitor.on_named("bind", |_| panic!("never delivered")).is_none());
        assert!(monitor.on_named("add", |_| {}).is_some());
    }

    #[test]
    fn close_is_idempotent_and_releases_source() {
        let sys = InMemorySubsystem::new();
        let monitor = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        assert_eq!(sys.open_monitors(), 1);
        assert_eq!(monitor.state(), MonitorState::Open);

        monitor.close();
        assert_eq!(monitor.state(), MonitorState::Closed);
        assert_eq!(sys.open_monitors(), 0);

        monitor.close();
        assert!(monitor.is_closed());
    }

    #[test]
    fn close_from_own_handler_stops_delivery() {
        let sys = InMemorySubsystem::new();
        let monitor = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        let handle = monitor.handle();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        monitor.on(Channel::Add, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            handle.close();
        });
        let c = Arc::clone(&calls);
        monitor.on(Channel::Add, move |_| {
            c.fetch_add(100, Ordering::SeqCst);
        });

        sys.emit(&DeviceEvent::new(Action::Add, input_device(0)));
        sys.emit(&DeviceEvent::new(Action::Add, input_device(1)));

        assert!(wait_until(|| sys.open_monitors() == 0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(monitor.is_closed());
    }

    #[test]
    fn panicking_handler_does_not_stop_dispatch() {
        let sys = InMemorySubsystem::new();
        let monitor = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        monitor.on(Channel::Change, |_| panic!("handler failure"));
        let c = Arc::clone(&calls);
        monitor.on(Channel::Change, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        sys.emit(&DeviceEvent::new(Action::Change, input_device(0)));
        sys.emit(&DeviceEvent::new(Action::Change, input_device(1)));
        assert!(wait_until(|| calls.load(Ordering::SeqCst) == 2));
    }

    #[test]
    fn off_unregisters() {
        let sys = InMemorySubsystem::new();
        let monitor = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let id = monitor.on(Channel::Remove, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(monitor.off(id));
        assert!(!monitor.off(id));

        let stream = monitor.stream(Channel::Remove);
        sys.emit(&DeviceEvent::new(Action::Remove, input_device(0)));
        stream.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn open_failure_yields_no_monitor() {
        let sys = InMemorySubsystem::new().with_monitor_limit(1);
        let _first = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        let err = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap_err();
        assert_eq!(err, ConstructionError::ResourceExhausted { limit: 1 });
    }

    #[test]
    fn terminated_source_ends_worker() {
        let sys = InMemorySubsystem::new();
        let monitor = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        sys.close_sources();
        // The worker exits on its own; close still succeeds afterwards.
        monitor.close();
        assert!(monitor.is_closed());
    }

    #[test]
    fn read_error_is_counted_and_delivery_continues() {
        let (sys, tx) = ScriptedSubsystem::new();
        let monitor = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        let added = monitor.stream(Channel::Add);

        tx.send(Err(SourceError::Io {
            message: "ENOBUFS".to_string(),
        }))
        .unwrap();
        tx.send(Ok(DeviceEvent::new(Action::Add, input_device(0)))).unwrap();

        let got = added.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(got.syspath(), Some("/devices/input0"));
        assert_eq!(monitor.read_errors(), 1);
        assert!(!monitor.is_closed());
    }

    #[test]
    fn handlers_closing_each_others_monitors_do_not_deadlock() {
        let sys = InMemorySubsystem::new();
        let a = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        let b = Monitor::open(&sys, MonitorFilter::all(), fast()).unwrap();
        // Both handlers are mid-dispatch before either closes the other.
        let barrier = Arc::new(Barrier::new(2));

        for (monitor, other) in [(&a, b.handle()), (&b, a.handle())] {
            let barrier = Arc::clone(&barrier);
            monitor.on(Channel::Add, move |_| {
                barrier.wait();
                other.close();
            });
        }

        sys.emit(&DeviceEvent::new(Action::Add, input_device(0)));
        assert!(wait_until(|| sys.open_monitors() == 0));
        assert!(a.is_closed());
        assert!(b.is_closed());
    }
}
