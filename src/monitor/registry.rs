use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::device::DeviceNode;

use super::events::{Channel, HandlerId};

pub(crate) type Handler = Arc<dyn Fn(&DeviceNode) + Send + Sync>;

/// Per-channel handlers in registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    by_channel: HashMap<Channel, Vec<(HandlerId, Handler)>>,
}

impl HandlerRegistry {
    pub(crate) fn insert(&mut self, channel: Channel, handler: Handler) -> HandlerId {
        let id = HandlerId::new();
        self.by_channel.entry(channel).or_default().push((id, handler));
        id
    }

    /// Remove a handler, handing it back so the caller can drop it unlocked.
    pub(crate) fn remove(&mut self, id: HandlerId) -> Option<Handler> {
        for handlers in self.by_channel.values_mut() {
            if let Some(pos) = handlers.iter().position(|(h, _)| *h == id) {
                return Some(handlers.remove(pos).1);
            }
        }
        None
    }

    /// Snapshot of the handlers for `channel`.
    pub(crate) fn handlers(&self, channel: Channel) -> Vec<Handler> {
        self.by_channel
            .get(&channel)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, channel: Channel) -> usize {
        self.by_channel.get(&channel).map_or(0, Vec::len)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for channel in Channel::ALL {
            map.entry(&channel, &self.count(channel));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn handlers_keep_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut reg = HandlerRegistry::default();
        for n in 0..3 {
            let seen = Arc::clone(&seen);
            reg.insert(Channel::Add, Arc::new(move |_: &DeviceNode| seen.lock().unwrap().push(n)));
        }

        let node = DeviceNode::new("/sys/x");
        for h in reg.handlers(Channel::Add) {
            h(&node);
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert!(reg.handlers(Channel::Remove).is_empty());
    }

    #[test]
    fn remove_by_id() {
        let mut reg = HandlerRegistry::default();
        let a = reg.insert(Channel::Change, Arc::new(|_: &DeviceNode| {}));
        let b = reg.insert(Channel::Change, Arc::new(|_: &DeviceNode| {}));

        assert!(reg.remove(a).is_some());
        assert!(reg.remove(a).is_none());
        assert_eq!(reg.count(Channel::Change), 1);
        assert!(reg.remove(b).is_some());
        assert_eq!(reg.count(Channel::Change), 0);
    }
}
