//! Change notifications published by the engine.

use log::debug;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::subscription::SubscriptionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Rules of a subscription changed (reload, edit, enable/disable)
    SubscriptionChanged(SubscriptionId),
    /// A refresh completed and the new list is live
    SubscriptionUpdated(SubscriptionId),
    /// A refresh failed; the previous rules stay active
    SubscriptionError { id: SubscriptionId, message: String },
    SubscriptionAdded(SubscriptionId),
    SubscriptionRemoved(SubscriptionId),
    /// Element hiding output may differ; renderers should rebuild their
    /// user stylesheet
    StyleSheetChanged,
    /// The disabled-rule registry changed and should be persisted
    DisabledRulesChanged,
}

/// Fan-out of events to every live receiver.
#[derive(Debug, Default)]
pub struct EventBus {
    senders: Vec<UnboundedSender<EngineEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = unbounded_channel();
        self.senders.push(tx);
        rx
    }

    /// Deliver `event`; receivers that were dropped are forgotten.
    pub fn emit(&mut self, event: EngineEvent) {
        debug!("event {:?}", event);
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn receiver_count(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_every_receiver() {
        let mut bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(EngineEvent::StyleSheetChanged);

        assert_eq!(a.try_recv().unwrap(), EngineEvent::StyleSheetChanged);
        assert_eq!(b.try_recv().unwrap(), EngineEvent::StyleSheetChanged);
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);

        bus.emit(EngineEvent::DisabledRulesChanged);
        assert_eq!(bus.receiver_count(), 0);
    }
}
