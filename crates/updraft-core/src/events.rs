//! Typed event channel exposed to the UI collaborator.
//!
//! Each subscriber picks the [`EventKind`]s it cares about and receives
//! matching [`SessionEvent`]s on its own unbounded channel.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CurrentSentenceChanged,
    TranslateSentenceChange,
    TranslateSentencesStart,
    TranslateSentencesEnd,
    TranslateSentencesFailed,
    DubSentencesStart,
    DubSentencesEnd,
    TokenUsageChange,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::CurrentSentenceChanged,
        EventKind::TranslateSentenceChange,
        EventKind::TranslateSentencesStart,
        EventKind::TranslateSentencesEnd,
        EventKind::TranslateSentencesFailed,
        EventKind::DubSentencesStart,
        EventKind::DubSentencesEnd,
        EventKind::TokenUsageChange,
    ];
}

/// Payloads are sentence indices into the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    CurrentSentenceChanged(usize),
    TranslateSentenceChange(usize),
    TranslateSentencesStart(Vec<usize>),
    TranslateSentencesEnd(Vec<usize>),
    TranslateSentencesFailed { indices: Vec<usize>, reason: String },
    DubSentencesStart(Vec<usize>),
    DubSentencesEnd(Vec<usize>),
    TokenUsageChange,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CurrentSentenceChanged(_) => EventKind::CurrentSentenceChanged,
            Self::TranslateSentenceChange(_) => EventKind::TranslateSentenceChange,
            Self::TranslateSentencesStart(_) => EventKind::TranslateSentencesStart,
            Self::TranslateSentencesEnd(_) => EventKind::TranslateSentencesEnd,
            Self::TranslateSentencesFailed { .. } => EventKind::TranslateSentencesFailed,
            Self::DubSentencesStart(_) => EventKind::DubSentencesStart,
            Self::DubSentencesEnd(_) => EventKind::DubSentencesEnd,
            Self::TokenUsageChange => EventKind::TokenUsageChange,
        }
    }
}

struct Subscriber {
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Subscriber {
            kinds: kinds.to_vec(),
            tx,
        });
        rx
    }

    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.subscribe(&EventKind::ALL)
    }

    pub fn emit(&self, event: SessionEvent) {
        let kind = event.kind();
        let mut subscribers = self.lock();
        subscribers.retain(|sub| !sub.tx.is_closed());
        for sub in subscribers.iter().filter(|sub| sub.kinds.contains(&kind)) {
            let _ = sub.tx.send(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_only_selected_kinds() {
        let bus = EventBus::new();
        let mut changes = bus.subscribe(&[EventKind::CurrentSentenceChanged]);
        let mut everything = bus.subscribe_all();

        bus.emit(SessionEvent::DubSentencesStart(vec![1, 2]));
        bus.emit(SessionEvent::CurrentSentenceChanged(4));

        assert_eq!(changes.try_recv().ok(), Some(SessionEvent::CurrentSentenceChanged(4)));
        assert!(changes.try_recv().is_err());
        assert_eq!(
            everything.try_recv().ok(),
            Some(SessionEvent::DubSentencesStart(vec![1, 2]))
        );
        assert_eq!(
            everything.try_recv().ok(),
            Some(SessionEvent::CurrentSentenceChanged(4))
        );
    }

    #[test]
    fn dropped_receivers_are_pruned_and_clear_detaches_everyone() {
        let bus = EventBus::new();
        let dropped = bus.subscribe_all();
        let mut kept = bus.subscribe_all();
        drop(dropped);

        bus.emit(SessionEvent::TokenUsageChange);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().ok(), Some(SessionEvent::TokenUsageChange));

        bus.clear();
        bus.emit(SessionEvent::TokenUsageChange);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(kept.try_recv().is_err());
    }
}
