//! Player settings with explicit publish-on-write notification.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub pre_translate_count: usize,
    pub pre_dub_count: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            pre_translate_count: 5,
            pre_dub_count: 3,
        }
    }
}

/// Partial update; `None` fields keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerSettingsPatch {
    pub pre_translate_count: Option<usize>,
    pub pre_dub_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&PlayerSettings) + Send + Sync>;

struct Inner {
    settings: PlayerSettings,
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(PlayerSettings::default())
    }
}

impl SettingsStore {
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                settings,
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn get(&self) -> PlayerSettings {
        self.lock().settings
    }

    /// Apply `patch` and notify every subscriber before returning.
    ///
    /// Listeners run outside the store lock, so they may read the store.
    pub fn update(&self, patch: PlayerSettingsPatch) -> PlayerSettings {
        let (settings, listeners) = {
            let mut inner = self.lock();
            if let Some(count) = patch.pre_translate_count {
                inner.settings.pre_translate_count = count;
            }
            if let Some(count) = patch.pre_dub_count {
                inner.settings.pre_dub_count = count;
            }
            let listeners: Vec<Listener> =
                inner.listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect();
            (inner.settings, listeners)
        };
        debug!(?settings, listeners = listeners.len(), "Player settings updated");
        for listener in listeners {
            listener(&settings);
        }
        settings
    }

    pub fn subscribe(&self, listener: impl Fn(&PlayerSettings) + Send + Sync + 'static) -> SubscriptionId {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(existing, _)| *existing != id);
        inner.listeners.len() != before
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn update_merges_patch_and_notifies_synchronously() {
        let store = SettingsStore::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |settings| sink.lock().expect("sink lock").push(*settings));

        let updated = store.update(PlayerSettingsPatch {
            pre_dub_count: Some(7),
            ..PlayerSettingsPatch::default()
        });

        assert_eq!(
            updated,
            PlayerSettings {
                pre_translate_count: 5,
                pre_dub_count: 7
            }
        );
        assert_eq!(*seen.lock().expect("sink lock"), vec![updated]);
        assert_eq!(store.get(), updated);
    }

    #[test]
    fn unsubscribed_listeners_stop_receiving() {
        let store = SettingsStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.update(PlayerSettingsPatch::default());
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.update(PlayerSettingsPatch::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_may_read_the_store() {
        let store = SettingsStore::default();
        let reader = store.clone();
        let observed = Arc::new(AtomicUsize::new(0));
        let slot = Arc::clone(&observed);
        store.subscribe(move |_| {
            slot.store(reader.get().pre_translate_count, Ordering::SeqCst);
        });
        store.update(PlayerSettingsPatch {
            pre_translate_count: Some(11),
            ..PlayerSettingsPatch::default()
        });
        assert_eq!(observed.load(Ordering::SeqCst), 11);
    }
}
