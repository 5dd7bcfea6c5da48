//! Persistent key/value storage shared by all contexts.
//!
//! Writes from one context surface in every other context as a
//! [`StorageChange`]. That notification is the only broadcast channel the
//! extension uses: the background persists the session and content scripts
//! and the popup react to the change.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::HostError;

/// One key changing value. `new_value == None` means the key was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub type StorageListener = Rc<dyn Fn(&StorageChange)>;

/// Handle that keeps a listener registered. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[async_trait(?Send)]
pub trait StorageArea {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError>;

    async fn remove(&self, key: &str) -> Result<(), HostError>;

    /// Listen to changes made by any context, including this one.
    fn subscribe(&self, listener: StorageListener) -> Subscription;

    /// Read a key and delete it.
    async fn take(&self, key: &str) -> Result<Option<Value>, HostError> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.remove(key).await?;
        }
        Ok(value)
    }
}

/// Read and decode a JSON value.
pub async fn load<T: DeserializeOwned>(
    storage: &dyn StorageArea,
    key: &str,
) -> Result<Option<T>, HostError> {
    match storage.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| HostError::Decode {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

pub async fn store<T: Serialize>(
    storage: &dyn StorageArea,
    key: &str,
    value: &T,
) -> Result<(), HostError> {
    storage.set(key, serde_json::to_value(value)?).await
}

// ============================================================================
// In-memory implementation
// ============================================================================

type ListenerList = RefCell<Vec<(u64, StorageListener)>>;

/// Storage area living in this process. Share one `Rc<MemoryStorage>`
/// between contexts to get cross-context change notifications.
#[derive(Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, Value>>,
    listeners: Rc<ListenerList>,
    next_listener: Cell<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.borrow().contains_key(key)
    }

    pub fn peek(&self, key: &str) -> Option<Value> {
        self.items.borrow().get(key).cloned()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn notify(&self, change: StorageChange) {
        // Listeners may subscribe or unsubscribe while being called.
        let listeners: Vec<StorageListener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }
}

#[async_trait(?Send)]
impl StorageArea for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        let old_value = self
            .items
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        self.notify(StorageChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HostError> {
        let old_value = self.items.borrow_mut().remove(key);
        if old_value.is_some() {
            self.notify(StorageChange {
                key: key.to_string(),
                old_value,
                new_value: None,
            });
        }
        Ok(())
    }

    fn subscribe(&self, listener: StorageListener) -> Subscription {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));

        let listeners: Weak<ListenerList> = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.borrow_mut().retain(|(entry, _)| *entry != id);
            }
        })
    }
}
