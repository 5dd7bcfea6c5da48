//! `chrome.*` bindings for the real extension build.

use async_trait::async_trait;
use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};
use js_sys::{Function, Object, Reflect, JSON};
use serde_json::Value;
use shared_types::Request;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::error::{HostError, MessagingError};
use crate::messaging::Messenger;
use crate::storage::{StorageArea, StorageChange, StorageListener, Subscription};
use crate::tabs::{TabId, Tabs};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    async fn storage_local_get(keys: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = set)]
    async fn storage_local_set(items: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = remove)]
    async fn storage_local_remove(keys: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = addListener)]
    fn storage_on_changed_add(listener: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = removeListener)]
    fn storage_on_changed_remove(listener: &Function);

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = sendMessage)]
    async fn runtime_send_message(message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = create)]
    async fn tabs_create(properties: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = remove)]
    async fn tabs_remove(tab_id: i32) -> Result<JsValue, JsValue>;
}

/// `chrome.runtime.id` disappears once the extension is reloaded under a
/// live content script.
pub fn runtime_alive() -> bool {
    let global = js_sys::global();
    Reflect::get(&global, &JsValue::from_str("chrome"))
        .and_then(|chrome| Reflect::get(&chrome, &JsValue::from_str("runtime")))
        .and_then(|runtime| Reflect::get(&runtime, &JsValue::from_str("id")))
        .map(|id| !id.is_undefined())
        .unwrap_or(false)
}

pub fn to_js(value: &Value) -> Result<JsValue, HostError> {
    JSON::parse(&value.to_string()).map_err(classify)
}

pub fn from_js(value: &JsValue) -> Result<Value, HostError> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text: String = JSON::stringify(value).map_err(classify)?.into();
    serde_json::from_str(&text).map_err(HostError::from)
}

fn classify(err: JsValue) -> HostError {
    let message = err
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.message()))
        .or_else(|| err.as_string())
        .unwrap_or_else(|| "unknown host error".to_string());
    if message.contains("Extension context invalidated") {
        HostError::ContextInvalidated
    } else {
        HostError::Storage(message)
    }
}

fn optional(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        other => Some(other),
    }
}

// ── Storage ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeStorage;

#[async_trait(?Send)]
impl StorageArea for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
        let items = storage_local_get(JsValue::from_str(key))
            .await
            .map_err(classify)?;
        let value = Reflect::get(&items, &JsValue::from_str(key)).map_err(classify)?;
        from_js(&value).map(optional)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        let items = Object::new();
        Reflect::set(&items, &JsValue::from_str(key), &to_js(&value)?).map_err(classify)?;
        storage_local_set(items.into()).await.map_err(classify)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HostError> {
        storage_local_remove(JsValue::from_str(key))
            .await
            .map_err(classify)?;
        Ok(())
    }

    fn subscribe(&self, listener: StorageListener) -> Subscription {
        let closure = Closure::wrap(Box::new(move |changes: JsValue, area: JsValue| {
            if area.as_string().as_deref() != Some("local") {
                return;
            }
            let Some(changes) = changes.dyn_ref::<Object>() else {
                return;
            };
            for key in Object::keys(changes).iter() {
                let Some(name) = key.as_string() else {
                    continue;
                };
                let Ok(entry) = Reflect::get(changes, &key) else {
                    continue;
                };
                let read = |field: &str| {
                    Reflect::get(&entry, &JsValue::from_str(field))
                        .ok()
                        .and_then(|v| from_js(&v).ok())
                        .and_then(optional)
                };
                listener(&StorageChange {
                    key: name,
                    old_value: read("oldValue"),
                    new_value: read("newValue"),
                });
            }
        }) as Box<dyn FnMut(JsValue, JsValue)>);

        storage_on_changed_add(closure.as_ref().unchecked_ref());
        Subscription::new(move || {
            storage_on_changed_remove(closure.as_ref().unchecked_ref());
            drop(closure);
        })
    }
}

// ── Messaging ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeMessenger;

#[async_trait(?Send)]
impl Messenger for ChromeMessenger {
    async fn send(&self, request: Request) -> Result<Value, MessagingError> {
        if !runtime_alive() {
            return Err(MessagingError::ContextInvalidated);
        }
        let payload = serde_json::to_value(&request)
            .map_err(|e| MessagingError::Transport(e.to_string()))?;
        let reply = runtime_send_message(to_js(&payload)?)
            .await
            .map_err(|e| MessagingError::from(classify(e)))?;
        Ok(from_js(&reply)?)
    }
}

// ── Tabs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeTabs;

#[async_trait(?Send)]
impl Tabs for ChromeTabs {
    async fn open(&self, url: &str) -> Result<TabId, HostError> {
        let properties = Object::new();
        Reflect::set(&properties, &"url".into(), &url.into()).map_err(classify)?;
        Reflect::set(&properties, &"active".into(), &JsValue::TRUE).map_err(classify)?;
        let tab = tabs_create(properties.into()).await.map_err(classify)?;
        Reflect::get(&tab, &"id".into())
            .map_err(classify)?
            .as_f64()
            .map(|id| id as TabId)
            .ok_or_else(|| HostError::Tabs("created tab has no id".to_string()))
    }

    async fn close(&self, tab: TabId) -> Result<(), HostError> {
        tabs_remove(tab)
            .await
            .map_err(|e| HostError::Tabs(classify(e).to_string()))?;
        Ok(())
    }
}

// ── Spawning ─────────────────────────────────────────────────────────────────

/// Runs local futures on the browser microtask queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserSpawner;

impl LocalSpawn for BrowserSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}
