//! Service worker entry points. The JS glue registers the `chrome.*` event
//! listeners and forwards them here.

use std::rc::Rc;

use host::chrome::{from_js, to_js, ChromeStorage, ChromeTabs};
use host::logging::init_tracing;
use host::SystemClock;
use js_sys::Promise;
use shared_types::{failure_envelope, ExternalMessage, Request};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::api::HttpServerApi;
use crate::config::Config;
use crate::coordinator::Coordinator;

#[wasm_bindgen]
pub struct BackgroundRuntime {
    coordinator: Rc<Coordinator>,
}

#[wasm_bindgen]
impl BackgroundRuntime {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<BackgroundRuntime, JsValue> {
        init_tracing();
        let config = Config::default();
        let api = HttpServerApi::new(&config.api_root())
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let coordinator = Coordinator::new(
            config,
            Rc::new(ChromeStorage),
            Rc::new(api),
            Rc::new(ChromeTabs),
            Rc::new(SystemClock),
        );
        tracing::info!("background coordinator started");
        Ok(Self {
            coordinator: Rc::new(coordinator),
        })
    }

    /// `chrome.runtime.onMessage`: the glue returns `true` and answers with
    /// the resolved value.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) -> Promise {
        let coordinator = Rc::clone(&self.coordinator);
        future_to_promise(async move {
            let reply = match from_js(&message)
                .map_err(|e| e.to_string())
                .and_then(|value| serde_json::from_value::<Request>(value).map_err(|e| e.to_string()))
            {
                Ok(request) => coordinator.handle(request).await,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed message");
                    failure_envelope(format!("malformed request: {e}"))
                }
            };
            to_js(&reply).map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }

    /// `chrome.tabs.onUpdated` with the tab's new URL.
    #[wasm_bindgen(js_name = onTabUpdated)]
    pub fn on_tab_updated(&self, tab_id: i32, url: String) {
        let coordinator = Rc::clone(&self.coordinator);
        spawn_local(async move {
            let outcome = coordinator.on_tab_updated(tab_id, &url).await;
            tracing::trace!(tab_id, ?outcome, "tab update handled");
        });
    }

    /// `chrome.runtime.onMessageExternal` with the sender's origin.
    #[wasm_bindgen(js_name = handleExternalMessage)]
    pub fn handle_external_message(&self, origin: String, message: JsValue) -> Promise {
        let coordinator = Rc::clone(&self.coordinator);
        future_to_promise(async move {
            let parsed = from_js(&message)
                .map_err(|e| e.to_string())
                .and_then(|v| serde_json::from_value::<ExternalMessage>(v).map_err(|e| e.to_string()));
            let reply = match parsed {
                Ok(message) => serde_json::to_value(coordinator.on_external_message(&origin, message).await)
                    .unwrap_or_else(|e| failure_envelope(e.to_string())),
                Err(e) => {
                    tracing::warn!(origin = %origin, error = %e, "dropping malformed external message");
                    failure_envelope(format!("malformed message: {e}"))
                }
            };
            to_js(&reply).map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }
}
