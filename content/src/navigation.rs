//! Same-document navigation detection.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

pub type NavigationCallback = Rc<dyn Fn(&str)>;

/// Undoes whatever an observer installed. Runs on drop.
pub struct Disposer {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Disposer {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn dispose(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// Reports URL changes that happen without a page load.
pub trait NavigationObserver {
    /// `callback` receives the new URL, once per distinct change.
    fn on_change(&self, callback: NavigationCallback) -> Disposer;
}

/// Page primitives [`HistoryObserver`] needs. Each install returns the
/// function that undoes it.
pub trait HistoryHooks {
    fn current_url(&self) -> String;

    /// Call `notify` after every `pushState`/`replaceState` and on `popstate`.
    fn intercept(&self, notify: Rc<dyn Fn()>) -> Box<dyn FnOnce()>;

    fn every(&self, period: Duration, tick: Rc<dyn Fn()>) -> Box<dyn FnOnce()>;
}

/// Patches the history API and polls as a fallback for routers that
/// bypass it.
pub struct HistoryObserver<H: HistoryHooks> {
    hooks: Rc<H>,
    poll_interval: Duration,
}

impl<H: HistoryHooks + 'static> HistoryObserver<H> {
    pub fn new(hooks: H, poll_interval: Duration) -> Self {
        Self {
            hooks: Rc::new(hooks),
            poll_interval,
        }
    }
}

impl<H: HistoryHooks + 'static> NavigationObserver for HistoryObserver<H> {
    fn on_change(&self, callback: NavigationCallback) -> Disposer {
        let last = Rc::new(RefCell::new(self.hooks.current_url()));
        let hooks = Rc::clone(&self.hooks);
        let check: Rc<dyn Fn()> = Rc::new(move || {
            let url = hooks.current_url();
            if *last.borrow() == url {
                return;
            }
            tracing::trace!(url = %url, "navigation detected");
            *last.borrow_mut() = url.clone();
            callback(&url);
        });

        let restore = self.hooks.intercept(Rc::clone(&check));
        let stop_polling = self.hooks.every(self.poll_interval, check);
        Disposer::new(move || {
            restore();
            stop_polling();
        })
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserHistoryHooks;

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::rc::Rc;
    use std::time::Duration;

    use gloo_timers::callback::Interval;
    use js_sys::{Function, Reflect};
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{JsCast, JsValue};

    use super::HistoryHooks;

    /// `window.history` and `window.location` of the host page.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct BrowserHistoryHooks;

    fn patch(history: &web_sys::History, method: &str, notify: Rc<dyn Fn()>) -> Option<Box<dyn FnOnce()>> {
        let key = JsValue::from_str(method);
        let original: Function = Reflect::get(history, &key).ok()?.dyn_into().ok()?;
        let target = history.clone();
        let call_original = original.clone();
        let wrapper = Closure::wrap(Box::new(move |state: JsValue, unused: JsValue, url: JsValue| {
            let result = call_original.call3(&target, &state, &unused, &url);
            notify();
            match result {
                Ok(value) => value,
                Err(e) => wasm_bindgen::throw_val(e),
            }
        }) as Box<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>);
        Reflect::set(history, &key, wrapper.as_ref()).ok()?;

        let history = history.clone();
        Some(Box::new(move || {
            let _ = Reflect::set(&history, &key, &original);
            drop(wrapper);
        }))
    }

    impl HistoryHooks for BrowserHistoryHooks {
        fn current_url(&self) -> String {
            web_sys::window()
                .and_then(|w| w.location().href().ok())
                .unwrap_or_default()
        }

        fn intercept(&self, notify: Rc<dyn Fn()>) -> Box<dyn FnOnce()> {
            let Some(window) = web_sys::window() else {
                return Box::new(|| {});
            };
            let Ok(history) = window.history() else {
                return Box::new(|| {});
            };

            let restores: Vec<Box<dyn FnOnce()>> = ["pushState", "replaceState"]
                .into_iter()
                .filter_map(|method| patch(&history, method, Rc::clone(&notify)))
                .collect();

            let on_popstate = Closure::wrap(Box::new(move |_event: web_sys::Event| {
                notify();
            }) as Box<dyn FnMut(web_sys::Event)>);
            let _ = window
                .add_event_listener_with_callback("popstate", on_popstate.as_ref().unchecked_ref());

            Box::new(move || {
                for restore in restores {
                    restore();
                }
                let _ = window.remove_event_listener_with_callback(
                    "popstate",
                    on_popstate.as_ref().unchecked_ref(),
                );
                drop(on_popstate);
            })
        }

        fn every(&self, period: Duration, tick: Rc<dyn Fn()>) -> Box<dyn FnOnce()> {
            let millis = u32::try_from(period.as_millis()).unwrap_or(u32::MAX);
            let interval = Interval::new(millis, move || tick());
            Box::new(move || drop(interval))
        }
    }
}
