use std::rc::Rc;

use host::chrome::{BrowserSpawner, ChromeMessenger, ChromeStorage};
use gloo_timers::callback::Interval;
use host::SystemClock;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, PageTransitionEvent, VisibilityState};

use crate::navigation::BrowserHistoryHooks;
use crate::overlay::dom::DomSurface;
use crate::{ContentHost, ContentSession, HistoryObserver, OverlayConfig};

/// Content-script entry point.
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    host::logging::init_tracing();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let url = window.location().href()?;
    let config = OverlayConfig::default();

    let session = ContentSession::new(
        ContentHost {
            messenger: Rc::new(ChromeMessenger),
            storage: Rc::new(ChromeStorage),
            clock: Rc::new(SystemClock),
            surface: Rc::new(DomSurface::new()?),
            spawner: Rc::new(BrowserSpawner),
        },
        config.clone(),
    );

    session.set_visibility(document.visibility_state() == VisibilityState::Visible);
    session.set_focus(document.has_focus().unwrap_or(true));

    // Page-lifetime listeners; `pagehide` tears the session down unless the
    // page goes into the back/forward cache.
    let target: &web_sys::EventTarget = document.as_ref();
    let on_visibility = {
        let session = Rc::clone(&session);
        let document = document.clone();
        Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
            session.set_visibility(document.visibility_state() == VisibilityState::Visible);
        })
    };
    target.add_event_listener_with_callback("visibilitychange", on_visibility.as_ref().unchecked_ref())?;
    on_visibility.forget();

    for (event, focused) in [("focus", true), ("blur", false)] {
        let session = Rc::clone(&session);
        let listener = Closure::<dyn FnMut(Event)>::new(move |_event: Event| session.set_focus(focused));
        window.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())?;
        listener.forget();
    }

    let on_pagehide = {
        let session = Rc::clone(&session);
        Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let persisted = event
                .dyn_ref::<PageTransitionEvent>()
                .is_some_and(PageTransitionEvent::persisted);
            session.page_hidden(persisted);
        })
    };
    window.add_event_listener_with_callback("pagehide", on_pagehide.as_ref().unchecked_ref())?;
    on_pagehide.forget();

    let on_pageshow = {
        let session = Rc::clone(&session);
        Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            if event
                .dyn_ref::<PageTransitionEvent>()
                .is_some_and(PageTransitionEvent::persisted)
            {
                session.page_restored();
            }
        })
    };
    window.add_event_listener_with_callback("pageshow", on_pageshow.as_ref().unchecked_ref())?;
    on_pageshow.forget();

    let ticking = Rc::clone(&session);
    let millis = u32::try_from(config.refresh_interval.as_millis()).unwrap_or(u32::MAX);
    Interval::new(millis, move || ticking.tick()).forget();

    wasm_bindgen_futures::spawn_local(async move {
        let observer = HistoryObserver::new(BrowserHistoryHooks, config.poll_interval);
        session.start(&url, &observer).await;
    });
    Ok(())
}
