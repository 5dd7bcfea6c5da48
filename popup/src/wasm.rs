use std::cell::RefCell;
use std::rc::Rc;

use host::chrome::{BrowserSpawner, ChromeMessenger, ChromeStorage};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event};

use crate::controller::{PopupAction, PopupActionSink, PopupConfig, PopupController, PopupWindow};
use crate::view::PopupView;

/// Renders into `#app` of `popup.html`.
struct DomWindow {
    document: Document,
    root: Element,
    dispatch: RefCell<Option<PopupActionSink>>,
    listeners: RefCell<Vec<Closure<dyn FnMut(Event)>>>,
}

impl DomWindow {
    fn new() -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let root = document
            .get_element_by_id("app")
            .ok_or_else(|| JsValue::from_str("missing #app"))?;
        Ok(Self {
            document,
            root,
            dispatch: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
        })
    }

    fn element(&self, tag: &str, class: &str, text: &str) -> Result<Element, JsValue> {
        let element = self.document.create_element(tag)?;
        element.set_class_name(class);
        if !text.is_empty() {
            element.set_text_content(Some(text));
        }
        Ok(element)
    }

    fn button(&self, label: &str, action: PopupAction) -> Result<Element, JsValue> {
        let button = self.element("button", "revu-button", label)?;
        let Some(dispatch) = self.dispatch.borrow().clone() else {
            return Ok(button);
        };
        // Rendering replaces this listener; deliver after the handler returns.
        let listener = Closure::wrap(Box::new(move |_event: Event| {
            let dispatch = dispatch.clone();
            wasm_bindgen_futures::spawn_local(async move { dispatch(action) });
        }) as Box<dyn FnMut(Event)>);
        button.add_event_listener_with_callback("click", listener.as_ref().unchecked_ref())?;
        self.listeners.borrow_mut().push(listener);
        Ok(button)
    }

    fn build(&self, view: &PopupView) -> Result<Element, JsValue> {
        let container = self.element("div", "revu-popup", "")?;
        match view {
            PopupView::Loading => {
                container.append_child(&self.element("p", "revu-muted", "Loading…")?)?;
            }
            PopupView::NotConnected => {
                container.append_child(&self.element("p", "", "Revu is not connected.")?)?;
                container.append_child(&self.button("Connect", PopupAction::Connect)?)?;
            }
            PopupView::Error(message) => {
                container.append_child(&self.element("p", "revu-error", message)?)?;
                container.append_child(&self.button("Retry", PopupAction::Retry)?)?;
            }
            PopupView::Connected { name, email, links } => {
                container.append_child(&self.element("p", "revu-name", name)?)?;
                if let Some(email) = email {
                    container.append_child(&self.element("p", "revu-muted", email)?)?;
                }
                let nav = self.element("nav", "revu-links", "")?;
                for link in links {
                    let anchor = self.element("a", "revu-link", link.label)?;
                    anchor.set_attribute("href", &link.url)?;
                    anchor.set_attribute("target", "_blank")?;
                    nav.append_child(&anchor)?;
                }
                container.append_child(&nav)?;
                container.append_child(&self.button("Disconnect", PopupAction::Disconnect)?)?;
            }
        }
        Ok(container)
    }
}

impl PopupWindow for DomWindow {
    fn bind(&self, dispatch: PopupActionSink) {
        *self.dispatch.borrow_mut() = Some(dispatch);
    }

    fn render(&self, view: &PopupView) {
        let previous = std::mem::take(&mut *self.listeners.borrow_mut());
        match self.build(view) {
            Ok(tree) => {
                self.root.set_inner_html("");
                if let Err(e) = self.root.append_child(&tree) {
                    tracing::warn!(error = ?e, "failed to render popup");
                }
            }
            Err(e) => tracing::warn!(error = ?e, "failed to build popup view"),
        }
        drop(previous);
    }

    fn close(&self) {
        if let Some(window) = web_sys::window() {
            let _ = window.close();
        }
    }
}

/// Popup entry point.
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    host::logging::init_tracing();
    let popup = PopupController::new(
        Rc::new(ChromeMessenger),
        Rc::new(ChromeStorage),
        Rc::new(DomWindow::new()?),
        Rc::new(BrowserSpawner),
        PopupConfig::default(),
    );
    popup.open();
    // The popup document lives exactly as long as the controller.
    std::mem::forget(popup);
    Ok(())
}
