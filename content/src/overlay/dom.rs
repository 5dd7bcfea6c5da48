//! Overlay surface rendered into a closed shadow root on the host page.

use std::cell::RefCell;

use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Event, HtmlTextAreaElement, MouseEvent, ShadowRoot, ShadowRootInit, ShadowRootMode};

use super::surface::{ActionSink, OverlaySurface, Viewport};
use super::view::ViewNode;
use super::OverlayAction;

const HOST_ID: &str = "revu-overlay-host";

const STYLES: &str = r#"
.revu-overlay { position: fixed; z-index: 2147483647; font: 13px/1.4 system-ui, sans-serif; color: #111827; }
.revu-bubble { width: 48px; height: 48px; border-radius: 24px; border: none; cursor: grab; color: #fff; font-weight: 700; background: #6b7280; }
.revu-indicator-loading { background: #9ca3af; }
.revu-indicator-warning { background: #f59e0b; }
.revu-indicator-due { background: #dc2626; }
.revu-indicator-scheduled { background: #16a34a; }
.revu-panel { margin-top: 8px; width: 300px; padding: 12px; border-radius: 8px; background: #fff; box-shadow: 0 8px 24px rgba(0,0,0,.18); }
.revu-header { display: flex; justify-content: space-between; align-items: center; font-weight: 600; }
.revu-error { color: #b91c1c; }
.revu-muted { color: #6b7280; }
.revu-ratings, .revu-actions { display: flex; gap: 6px; margin-top: 8px; }
textarea { width: 100%; min-height: 72px; box-sizing: border-box; }
"#;

type Listener = Closure<dyn FnMut(Event)>;

pub struct DomSurface {
    document: Document,
    host: web_sys::Element,
    root: ShadowRoot,
    dispatch: RefCell<Option<ActionSink>>,
    listeners: RefCell<Vec<Listener>>,
    window_listeners: RefCell<Vec<(&'static str, Listener)>>,
}

/// Deliver `action` after the current event handler returns: the handler's
/// closure is dropped by the re-render it triggers.
fn deferred(dispatch: &ActionSink, action: OverlayAction) {
    let dispatch = dispatch.clone();
    wasm_bindgen_futures::spawn_local(async move { dispatch(action) });
}

impl DomSurface {
    pub fn new() -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        if let Some(stale) = document.get_element_by_id(HOST_ID) {
            stale.remove();
        }
        let host = document.create_element("div")?;
        host.set_id(HOST_ID);
        let root = host.attach_shadow(&ShadowRootInit::new(ShadowRootMode::Closed))?;
        Ok(Self {
            document,
            host,
            root,
            dispatch: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
            window_listeners: RefCell::new(Vec::new()),
        })
    }

    fn listen(&self, target: &web_sys::EventTarget, event: &str, listener: Listener) -> Result<(), JsValue> {
        target.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())?;
        self.listeners.borrow_mut().push(listener);
        Ok(())
    }

    fn build(&self, node: &ViewNode, dispatch: &ActionSink) -> Result<web_sys::Node, JsValue> {
        let element = match node {
            ViewNode::Text(text) => return Ok(self.document.create_text_node(text).into()),
            ViewNode::Element(element) => element,
        };

        let node = self.document.create_element(element.tag)?;
        if !element.class.is_empty() {
            node.set_class_name(&element.class);
        }
        for (name, value) in &element.attrs {
            match node.dyn_ref::<HtmlTextAreaElement>() {
                Some(textarea) if *name == "value" => textarea.set_value(value),
                _ => node.set_attribute(name, value)?,
            }
        }

        if let Some(action) = element.on_click.clone() {
            let dispatch = dispatch.clone();
            self.listen(
                &node,
                "click",
                Closure::wrap(Box::new(move |_event: Event| deferred(&dispatch, action.clone()))
                    as Box<dyn FnMut(Event)>),
            )?;
        }
        if let Some(field) = element.on_input {
            // Draft updates never re-render, so the listener survives them.
            let dispatch = dispatch.clone();
            self.listen(
                &node,
                "input",
                Closure::wrap(Box::new(move |event: Event| {
                    let value = event
                        .target()
                        .and_then(|t| t.dyn_into::<HtmlTextAreaElement>().ok())
                        .map(|t| t.value())
                        .unwrap_or_default();
                    dispatch(OverlayAction::UpdateDraft(field, value));
                }) as Box<dyn FnMut(Event)>),
            )?;
        }
        if element.attr_value("data-drag-handle").is_some() {
            let dispatch = dispatch.clone();
            self.listen(
                &node,
                "mousedown",
                Closure::wrap(Box::new(move |event: Event| {
                    if let Some(mouse) = event.dyn_ref::<MouseEvent>() {
                        let (x, y) = (f64::from(mouse.client_x()), f64::from(mouse.client_y()));
                        deferred(&dispatch, OverlayAction::DragStart { x, y });
                    }
                }) as Box<dyn FnMut(Event)>),
            )?;
        }

        for child in &element.children {
            node.append_child(&self.build(child, dispatch)?)?;
        }
        Ok(node.into())
    }

    fn redraw(&self, view: &ViewNode) -> Result<(), JsValue> {
        let Some(dispatch) = self.dispatch.borrow().clone() else {
            return Ok(());
        };
        let previous = std::mem::take(&mut *self.listeners.borrow_mut());

        let style = self.document.create_element("style")?;
        style.set_text_content(Some(STYLES));
        let tree = self.build(view, &dispatch)?;
        self.root.set_inner_html("");
        self.root.append_child(&style)?;
        self.root.append_child(&tree)?;

        drop(previous);
        Ok(())
    }

    fn window_listener(&self, event: &'static str, listener: Listener) {
        if let Some(window) = web_sys::window() {
            if window
                .add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())
                .is_ok()
            {
                self.window_listeners.borrow_mut().push((event, listener));
            }
        }
    }
}

impl OverlaySurface for DomSurface {
    fn mount(&self, dispatch: ActionSink) {
        let parent = self
            .document
            .body()
            .map(web_sys::Element::from)
            .or_else(|| self.document.document_element());
        if let Some(parent) = parent {
            if let Err(e) = parent.append_child(&self.host) {
                tracing::warn!(error = ?e, "failed to inject overlay");
            }
        }

        let on_move = dispatch.clone();
        self.window_listener(
            "mousemove",
            Closure::wrap(Box::new(move |event: Event| {
                if let Some(mouse) = event.dyn_ref::<MouseEvent>() {
                    let (x, y) = (f64::from(mouse.client_x()), f64::from(mouse.client_y()));
                    deferred(&on_move, OverlayAction::DragMove { x, y });
                }
            }) as Box<dyn FnMut(Event)>),
        );
        let on_up = dispatch.clone();
        self.window_listener(
            "mouseup",
            Closure::wrap(Box::new(move |_event: Event| deferred(&on_up, OverlayAction::DragEnd))
                as Box<dyn FnMut(Event)>),
        );

        *self.dispatch.borrow_mut() = Some(dispatch);
    }

    fn update(&self, view: &ViewNode) {
        if let Err(e) = self.redraw(view) {
            tracing::warn!(error = ?e, "failed to render overlay");
        }
    }

    fn unmount(&self) {
        self.host.remove();
        self.listeners.borrow_mut().clear();
        if let Some(window) = web_sys::window() {
            for (event, listener) in self.window_listeners.borrow_mut().drain(..) {
                let _ = window
                    .remove_event_listener_with_callback(event, listener.as_ref().unchecked_ref());
            }
        }
        self.dispatch.borrow_mut().take();
    }

    fn viewport(&self) -> Viewport {
        let window = web_sys::window();
        let read = |value: Option<Result<JsValue, JsValue>>| {
            value.and_then(|v| v.ok()).and_then(|v| v.as_f64()).unwrap_or(0.0)
        };
        Viewport {
            width: read(window.as_ref().map(|w| w.inner_width())),
            height: read(window.as_ref().map(|w| w.inner_height())),
        }
    }
}
