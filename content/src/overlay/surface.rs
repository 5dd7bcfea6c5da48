use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::view::ViewNode;
use super::OverlayAction;

pub type ActionSink = Rc<dyn Fn(OverlayAction)>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Where the overlay's view tree is shown.
pub trait OverlaySurface {
    /// Attach to the page. User interactions are reported through `dispatch`.
    fn mount(&self, dispatch: ActionSink);

    /// Replace everything shown with `view`.
    fn update(&self, view: &ViewNode);

    /// Remove every injected element and listener.
    fn unmount(&self);

    fn viewport(&self) -> Viewport;
}

/// Surface that keeps the rendered trees in memory.
pub struct MemorySurface {
    viewport: Viewport,
    mounted: Cell<bool>,
    dispatch: RefCell<Option<ActionSink>>,
    updates: RefCell<Vec<ViewNode>>,
}

impl MemorySurface {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            mounted: Cell::new(false),
            dispatch: RefCell::new(None),
            updates: RefCell::new(Vec::new()),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub fn update_count(&self) -> usize {
        self.updates.borrow().len()
    }

    pub fn last_view(&self) -> Option<ViewNode> {
        self.updates.borrow().last().cloned()
    }

    /// Simulate a user interaction. Returns false when nothing is mounted.
    pub fn interact(&self, action: OverlayAction) -> bool {
        let dispatch = self.dispatch.borrow().clone();
        match dispatch {
            Some(dispatch) if self.mounted.get() => {
                dispatch(action);
                true
            }
            _ => false,
        }
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new(Viewport {
            width: 1280.0,
            height: 800.0,
        })
    }
}

impl OverlaySurface for MemorySurface {
    fn mount(&self, dispatch: ActionSink) {
        *self.dispatch.borrow_mut() = Some(dispatch);
        self.mounted.set(true);
    }

    fn update(&self, view: &ViewNode) {
        self.updates.borrow_mut().push(view.clone());
    }

    fn unmount(&self) {
        self.dispatch.borrow_mut().take();
        self.mounted.set(false);
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}
