//! Injected overlay: state machine, view, drag-to-reposition.

mod drag;
pub mod state;
pub mod surface;
pub mod view;

#[cfg(target_arch = "wasm32")]
pub mod dom;

use std::rc::Rc;

use host::Clock;
use shared_types::{OverlayPosition, ProblemContext, Rating};

use crate::config::OverlayConfig;
pub use drag::{clamp_position, DragState};
pub use state::{ContentState, DraftField, EditDraft, Indicator, OverlayModel};
pub use surface::{ActionSink, MemorySurface, OverlaySurface, Viewport};
pub use view::{render, Element, ViewNode};

/// User interactions reported by the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayAction {
    ToggleExpanded,
    Edit,
    CancelEdit,
    UpdateDraft(DraftField, String),
    Save,
    Track,
    Review(Rating),
    Connect,
    Retry,
    DragStart { x: f64, y: f64 },
    DragMove { x: f64, y: f64 },
    DragEnd,
}

/// One mounted overlay for one problem. Dropped (and unmounted) when the
/// problem context changes.
pub struct Overlay {
    model: OverlayModel,
    surface: Rc<dyn OverlaySurface>,
    clock: Rc<dyn Clock>,
    config: OverlayConfig,
    last_view: Option<ViewNode>,
    drag: Option<DragState>,
    /// The bubble was just dragged; the click ending that gesture is not a toggle.
    swallow_click: bool,
    mounted: bool,
}

impl Overlay {
    pub fn create(
        context: ProblemContext,
        position: OverlayPosition,
        can_save: bool,
        surface: Rc<dyn OverlaySurface>,
        clock: Rc<dyn Clock>,
        config: OverlayConfig,
        dispatch: ActionSink,
    ) -> Self {
        let position = clamp_position(position, surface.viewport(), &config);
        surface.mount(dispatch);
        let mut overlay = Self {
            model: OverlayModel::new(context, position, can_save),
            surface,
            clock,
            config,
            last_view: None,
            drag: None,
            swallow_click: false,
            mounted: true,
        };
        overlay.render();
        overlay
    }

    pub fn model(&self) -> &OverlayModel {
        &self.model
    }

    /// Apply a transition and re-render.
    pub fn update<R>(&mut self, transition: impl FnOnce(&mut OverlayModel) -> R) -> R {
        let result = transition(&mut self.model);
        self.render();
        result
    }

    /// Apply a transition without touching the surface (draft keystrokes:
    /// rebuilding the form would reset the caret).
    pub fn update_quietly(&mut self, transition: impl FnOnce(&mut OverlayModel)) {
        transition(&mut self.model);
    }

    /// Rebuild the view; the surface is only touched when the tree changed.
    pub fn render(&mut self) -> bool {
        if !self.mounted {
            return false;
        }
        let view = render(&self.model, self.clock.now());
        if self.last_view.as_ref() == Some(&view) {
            return false;
        }
        self.surface.update(&view);
        self.last_view = Some(view);
        true
    }

    pub fn begin_drag(&mut self, x: f64, y: f64) {
        self.swallow_click = false;
        self.drag = Some(DragState::begin(x, y, self.model.position));
    }

    pub fn drag_to(&mut self, x: f64, y: f64) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        let position = clamp_position(drag.position_at(x, y), self.surface.viewport(), &self.config);
        self.update(|model| model.position = position);
    }

    /// Finish a drag; returns the position to persist when the bubble moved.
    pub fn end_drag(&mut self) -> Option<OverlayPosition> {
        let drag = self.drag.take()?;
        self.swallow_click = drag.moved();
        drag.moved().then_some(self.model.position)
    }

    /// Bubble click. Ignored once right after a drag that moved the bubble.
    pub fn toggle_expanded(&mut self) {
        if std::mem::take(&mut self.swallow_click) {
            return;
        }
        self.update(|m| m.toggle_expanded());
    }

    pub fn destroy(&mut self) {
        if self.mounted {
            self.surface.unmount();
            self.mounted = false;
            self.last_view = None;
        }
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        self.destroy();
    }
}
