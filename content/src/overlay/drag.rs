use shared_types::OverlayPosition;

use super::surface::Viewport;
use crate::config::OverlayConfig;

/// Keep the bubble fully inside the viewport, `viewport_margin` from each edge.
pub fn clamp_position(
    position: OverlayPosition,
    viewport: Viewport,
    config: &OverlayConfig,
) -> OverlayPosition {
    let clamp_axis = |value: f64, extent: f64| {
        let min = config.viewport_margin;
        let max = (extent - config.viewport_margin - config.bubble_size).max(min);
        if value.is_finite() {
            value.clamp(min, max)
        } else {
            min
        }
    };
    OverlayPosition {
        x: clamp_axis(position.x, viewport.width),
        y: clamp_axis(position.y, viewport.height),
    }
}

/// Pointer gesture in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    pointer_x: f64,
    pointer_y: f64,
    origin: OverlayPosition,
    moved: bool,
}

impl DragState {
    pub fn begin(pointer_x: f64, pointer_y: f64, origin: OverlayPosition) -> Self {
        Self {
            pointer_x,
            pointer_y,
            origin,
            moved: false,
        }
    }

    pub fn position_at(&mut self, pointer_x: f64, pointer_y: f64) -> OverlayPosition {
        let dx = pointer_x - self.pointer_x;
        let dy = pointer_y - self.pointer_y;
        if dx != 0.0 || dy != 0.0 {
            self.moved = true;
        }
        OverlayPosition {
            x: self.origin.x + dx,
            y: self.origin.y + dy,
        }
    }

    pub fn moved(&self) -> bool {
        self.moved
    }
}
