use std::time::Duration;

/// Tunables of the content runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayConfig {
    /// Fallback URL poll for sites whose routers bypass the history API.
    pub poll_interval: Duration,
    /// Minimum distance between the bubble and the viewport edge, in CSS pixels.
    pub viewport_margin: f64,
    /// Bubble edge length used when clamping drags.
    pub bubble_size: f64,
    /// Offer the notes/solution form on tracked problems.
    pub allow_editing: bool,
    /// How often time-dependent parts of the view (the due badge) are
    /// re-evaluated.
    pub refresh_interval: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            viewport_margin: 8.0,
            bubble_size: 48.0,
            allow_editing: true,
            refresh_interval: Duration::from_secs(60),
        }
    }
}
