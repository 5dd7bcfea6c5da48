//! Content runtime for problem pages
//!
//! Injected into every supported coding site. It resolves which problem the
//! page shows, keeps an overlay with the problem's review state in sync with
//! the background, and measures active time spent on the problem.
//!
//! - [`problem_context`]: URL → `{platform, slug}`
//! - [`navigation`]: client-side route changes
//! - [`overlay`]: state machine, view tree and surfaces
//! - [`timer`]: visible+focused time accounting
//! - [`runtime`]: the per-page [`ContentSession`] tying them together

pub mod config;
pub mod error;
pub mod navigation;
pub mod overlay;
pub mod problem_context;
pub mod runtime;
pub mod timer;

#[cfg(target_arch = "wasm32")]
mod wasm;

pub use config::OverlayConfig;
pub use error::ContentError;
pub use navigation::{Disposer, HistoryHooks, HistoryObserver, NavigationObserver};
pub use overlay::{Overlay, OverlayAction, OverlayModel};
pub use problem_context::resolve;
pub use runtime::{ContentHost, ContentSession};
pub use timer::{ReviewTimer, ReviewTimerState};
