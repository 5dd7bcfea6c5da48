//! Toolbar popup
//!
//! Shows whether the extension is connected, offers connect/disconnect and
//! links into the web app. It keeps no state of its own: every view is
//! derived from `GET_AUTH_STATUS`, re-requested whenever the persisted
//! session changes.

pub mod controller;
pub mod view;

#[cfg(target_arch = "wasm32")]
mod wasm;

pub use controller::{PopupAction, PopupActionSink, PopupConfig, PopupController, PopupWindow};
pub use view::{quick_links, PopupView, QuickLink};
