//! Background coordinator for the Revu extension
//!
//! The background context is the only owner of the auth session. It:
//! - answers every [`shared_types::Request`] from content scripts and the popup
//! - keeps the access token fresh (refresh inside the expiry buffer, revoke on failure)
//! - runs the connect handshake: nonce, connect tab, callback watch, code exchange
//!
//! Other contexts learn about session changes only through storage change
//! notifications on the session key.

pub mod api;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod oauth;
pub mod session;
pub mod tokens;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use api::{ApiError, HttpServerApi, ServerApi};
pub use bridge::LocalBridge;
pub use config::Config;
pub use coordinator::{CallbackOutcome, Coordinator};
pub use error::BackgroundError;
pub use session::SessionStore;
pub use tokens::TokenManager;
