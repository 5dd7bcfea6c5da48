//! Host platform primitives for the extension contexts
//!
//! Background, content and popup never share memory. The only channels
//! between them are the ones modelled here:
//! - [`StorageArea`]: persisted key/value storage with change notifications
//! - [`Messenger`]: request/response messaging to the background
//! - [`Tabs`]: opening and closing browser tabs (background only)
//!
//! The in-memory implementations back native builds and tests; the
//! `chrome` module binds the real `chrome.*` APIs on `wasm32`.

pub mod clock;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod storage;
pub mod tabs;

#[cfg(target_arch = "wasm32")]
pub mod chrome;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{HostError, MessagingError};
pub use messaging::{call, Messenger};
pub use storage::{MemoryStorage, StorageArea, StorageChange, Subscription};
pub use tabs::{MemoryTabs, TabId, Tabs};
