use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::task::{LocalSpawn, LocalSpawnExt};
use host::{call, Messenger, StorageArea, StorageChange, Subscription};
use shared_types::{Connect, Disconnect, GetAuthStatus, STORAGE_KEY_SESSION};

use crate::view::PopupView;

/// Buttons the popup offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupAction {
    Connect,
    Disconnect,
    Retry,
}

pub type PopupActionSink = Rc<dyn Fn(PopupAction)>;

/// The popup document.
pub trait PopupWindow {
    /// Route button presses to `dispatch`.
    fn bind(&self, dispatch: PopupActionSink);

    fn render(&self, view: &PopupView);

    fn close(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupConfig {
    pub app_base: String,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            app_base: option_env!("REVU_APP_BASE")
                .unwrap_or("https://revu.app")
                .to_string(),
        }
    }
}

/// Stateless on open: everything shown comes from `GET_AUTH_STATUS`.
pub struct PopupController {
    this: Weak<PopupController>,
    messenger: Rc<dyn Messenger>,
    storage: Rc<dyn StorageArea>,
    window: Rc<dyn PopupWindow>,
    spawner: Rc<dyn LocalSpawn>,
    config: PopupConfig,
    view: RefCell<PopupView>,
    subscription: RefCell<Option<Subscription>>,
}

impl PopupController {
    pub fn new(
        messenger: Rc<dyn Messenger>,
        storage: Rc<dyn StorageArea>,
        window: Rc<dyn PopupWindow>,
        spawner: Rc<dyn LocalSpawn>,
        config: PopupConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            messenger,
            storage,
            window,
            spawner,
            config,
            view: RefCell::new(PopupView::Loading),
            subscription: RefCell::new(None),
        })
    }

    /// Show the current status and follow session changes made elsewhere.
    pub fn open(&self) {
        let weak = self.this.clone();
        self.window.bind(Rc::new(move |action: PopupAction| {
            if let Some(popup) = weak.upgrade() {
                popup.dispatch(action);
            }
        }));
        self.window.render(&PopupView::Loading);
        *self.view.borrow_mut() = PopupView::Loading;

        let weak = self.this.clone();
        let subscription = self.storage.subscribe(Rc::new(move |change: &StorageChange| {
            if change.key != STORAGE_KEY_SESSION {
                return;
            }
            if let Some(popup) = weak.upgrade() {
                tracing::debug!(signed_in = change.new_value.is_some(), "session changed");
                popup.spawn_with_self(|popup| async move { popup.refresh().await });
            }
        }));
        *self.subscription.borrow_mut() = Some(subscription);

        self.spawn_with_self(|popup| async move { popup.refresh().await });
    }

    pub async fn refresh(&self) {
        let view = match call(self.messenger.as_ref(), GetAuthStatus).await {
            Ok(status) => PopupView::from_status(status, &self.config.app_base),
            Err(e) => {
                tracing::warn!(error = %e, "auth status request failed");
                PopupView::from_messaging_error(&e)
            }
        };
        self.show(view);
    }

    /// Open the connect page; the popup closes once the tab is up.
    pub async fn connect(&self) {
        match call(self.messenger.as_ref(), Connect).await {
            Ok(response) if response.success => self.window.close(),
            Ok(response) => {
                let error = response.error.unwrap_or_else(|| "Could not connect".to_string());
                tracing::warn!(error = %error, "connect rejected");
                self.show(PopupView::Error(error));
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect request failed");
                self.show(PopupView::from_messaging_error(&e));
            }
        }
    }

    pub async fn disconnect(&self) {
        match call(self.messenger.as_ref(), Disconnect).await {
            Ok(response) if response.success => tracing::info!("disconnected"),
            Ok(response) => tracing::warn!(error = ?response.error, "disconnect rejected"),
            Err(e) => {
                self.show(PopupView::from_messaging_error(&e));
                return;
            }
        }
        self.refresh().await;
    }

    pub fn dispatch(&self, action: PopupAction) {
        match action {
            PopupAction::Connect => self.spawn_with_self(|popup| async move { popup.connect().await }),
            PopupAction::Disconnect => {
                self.spawn_with_self(|popup| async move { popup.disconnect().await })
            }
            PopupAction::Retry => {
                self.show(PopupView::Loading);
                self.spawn_with_self(|popup| async move { popup.refresh().await });
            }
        }
    }

    pub fn view(&self) -> PopupView {
        self.view.borrow().clone()
    }

    /// Stop following storage changes.
    pub fn close(&self) {
        self.subscription.borrow_mut().take();
    }

    fn show(&self, view: PopupView) {
        if *self.view.borrow() == view {
            return;
        }
        self.window.render(&view);
        *self.view.borrow_mut() = view;
    }

    fn spawn_with_self<F, Fut>(&self, task: F)
    where
        F: FnOnce(Rc<PopupController>) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let Some(popup) = self.this.upgrade() else {
            return;
        };
        if let Err(e) = self.spawner.spawn_local(task(popup)) {
            tracing::warn!(error = %e, "failed to spawn popup task");
        }
    }
}
