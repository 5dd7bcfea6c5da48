//! End-to-end: background, content runtime and popup wired through
//! in-memory hosts, talking to the mock extension API over HTTP.

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use background::{CallbackOutcome, Config, Coordinator, HttpServerApi, LocalBridge};
use common::{start_mock_server, MockServer, ACCESS_TOKEN, CODE, REFRESHED_TOKEN};
use content::overlay::{ContentState, MemorySurface};
use content::{
    ContentHost, ContentSession, Disposer, NavigationObserver, OverlayAction, OverlayConfig,
};
use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};
use host::{MemoryStorage, MemoryTabs, StorageArea, SystemClock, TabId};
use popup::{PopupAction, PopupActionSink, PopupConfig, PopupController, PopupView, PopupWindow};
use shared_types::{Rating, STORAGE_KEY_OAUTH_STATE, STORAGE_KEY_SESSION};
use tokio::task::LocalSet;
use url::Url;

const TWO_SUM: &str = "https://leetcode.com/problems/two-sum/description/";

/// Spawns onto the enclosing `LocalSet`.
struct LocalTasks;

impl LocalSpawn for LocalTasks {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        tokio::task::spawn_local(future);
        Ok(())
    }
}

/// Single-page app that never navigates.
struct StaticPage;

impl NavigationObserver for StaticPage {
    fn on_change(&self, _callback: content::navigation::NavigationCallback) -> Disposer {
        Disposer::new(|| {})
    }
}

#[derive(Default)]
struct PopupDocument {
    view: RefCell<Option<PopupView>>,
    closed: Cell<bool>,
    dispatch: RefCell<Option<PopupActionSink>>,
}

impl PopupDocument {
    fn press(&self, action: PopupAction) {
        let dispatch = self.dispatch.borrow().clone();
        if let Some(dispatch) = dispatch {
            dispatch(action);
        }
    }
}

impl PopupWindow for PopupDocument {
    fn bind(&self, dispatch: PopupActionSink) {
        *self.dispatch.borrow_mut() = Some(dispatch);
    }

    fn render(&self, view: &PopupView) {
        *self.view.borrow_mut() = Some(view.clone());
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

struct Extension {
    storage: Rc<MemoryStorage>,
    tabs: Rc<MemoryTabs>,
    coordinator: Rc<Coordinator>,
    bridge: Rc<LocalBridge>,
}

impl Extension {
    fn new(server: &MockServer) -> Self {
        let storage = Rc::new(MemoryStorage::new());
        let tabs = Rc::new(MemoryTabs::new());
        let config = Config {
            api_base: server.api_base(),
            ..Config::from_env().unwrap()
        };
        let api = HttpServerApi::new(&config.api_root()).unwrap();
        let coordinator = Rc::new(Coordinator::new(
            config,
            storage.clone(),
            Rc::new(api),
            tabs.clone(),
            Rc::new(SystemClock),
        ));
        let bridge = Rc::new(LocalBridge::new(coordinator.clone()));
        Self {
            storage,
            tabs,
            coordinator,
            bridge,
        }
    }

    async fn open_page(&self, url: &str) -> (Rc<ContentSession>, Rc<MemorySurface>) {
        let surface = Rc::new(MemorySurface::default());
        let session = ContentSession::new(
            ContentHost {
                messenger: self.bridge.clone(),
                storage: self.storage.clone(),
                clock: Rc::new(SystemClock),
                surface: surface.clone(),
                spawner: Rc::new(LocalTasks),
            },
            OverlayConfig::default(),
        );
        session.start(url, &StaticPage).await;
        (session, surface)
    }

    fn open_popup(&self) -> (Rc<PopupController>, Rc<PopupDocument>) {
        let document = Rc::new(PopupDocument::default());
        let popup = PopupController::new(
            self.bridge.clone(),
            self.storage.clone(),
            document.clone(),
            Rc::new(LocalTasks),
            PopupConfig::default(),
        );
        popup.open();
        (popup, document)
    }

    /// The connect tab the background opened, with its `state` nonce.
    fn connect_tab(&self) -> (TabId, String) {
        let (tab_id, url) = self.tabs.opened().last().cloned().expect("no connect tab");
        let url = Url::parse(&url).unwrap();
        assert_eq!(url.path(), "/extension/connect");
        let state = url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("connect url without state");
        (tab_id, state)
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn content_state(session: &ContentSession) -> Option<ContentState> {
    session.model().map(|m| m.content)
}

#[tokio::test]
async fn test_connect_flow_reaches_overlay_and_popup() {
    let server = start_mock_server().await;
    LocalSet::new()
        .run_until(async move {
            let ext = Extension::new(&server);
            let (session, surface) = ext.open_page(TWO_SUM).await;
            eventually("overlay to ask for a connection", || {
                content_state(&session) == Some(ContentState::NotConnected)
            })
            .await;

            let (_popup, document) = ext.open_popup();
            eventually("popup to show not connected", || {
                *document.view.borrow() == Some(PopupView::NotConnected)
            })
            .await;

            // Connect from the overlay; the background opens the connect tab.
            assert!(surface.interact(OverlayAction::Connect));
            eventually("connect tab", || !ext.tabs.opened().is_empty()).await;
            let (tab_id, state) = ext.connect_tab();
            assert!(ext.storage.contains(STORAGE_KEY_OAUTH_STATE));

            // The web app redirects the tab to the callback route.
            let callback = format!("https://revu.app/extension/callback?code={CODE}&state={state}");
            let outcome = ext.coordinator.on_tab_updated(tab_id, &callback).await;
            assert_eq!(outcome, CallbackOutcome::Connected);
            assert_eq!(ext.tabs.closed(), vec![tab_id]);
            assert!(!ext.storage.contains(STORAGE_KEY_OAUTH_STATE));

            // The session write reaches both the overlay and the open popup.
            eventually("overlay to load the problem", || {
                matches!(content_state(&session), Some(ContentState::Problem(_)))
            })
            .await;
            eventually("popup to show the account", || {
                matches!(
                    &*document.view.borrow(),
                    Some(PopupView::Connected { name, .. }) if name == "Ada Lovelace"
                )
            })
            .await;
            assert_eq!(server.state().lookups, vec!["leetcode/two-sum".to_string()]);

            // A replayed callback is not exchanged twice.
            let replay = ext.coordinator.on_tab_updated(tab_id, &callback).await;
            assert_eq!(replay, CallbackOutcome::Duplicate);
            assert_eq!(server.state().exchanged_codes.len(), 1);
        })
        .await;
}

#[tokio::test]
async fn test_mismatched_state_leaves_everything_untouched() {
    let server = start_mock_server().await;
    LocalSet::new()
        .run_until(async move {
            let ext = Extension::new(&server);
            let (popup, document) = ext.open_popup();
            eventually("popup to load", || {
                *document.view.borrow() == Some(PopupView::NotConnected)
            })
            .await;

            document.press(PopupAction::Connect);
            eventually("popup to close", || document.closed.get()).await;
            let (tab_id, _) = ext.connect_tab();

            let forged = format!("https://revu.app/extension/callback?code={CODE}&state=forged");
            let outcome = ext.coordinator.on_tab_updated(tab_id, &forged).await;
            assert_eq!(outcome, CallbackOutcome::StateMismatch);
            assert!(!ext.storage.contains(STORAGE_KEY_SESSION));
            assert!(ext.tabs.closed().is_empty());
            assert!(server.state().exchanged_codes.is_empty());
            popup.close();
        })
        .await;
}

#[tokio::test]
async fn test_review_round_trip_and_disconnect() {
    let server = start_mock_server().await;
    LocalSet::new()
        .run_until(async move {
            let ext = Extension::new(&server);
            ext.coordinator
                .on_tab_updated(1, &format!("https://revu.app/extension/callback?code={CODE}"))
                .await;
            assert!(ext.storage.contains(STORAGE_KEY_SESSION));

            let (session, surface) = ext.open_page(TWO_SUM).await;
            eventually("problem", || {
                matches!(content_state(&session), Some(ContentState::Problem(_)))
            })
            .await;

            assert!(surface.interact(OverlayAction::Review(Rating::Easy)));
            eventually("review to land", || {
                matches!(content_state(&session), Some(ContentState::Problem(p)) if p.review_count == 1)
            })
            .await;
            {
                let state = server.state();
                let review = &state.reviews[0];
                assert_eq!(review["rating"], "easy");
                assert!(review["timeSpentMs"].is_u64());
                assert!(review["clientEventId"].as_str().is_some_and(|id| id.len() == 36));
            }

            let (_popup, document) = ext.open_popup();
            eventually("popup to load", || {
                matches!(&*document.view.borrow(), Some(PopupView::Connected { .. }))
            })
            .await;
            document.press(PopupAction::Disconnect);
            eventually("popup to show not connected", || {
                *document.view.borrow() == Some(PopupView::NotConnected)
            })
            .await;
            eventually("overlay to show not connected", || {
                content_state(&session) == Some(ContentState::NotConnected)
            })
            .await;
        })
        .await;
}

#[tokio::test]
async fn test_server_rejection_revokes_session_everywhere() {
    let server = start_mock_server().await;
    LocalSet::new()
        .run_until(async move {
            let ext = Extension::new(&server);
            ext.coordinator
                .on_tab_updated(1, &format!("https://revu.app/extension/callback?code={CODE}"))
                .await;
            let (session, _surface) = ext.open_page(TWO_SUM).await;
            eventually("problem", || {
                matches!(content_state(&session), Some(ContentState::Problem(_)))
            })
            .await;

            // The server stops accepting the token it issued.
            server.state().valid_token = "rotated".to_string();
            session.refresh();
            eventually("overlay to show not connected", || {
                content_state(&session) == Some(ContentState::NotConnected)
            })
            .await;
            assert!(!ext.storage.contains(STORAGE_KEY_SESSION));
        })
        .await;
}

#[tokio::test]
async fn test_expired_session_is_refreshed_once() {
    let server = start_mock_server().await;
    LocalSet::new()
        .run_until(async move {
            let ext = Extension::new(&server);
            // A session thirty seconds from expiry, inside the refresh buffer.
            let expiring = serde_json::json!({
                "accessToken": ACCESS_TOKEN,
                "refreshToken": common::REFRESH_TOKEN,
                "expiresAt": (chrono::Utc::now() + chrono::Duration::seconds(30)).timestamp_millis(),
            });
            ext.storage.set(STORAGE_KEY_SESSION, expiring).await.unwrap();

            let (first, _a) = ext.open_page(TWO_SUM).await;
            let (second, _b) = ext.open_page(TWO_SUM).await;
            eventually("both overlays to load", || {
                [&first, &second]
                    .iter()
                    .all(|s| matches!(content_state(s), Some(ContentState::Problem(_))))
            })
            .await;

            assert_eq!(server.state().refreshes, 1);
            let stored = ext.storage.peek(STORAGE_KEY_SESSION).unwrap();
            assert_eq!(stored["accessToken"], REFRESHED_TOKEN);
            assert_eq!(stored["refreshToken"], common::REFRESH_TOKEN);
        })
        .await;
}
