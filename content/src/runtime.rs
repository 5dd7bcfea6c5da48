//! Per-injection content runtime.
//!
//! One [`ContentSession`] exists per injected page. It owns the overlay, the
//! review timer and every listener it installs, and is the only place where
//! navigation, storage changes, page activity and user actions meet.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::future::{abortable, AbortHandle, Aborted};
use futures::task::{LocalSpawn, LocalSpawnExt};
use host::storage::{load, store};
use host::{call, Clock, Messenger, MessagingError, StorageArea, StorageChange, Subscription};
use shared_types::{
    AttemptRecord, Connect, GetProblem, GetProblemResponse, MutationResponse, OverlayPosition,
    ProblemContext, ProblemData, Rating, ReviewProblem, SaveProblem, STORAGE_KEY_OVERLAY_POSITION,
    STORAGE_KEY_SESSION,
};
use uuid::Uuid;

use crate::config::OverlayConfig;
use crate::error::ContentError;
use crate::navigation::{Disposer, NavigationObserver};
use crate::overlay::{ActionSink, Overlay, OverlayAction, OverlayModel, OverlaySurface};
use crate::problem_context::resolve;
use crate::timer::ReviewTimer;

/// Host capabilities the runtime is wired to.
#[derive(Clone)]
pub struct ContentHost {
    pub messenger: Rc<dyn Messenger>,
    pub storage: Rc<dyn StorageArea>,
    pub clock: Rc<dyn Clock>,
    pub surface: Rc<dyn OverlaySurface>,
    pub spawner: Rc<dyn LocalSpawn>,
}

#[derive(Debug, Clone, Copy)]
struct Flags {
    page_visible: bool,
    page_focused: bool,
    /// A problem (tracked or not) is loaded and time on it counts.
    timing_enabled: bool,
    /// A review is in flight; activity changes must not restart the timer.
    submitting: bool,
}

impl Flags {
    fn page_active(&self) -> bool {
        self.page_visible && self.page_focused
    }
}

struct Inner {
    current_url: Option<String>,
    overlay: Option<Overlay>,
    timer: ReviewTimer,
    fetch: Option<AbortHandle>,
    generation: u64,
    /// Bumped on sign-out; writes started before it are answered into the void.
    auth_epoch: u64,
    flags: Flags,
    position: OverlayPosition,
    subscription: Option<Subscription>,
    navigation: Option<Disposer>,
    torn_down: bool,
}

impl Inner {
    fn abort_fetch(&mut self) {
        if let Some(handle) = self.fetch.take() {
            handle.abort();
        }
    }

    fn stop_timing(&mut self) {
        self.timer.pause();
        self.flags.timing_enabled = false;
    }

    fn start_timing(&mut self) {
        self.flags.timing_enabled = true;
        if !self.flags.submitting {
            self.timer.start(self.flags.page_active());
        }
    }

    /// Overlay for `context`, unless navigation replaced it meanwhile.
    fn overlay_for(&mut self, context: &ProblemContext) -> Option<&mut Overlay> {
        self.overlay
            .as_mut()
            .filter(|overlay| overlay.model().context == *context)
    }

    /// Overlay a write reply applies to: same page and no sign-out since the
    /// request went out.
    fn reply_target(&mut self, context: &ProblemContext, epoch: u64) -> Option<&mut Overlay> {
        if self.torn_down || self.auth_epoch != epoch {
            return None;
        }
        self.overlay_for(context)
    }

    fn show_problem(&mut self, problem: ProblemData) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.update(|m| m.show_problem(problem));
            self.start_timing();
        }
    }
}

pub struct ContentSession {
    this: Weak<ContentSession>,
    host: ContentHost,
    config: OverlayConfig,
    inner: RefCell<Inner>,
}

/// Outcome of a write request, with the background's failure envelope folded in.
fn mutation_outcome(
    reply: Result<MutationResponse, MessagingError>,
) -> Result<Option<ProblemData>, ContentError> {
    let response = reply?;
    if response.success {
        return Ok(response.problem);
    }
    Err(ContentError::from_reply(
        response.error.as_deref().unwrap_or("Request failed"),
    ))
}

fn fetch_outcome(
    reply: Result<GetProblemResponse, MessagingError>,
) -> Result<Option<ProblemData>, ContentError> {
    let response = reply?;
    if let Some(error) = response.error {
        return Err(ContentError::from_reply(&error));
    }
    Ok(response.problem.filter(|_| response.tracked))
}

impl ContentSession {
    pub fn new(host: ContentHost, config: OverlayConfig) -> Rc<Self> {
        let timer = ReviewTimer::new(Rc::clone(&host.clock));
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            host,
            config,
            inner: RefCell::new(Inner {
                current_url: None,
                overlay: None,
                timer,
                fetch: None,
                generation: 0,
                auth_epoch: 0,
                flags: Flags {
                    page_visible: true,
                    page_focused: true,
                    timing_enabled: false,
                    submitting: false,
                },
                position: OverlayPosition::default(),
                subscription: None,
                navigation: None,
                torn_down: false,
            }),
        })
    }

    /// Restore the bubble position, install listeners and resolve `url`.
    pub async fn start(&self, url: &str, observer: &dyn NavigationObserver) {
        let position = match load::<OverlayPosition>(
            self.host.storage.as_ref(),
            STORAGE_KEY_OVERLAY_POSITION,
        )
        .await
        {
            Ok(position) => position.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring stored overlay position");
                OverlayPosition::default()
            }
        };

        let weak = self.this.clone();
        let subscription = self.host.storage.subscribe(Rc::new(move |change: &StorageChange| {
            if let Some(session) = weak.upgrade() {
                session.on_storage_change(change);
            }
        }));
        let weak = self.this.clone();
        let navigation = observer.on_change(Rc::new(move |url: &str| {
            if let Some(session) = weak.upgrade() {
                session.handle_navigation(url);
            }
        }));

        {
            let mut inner = self.inner.borrow_mut();
            if inner.torn_down {
                return;
            }
            inner.position = position;
            inner.subscription = Some(subscription);
            inner.navigation = Some(navigation);
        }
        tracing::debug!(url, "content session started");
        self.handle_navigation(url);
    }

    /// React to a (possibly unchanged) page URL.
    pub fn handle_navigation(&self, url: &str) {
        let context = resolve(url);
        let stale = {
            let mut inner = self.inner.borrow_mut();
            if inner.torn_down {
                return;
            }
            inner.current_url = Some(url.to_string());
            let current = inner.overlay.as_ref().map(|o| o.model().context.clone());
            if current == context {
                return;
            }
            inner.abort_fetch();
            inner.stop_timing();
            inner.timer.reset();
            inner.flags.submitting = false;
            inner.overlay.take()
        };
        // Unmount outside the borrow; the surface may call back.
        drop(stale);

        let Some(context) = context else {
            tracing::debug!(url, "not a problem page");
            return;
        };
        tracing::info!(platform = %context.platform, slug = %context.slug, "problem page detected");

        {
            let mut inner = self.inner.borrow_mut();
            let overlay = Overlay::create(
                context,
                inner.position,
                self.config.allow_editing,
                Rc::clone(&self.host.surface),
                Rc::clone(&self.host.clock),
                self.config.clone(),
                self.action_sink(),
            );
            inner.overlay = Some(overlay);
        }
        self.load_problem();
    }

    /// Fetch the current problem, superseding any fetch in flight.
    pub fn load_problem(&self) {
        let (context, generation, fetch) = {
            let mut inner = self.inner.borrow_mut();
            let inner = &mut *inner;
            let Some(overlay) = inner.overlay.as_mut() else {
                return;
            };
            let context = overlay.model().context.clone();
            overlay.update(|m| m.begin_loading());
            inner.abort_fetch();
            inner.stop_timing();
            inner.generation += 1;

            let request = GetProblem {
                platform: context.platform,
                slug: context.slug.clone(),
            };
            let messenger = Rc::clone(&self.host.messenger);
            let (fetch, handle) =
                abortable(async move { call(messenger.as_ref(), request).await });
            inner.fetch = Some(handle);
            (context, inner.generation, fetch)
        };

        let weak = self.this.clone();
        self.spawn(async move {
            let reply = match fetch.await {
                Ok(reply) => reply,
                Err(Aborted) => {
                    tracing::trace!(%context, "problem fetch superseded");
                    return;
                }
            };
            if let Some(session) = weak.upgrade() {
                session.apply_fetch(generation, reply);
            }
        });
    }

    pub fn refresh(&self) {
        self.load_problem();
    }

    pub fn retry(&self) {
        tracing::debug!("retrying problem fetch");
        self.load_problem();
    }

    fn apply_fetch(&self, generation: u64, reply: Result<GetProblemResponse, MessagingError>) {
        let mut inner = self.inner.borrow_mut();
        if inner.torn_down || inner.generation != generation {
            return;
        }
        inner.fetch = None;
        let Some(overlay) = inner.overlay.as_mut() else {
            return;
        };
        match fetch_outcome(reply) {
            Ok(Some(problem)) => inner.show_problem(problem),
            Ok(None) => {
                overlay.update(|m| m.show_not_tracked());
                inner.start_timing();
            }
            Err(ContentError::Aborted) => {}
            Err(e) if e.is_auth() => overlay.update(|m| m.show_not_connected()),
            Err(e) => {
                tracing::warn!(error = %e, "problem fetch failed");
                overlay.update(|m| m.show_error(e.user_message()));
            }
        }
    }

    fn on_storage_change(&self, change: &StorageChange) {
        if change.key == STORAGE_KEY_SESSION {
            self.on_session_change(change.new_value.is_some());
        }
    }

    /// The persisted session appeared, changed or disappeared.
    pub fn on_session_change(&self, signed_in: bool) {
        let reload = {
            let mut inner = self.inner.borrow_mut();
            if inner.torn_down {
                return;
            }
            if signed_in {
                inner
                    .overlay
                    .as_mut()
                    .is_some_and(|overlay| overlay.update(|m| m.auth_restored()))
            } else {
                inner.auth_epoch += 1;
                inner.abort_fetch();
                inner.stop_timing();
                if let Some(overlay) = inner.overlay.as_mut() {
                    overlay.update(|m| m.show_not_connected());
                }
                false
            }
        };
        if reload {
            tracing::debug!("session restored, reloading problem");
            self.load_problem();
        }
    }

    /// `pagehide`. A page entering the back/forward cache is only paused;
    /// anything else is gone for good.
    pub fn page_hidden(&self, persisted: bool) {
        if persisted {
            tracing::debug!("page cached, pausing");
            self.set_visibility(false);
        } else {
            self.teardown();
        }
    }

    /// `pageshow` for a page restored from the back/forward cache. The
    /// problem may have changed meanwhile, so it is fetched again.
    pub fn page_restored(&self) {
        if self.inner.borrow().torn_down {
            return;
        }
        tracing::debug!("page restored from cache");
        self.set_visibility(true);
        self.refresh();
    }

    pub fn set_visibility(&self, visible: bool) {
        self.update_activity(|flags| flags.page_visible = visible);
    }

    pub fn set_focus(&self, focused: bool) {
        self.update_activity(|flags| flags.page_focused = focused);
    }

    fn update_activity(&self, change: impl FnOnce(&mut Flags)) {
        let mut inner = self.inner.borrow_mut();
        change(&mut inner.flags);
        let flags = inner.flags;
        if !flags.page_active() {
            inner.timer.pause();
        } else if flags.timing_enabled && !flags.submitting {
            inner.timer.start(true);
        }
    }

    /// Re-evaluate the view against the clock; a problem can become due
    /// while the page stays open.
    pub fn tick(&self) {
        self.with_overlay(Overlay::render);
    }

    pub fn dispatch(&self, action: OverlayAction) {
        tracing::trace!(?action, "overlay action");
        match action {
            OverlayAction::ToggleExpanded => {
                self.with_overlay(Overlay::toggle_expanded);
            }
            OverlayAction::Edit => {
                self.with_overlay(|o| o.update(|m| m.start_editing()));
            }
            OverlayAction::CancelEdit => {
                self.with_overlay(|o| o.update(|m| m.cancel_editing()));
            }
            OverlayAction::UpdateDraft(field, value) => {
                self.with_overlay(|o| o.update_quietly(|m| m.update_draft(field, value)));
            }
            OverlayAction::Save => self.save(),
            OverlayAction::Track => self.track(),
            OverlayAction::Review(rating) => self.review(rating),
            OverlayAction::Connect => self.connect(),
            OverlayAction::Retry => self.retry(),
            OverlayAction::DragStart { x, y } => {
                self.with_overlay(|o| o.begin_drag(x, y));
            }
            OverlayAction::DragMove { x, y } => {
                self.with_overlay(|o| o.drag_to(x, y));
            }
            OverlayAction::DragEnd => self.end_drag(),
        }
    }

    fn save(&self) {
        let epoch = self.inner.borrow().auth_epoch;
        let Some((context, draft)) = self
            .with_overlay(|o| {
                let context = o.model().context.clone();
                o.update(|m| m.begin_save()).map(|draft| (context, draft))
            })
            .flatten()
        else {
            return;
        };

        let request = SaveProblem {
            platform: context.platform,
            slug: context.slug.clone(),
            notes: Some(draft.notes),
            solution: draft.solution,
        };
        let messenger = Rc::clone(&self.host.messenger);
        let weak = self.this.clone();
        self.spawn(async move {
            let reply = call(messenger.as_ref(), request).await;
            let Some(session) = weak.upgrade() else {
                return;
            };
            let mut inner = session.inner.borrow_mut();
            let Some(overlay) = inner.reply_target(&context, epoch) else {
                tracing::debug!(%context, "dropping stale save reply");
                return;
            };
            match mutation_outcome(reply) {
                Ok(problem) => overlay.update(|m| m.save_succeeded(problem)),
                Err(e) if e.is_auth() => overlay.update(|m| m.show_not_connected()),
                Err(e) => {
                    tracing::warn!(error = %e, %context, "saving notes failed");
                    overlay.update(|m| m.save_failed());
                }
            }
        });
    }

    /// Start tracking the current problem by recording an attempt.
    fn track(&self) {
        let (record, epoch) = {
            let mut inner = self.inner.borrow_mut();
            let inner = &mut *inner;
            let Some(overlay) = inner.overlay.as_mut() else {
                return;
            };
            if overlay.model().busy {
                return;
            }
            overlay.update(|m| m.busy = true);
            let context = overlay.model().context.clone();
            let record = AttemptRecord {
                platform: context.platform,
                slug: context.slug,
                title: None,
                difficulty: None,
                url: inner.current_url.clone(),
                solved: true,
                time_spent_ms: Some(inner.timer.elapsed_ms()),
            };
            (record, inner.auth_epoch)
        };

        let context = ProblemContext::new(record.platform, record.slug.clone());
        let messenger = Rc::clone(&self.host.messenger);
        let weak = self.this.clone();
        self.spawn(async move {
            let reply = call(messenger.as_ref(), record).await;
            let Some(session) = weak.upgrade() else {
                return;
            };
            let reload = {
                let mut inner = session.inner.borrow_mut();
                let Some(overlay) = inner.reply_target(&context, epoch) else {
                    tracing::debug!(%context, "dropping stale tracking reply");
                    return;
                };
                match mutation_outcome(reply) {
                    Ok(Some(problem)) => {
                        tracing::info!(%context, "problem tracked");
                        inner.show_problem(problem);
                        false
                    }
                    Ok(None) => true,
                    Err(e) if e.is_auth() => {
                        overlay.update(|m| m.show_not_connected());
                        false
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, %context, "tracking failed");
                        overlay.update(|m| m.show_error(e.user_message()));
                        false
                    }
                }
            };
            if reload {
                session.load_problem();
            }
        });
    }

    /// Submit a rating with the time spent since the last reset.
    fn review(&self, rating: Rating) {
        let (request, epoch) = {
            let mut inner = self.inner.borrow_mut();
            let inner = &mut *inner;
            if inner.flags.submitting {
                return;
            }
            let Some(overlay) = inner.overlay.as_mut() else {
                return;
            };
            if overlay.model().problem().is_none() {
                return;
            }
            let context = overlay.model().context.clone();
            overlay.update(|m| m.busy = true);

            let time_spent_ms = inner.timer.elapsed_ms();
            inner.timer.pause();
            inner.flags.submitting = true;
            let request = ReviewProblem {
                platform: context.platform,
                slug: context.slug,
                rating: Some(rating),
                time_spent_ms: Some(time_spent_ms),
                client_event_id: Some(Uuid::new_v4().to_string()),
            };
            (request, inner.auth_epoch)
        };

        tracing::debug!(
            platform = %request.platform,
            slug = %request.slug,
            rating = rating.label(),
            time_spent_ms = request.time_spent_ms,
            "submitting review"
        );
        let context = ProblemContext::new(request.platform, request.slug.clone());
        let messenger = Rc::clone(&self.host.messenger);
        let weak = self.this.clone();
        self.spawn(async move {
            let reply = call(messenger.as_ref(), request).await;
            let Some(session) = weak.upgrade() else {
                return;
            };
            let reload = {
                let mut inner = session.inner.borrow_mut();
                inner.flags.submitting = false;
                if inner.reply_target(&context, epoch).is_none() {
                    tracing::debug!(%context, "dropping stale review reply");
                    return;
                }
                inner.timer.reset();
                let Some(overlay) = inner.overlay.as_mut() else {
                    return;
                };
                match mutation_outcome(reply) {
                    Ok(Some(problem)) => {
                        inner.show_problem(problem);
                        false
                    }
                    Ok(None) => true,
                    Err(e) if e.is_auth() => {
                        overlay.update(|m| m.show_not_connected());
                        inner.stop_timing();
                        false
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, %context, "review failed");
                        overlay.update(|m| m.show_error(e.user_message()));
                        inner.stop_timing();
                        false
                    }
                }
            };
            if reload {
                session.load_problem();
            }
        });
    }

    fn connect(&self) {
        let messenger = Rc::clone(&self.host.messenger);
        let weak = self.this.clone();
        self.spawn(async move {
            match call(messenger.as_ref(), Connect).await {
                Ok(response) if response.success => tracing::info!("connect page opened"),
                Ok(response) => {
                    tracing::warn!(error = ?response.error, "connect request rejected");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "connect request failed");
                    let message = ContentError::from(e).user_message();
                    if let Some(session) = weak.upgrade() {
                        session.with_overlay(|o| o.update(|m| m.show_error(message)));
                    }
                }
            }
        });
    }

    fn end_drag(&self) {
        let Some(position) = self.with_overlay(|o| o.end_drag()).flatten() else {
            return;
        };
        self.inner.borrow_mut().position = position;
        let storage = Rc::clone(&self.host.storage);
        self.spawn(async move {
            if let Err(e) = store(storage.as_ref(), STORAGE_KEY_OVERLAY_POSITION, &position).await
            {
                tracing::warn!(error = %e, "failed to persist overlay position");
            }
        });
    }

    /// Stop everything and remove every listener. Idempotent.
    pub fn teardown(&self) {
        let (overlay, subscription, navigation) = {
            let mut inner = self.inner.borrow_mut();
            if inner.torn_down {
                return;
            }
            inner.torn_down = true;
            inner.abort_fetch();
            inner.stop_timing();
            (
                inner.overlay.take(),
                inner.subscription.take(),
                inner.navigation.take(),
            )
        };
        drop(overlay);
        drop(subscription);
        drop(navigation);
        tracing::debug!("content session torn down");
    }

    pub fn context(&self) -> Option<ProblemContext> {
        self.inner
            .borrow()
            .overlay
            .as_ref()
            .map(|o| o.model().context.clone())
    }

    pub fn model(&self) -> Option<OverlayModel> {
        self.inner.borrow().overlay.as_ref().map(|o| o.model().clone())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.inner.borrow().timer.elapsed_ms()
    }

    pub fn timer_running(&self) -> bool {
        self.inner.borrow().timer.is_running()
    }

    fn with_overlay<R>(&self, f: impl FnOnce(&mut Overlay) -> R) -> Option<R> {
        self.inner.borrow_mut().overlay.as_mut().map(f)
    }

    fn action_sink(&self) -> ActionSink {
        let weak = self.this.clone();
        Rc::new(move |action: OverlayAction| {
            if let Some(session) = weak.upgrade() {
                session.dispatch(action);
            }
        })
    }

    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        if let Err(e) = self.host.spawner.spawn_local(task) {
            tracing::warn!(error = %e, "failed to spawn content task");
        }
    }
}

impl Drop for ContentSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
