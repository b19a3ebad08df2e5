//! View bindings: the push-event handling one mounted listing table needs.
//!
//! A [`ViewBinding`] subscribes once to the seven listing events on the
//! shared [`PushChannel`], applies each to its [`ListingStore`], and tracks
//! the two pieces of view state the events interact with: which listing's
//! drawer is open, and the latest notice banner.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::channel::{PushChannel, Subscription};
use crate::event::{EventKind, ListingActed, PushEvent};
use crate::listing::RealEstateKind;
use crate::store::ListingStore;

/// Who performed the action a notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// The signed-in operator.
    Mine,
    /// Another operator.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    SavedToCrm,
    Duplicate,
}

/// Banner raised when a listing leaves the working queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub actor: Actor,
    pub real_estate_id: String,
    /// The drawer was open on this listing and has been closed.
    pub drawer_closed: bool,
}

struct BindingState {
    store: ListingStore,
    user_id: String,
    drawer: watch::Sender<Option<String>>,
    banner: watch::Sender<Option<Notice>>,
}

impl BindingState {
    fn apply(&self, event: &PushEvent) {
        match event {
            PushEvent::CallStarted(e) => {
                self.store.reserve_for_call(e);
            }
            PushEvent::CallEnded(e) => {
                self.store.cancel_reservation_for_call(&e.real_estate_id);
            }
            PushEvent::ClientDisconnected(e) => {
                self.store.handle_disconnect(&e.user_id);
            }
            PushEvent::RealEstateSaved(e) => self.listing_left(e, NoticeKind::SavedToCrm),
            PushEvent::DuplicateAdded(e) => self.listing_left(e, NoticeKind::Duplicate),
            PushEvent::StatusChanged(e) => {
                self.store.change_status(&e.real_estate_id, &e.status);
            }
            PushEvent::CommentAdded(e) => {
                if !self.store.increment_comment_count(&e.real_estate_id) {
                    return;
                }
                if let Some(comment) = &e.comment
                    && self.drawer_open_on(&e.real_estate_id)
                {
                    self.store.add_comment(&e.real_estate_id, comment.clone());
                }
            }
            PushEvent::PaymentCompleted(_) => {}
        }
    }

    fn drawer_open_on(&self, id: &str) -> bool {
        self.drawer.borrow().as_deref() == Some(id)
    }

    /// A listing was saved to the CRM or confirmed as a duplicate: drop it
    /// from the queue and tell the operator.
    fn listing_left(&self, event: &ListingActed, kind: NoticeKind) {
        let actor = if event.user_id == self.user_id {
            Actor::Mine
        } else {
            Actor::Other
        };
        let removed = self.store.remove_by_id(&event.real_estate_id);
        let drawer_open = self.drawer_open_on(&event.real_estate_id);
        if !removed && !drawer_open {
            return;
        }

        let drawer_closed = drawer_open && actor == Actor::Other;
        if drawer_closed {
            self.drawer.send_replace(None);
        }
        tracing::info!(
            kind = %self.store.kind(),
            real_estate_id = %event.real_estate_id,
            user_id = %event.user_id,
            ?actor,
            notice = ?kind,
            drawer_closed,
            "listing left the queue"
        );
        self.banner.send_replace(Some(Notice {
            kind,
            actor,
            real_estate_id: event.real_estate_id.clone(),
            drawer_closed,
        }));
    }
}

/// Push handling and view state for one mounted listing table.
///
/// Dropping the binding unregisters every handler it installed.
pub struct ViewBinding {
    state: Arc<BindingState>,
    _subscriptions: Vec<Subscription>,
}

impl fmt::Debug for ViewBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewBinding")
            .field("kind", &self.state.store.kind())
            .field("user_id", &self.state.user_id)
            .field("open_drawer", &*self.state.drawer.borrow())
            .finish()
    }
}

impl ViewBinding {
    /// Bind `store` to the listing events on `channel`.
    ///
    /// # Arguments
    ///
    /// * `channel` - The session's shared push channel.
    /// * `store` - Store for the table's kind.
    /// * `user_id` - The signed-in operator, used to tell "mine" from
    ///   "someone else's" actions.
    pub fn new(channel: &PushChannel, store: ListingStore, user_id: impl Into<String>) -> Self {
        let (drawer, _) = watch::channel(None);
        let (banner, _) = watch::channel(None);
        let state = Arc::new(BindingState {
            store,
            user_id: user_id.into(),
            drawer,
            banner,
        });

        let subscriptions = EventKind::LISTING_EVENTS
            .into_iter()
            .map(|kind| {
                let state = Arc::clone(&state);
                channel.on(kind, move |event| state.apply(event))
            })
            .collect();

        Self {
            state,
            _subscriptions: subscriptions,
        }
    }

    pub fn kind(&self) -> RealEstateKind {
        self.state.store.kind()
    }

    pub fn store(&self) -> &ListingStore {
        &self.state.store
    }

    /// Apply one event as if it had arrived on the channel.
    pub fn apply(&self, event: &PushEvent) {
        self.state.apply(event);
    }

    pub fn open_drawer(&self, real_estate_id: impl Into<String>) {
        self.state.drawer.send_replace(Some(real_estate_id.into()));
    }

    pub fn close_drawer(&self) {
        self.state.drawer.send_replace(None);
    }

    pub fn open_drawer_id(&self) -> Option<String> {
        self.state.drawer.borrow().clone()
    }

    /// The latest notice, until dismissed.
    pub fn banner(&self) -> Option<Notice> {
        self.state.banner.borrow().clone()
    }

    pub fn subscribe_banner(&self) -> watch::Receiver<Option<Notice>> {
        self.state.banner.subscribe()
    }

    pub fn dismiss_banner(&self) {
        self.state.banner.send_if_modified(|banner| banner.take().is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallEnded, CallStarted, ClientDisconnected, CommentAdded, StatusChanged};
    use crate::listing::Comment;
    use crate::store::test_fixtures::listings;
    use chrono::{TimeZone, Utc};

    fn setup(user: &str) -> (PushChannel, ViewBinding) {
        let channel = PushChannel::new();
        let store = ListingStore::with_listings(RealEstateKind::Flat, listings(&["a", "b"]));
        let binding = ViewBinding::new(&channel, store, user);
        (channel, binding)
    }

    fn acted(id: &str, user: &str) -> ListingActed {
        ListingActed {
            real_estate_id: id.into(),
            user_id: user.into(),
        }
    }

    fn comment_added(id: &str, with_body: bool) -> PushEvent {
        PushEvent::CommentAdded(CommentAdded {
            real_estate_id: id.into(),
            user_id: "u2".into(),
            comment: with_body.then(|| Comment {
                id: "c1".into(),
                user_id: "u2".into(),
                text: "called, no answer".into(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
            }),
        })
    }

    fn ids(binding: &ViewBinding) -> Vec<String> {
        binding
            .store()
            .snapshot()
            .listings
            .iter()
            .map(|l| l.id.clone())
            .collect()
    }

    #[test]
    fn subscribes_to_the_seven_listing_events() {
        let (channel, binding) = setup("u1");
        for kind in EventKind::LISTING_EVENTS {
            assert_eq!(channel.handler_count(kind), 1, "{kind}");
        }
        assert_eq!(channel.handler_count(EventKind::PaymentCompleted), 0);

        drop(binding);
        for kind in EventKind::LISTING_EVENTS {
            assert_eq!(channel.handler_count(kind), 0, "{kind}");
        }
    }

    #[test]
    fn call_lifecycle_flows_through_the_channel() {
        let (channel, binding) = setup("u1");
        channel.dispatch(&PushEvent::CallStarted(CallStarted {
            real_estate_id: "a".into(),
            user_id: "u2".into(),
            avatar_url: String::new(),
            full_name: "Other".into(),
        }));
        assert!(binding.store().snapshot().get("a").unwrap().is_reserved());

        channel.dispatch(&PushEvent::CallEnded(CallEnded {
            real_estate_id: "a".into(),
        }));
        assert!(!binding.store().snapshot().get("a").unwrap().is_reserved());

        channel.dispatch(&PushEvent::CallStarted(CallStarted {
            real_estate_id: "b".into(),
            user_id: "u2".into(),
            avatar_url: String::new(),
            full_name: "Other".into(),
        }));
        channel.dispatch(&PushEvent::ClientDisconnected(ClientDisconnected {
            user_id: "u2".into(),
        }));
        assert!(!binding.store().snapshot().get("b").unwrap().is_reserved());
    }

    #[test]
    fn duplicate_by_other_user_removes_and_flags_other() {
        let (channel, binding) = setup("u1");
        channel.dispatch(&PushEvent::DuplicateAdded(acted("a", "u2")));

        assert_eq!(ids(&binding), vec!["b"]);
        assert_eq!(
            binding.banner(),
            Some(Notice {
                kind: NoticeKind::Duplicate,
                actor: Actor::Other,
                real_estate_id: "a".into(),
                drawer_closed: false,
            })
        );
    }

    #[test]
    fn my_save_flags_mine_and_keeps_drawer() {
        let (_channel, binding) = setup("u1");
        binding.open_drawer("a");
        binding.apply(&PushEvent::RealEstateSaved(acted("a", "u1")));

        let notice = binding.banner().expect("notice raised");
        assert_eq!(notice.kind, NoticeKind::SavedToCrm);
        assert_eq!(notice.actor, Actor::Mine);
        assert!(!notice.drawer_closed);
        assert_eq!(binding.open_drawer_id().as_deref(), Some("a"));
    }

    #[test]
    fn other_users_save_closes_open_drawer() {
        let (_channel, binding) = setup("u1");
        binding.open_drawer("a");
        binding.apply(&PushEvent::RealEstateSaved(acted("a", "u2")));

        assert!(binding.open_drawer_id().is_none());
        assert!(binding.banner().expect("notice").drawer_closed);
    }

    #[test]
    fn save_for_unknown_listing_raises_nothing() {
        let (_channel, binding) = setup("u1");
        binding.apply(&PushEvent::RealEstateSaved(acted("zzz", "u2")));
        assert!(binding.banner().is_none());
        assert_eq!(ids(&binding), vec!["a", "b"]);
    }

    #[test]
    fn status_change_updates_record() {
        let (_channel, binding) = setup("u1");
        binding.apply(&PushEvent::StatusChanged(StatusChanged {
            real_estate_id: "b".into(),
            status: "NO_ANSWER".into(),
            user_id: None,
        }));
        assert_eq!(
            binding.store().snapshot().get("b").unwrap().status.as_deref(),
            Some("NO_ANSWER")
        );
    }

    #[test]
    fn comment_body_is_appended_only_when_drawer_is_open() {
        let (_channel, binding) = setup("u1");
        binding.apply(&comment_added("a", true));
        {
            let page = binding.store().snapshot();
            let a = page.get("a").unwrap();
            assert_eq!(a.counts.comments, 1);
            assert!(a.comments.is_empty());
        }

        binding.open_drawer("a");
        binding.apply(&comment_added("a", true));
        let page = binding.store().snapshot();
        let a = page.get("a").unwrap();
        assert_eq!(a.counts.comments, 2);
        assert_eq!(a.comments.len(), 1);
    }

    #[test]
    fn comment_without_body_only_moves_counter() {
        let (_channel, binding) = setup("u1");
        binding.open_drawer("a");
        binding.apply(&comment_added("a", false));
        let page = binding.store().snapshot();
        assert_eq!(page.get("a").unwrap().counts.comments, 1);
        assert!(page.get("a").unwrap().comments.is_empty());
    }

    #[tokio::test]
    async fn banner_subscribers_are_woken() {
        let (_channel, binding) = setup("u1");
        let mut rx = binding.subscribe_banner();
        binding.apply(&PushEvent::DuplicateAdded(acted("b", "u1")));

        rx.changed().await.expect("sender alive");
        let actor = (*rx.borrow_and_update()).as_ref().map(|n| n.actor);
        assert_eq!(actor, Some(Actor::Mine));

        binding.dismiss_banner();
        rx.changed().await.expect("sender alive");
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn dismissing_empty_banner_does_not_notify() {
        let (_channel, binding) = setup("u1");
        let rx = binding.subscribe_banner();
        binding.dismiss_banner();
        assert!(!rx.has_changed().expect("sender alive"));
    }
}
