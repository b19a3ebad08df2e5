//! End-to-end push → store → binding flow through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use realty_desk::{
    Actor, CallEnded, CallStarted, ClientDisconnected, EventKind, Listing, ListingActed,
    ListingStore, NoticeKind, PushChannel, PushEvent, RealEstateKind, ViewBinding,
    decode_push_frame,
};

fn store(ids: &[&str]) -> ListingStore {
    ListingStore::with_listings(
        RealEstateKind::Flat,
        ids.iter().map(|id| Listing::new(*id)).collect(),
    )
}

fn call_started(id: &str, user: &str) -> PushEvent {
    PushEvent::CallStarted(CallStarted {
        real_estate_id: id.into(),
        user_id: user.into(),
        avatar_url: String::new(),
        full_name: "X".into(),
    })
}

fn caller(store: &ListingStore, id: &str) -> Option<String> {
    store
        .snapshot()
        .get(id)
        .and_then(|l| l.calling_user.as_ref().map(|c| c.user_id.clone()))
}

fn ids(store: &ListingStore) -> Vec<String> {
    store.snapshot().listings.iter().map(|l| l.id.clone()).collect()
}

#[test]
fn call_ended_clears_reservation() {
    let channel = PushChannel::new();
    let store = store(&["a", "b"]);
    let _binding = ViewBinding::new(&channel, store.clone(), "u1");

    channel.dispatch(&call_started("a", "u2"));
    assert_eq!(caller(&store, "a").as_deref(), Some("u2"));

    channel.dispatch(&PushEvent::CallEnded(CallEnded {
        real_estate_id: "a".into(),
    }));
    assert_eq!(caller(&store, "a"), None);
}

#[test]
fn disconnect_clears_only_that_operators_listing() {
    let channel = PushChannel::new();
    let store = store(&["a", "b", "c"]);
    let _binding = ViewBinding::new(&channel, store.clone(), "u1");
    channel.dispatch(&call_started("a", "u2"));
    channel.dispatch(&call_started("b", "u3"));

    channel.dispatch(&PushEvent::ClientDisconnected(ClientDisconnected {
        user_id: "u2".into(),
    }));

    assert_eq!(caller(&store, "a"), None);
    assert_eq!(caller(&store, "b").as_deref(), Some("u3"));
    assert_eq!(caller(&store, "c"), None);
}

#[test]
fn saved_event_removes_exactly_that_record() {
    let channel = PushChannel::new();
    let store = store(&["a", "b", "c"]);
    let _binding = ViewBinding::new(&channel, store.clone(), "u1");

    channel.dispatch(&PushEvent::RealEstateSaved(ListingActed {
        real_estate_id: "b".into(),
        user_id: "u2".into(),
    }));

    assert_eq!(ids(&store), vec!["a", "c"]);
}

#[test]
fn comment_count_is_exact_under_interleaved_favourite_toggles() {
    let store = store(&["a"]);
    for i in 0..7 {
        store.increment_comment_count("a");
        store.set_favourite("a", i % 2 == 0);
    }
    let page = store.snapshot();
    let a = page.get("a").expect("a present");
    assert_eq!(a.counts.comments, 7);
    assert!(a.is_favourite);
}

#[test]
fn call_started_reserves_only_the_named_listing() {
    let channel = PushChannel::new();
    let store = store(&["a", "b"]);
    let _binding = ViewBinding::new(&channel, store.clone(), "u1");

    let frame = r#"{"event":"CALL_STARTED","data":{"realEstateId":"a","userId":"u1","fullName":"X","avatarUrl":""}}"#;
    let event = decode_push_frame(frame).expect("well-formed frame");
    channel.dispatch(&event);

    assert_eq!(caller(&store, "a").as_deref(), Some("u1"));
    assert_eq!(caller(&store, "b"), None);
}

#[test]
fn duplicate_by_another_operator_raises_other_notice() {
    let channel = PushChannel::new();
    let store = store(&["a", "b"]);
    let binding = ViewBinding::new(&channel, store.clone(), "u1");

    channel.dispatch(&PushEvent::DuplicateAdded(ListingActed {
        real_estate_id: "a".into(),
        user_id: "u2".into(),
    }));

    assert_eq!(ids(&store), vec!["b"]);
    let notice = binding.banner().expect("notice raised");
    assert_eq!(notice.kind, NoticeKind::Duplicate);
    assert_eq!(notice.actor, Actor::Other);
}

#[test]
fn replacing_a_handler_twice_leaves_one() {
    let channel = PushChannel::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let register = || {
        let hits = Arc::clone(&hits);
        channel.replace(EventKind::CallEnded, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    };
    let _first = register();
    let _second = register();

    assert_eq!(channel.handler_count(EventKind::CallEnded), 1);
    channel.dispatch(&PushEvent::CallEnded(CallEnded {
        real_estate_id: "a".into(),
    }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn two_tables_share_one_channel_without_crosstalk() {
    let channel = PushChannel::new();
    let flats = store(&["a"]);
    let houses = ListingStore::with_listings(RealEstateKind::House, vec![Listing::new("h1")]);
    let _flat_binding = ViewBinding::new(&channel, flats.clone(), "u1");
    let house_binding = ViewBinding::new(&channel, houses.clone(), "u1");

    channel.dispatch(&call_started("h1", "u2"));

    assert_eq!(caller(&houses, "h1").as_deref(), Some("u2"));
    assert_eq!(caller(&flats, "a"), None);

    drop(house_binding);
    assert_eq!(channel.handler_count(EventKind::CallStarted), 1);
}

#[tokio::test]
async fn store_subscribers_see_push_mutations() {
    let channel = PushChannel::new();
    let store = store(&["a", "b"]);
    let _binding = ViewBinding::new(&channel, store.clone(), "u1");
    let mut rx = store.subscribe();

    channel.dispatch(&call_started("b", "u2"));

    rx.changed().await.expect("store alive");
    let page = rx.borrow_and_update().clone();
    assert!(page.get("b").expect("b present").is_reserved());
}
