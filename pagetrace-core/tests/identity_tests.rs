//! Identity and behavior ring tests

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pagetrace_core::identity::{
    Identity, IdentityStore, MemoryStore, StoreScope, SESSION_KEY, VISITOR_EXPIRY_KEY, VISITOR_KEY,
};
use pagetrace_core::{BehaviorRing, EnrichedEvent, Event};

#[test]
fn test_visitor_id_stable_within_day() {
    let store = Arc::new(MemoryStore::new());
    let identity = Identity::new(store.clone());

    let morning = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
    let evening = Utc.with_ymd_and_hms(2024, 6, 10, 22, 30, 0).unwrap();

    let id = identity.visitor_id_at(morning);
    assert_eq!(identity.visitor_id_at(evening), id);

    let expiry = Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap();
    assert_eq!(
        store.get(StoreScope::Persistent, VISITOR_EXPIRY_KEY),
        Some(expiry.timestamp_millis().to_string())
    );
    assert_eq!(store.get(StoreScope::Persistent, VISITOR_KEY), Some(id));
}

#[test]
fn test_visitor_id_rolls_over_next_day() {
    let identity = Identity::new(Arc::new(MemoryStore::new()));

    let today = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    let tomorrow = Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 1).unwrap();

    let first = identity.visitor_id_at(today);
    let second = identity.visitor_id_at(tomorrow);
    assert_ne!(first, second);
    assert_eq!(identity.visitor_id_at(tomorrow), second);
}

#[test]
fn test_visitor_id_regenerated_without_expiry() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(StoreScope::Persistent, VISITOR_KEY, "stale-id")
        .unwrap();

    let identity = Identity::new(store);
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    assert_ne!(identity.visitor_id_at(now), "stale-id");
}

#[test]
fn test_session_id_uses_session_scope() {
    let store = Arc::new(MemoryStore::new());
    let identity = Identity::new(store.clone());

    let id = identity.session_id();
    assert_eq!(store.get(StoreScope::Session, SESSION_KEY), Some(id.clone()));
    assert_eq!(store.get(StoreScope::Persistent, SESSION_KEY), None);
    assert_eq!(Identity::new(store).session_id(), id);
}

#[tokio::test]
async fn test_ring_keeps_last_hundred_in_order() {
    let ring = BehaviorRing::default();

    for i in 0..105 {
        let event = Event::at(Event::navigation("/from", "/to").kind, "/", i);
        ring.record(EnrichedEvent::bare(event));
    }
    assert_eq!(ring.evicted(), 5);

    let snapshot = ring.drain_and_rotate().await;
    let timestamps: Vec<i64> = snapshot
        .records
        .iter()
        .map(|r| r.event.event().timestamp)
        .collect();
    assert_eq!(timestamps, (5..105).collect::<Vec<i64>>());
    assert!(ring.is_empty());
    assert_ne!(ring.current_trace_id(), snapshot.trace_id);
}

#[tokio::test]
async fn test_concurrent_drains_are_disjoint() {
    let ring = Arc::new(BehaviorRing::new(10));
    for i in 0..4 {
        ring.record(EnrichedEvent::bare(Event::at(
            Event::navigation("/a", "/b").kind,
            "/",
            i,
        )));
    }

    let (a, b) = tokio::join!(ring.drain_and_rotate(), ring.drain_and_rotate());
    assert_eq!(a.records.len() + b.records.len(), 4);
    assert!(a.records.is_empty() || b.records.is_empty());
    assert_ne!(a.trace_id, b.trace_id);
}
