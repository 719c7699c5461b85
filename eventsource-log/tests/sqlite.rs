//! File-backed SQLite tests: persistence across reopen and allocation shared
//! between independent connections.

use eventsource_log::{
    EventId, EventStore, SequenceAllocator, Sequenced, SqliteDatabase, SqliteEventStore,
    SqliteSequenceAllocator,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestEvent {
    id: EventId,
    data: String,
}

impl Sequenced for TestEvent {
    fn sequence(&self) -> EventId {
        self.id
    }
}

#[tokio::test]
async fn events_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("events.db");

    {
        let store: SqliteEventStore<TestEvent> = SqliteEventStore::open(&path).unwrap();
        for id in 1..=3 {
            store
                .append(&TestEvent {
                    id,
                    data: format!("payload-{id}"),
                })
                .await
                .unwrap();
        }
    }

    let store: SqliteEventStore<TestEvent> = SqliteEventStore::open(&path).unwrap();
    let events: Vec<TestEvent> = store.query_from(1, 100).await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, 2);
    assert_eq!(events[1].data, "payload-3");
}

#[tokio::test]
async fn counter_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");

    {
        let allocator = SqliteSequenceAllocator::new(SqliteDatabase::open(&path).unwrap(), "seq");
        assert_eq!(allocator.next_id().await.unwrap(), 1);
        assert_eq!(allocator.next_id().await.unwrap(), 2);
    }

    let allocator = SqliteSequenceAllocator::new(SqliteDatabase::open(&path).unwrap(), "seq");
    assert_eq!(allocator.next_id().await.unwrap(), 3);
}

#[tokio::test]
async fn separate_connections_never_share_an_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");

    let first = std::sync::Arc::new(SqliteSequenceAllocator::new(
        SqliteDatabase::open(&path).unwrap(),
        "events.sequence",
    ));
    let second = std::sync::Arc::new(SqliteSequenceAllocator::new(
        SqliteDatabase::open(&path).unwrap(),
        "events.sequence",
    ));

    let mut handles = vec![];
    for allocator in [first, second] {
        handles.push(tokio::spawn(async move {
            let mut ids = vec![];
            for _ in 0..25 {
                ids.push(allocator.next_id().await.unwrap());
            }
            ids
        }));
    }

    let mut all = vec![];
    for handle in handles {
        let ids = handle.await.unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids increase per caller");
        all.extend(ids);
    }
    all.sort_unstable();
    all.dedup();

    assert_eq!(all, (1..=50).collect::<Vec<_>>());
}
