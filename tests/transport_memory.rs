// tests/transport_memory.rs

//! Reference semantics of the in-memory broker, exercised through the
//! domain-level transport traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::sleep;

use durapub::{
    // ---
    AckId,
    Delivery,
    Error,
    MemoryBroker,
    QueueGroup,
    StartPosition,
    Subject,
    SubscribeOptions,
};

/// Give the per-subscription drain tasks a chance to run.
async fn settle() {
    sleep(Duration::from_millis(50)).await;
}

fn collecting_handler(
    seen: Arc<Mutex<Vec<(u64, Bytes)>>>,
) -> Box<dyn FnMut(Delivery) + Send> {
    Box::new(move |mut delivery: Delivery| {
        delivery.ack().expect("memory broker acks never fail");
        seen.lock()
            .unwrap()
            .push((delivery.sequence, delivery.data.clone()));
    })
}

#[tokio::test]
async fn memory_subscribe_then_publish_delivers() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("test.subject").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    conn.subscribe(
        &subject,
        None,
        collecting_handler(seen.clone()),
        SubscribeOptions::default(),
    )
    .await
    .expect("subscribe failed");

    conn.publish(&subject, Bytes::from_static(b"hello"))
        .await
        .expect("publish failed");
    settle().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], (1, Bytes::from_static(b"hello")));
}

#[tokio::test]
async fn memory_matching_is_exact() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();

    let seen = Arc::new(Mutex::new(Vec::new()));
    conn.subscribe(
        &Subject::new("orders.created").unwrap(),
        None,
        collecting_handler(seen.clone()),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    conn.publish(
        &Subject::new("orders.cancelled").unwrap(),
        Bytes::from_static(b"other"),
    )
    .await
    .unwrap();
    settle().await;

    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn memory_sequences_increase_per_subject() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("seq.test").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    conn.subscribe(
        &subject,
        None,
        collecting_handler(seen.clone()),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    for body in [&b"a"[..], b"b", b"c"] {
        conn.publish(&subject, Bytes::copy_from_slice(body))
            .await
            .unwrap();
    }
    settle().await;

    let sequences: Vec<u64> = seen.lock().unwrap().iter().map(|(seq, _)| *seq).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test]
async fn memory_queue_group_load_shares() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("work.items").unwrap();
    let queue = QueueGroup::from("workers");

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    for seen in [&first, &second] {
        conn.subscribe(
            &subject,
            Some(&queue),
            collecting_handler(seen.clone()),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();
    }

    for i in 0..4u8 {
        conn.publish(&subject, Bytes::copy_from_slice(&[i]))
            .await
            .unwrap();
    }
    settle().await;

    let first_count = first.lock().unwrap().len();
    let second_count = second.lock().unwrap().len();
    assert_eq!(first_count + second_count, 4, "each message delivered once");
    assert!(first_count > 0 && second_count > 0, "load actually shared");
}

#[tokio::test]
async fn memory_fan_out_without_queue_group() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("events").unwrap();

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    for seen in [&first, &second] {
        conn.subscribe(
            &subject,
            None,
            collecting_handler(seen.clone()),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();
    }

    conn.publish(&subject, Bytes::from_static(b"evt")).await.unwrap();
    settle().await;

    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn memory_replays_history_per_start_position() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("audit.log").unwrap();

    for body in [&b"one"[..], b"two", b"three"] {
        conn.publish(&subject, Bytes::copy_from_slice(body))
            .await
            .unwrap();
    }

    let all = Arc::new(Mutex::new(Vec::new()));
    conn.subscribe(
        &subject,
        None,
        collecting_handler(all.clone()),
        SubscribeOptions {
            start: StartPosition::DeliverAll,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let last = Arc::new(Mutex::new(Vec::new()));
    conn.subscribe(
        &subject,
        None,
        collecting_handler(last.clone()),
        SubscribeOptions {
            start: StartPosition::LastReceived,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let from_two = Arc::new(Mutex::new(Vec::new()));
    conn.subscribe(
        &subject,
        None,
        collecting_handler(from_two.clone()),
        SubscribeOptions {
            start: StartPosition::Sequence(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    settle().await;

    assert_eq!(all.lock().unwrap().len(), 3);
    assert_eq!(
        last.lock().unwrap().as_slice(),
        &[(3, Bytes::from_static(b"three"))]
    );
    assert_eq!(from_two.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn memory_ack_clears_pending() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("pending.test").unwrap();

    // First subscriber never acks, second acks everything.
    conn.subscribe(
        &subject,
        None,
        Box::new(|_delivery: Delivery| {}),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    conn.subscribe(
        &subject,
        None,
        collecting_handler(seen.clone()),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    conn.publish(&subject, Bytes::from_static(b"x")).await.unwrap();
    settle().await;

    assert_eq!(broker.pending_acks(), 1, "only the silent subscriber owes an ack");
}

#[tokio::test]
async fn memory_publish_async_fires_ack_callback() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("async.test").unwrap();

    let acked = Arc::new(AtomicUsize::new(0));
    let acked_in_handler = acked.clone();
    let returned_id: AckId = conn
        .publish_async(
            &subject,
            Bytes::from_static(b"payload"),
            Arc::new(move |_id: &AckId, err: Option<&Error>| {
                assert!(err.is_none());
                acked_in_handler.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

    settle().await;

    assert!(!returned_id.as_str().is_empty());
    assert_eq!(acked.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn memory_unsubscribe_stops_delivery() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("stop.test").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let subscription = conn
        .subscribe(
            &subject,
            None,
            collecting_handler(seen.clone()),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

    conn.publish(&subject, Bytes::from_static(b"before")).await.unwrap();
    settle().await;

    subscription.unsubscribe().await.unwrap();

    conn.publish(&subject, Bytes::from_static(b"after")).await.unwrap();
    settle().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, Bytes::from_static(b"before"));
}

#[tokio::test]
async fn memory_closed_broker_rejects_operations() {
    // ---
    let broker = MemoryBroker::new();
    let conn = broker.durable_conn();
    let subject = Subject::new("closed.test").unwrap();

    conn.close().await.unwrap();

    let err = conn
        .publish(&subject, Bytes::from_static(b"late"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    // Closing again is a no-op.
    conn.close().await.unwrap();
}
