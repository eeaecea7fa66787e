// src/transport/memory/broker.rs

//! In-memory broker.
//!
//! This file contains the concrete implementation of the domain-level
//! [`CoreConn`], [`DurableConn`] and [`DurableConnector`] traits using
//! in-process data structures only.
//!
//! The memory broker is the **reference implementation** of transport
//! semantics. Other transports are expected to approximate this behavior
//! as closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! ## Semantics
//!
//! - Subject matching is exact string equality; no wildcards.
//! - Durable subjects carry a monotonically increasing sequence and a
//!   retained history, so late subscribers can replay per
//!   [`StartPosition`].
//! - Plain subscriptions fan out; queue-group subscriptions round-robin
//!   within their group.
//! - Deliveries are handed to each subscription's handler from a
//!   dedicated task, one at a time per subscription.
//! - Acknowledging a delivery clears it from that subscription's pending
//!   set ([`MemoryBroker::pending_acks`] exposes the count).
//!
//! ## Non-Goals
//!
//! - Persistence across process restarts
//! - Network behavior or failure simulation
//! - Redelivery scheduling (nothing here re-sends an unacked message)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::StreamingConfig;
use crate::domain::{
    //
    AckHandler,
    AckId,
    CoreConn,
    Delivery,
    DurableConn,
    DurableConnPtr,
    DurableConnector,
    QueueGroup,
    RawHandler,
    RequestHandler,
    StartPosition,
    Subject,
    SubscribeOptions,
    Subscription,
    SubscriptionPtr,
};
use crate::{Error, Result};

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// The protected maps hold best-effort routing state; there are no
/// invariants spanning multiple fields, so continuing after another
/// task's panic is safe.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// One message retained in a subject's history.
struct StoredMsg {
    sequence: u64,
    timestamp: i64,
    data: Bytes,
}

/// A registered durable subscription.
struct DurableSub {
    id: u64,
    queue: Option<QueueGroup>,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Per-subject durable state.
#[derive(Default)]
struct SubjectState {
    sequence: u64,
    history: Vec<StoredMsg>,
    subs: Vec<DurableSub>,
}

/// A registered point-to-point responder.
struct Responder {
    id: u64,
    handler: Arc<Mutex<RequestHandler>>,
}

struct State {
    closed: AtomicBool,
    next_sub_id: AtomicU64,
    subjects: Mutex<HashMap<Subject, SubjectState>>,
    // Round-robin cursors for queue-group delivery.
    rr: Mutex<HashMap<(Subject, QueueGroup), usize>>,
    // (subscription id, sequence) pairs delivered but not yet acked.
    pending: Mutex<std::collections::HashSet<(u64, u64)>>,
    responders: Mutex<HashMap<Subject, Vec<Responder>>>,
    rr_requests: Mutex<HashMap<Subject, usize>>,
    connections: Mutex<Vec<(String, String)>>,
    published: Mutex<Vec<(Subject, Bytes)>>,
}

impl State {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::transport("broker closed"));
        }
        Ok(())
    }
}

/// In-process broker implementing both transport substrates.
///
/// Cheap to clone; clones share the same broker state.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<State>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State {
                closed: AtomicBool::new(false),
                next_sub_id: AtomicU64::new(1),
                subjects: Mutex::new(HashMap::new()),
                rr: Mutex::new(HashMap::new()),
                pending: Mutex::new(std::collections::HashSet::new()),
                responders: Mutex::new(HashMap::new()),
                rr_requests: Mutex::new(HashMap::new()),
                connections: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
            }),
        }
    }

    /// This broker as a point-to-point connection handle.
    pub fn core_conn(&self) -> Arc<dyn CoreConn> {
        Arc::new(self.clone())
    }

    /// This broker as a durable connection handle.
    pub fn durable_conn(&self) -> DurableConnPtr {
        Arc::new(self.clone())
    }

    /// Every `(subject, bytes)` pair published on the durable side, in
    /// publish order. Introspection for tests and diagnostics.
    pub fn published(&self) -> Vec<(Subject, Bytes)> {
        lock_ignore_poison(&self.state.published).clone()
    }

    /// Deliveries handed out but not yet acknowledged.
    pub fn pending_acks(&self) -> usize {
        lock_ignore_poison(&self.state.pending).len()
    }

    /// `(cluster_id, client_id)` pairs seen by the connector, in
    /// connection order.
    pub fn connections(&self) -> Vec<(String, String)> {
        lock_ignore_poison(&self.state.connections).clone()
    }

    fn next_sub_id(&self) -> u64 {
        self.state.next_sub_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Build a delivery whose ack clears the pending entry.
    fn make_delivery(
        state: &Arc<State>,
        sub_id: u64,
        subject: Subject,
        msg: &StoredMsg,
        redelivered: bool,
    ) -> Delivery {
        // ---
        let weak: Weak<State> = Arc::downgrade(state);
        let sequence = msg.sequence;

        Delivery::new(
            subject,
            msg.sequence,
            msg.timestamp,
            msg.data.clone(),
            redelivered,
            move || {
                if let Some(state) = weak.upgrade() {
                    lock_ignore_poison(&state.pending).remove(&(sub_id, sequence));
                }
                Ok(())
            },
        )
    }

    /// Append to the subject's history and route to current subscribers.
    fn store_and_route(&self, subject: &Subject, data: Bytes) -> Result<()> {
        // ---
        self.state.check_open()?;

        lock_ignore_poison(&self.state.published).push((subject.clone(), data.clone()));

        let mut subjects = lock_ignore_poison(&self.state.subjects);
        let entry = subjects.entry(subject.clone()).or_default();

        entry.sequence += 1;
        let msg = StoredMsg {
            sequence: entry.sequence,
            timestamp: now_nanos(),
            data,
        };

        // Fan out to plain subscriptions, round-robin within each queue
        // group.
        let mut targets: Vec<(u64, &mpsc::UnboundedSender<Delivery>)> = Vec::new();
        let mut groups: HashMap<&QueueGroup, Vec<&DurableSub>> = HashMap::new();

        for sub in &entry.subs {
            match &sub.queue {
                None => targets.push((sub.id, &sub.tx)),
                Some(queue) => groups.entry(queue).or_default().push(sub),
            }
        }

        {
            let mut rr = lock_ignore_poison(&self.state.rr);
            for (queue, members) in groups {
                let cursor = rr
                    .entry((subject.clone(), queue.clone()))
                    .or_insert(0);
                let chosen = members[*cursor % members.len()];
                *cursor = cursor.wrapping_add(1);
                targets.push((chosen.id, &chosen.tx));
            }
        }

        let mut pending = lock_ignore_poison(&self.state.pending);
        for (sub_id, tx) in targets {
            pending.insert((sub_id, msg.sequence));
            let delivery = Self::make_delivery(&self.state, sub_id, subject.clone(), &msg, false);
            // A closed channel means the drain task is gone; the pending
            // entry stays, which is what an unacked delivery looks like.
            let _ = tx.send(delivery);
        }
        drop(pending);

        entry.history.push(msg);
        Ok(())
    }

    /// History slice a new subscription should replay for `start`.
    fn replay_range(history: &[StoredMsg], start: StartPosition) -> &[StoredMsg] {
        // ---
        match start {
            StartPosition::NewOnly => &[],
            StartPosition::DeliverAll => history,
            StartPosition::LastReceived => {
                if history.is_empty() {
                    &[]
                } else {
                    &history[history.len() - 1..]
                }
            }
            StartPosition::Sequence(seq) => {
                let from = history.partition_point(|msg| msg.sequence < seq);
                &history[from..]
            }
        }
    }

    fn close_all(&self) {
        // Idempotent: repeated closes are no-ops.
        self.state.closed.store(true, Ordering::SeqCst);
        lock_ignore_poison(&self.state.subjects).clear();
        lock_ignore_poison(&self.state.responders).clear();
        lock_ignore_poison(&self.state.rr).clear();
        lock_ignore_poison(&self.state.rr_requests).clear();
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("closed", &self.state.closed.load(Ordering::SeqCst))
            .finish()
    }
}

enum SubKind {
    Durable,
    Responder,
}

/// Handle to a live memory-broker subscription.
struct MemorySubscription {
    state: Weak<State>,
    kind: SubKind,
    subject: Subject,
    id: u64,
}

#[async_trait::async_trait]
impl Subscription for MemorySubscription {
    async fn unsubscribe(&self) -> Result<()> {
        // ---
        let Some(state) = self.state.upgrade() else {
            return Ok(());
        };

        match self.kind {
            SubKind::Durable => {
                let mut subjects = lock_ignore_poison(&state.subjects);
                if let Some(entry) = subjects.get_mut(&self.subject) {
                    entry.subs.retain(|sub| sub.id != self.id);
                }
            }
            SubKind::Responder => {
                let mut responders = lock_ignore_poison(&state.responders);
                if let Some(entries) = responders.get_mut(&self.subject) {
                    entries.retain(|responder| responder.id != self.id);
                }
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl CoreConn for MemoryBroker {
    async fn request(&self, subject: &Subject, data: Bytes, timeout: Duration) -> Result<Bytes> {
        // ---
        self.state.check_open()?;

        let handler = {
            let responders = lock_ignore_poison(&self.state.responders);
            match responders.get(subject) {
                Some(entries) if !entries.is_empty() => {
                    let mut rr = lock_ignore_poison(&self.state.rr_requests);
                    let cursor = rr.entry(subject.clone()).or_insert(0);
                    let chosen = &entries[*cursor % entries.len()];
                    *cursor = cursor.wrapping_add(1);
                    Some(chosen.handler.clone())
                }
                _ => None,
            }
        };

        let Some(handler) = handler else {
            // Nobody to answer; behave like a silent network.
            tokio::time::sleep(timeout).await;
            return Err(Error::Timeout);
        };

        let reply = {
            let mut handler = lock_ignore_poison(&handler);
            (*handler)(data)
        };

        match reply {
            Ok(Some(bytes)) => Ok(bytes),
            // A responder that declines or fails is indistinguishable
            // from no reply at all.
            Ok(None) | Err(_) => {
                tokio::time::sleep(timeout).await;
                Err(Error::Timeout)
            }
        }
    }

    async fn subscribe(
        &self,
        subject: &Subject,
        _queue: Option<&QueueGroup>,
        handler: RequestHandler,
    ) -> Result<SubscriptionPtr> {
        // ---
        self.state.check_open()?;

        let id = self.next_sub_id();
        let mut responders = lock_ignore_poison(&self.state.responders);
        responders.entry(subject.clone()).or_default().push(Responder {
            id,
            handler: Arc::new(Mutex::new(handler)),
        });

        Ok(Box::new(MemorySubscription {
            state: Arc::downgrade(&self.state),
            kind: SubKind::Responder,
            subject: subject.clone(),
            id,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.close_all();
        Ok(())
    }
}

#[async_trait::async_trait]
impl DurableConn for MemoryBroker {
    async fn publish(&self, subject: &Subject, data: Bytes) -> Result<()> {
        // In-process delivery is immediate, so routing doubles as the
        // cluster acknowledgement.
        self.store_and_route(subject, data)
    }

    async fn publish_async(
        &self,
        subject: &Subject,
        data: Bytes,
        ack_handler: AckHandler,
    ) -> Result<AckId> {
        // ---
        self.store_and_route(subject, data)?;

        let id = AckId::generate();
        let callback_id = id.clone();
        // The ack callback fires on broker concurrency, not the
        // publisher's call stack.
        tokio::spawn(async move {
            ack_handler(&callback_id, None);
        });

        Ok(id)
    }

    async fn subscribe(
        &self,
        subject: &Subject,
        queue: Option<&QueueGroup>,
        handler: RawHandler,
        options: SubscribeOptions,
    ) -> Result<SubscriptionPtr> {
        // ---
        self.state.check_open()?;

        let id = self.next_sub_id();
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

        // One drain task per subscription; deliveries for a subscription
        // are handed to its handler strictly one at a time.
        let mut handler = handler;
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                handler(delivery);
            }
        });

        let mut subjects = lock_ignore_poison(&self.state.subjects);
        let entry = subjects.entry(subject.clone()).or_default();

        // Replay retained history per the requested start position.
        {
            let mut pending = lock_ignore_poison(&self.state.pending);
            for msg in Self::replay_range(&entry.history, options.start) {
                pending.insert((id, msg.sequence));
                let delivery = Self::make_delivery(&self.state, id, subject.clone(), msg, false);
                let _ = tx.send(delivery);
            }
        }

        entry.subs.push(DurableSub {
            id,
            queue: queue.cloned(),
            tx,
        });

        Ok(Box::new(MemorySubscription {
            state: Arc::downgrade(&self.state),
            kind: SubKind::Durable,
            subject: subject.clone(),
            id,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.close_all();
        Ok(())
    }
}

#[async_trait::async_trait]
impl DurableConnector for MemoryBroker {
    async fn connect(
        &self,
        cluster_id: &str,
        client_id: &str,
        _config: StreamingConfig,
    ) -> Result<DurableConnPtr> {
        // ---
        self.state.check_open()?;

        lock_ignore_poison(&self.state.connections)
            .push((cluster_id.to_owned(), client_id.to_owned()));

        Ok(Arc::new(self.clone()))
    }
}
