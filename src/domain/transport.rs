// src/domain/transport.rs

//! Transport collaborator interfaces.
//!
//! This module defines the seams through which the facade consumes its
//! two messaging substrates: the point-to-point connection ([`CoreConn`])
//! and the durable, acknowledgement-tracked connection ([`DurableConn`]).
//! It intentionally avoids any reference to concrete protocols, brokers,
//! or client libraries.
//!
//! The transport layer is responsible only for moving bytes and invoking
//! the registered callbacks. Delivery discipline (fast ack, redelivery
//! detection, decode gating) lives in the streaming client; request
//! correlation lives in the direct client.
//!
//! Concrete implementations of these interfaces live under
//! `src/transport/`.

use std::time::Duration;

use bytes::Bytes;

use crate::config::StreamingConfig;
use crate::domain::types::{AckId, Delivery, QueueGroup, Subject};
use crate::{Error, Result};
use std::sync::Arc;

/// Byte-level delivery callback registered with the durable transport.
///
/// The transport may invoke handlers for different subscriptions
/// concurrently; invocations for one subscription are serialized by
/// convention of the collaborator, but that serialization is not a
/// contract this crate provides.
pub type RawHandler = Box<dyn FnMut(Delivery) + Send>;

/// Acknowledgement callback for asynchronous publishes.
///
/// Invoked by the transport at most once per published message, on its
/// own concurrency, not necessarily in publish order. `None` signals the
/// broker accepted the message; `Some(err)` reports the rejection.
pub type AckHandler = Arc<dyn Fn(&AckId, Option<&Error>) + Send + Sync>;

/// Callback invoked with the reason when the durable connection is lost.
///
/// Reporting only; the facade never reconnects on the caller's behalf.
pub type ConnectionLostHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Request callback registered with the point-to-point transport.
///
/// Receives the raw request bytes; returning `Ok(Some(bytes))` sends
/// those bytes back to the requester, `Ok(None)` stays silent.
pub type RequestHandler = Box<dyn FnMut(Bytes) -> Result<Option<Bytes>> + Send>;

/// Where a new durable subscription starts in the subject's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Only messages published after the subscription is registered.
    #[default]
    NewOnly,
    /// Start with the most recently delivered message.
    LastReceived,
    /// Replay every available message.
    DeliverAll,
    /// Start at an explicit sequence number.
    Sequence(u64),
}

/// Options forwarded to the durable transport when subscribing.
///
/// The streaming client forces `manual_acks = true` regardless of what
/// the caller sets: the wrapper, not the transport, decides when a
/// delivery is acknowledged.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Disable transport auto-acknowledgement; the subscriber calls
    /// [`Delivery::ack`] itself.
    pub manual_acks: bool,

    /// Name under which the broker persists this subscription's position.
    pub durable_name: Option<String>,

    /// Maximum unacknowledged deliveries in flight.
    pub max_in_flight: Option<u32>,

    /// How long the broker waits for an ack before redelivering.
    pub ack_wait: Option<Duration>,

    /// Start position in the subject's history.
    pub start: StartPosition,
}

/// Handle to an active subscription on either transport.
///
/// Transport-owned capability: dropping the handle does not unsubscribe;
/// delivery stops only on explicit `unsubscribe()` or transport close.
#[async_trait::async_trait]
pub trait Subscription: Send + Sync {
    /// Remove the subscription; no further deliveries after this returns.
    async fn unsubscribe(&self) -> Result<()>;
}

/// Boxed subscription handle.
pub type SubscriptionPtr = Box<dyn Subscription>;

/// Point-to-point transport connection.
///
/// Lightweight substrate providing request/reply without persistence
/// guarantees. Requests are single-shot with at-most-once delivery: a
/// timeout or drop is surfaced as an error, never retried here.
#[async_trait::async_trait]
pub trait CoreConn: Send + Sync {
    /// Send `data` on `subject` and await a single reply.
    ///
    /// Returns [`Error::Timeout`] when no reply arrives within `timeout`;
    /// a late reply after that is discarded by the transport.
    async fn request(&self, subject: &Subject, data: Bytes, timeout: Duration) -> Result<Bytes>;

    /// Register a responder for requests on `subject`.
    ///
    /// With a queue group, competing responders share the request load;
    /// without one, the transport picks any registered responder.
    async fn subscribe(
        &self,
        subject: &Subject,
        queue: Option<&QueueGroup>,
        handler: RequestHandler,
    ) -> Result<SubscriptionPtr>;

    /// Close the connection and release its resources.
    async fn close(&self) -> Result<()>;
}

/// Shared point-to-point connection pointer.
pub type CoreConnPtr = Arc<dyn CoreConn>;

/// Durable transport connection.
///
/// Persistent, acknowledgement-tracked substrate. The connection is safe
/// to use from multiple tasks concurrently.
#[async_trait::async_trait]
pub trait DurableConn: Send + Sync {
    /// Publish and block until the cluster durably accepted the message
    /// (at-least-once from the transport's perspective).
    async fn publish(&self, subject: &Subject, data: Bytes) -> Result<()>;

    /// Publish without waiting; `ack_handler` fires later, at most once,
    /// when the broker acknowledges or rejects the message. Returns the
    /// correlation identifier for that future callback.
    async fn publish_async(
        &self,
        subject: &Subject,
        data: Bytes,
        ack_handler: AckHandler,
    ) -> Result<AckId>;

    /// Register a delivery callback for `subject`, optionally load-shared
    /// within `queue`.
    async fn subscribe(
        &self,
        subject: &Subject,
        queue: Option<&QueueGroup>,
        handler: RawHandler,
        options: SubscribeOptions,
    ) -> Result<SubscriptionPtr>;

    /// Close the connection and release its resources.
    async fn close(&self) -> Result<()>;
}

/// Shared durable connection pointer.
pub type DurableConnPtr = Arc<dyn DurableConn>;

/// Factory opening durable connections.
///
/// The construction seam: concrete transports implement this so the
/// streaming client can open its connection without naming any broker
/// library.
#[async_trait::async_trait]
pub trait DurableConnector: Send + Sync {
    /// Open a durable connection to `cluster_id` as `client_id`.
    async fn connect(
        &self,
        cluster_id: &str,
        client_id: &str,
        config: StreamingConfig,
    ) -> Result<DurableConnPtr>;
}
