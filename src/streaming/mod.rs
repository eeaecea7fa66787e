// src/streaming/mod.rs

//! Durable delivery wrapper.
//!
//! [`StreamingClient`] is the core of the crate: a typed facade over a
//! durable, acknowledgement-tracked connection ([`DurableConn`]) and,
//! optionally, a point-to-point [`DirectClient`]. It owns the
//! acknowledgement policy, redelivery detection, serialization glue, and
//! the coordinated shutdown of both layers.
//!
//! # Delivery discipline
//!
//! Subscriptions always run in manual-acknowledgement mode and
//! acknowledge every delivery **before** decoding or invoking the
//! caller's handler ("fast ack"): receipt, not successful processing, is
//! the unit of acknowledgement. The consequence is at-most-once delivery
//! to the handler with respect to broker retries — a failure after the
//! ack (decode error, handler logic error) is a silent drop, never
//! redelivered. This is a deliberate throughput-over-recovery trade-off;
//! callers that cannot tolerate drops must layer their own confirmation
//! on top.
//!
//! The wrapper adds no ordering, batching, or deduplication beyond what
//! the transport provides, and spawns no tasks of its own; it is purely
//! reactive to transport callbacks.

use std::sync::Arc;
use std::time::Duration;

use crate::config::StreamingConfig;
use crate::direct::DirectClient;
use crate::domain::{
    //
    AckHandler,
    AckId,
    CoreConnPtr,
    Delivery,
    DurableConnPtr,
    DurableConnector,
    QueueGroup,
    RawHandler,
    Subject,
    SubscribeOptions,
    SubscriptionPtr,
};
use crate::logging::{LogSink, Logger};
use crate::payload::Serializable;
use crate::{Error, Result};

/// Typed publish/subscribe client over a durable transport, with an
/// optional point-to-point layer for request/reply and liveness probes.
pub struct StreamingClient {
    log: Logger,
    sc: DurableConnPtr,
    nc: Option<DirectClient>,
}

impl StreamingClient {
    /// Open a durable connection bound to an existing point-to-point
    /// client.
    ///
    /// The direct client's raw connection handle is bound into the
    /// durable connection options, coupling both layers to one physical
    /// link; [`close`](Self::close) then shuts both down in order.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyConnection`] if `direct` holds no raw connection;
    /// otherwise whatever the connector surfaces.
    pub async fn connect(
        connector: &dyn DurableConnector,
        cluster_id: &str,
        client_id: &str,
        direct: Option<DirectClient>,
        config: Option<StreamingConfig>,
    ) -> Result<Self> {
        // ---
        let mut config = config.unwrap_or_default();

        if let Some(direct) = &direct {
            let conn = direct.conn().ok_or(Error::EmptyConnection)?;
            config.core_conn = Some(conn);
        }

        Self::connect_inner(connector, cluster_id, client_id, direct, config).await
    }

    /// Open a standalone durable connection, with no point-to-point
    /// layer bound.
    ///
    /// Uses default options when `config` is `None`; a supplied DSN list
    /// replaces the config's addresses.
    pub async fn connect_only_streaming(
        connector: &dyn DurableConnector,
        cluster_id: &str,
        client_id: &str,
        dsn: Option<Vec<String>>,
        config: Option<StreamingConfig>,
    ) -> Result<Self> {
        // ---
        let mut config = config.unwrap_or_default();

        if let Some(dsn) = dsn {
            config.dsn = dsn;
        }

        Self::connect_inner(connector, cluster_id, client_id, None, config).await
    }

    async fn connect_inner(
        connector: &dyn DurableConnector,
        cluster_id: &str,
        client_id: &str,
        direct: Option<DirectClient>,
        mut config: StreamingConfig,
    ) -> Result<Self> {
        // ---
        let log = Logger::default();

        // Connection loss must always be observable, even when the caller
        // installs no hook of their own.
        if config.on_connection_lost.is_none() {
            let log = log.clone();
            config.on_connection_lost = Some(Arc::new(move |reason: &Error| {
                log.error(format!("connection lost, reason: {reason}"));
            }));
        }

        let sc = connector.connect(cluster_id, client_id, config).await?;

        Ok(Self {
            log,
            sc,
            nc: direct,
        })
    }

    /// Wrap an already-open durable connection.
    ///
    /// The constructor for tests and advanced callers that manage the
    /// connection lifecycle themselves.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyConnection`] if `direct` is present but unbound.
    pub fn with_conn(sc: DurableConnPtr, direct: Option<DirectClient>) -> Result<Self> {
        // ---
        if let Some(direct) = &direct {
            if direct.conn().is_none() {
                return Err(Error::EmptyConnection);
            }
        }

        Ok(Self {
            log: Logger::default(),
            sc,
            nc: direct,
        })
    }

    // --- durable layer ---

    /// Publish and wait for the cluster's acknowledgement.
    ///
    /// Blocks until the broker durably accepted the message
    /// (at-least-once from the transport's perspective). An encode
    /// failure is logged and returned without contacting the transport;
    /// transport errors are returned verbatim.
    pub async fn publish_sync<P>(&self, subject: &Subject, payload: &P) -> Result<()>
    where
        P: Serializable + Sync,
    {
        self.log.debug(format!("[publish_sync] subject={subject}"));

        let data = payload.marshal().map_err(|err| {
            self.log.error(format!(
                "[publish_sync] marshal failed, subject={subject}: {err}"
            ));
            err
        })?;

        self.sc.publish(subject, data).await
    }

    /// Publish without waiting for the broker.
    ///
    /// Returns immediately with the correlation identifier; the
    /// acknowledgement callback fires later, at most once, when the
    /// broker accepts or rejects the message — order relative to other
    /// in-flight publishes is not guaranteed. A `None` handler is
    /// replaced with [`default_ack_handler`](Self::default_ack_handler)
    /// so every asynchronous publish has exactly one callback path.
    pub async fn publish_async<P>(
        &self,
        subject: &Subject,
        payload: &P,
        ack_handler: Option<AckHandler>,
    ) -> Result<AckId>
    where
        P: Serializable + Sync,
    {
        self.log.debug(format!("[publish_async] subject={subject}"));

        let data = payload.marshal().map_err(|err| {
            self.log.error(format!(
                "[publish_async] marshal failed, subject={subject}: {err}"
            ));
            err
        })?;

        let ack_handler = match ack_handler {
            Some(handler) => handler,
            None => {
                self.log.debug(format!(
                    "[publish_async] no ack handler given, using default, subject={subject}"
                ));
                self.default_ack_handler()
            }
        };

        self.sc.publish_async(subject, data, ack_handler).await
    }

    /// Acknowledgement callback that logs the outcome and nothing else.
    ///
    /// A safety net ensuring asynchronous publishes always have an
    /// observable outcome; prefer supplying your own handler.
    pub fn default_ack_handler(&self) -> AckHandler {
        let log = self.log.clone();
        Arc::new(move |id: &AckId, err: Option<&Error>| match err {
            Some(err) => log.error(format!("async publish failed, id={id}: {err}")),
            None => log.debug(format!("received ack for id={id}")),
        })
    }

    /// Subscribe to `subject` with fan-out delivery.
    ///
    /// The payload is decoded into a fresh `T::default()` per envelope,
    /// so concurrent deliveries never share a decode target. See the
    /// module docs for the fast-ack delivery discipline; `options` is
    /// forwarded with `manual_acks` forced on.
    pub async fn subscribe<T, F>(
        &self,
        subject: &Subject,
        handler: F,
        options: SubscribeOptions,
    ) -> Result<SubscriptionPtr>
    where
        T: Serializable + Default + Send + 'static,
        F: FnMut(&mut Delivery, T) + Send + 'static,
    {
        self.subscribe_inner(subject, None, handler, options).await
    }

    /// Subscribe with load-shared delivery within `queue`.
    ///
    /// Same delivery discipline as [`subscribe`](Self::subscribe).
    pub async fn queue_subscribe<T, F>(
        &self,
        subject: &Subject,
        queue: &QueueGroup,
        handler: F,
        options: SubscribeOptions,
    ) -> Result<SubscriptionPtr>
    where
        T: Serializable + Default + Send + 'static,
        F: FnMut(&mut Delivery, T) + Send + 'static,
    {
        self.subscribe_inner(subject, Some(queue), handler, options)
            .await
    }

    async fn subscribe_inner<T, F>(
        &self,
        subject: &Subject,
        queue: Option<&QueueGroup>,
        mut handler: F,
        mut options: SubscribeOptions,
    ) -> Result<SubscriptionPtr>
    where
        T: Serializable + Default + Send + 'static,
        F: FnMut(&mut Delivery, T) + Send + 'static,
    {
        // The wrapper, not the transport, decides when a delivery is
        // acknowledged.
        options.manual_acks = true;

        let log = self.log.clone();
        let label = match queue {
            Some(queue) => format!("subject={subject} queue={queue}"),
            None => format!("subject={subject}"),
        };

        self.log.debug(format!("[subscribe] {label}"));

        let raw: RawHandler = Box::new(move |mut delivery: Delivery| {
            // ---
            // Fast ack: receipt, not successful processing, is the unit
            // of acknowledgement. Everything after this point is
            // at-most-once.
            if let Err(err) = delivery.ack() {
                log.error(format!(
                    "[subscribe] ack failed, {label} seq={}: {err}",
                    delivery.sequence
                ));
                return;
            }

            if delivery.redelivered {
                log.warn(format!(
                    "[subscribe] redelivered message, {label} seq={}",
                    delivery.sequence
                ));
            }

            let mut decoded = T::default();
            if let Err(err) = decoded.unmarshal(&delivery.data) {
                log.error(format!(
                    "[subscribe] unmarshal failed, {label} seq={}: {err}",
                    delivery.sequence
                ));
                return;
            }

            handler(&mut delivery, decoded);
        });

        self.sc.subscribe(subject, queue, raw, options).await
    }

    // --- point-to-point delegation ---

    fn bound_direct(&self) -> Result<&DirectClient> {
        self.nc.as_ref().ok_or(Error::NoUnderlyingClient)
    }

    /// Probe liveness via the bound direct client.
    ///
    /// # Errors
    ///
    /// [`Error::NoUnderlyingClient`] when no direct client is bound.
    pub async fn ping(&self, subject: &Subject, timeout: Duration) -> Result<bool> {
        self.bound_direct()?.ping(subject, timeout).await
    }

    /// Register a probe responder via the bound direct client.
    pub async fn pong_handler(&self, subject: &Subject) -> Result<SubscriptionPtr> {
        self.bound_direct()?.pong_handler(subject).await
    }

    /// Register a load-shared probe responder via the bound direct client.
    pub async fn pong_queue_handler(
        &self,
        subject: &Subject,
        queue: &QueueGroup,
    ) -> Result<SubscriptionPtr> {
        self.bound_direct()?.pong_queue_handler(subject, queue).await
    }

    /// Single-shot typed request/reply via the bound direct client.
    ///
    /// At-most-once delivery: a timed-out or dropped request is an error,
    /// never retried automatically.
    pub async fn request<Req, Resp>(
        &self,
        subject: &Subject,
        request: &Req,
        reply: &mut Resp,
        timeout: Duration,
    ) -> Result<()>
    where
        Req: Serializable + Sync,
        Resp: Serializable,
    {
        self.bound_direct()?
            .request(subject, request, reply, timeout)
            .await
    }

    /// Register a typed responder via the bound direct client.
    pub async fn reply_handler<Req, Resp, F>(
        &self,
        subject: &Subject,
        handler: F,
    ) -> Result<SubscriptionPtr>
    where
        Req: Serializable + Default + 'static,
        Resp: Serializable,
        F: FnMut(Req) -> Option<Resp> + Send + 'static,
    {
        self.bound_direct()?.reply_handler(subject, handler).await
    }

    // --- shared ---

    /// Replace the log sink for this client and, if bound, the direct
    /// facade. Takes effect for subsequent statements only.
    pub fn use_custom_logger(&self, sink: Arc<dyn LogSink>) {
        self.log.swap(sink.clone());
        if let Some(nc) = &self.nc {
            nc.use_custom_logger(sink);
        }
    }

    /// The bound direct client, if any.
    pub fn direct(&self) -> Option<&DirectClient> {
        self.nc.as_ref()
    }

    /// The raw point-to-point connection handle, if any.
    pub fn core_conn(&self) -> Option<CoreConnPtr> {
        self.nc.as_ref().and_then(|nc| nc.conn())
    }

    /// Close both layers: the durable connection first, then — regardless
    /// of that result — the point-to-point connection if bound.
    ///
    /// When both closes fail the errors are combined in
    /// [`Error::CombinedClose`], preserving both messages. Intended to be
    /// called at most once; double-close behavior is whatever the
    /// transports do.
    pub async fn close(&self) -> Result<()> {
        // ---
        let durable = self.sc.close().await;

        let direct = match &self.nc {
            Some(nc) => nc.close().await,
            None => Ok(()),
        };

        match (durable, direct) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(durable), Ok(())) => Err(durable),
            (Ok(()), Err(direct)) => Err(direct),
            (Err(durable), Err(direct)) => Err(Error::CombinedClose {
                durable: Box::new(durable),
                direct: Box::new(direct),
            }),
        }
    }
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("direct_bound", &self.nc.is_some())
            .finish()
    }
}
