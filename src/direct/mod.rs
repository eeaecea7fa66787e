// src/direct/mod.rs

//! Point-to-point client facade.
//!
//! [`DirectClient`] is a thin, typed pass-through over a [`CoreConn`]:
//! keepalive probing (`ping` / `pong_handler`), single-shot request/reply
//! and reply registration. It holds the raw connection handle and exposes
//! it for reuse by the streaming layer's construction, so both layers can
//! share one physical connection and close in a coordinated way.
//!
//! Request/reply here is **at-most-once**: a timed-out or dropped request
//! is surfaced as an error and never retried automatically.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::domain::{CoreConnPtr, QueueGroup, Subject, SubscriptionPtr};
use crate::logging::{LogSink, Logger};
use crate::payload::Serializable;
use crate::{Error, Result};

/// Fixed probe body sent by [`DirectClient::ping`].
const PING_BODY: &[u8] = b"ping";

/// Fixed probe answer sent by [`DirectClient::pong_handler`] responders.
const PONG_BODY: &[u8] = b"pong";

/// Typed facade over a point-to-point transport connection.
pub struct DirectClient {
    log: Logger,
    conn: Option<CoreConnPtr>,
}

impl DirectClient {
    /// Create a facade bound to an open connection.
    pub fn new(conn: CoreConnPtr) -> Self {
        Self {
            log: Logger::default(),
            conn: Some(conn),
        }
    }

    /// Create a facade with no underlying connection.
    ///
    /// Every operation on an unbound facade fails with
    /// [`Error::EmptyConnection`] rather than panicking or blocking.
    pub fn unbound() -> Self {
        Self {
            log: Logger::default(),
            conn: None,
        }
    }

    /// The raw connection handle, if bound.
    pub fn conn(&self) -> Option<CoreConnPtr> {
        self.conn.clone()
    }

    /// Replace the log sink for all subsequent statements.
    pub fn use_custom_logger(&self, sink: Arc<dyn LogSink>) {
        self.log.swap(sink);
    }

    fn bound_conn(&self) -> Result<&CoreConnPtr> {
        self.conn.as_ref().ok_or(Error::EmptyConnection)
    }

    /// Probe liveness of whatever answers on `subject`.
    ///
    /// Sends a fixed probe body and waits up to `timeout` for the fixed
    /// answer. `Ok(true)` on a matching reply, `Ok(false)` on any other
    /// reply, [`Error::Timeout`] when nothing answers in time.
    pub async fn ping(&self, subject: &Subject, timeout: Duration) -> Result<bool> {
        let conn = self.bound_conn()?;
        self.log.debug(format!("[ping] subject={subject}"));

        let reply = conn
            .request(subject, Bytes::from_static(PING_BODY), timeout)
            .await?;

        Ok(reply.as_ref() == PONG_BODY)
    }

    /// Register a responder answering every probe on `subject`.
    pub async fn pong_handler(&self, subject: &Subject) -> Result<SubscriptionPtr> {
        self.pong_handler_inner(subject, None).await
    }

    /// Register a load-shared probe responder within `queue`.
    pub async fn pong_queue_handler(
        &self,
        subject: &Subject,
        queue: &QueueGroup,
    ) -> Result<SubscriptionPtr> {
        self.pong_handler_inner(subject, Some(queue)).await
    }

    async fn pong_handler_inner(
        &self,
        subject: &Subject,
        queue: Option<&QueueGroup>,
    ) -> Result<SubscriptionPtr> {
        let conn = self.bound_conn()?;
        self.log.debug(format!("[pong_handler] subject={subject}"));

        conn.subscribe(
            subject,
            queue,
            Box::new(|_request| Ok(Some(Bytes::from_static(PONG_BODY)))),
        )
        .await
    }

    /// Single-shot typed request/reply with at-most-once delivery.
    ///
    /// Marshals `request`, sends it on `subject`, and unmarshals the
    /// reply into `reply`. No automatic retry on timeout or drop.
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
        let conn = self.bound_conn()?;
        self.log.debug(format!("[request] subject={subject}"));

        let encoded = request.marshal().map_err(|err| {
            self.log
                .error(format!("[request] marshal failed, subject={subject}: {err}"));
            err
        })?;

        let raw_reply = conn.request(subject, encoded, timeout).await?;

        reply.unmarshal(&raw_reply).map_err(|err| {
            self.log.error(format!(
                "[request] reply unmarshal failed, subject={subject}: {err}"
            ));
            err
        })
    }

    /// Register a typed responder on `subject`.
    ///
    /// Each incoming request is decoded into a fresh `Req`; the handler's
    /// returned value, when present, is marshalled and sent back to the
    /// requester. Decode and encode failures are logged and drop that one
    /// request without reaching the handler or the requester.
    pub async fn reply_handler<Req, Resp, F>(
        &self,
        subject: &Subject,
        mut handler: F,
    ) -> Result<SubscriptionPtr>
    where
        Req: Serializable + Default + 'static,
        Resp: Serializable,
        F: FnMut(Req) -> Option<Resp> + Send + 'static,
    {
        let conn = self.bound_conn()?;
        let log = self.log.clone();
        let subject_in_handler = subject.clone();
        self.log.debug(format!("[reply_handler] subject={subject}"));

        conn.subscribe(
            subject,
            None,
            Box::new(move |raw: Bytes| {
                // ---
                let mut request = Req::default();
                if let Err(err) = request.unmarshal(&raw) {
                    log.error(format!(
                        "[reply_handler] unmarshal failed, subject={subject_in_handler}: {err}"
                    ));
                    return Err(err);
                }

                let reply = match handler(request) {
                    Some(reply) => reply,
                    None => return Ok(None),
                };

                match reply.marshal() {
                    Ok(encoded) => Ok(Some(encoded)),
                    Err(err) => {
                        log.error(format!(
                            "[reply_handler] reply marshal failed, subject={subject_in_handler}: {err}"
                        ));
                        Err(err)
                    }
                }
            }),
        )
        .await
    }

    /// Close the underlying connection.
    pub async fn close(&self) -> Result<()> {
        self.bound_conn()?.close().await
    }
}

impl std::fmt::Debug for DirectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectClient")
            .field("bound", &self.conn.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::{CoreConn, RequestHandler, Subscription};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NoopSubscription;

    #[async_trait::async_trait]
    impl Subscription for NoopSubscription {
        async fn unsubscribe(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Stub connection answering every request with a canned reply.
    struct CannedConn {
        reply: Bytes,
        requests: AtomicUsize,
        handlers: Mutex<Vec<RequestHandler>>,
    }

    impl CannedConn {
        fn new(reply: &'static [u8]) -> Self {
            Self {
                reply: Bytes::from_static(reply),
                requests: AtomicUsize::new(0),
                handlers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl CoreConn for CannedConn {
        async fn request(
            &self,
            _subject: &Subject,
            _data: Bytes,
            _timeout: Duration,
        ) -> Result<Bytes> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }

        async fn subscribe(
            &self,
            _subject: &Subject,
            _queue: Option<&QueueGroup>,
            handler: RequestHandler,
        ) -> Result<SubscriptionPtr> {
            self.handlers.lock().unwrap().push(handler);
            Ok(Box::new(NoopSubscription))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_ping_matches_probe_answer() {
        // ---
        let conn = Arc::new(CannedConn::new(b"pong"));
        let client = DirectClient::new(conn.clone());
        let subject = Subject::new("liveness").unwrap();

        let alive = client
            .ping(&subject, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(alive);
        assert_eq!(conn.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ping_rejects_mismatched_reply() {
        // ---
        let client = DirectClient::new(Arc::new(CannedConn::new(b"nope")));
        let subject = Subject::new("liveness").unwrap();

        let alive = client
            .ping(&subject, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!alive);
    }

    #[tokio::test]
    async fn test_unbound_facade_fails_without_touching_transport() {
        // ---
        let client = DirectClient::unbound();
        let subject = Subject::new("liveness").unwrap();

        let err = client
            .ping(&subject, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyConnection));

        let err = client.pong_handler(&subject).await.err().unwrap();
        assert!(matches!(err, Error::EmptyConnection));

        let err = client.close().await.unwrap_err();
        assert!(matches!(err, Error::EmptyConnection));
    }

    #[tokio::test]
    async fn test_pong_handler_answers_probe() {
        // ---
        let conn = Arc::new(CannedConn::new(b"unused"));
        let client = DirectClient::new(conn.clone());
        let subject = Subject::new("liveness").unwrap();

        client.pong_handler(&subject).await.unwrap();

        let mut handlers = conn.handlers.lock().unwrap();
        let reply = handlers[0](Bytes::from_static(b"ping")).unwrap();
        assert_eq!(reply, Some(Bytes::from_static(b"pong")));
    }
}
