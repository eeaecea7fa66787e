// src/config.rs

//! Public, transport-agnostic connection configuration.
//!
//! This type intentionally contains no broker-specific concepts.
//! Transport connectors are responsible for interpreting this config
//! into concrete connection settings.

use std::fmt;
use std::time::Duration;

use crate::domain::{ConnectionLostHandler, CoreConnPtr};

/// Default DSN when none is supplied.
pub const DEFAULT_DSN: &str = "nats://127.0.0.1:4222";

/// Connection options for the durable transport.
///
/// [`Default`] matches the transport collaborator's stock settings:
/// liveness probes every 5 seconds with 88 missed probes tolerated,
/// 2 second connect wait, 16384 unacknowledged async publishes in
/// flight, 30 second per-publish ack wait.
#[derive(Clone)]
pub struct StreamingConfig {
    /// Liveness probe cadence.
    pub ping_interval: Duration,

    /// Missed probes tolerated before the connection is considered lost.
    pub ping_max_out: u32,

    /// Maximum time to establish the connection.
    pub connect_wait: Duration,

    /// Backpressure limit on unacknowledged asynchronous publishes.
    pub max_pub_acks_in_flight: usize,

    /// How long a publish waits for the broker's acknowledgement.
    pub pub_ack_wait: Duration,

    /// Broker addresses; connectors join multiple entries with `", "`.
    pub dsn: Vec<String>,

    /// Existing point-to-point connection to bind into the durable
    /// connection, coupling both layers to one physical link.
    pub core_conn: Option<CoreConnPtr>,

    /// Invoked with the loss reason when the connection drops.
    ///
    /// Reporting only; reconnection is the transport's (and ultimately
    /// the caller's) responsibility.
    pub on_connection_lost: Option<ConnectionLostHandler>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            ping_max_out: 88,
            connect_wait: Duration::from_secs(2),
            max_pub_acks_in_flight: 16384,
            pub_ack_wait: Duration::from_secs(30),
            dsn: vec![DEFAULT_DSN.to_owned()],
            core_conn: None,
            on_connection_lost: None,
        }
    }
}

impl StreamingConfig {
    /// Set the liveness probe cadence and tolerance.
    pub fn with_pings(mut self, interval: Duration, max_out: u32) -> Self {
        self.ping_interval = interval;
        self.ping_max_out = max_out;
        self
    }

    /// Set the maximum time to establish the connection.
    pub fn with_connect_wait(mut self, wait: Duration) -> Self {
        self.connect_wait = wait;
        self
    }

    /// Set the backpressure limit on unacknowledged async publishes.
    pub fn with_max_pub_acks_in_flight(mut self, max: usize) -> Self {
        self.max_pub_acks_in_flight = max;
        self
    }

    /// Set the per-publish acknowledgement wait.
    pub fn with_pub_ack_wait(mut self, wait: Duration) -> Self {
        self.pub_ack_wait = wait;
        self
    }

    /// Replace the broker address list.
    pub fn with_dsn(mut self, dsn: Vec<String>) -> Self {
        self.dsn = dsn;
        self
    }

    /// Install a connection-lost callback.
    pub fn with_connection_lost_handler(mut self, handler: ConnectionLostHandler) -> Self {
        self.on_connection_lost = Some(handler);
        self
    }

    /// The DSN list joined for transports that take a single string.
    pub fn joined_dsn(&self) -> String {
        self.dsn.join(", ")
    }
}

impl fmt::Debug for StreamingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingConfig")
            .field("ping_interval", &self.ping_interval)
            .field("ping_max_out", &self.ping_max_out)
            .field("connect_wait", &self.connect_wait)
            .field("max_pub_acks_in_flight", &self.max_pub_acks_in_flight)
            .field("pub_ack_wait", &self.pub_ack_wait)
            .field("dsn", &self.dsn)
            .field("core_conn", &self.core_conn.as_ref().map(|_| ".."))
            .field(
                "on_connection_lost",
                &self.on_connection_lost.as_ref().map(|_| ".."),
            )
            .finish()
    }
}
