//! Typed publish/subscribe facade over durable and point-to-point
//! messaging transports.
//!
//! This library wraps two collaborating substrates behind one typed API:
//! a lightweight point-to-point connection for request/reply and
//! liveness probes, and a durable, acknowledgement-tracked streaming
//! connection layered on top of it. The facade enforces the delivery and
//! acknowledgement discipline that the raw transports leave to the
//! caller: serialization on publish, manual-acknowledgement
//! subscriptions with redelivery detection on receive, a default
//! acknowledgement callback so asynchronous publishes always have an
//! observable outcome, and coordinated shutdown of both layers with
//! error aggregation.
//!
//! # Example
//!
//! ```
//! use durapub::{
//!     Json, MemoryBroker, StreamingClient, Subject, SubscribeOptions,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Order {
//!     order_id: u64,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> durapub::Result<()> {
//! let broker = MemoryBroker::new();
//! let client = StreamingClient::connect_only_streaming(
//!     &broker,
//!     "test-cluster",
//!     "c1",
//!     None,
//!     None,
//! )
//! .await?;
//!
//! let subject = Subject::new("orders.created")?;
//! client
//!     .subscribe::<Json<Order>, _>(
//!         &subject,
//!         |_delivery, order| println!("order {}", order.0.order_id),
//!         SubscribeOptions::default(),
//!     )
//!     .await?;
//!
//! client.publish_sync(&subject, &Json(Order { order_id: 42 })).await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod config;
mod direct;
mod domain;
mod streaming;
mod transport;

mod error;
mod logging;
mod payload;

// Re-export main types
pub use direct::DirectClient;
pub use streaming::StreamingClient;

pub use config::{StreamingConfig, DEFAULT_DSN};

pub use error::{Error, Result};
pub use logging::{LogLevel, LogSink, Logger};
pub use payload::{Json, Serializable};

pub use transport::MemoryBroker;

// --- public re-exports
pub use domain::{
    //
    AckHandler,
    AckId,
    ConnectionLostHandler,
    CoreConn,
    CoreConnPtr,
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
