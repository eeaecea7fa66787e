//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! transport implementations, protocols, or infrastructure concerns.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod transport;
mod types;

// --- Transport seam re-exports ---

pub use transport::{
    //
    AckHandler,
    ConnectionLostHandler,
    CoreConn,
    CoreConnPtr,
    DurableConn,
    DurableConnPtr,
    DurableConnector,
    RawHandler,
    RequestHandler,
    StartPosition,
    SubscribeOptions,
    Subscription,
    SubscriptionPtr,
};

// --- Value type re-exports ---

pub use types::{
    //
    AckId,
    Delivery,
    QueueGroup,
    Subject,
};
