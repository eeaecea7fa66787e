// src/domain/types.rs

//! Core value types shared by both transport layers.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// An opaque routing string identifying a topic.
///
/// The facade imposes a single structural constraint at the boundary:
/// subjects are non-empty. Everything else (hierarchy, wildcards,
/// permitted characters) is delegated to the transport.
///
/// Subjects are immutable, cheap to clone, and safe to share across
/// threads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub struct Subject(Arc<str>);

impl Subject {
    /// Create a subject, validating that it is non-empty.
    pub fn new(value: impl Into<Arc<str>>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::InvalidSubject("subject must be non-empty".into()));
        }
        Ok(Subject(value))
    }

    /// Borrow the subject as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Subject {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Subject::new(value)
    }
}

impl TryFrom<String> for Subject {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Subject::new(value)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque string grouping competing subscribers for load-shared
/// delivery.
///
/// Absence of a queue group (the `Option::None` side of subscribe calls)
/// means fan-out delivery to all subscribers on the subject.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueueGroup(Arc<str>);

impl QueueGroup {
    /// Borrow the queue group as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for QueueGroup
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        QueueGroup(value.into())
    }
}

impl fmt::Display for QueueGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier correlating an asynchronous publish with its later
/// acknowledgement callback.
///
/// Returned by `publish_async`; handed back to the acknowledgement
/// handler when the broker accepts or rejects the message. A failed
/// publish returns an error instead of an identifier, so there is no
/// "empty id" sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AckId(Arc<str>);

impl AckId {
    /// Generate a fresh unique identifier.
    ///
    /// Used by transport implementations when the underlying broker does
    /// not supply its own correlation token.
    pub fn generate() -> Self {
        AckId(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for AckId
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        AckId(value.into())
    }
}

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability to acknowledge a single delivery, consumed on first use.
type AckFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// One delivered message plus its metadata.
///
/// The unit received from the durable transport: sequence identifier,
/// raw bytes, a redelivered flag, and a consumable acknowledge
/// capability. A delivery is owned transiently per callback invocation;
/// the facade fully consumes it (acknowledges and decodes) before the
/// callback returns and never retains it afterwards.
pub struct Delivery {
    /// Subject this message was delivered on.
    pub subject: Subject,

    /// Broker-assigned, per-subject monotonically increasing sequence.
    pub sequence: u64,

    /// Broker receipt time, nanoseconds since the Unix epoch.
    pub timestamp: i64,

    /// Opaque payload bytes.
    pub data: Bytes,

    /// True when the broker has delivered this message before.
    pub redelivered: bool,

    ack: Option<AckFn>,
}

impl Delivery {
    /// Construct a delivery. Transport implementations call this once per
    /// message handed to a subscription handler; `ack` is the closure the
    /// transport wants invoked to mark the message consumed.
    pub fn new(
        subject: Subject,
        sequence: u64,
        timestamp: i64,
        data: Bytes,
        redelivered: bool,
        ack: impl FnOnce() -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            subject,
            sequence,
            timestamp,
            data,
            redelivered,
            ack: Some(Box::new(ack)),
        }
    }

    /// Acknowledge this delivery.
    ///
    /// The first call consumes the capability and returns the transport's
    /// verdict; later calls are no-ops returning `Ok(())`.
    pub fn ack(&mut self) -> Result<()> {
        match self.ack.take() {
            Some(ack) => ack(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("len", &self.data.len())
            .field("redelivered", &self.redelivered)
            .field("acked", &self.ack.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_subject_rejects_empty() {
        // ---
        let err = Subject::new("").unwrap_err();
        assert!(matches!(err, Error::InvalidSubject(_)));

        let subj = Subject::new("orders.created").unwrap();
        assert_eq!(subj.as_str(), "orders.created");
    }

    #[test]
    fn test_subject_deserialize_validates() {
        // ---
        let subj: Subject = serde_json::from_str("\"orders.created\"").unwrap();
        assert_eq!(subj.as_str(), "orders.created");

        assert!(serde_json::from_str::<Subject>("\"\"").is_err());
    }

    #[test]
    fn test_ack_id_generate_unique() {
        // ---
        assert_ne!(AckId::generate(), AckId::generate());
    }

    #[test]
    fn test_delivery_ack_consumed_once() {
        // ---
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_ack = calls.clone();

        let mut delivery = Delivery::new(
            Subject::new("s").unwrap(),
            1,
            0,
            Bytes::new(),
            false,
            move || {
                calls_in_ack.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        delivery.ack().unwrap();
        delivery.ack().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
