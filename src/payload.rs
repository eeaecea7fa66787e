// src/payload.rs

//! Serializable payload contract.
//!
//! Message bodies cross the facade only as types implementing
//! [`Serializable`]: encode to bytes, decode from bytes. The facade never
//! inspects a payload's internals; the binary format is entirely the
//! implementor's concern.
//!
//! [`Json`] is the provided adapter for serde types; anything with a
//! custom wire format (protobuf, flat binary, ...) implements the trait
//! directly.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// Contract any message body must satisfy.
///
/// `marshal` failures surface as [`Error::Encoding`], `unmarshal`
/// failures as [`Error::Decoding`]. Both abort the operation they occur
/// in without reaching the transport (publish) or the caller's handler
/// (delivery).
pub trait Serializable: Send {
    /// Encode the value to its wire representation.
    fn marshal(&self) -> Result<Bytes>;

    /// Decode the wire representation into `self`, replacing its state.
    fn unmarshal(&mut self, data: &[u8]) -> Result<()>;
}

/// JSON adapter: makes any serde type usable as a payload.
///
/// # Example
///
/// ```
/// use durapub::{Json, Serializable};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
/// struct Order {
///     order_id: u64,
/// }
///
/// let payload = Json(Order { order_id: 42 });
/// let bytes = payload.marshal().unwrap();
///
/// let mut decoded = Json(Order::default());
/// decoded.unmarshal(&bytes).unwrap();
/// assert_eq!(decoded.0.order_id, 42);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Serializable for Json<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    fn marshal(&self) -> Result<Bytes> {
        let encoded = serde_json::to_vec(&self.0).map_err(Error::encoding)?;
        Ok(Bytes::from(encoded))
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        self.0 = serde_json::from_slice(data).map_err(Error::decoding)?;
        Ok(())
    }
}
