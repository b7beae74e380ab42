//! CBOR encoding of entity values.
//!
//! Entities encode their current values with [`to_cbor`]. The tracker
//! compares these bytes to decide whether an entity changed, and the store
//! persists them. Encoding must be deterministic: identical values produce
//! identical bytes. Derived `Serialize` impls on structs satisfy this since
//! fields are always emitted in declaration order.

use crate::error::{DbError, DbResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> DbResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| DbError::codec(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    ciborium::from_reader(bytes).map_err(|e| DbError::codec(e.to_string()))
}
