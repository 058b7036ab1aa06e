//! Conversions between Rust types and msgpack values.
//!
//! Call parameters and results travel as dynamically typed [`rmpv::Value`]s;
//! these serde bridges are the typed boundary the facade methods use to
//! build parameters and decode results.
//!
//! # Example
//!
//! ```
//! use nvim_rpc_client::codec::{from_value, to_value};
//!
//! let value = to_value(&vec![1, 2, 3]).unwrap();
//! let decoded: Vec<i32> = from_value(value).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

use rmpv::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Convert a serializable Rust value into a msgpack value.
#[inline]
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(rmpv::ext::to_value(value)?)
}

/// Decode a msgpack value into a typed Rust value.
#[inline]
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(rmpv::ext::from_value(value)?)
}
