//! Batched-transactional write/read coordination over a DynamoDB-style
//! managed datastore.
//!
//! This crate is a convenience layer, not a storage engine: it partitions
//! arbitrary-sized item sets into the provider's batch caps, retries
//! partial failures with backoff, composes heterogeneous operations into
//! all-or-nothing transactions, pages reads through continuation keys, and
//! drives declarative schema migrations. Durability and consistency are the
//! remote service's job; the wire client itself stays behind the traits in
//! [`client`].
//!
//! # Layout
//!
//! - [`client`] — async capability traits the remote service is consumed
//!   through.
//! - [`record`] / [`expression`] / [`ops`] — marshalling, request
//!   expressions, and lazily-evaluated operation descriptors.
//! - [`read`] / [`write`] — single-item operations and the paginated
//!   scan/query coordinator.
//! - [`batch`] — the partitioner, the retrying executor, and the
//!   concurrent fan-out processor.
//! - [`transact`] — capped atomic write/get builders and the ambient
//!   transaction scope.
//! - [`cursor`] — the opaque continuation-key codec.
//! - [`migrate`] — declarative table schemas diffed against live tables.
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod client;
pub mod cursor;
pub mod error;
pub mod expression;
pub mod migrate;
pub mod ops;
pub mod read;
pub mod record;
pub mod transact;
pub mod write;

pub use cursor::EvaluatedKey;
pub use error::Error;
pub use expression::Expression;
pub use ops::{WriteDescriptor, WriteSource};
pub use record::{Item, MarshalError, Record};

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
