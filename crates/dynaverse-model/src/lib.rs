//! Wire model types for the dynaverse convenience layer.
//!
//! This crate holds the remote datastore's native request/response shapes:
//! the `AttributeValue` tagged union, input/output structs for every
//! operation the layer consumes, the shared wire types those structs are
//! built from, and the service-side error taxonomy. The JSON protocol makes
//! serde derives trivial, so everything here is hand-written data with no
//! behavior beyond (de)serialization.
#![allow(clippy::too_many_lines)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::module_name_repetitions)]
#![allow(missing_docs)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod output;
pub mod types;

pub use attribute_value::{AttributeValue, Item};
pub use error::{ServiceError, ServiceErrorKind};
