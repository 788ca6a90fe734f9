//! All-or-nothing transactional writes and reads.
//!
//! A transaction group is atomic only within itself: builders split
//! oversized item sets into capped groups dispatched sequentially, so a
//! failure in a later group does not undo earlier ones. There is no
//! automatic retry at this layer.

pub mod get;
pub mod scope;
pub mod write;

pub use get::TransactGetBuilder;
pub use scope::TransactionScope;
pub use write::TransactionBuilder;

/// Hard cap on operations in one transactional write call.
pub const MAX_TRANSACT_ITEMS: usize = 25;

/// Hard cap on reads in one transactional get call.
pub const MAX_TRANSACT_GET_ITEMS: usize = 100;
