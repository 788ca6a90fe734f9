//! Ambient transaction scope.
//!
//! A [`TransactionScope`] is a cheaply cloneable handle that components
//! share: once a transaction is begun on any clone, every clone's
//! contributions accumulate into the same builder until one of them runs
//! it. Contributions made while no transaction is active are silently
//! dropped; that is the contract that lets library code contribute
//! unconditionally and leave the decision to transact to the caller.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use dynaverse_model::output::TransactWriteItemsOutput;

use crate::client::TransactWriteClient;
use crate::ops::WriteSource;
use crate::transact::TransactionBuilder;
use crate::{Error, Result};

/// A shared handle to an optional in-flight transaction.
#[derive(Clone, Default)]
pub struct TransactionScope {
    inner: Arc<Mutex<Option<TransactionBuilder>>>,
}

impl TransactionScope {
    /// A scope with no active transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh transaction, discarding any unfinished one.
    pub fn begin(&self) {
        let mut guard = self.inner.lock();
        if guard.is_some() {
            debug!("discarding unfinished ambient transaction");
        }
        *guard = Some(TransactionBuilder::new());
    }

    /// Returns `true` while a transaction is accumulating.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Discard the active transaction, if any.
    pub fn end(&self) {
        *self.inner.lock() = None;
    }

    /// Contribute put operations. A no-op when no transaction is active.
    pub fn put(&self, sources: impl IntoIterator<Item = impl Into<WriteSource>>) -> &Self {
        if let Some(builder) = self.inner.lock().as_mut() {
            builder.put(sources);
        }
        self
    }

    /// Contribute update operations. A no-op when no transaction is
    /// active.
    pub fn update(&self, sources: impl IntoIterator<Item = impl Into<WriteSource>>) -> &Self {
        if let Some(builder) = self.inner.lock().as_mut() {
            builder.update(sources);
        }
        self
    }

    /// Contribute delete operations. A no-op when no transaction is
    /// active.
    pub fn delete(&self, sources: impl IntoIterator<Item = impl Into<WriteSource>>) -> &Self {
        if let Some(builder) = self.inner.lock().as_mut() {
            builder.delete(sources);
        }
        self
    }

    /// Detach the accumulated transaction, leave a fresh empty one in
    /// its place, and execute it.
    ///
    /// # Errors
    ///
    /// [`Error::TransactionNotBegan`] when no transaction is active.
    pub async fn run<C>(&self, client: &C) -> Result<TransactWriteItemsOutput>
    where
        C: TransactWriteClient + ?Sized,
    {
        let mut builder = {
            let mut guard = self.inner.lock();
            match guard.take() {
                Some(builder) => {
                    *guard = Some(TransactionBuilder::new());
                    builder
                }
                None => return Err(Error::TransactionNotBegan),
            }
        };
        builder.run(client).await
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("active", &self.is_active())
            .finish()
    }
}
