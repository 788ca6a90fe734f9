//! Concurrent fan-out over multiple batch write builders.
//!
//! Operations are routed round-robin across a fixed set of builders;
//! `run` drives every builder's submission loop concurrently and stops
//! at the first failure, aborting the siblings. Sub-batches a worker has
//! already submitted are not undone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;

use crate::batch::{write, RetryPolicy, MAX_PROCESSOR_SIZE};
use crate::client::BatchWriteClient;
use crate::ops::{GetKeyFn, WriteItemFn};
use crate::{Error, Result};

/// A batch write executor fanned out over up to
/// [`MAX_PROCESSOR_SIZE`] workers.
///
/// A size of one collapses to a plain builder with no task spawning; the
/// only shared state in the fanned-out form is the routing counter.
#[derive(Debug)]
pub enum BatchProcessor {
    /// One builder, driven inline.
    Single(write::Builder),
    /// Round-robin routing over independent builders.
    Multi {
        /// One builder per worker, each exclusively owned by its worker
        /// during `run`.
        builders: Vec<write::Builder>,
        /// Monotonic routing counter.
        counter: AtomicUsize,
    },
}

impl BatchProcessor {
    /// A processor with `size` workers. Zero and one mean inline
    /// execution; anything above the worker cap is clamped to it.
    #[must_use]
    pub fn new(size: usize) -> Self {
        if size <= 1 {
            return Self::Single(write::Builder::new());
        }
        let size = size.min(MAX_PROCESSOR_SIZE);
        Self::Multi {
            builders: (0..size).map(|_| write::Builder::new()).collect(),
            counter: AtomicUsize::new(0),
        }
    }

    /// The number of workers `run` will drive.
    #[must_use]
    pub fn workers(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi { builders, .. } => builders.len(),
        }
    }

    /// Queue put requests, routing each to the next worker in turn.
    pub fn put(&mut self, items: impl IntoIterator<Item = WriteItemFn>) -> &mut Self {
        for item in items {
            self.next_builder().put(Some(item));
        }
        self
    }

    /// Queue delete requests, routing each to the next worker in turn.
    pub fn delete(&mut self, keys: impl IntoIterator<Item = GetKeyFn>) -> &mut Self {
        for key in keys {
            self.next_builder().delete(Some(key));
        }
        self
    }

    fn next_builder(&mut self) -> &mut write::Builder {
        match self {
            Self::Single(builder) => builder,
            Self::Multi { builders, counter } => {
                let index = counter.fetch_add(1, Ordering::Relaxed) % builders.len();
                &mut builders[index]
            }
        }
    }

    /// Execute every worker's queued requests. The fanned-out form joins
    /// on the first failure and aborts the remaining workers.
    pub async fn run<C>(self, client: Arc<C>, policy: RetryPolicy) -> Result<()>
    where
        C: BatchWriteClient + 'static,
    {
        match self {
            Self::Single(mut builder) => builder.run(client.as_ref(), &policy).await,
            Self::Multi { builders, .. } => {
                debug!(workers = builders.len(), "fanning out batch writes");
                let mut set = JoinSet::new();
                for mut builder in builders {
                    let client = Arc::clone(&client);
                    let policy = policy.clone();
                    set.spawn(async move { builder.run(client.as_ref(), &policy).await });
                }
                while let Some(joined) = set.join_next().await {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            set.abort_all();
                            return Err(e);
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            set.abort_all();
                            return Err(Error::Join(e.to_string()));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
