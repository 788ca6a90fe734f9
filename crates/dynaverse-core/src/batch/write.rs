//! The batch write partitioner and retrying executor.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use dynaverse_model::input::BatchWriteItemInput;
use dynaverse_model::output::BatchWriteItemOutput;
use dynaverse_model::types::WriteRequest;

use crate::batch::{Monitor, RetryPolicy, MAX_WRITE_ITEMS};
use crate::client::BatchWriteClient;
use crate::ops::{GetKeyFn, WriteItemFn};
use crate::{Error, Result};

/// Shared observation hook for batch write dispatches.
pub type WriteMonitor = Arc<dyn Monitor<BatchWriteItemInput, BatchWriteItemOutput>>;

/// One capped group: requests bucketed by table, 25 items in total.
#[derive(Debug, Default)]
struct Group {
    requests: HashMap<String, Vec<WriteRequest>>,
    len: usize,
}

impl Group {
    fn push(&mut self, table: String, request: WriteRequest) {
        self.requests.entry(table).or_default().push(request);
        self.len += 1;
    }
}

/// Accumulates put/delete requests into capped groups and executes them.
///
/// Groups fill in arrival order: when the running group reaches the write
/// cap a new one opens, so per-table relative order is preserved. A
/// resolver failure latches on the builder and [`run`](Self::run) returns
/// it without touching the remote service.
#[derive(Default)]
pub struct Builder {
    groups: Vec<Group>,
    error: Option<Error>,
    monitor: Option<WriteMonitor>,
}

impl Builder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observation hook.
    #[must_use]
    pub fn with_monitor(mut self, monitor: WriteMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Queue put requests.
    pub fn put(&mut self, items: impl IntoIterator<Item = WriteItemFn>) -> &mut Self {
        for item in items {
            if self.error.is_some() {
                return self;
            }
            match item() {
                Ok(descriptor) => {
                    if descriptor.expression.condition.is_some() {
                        self.error = Some(Error::Construction(
                            "batch writes do not support condition expressions".to_owned(),
                        ));
                        return self;
                    }
                    self.push(descriptor.table, WriteRequest::put(descriptor.item));
                }
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    /// Queue delete requests.
    pub fn delete(&mut self, keys: impl IntoIterator<Item = GetKeyFn>) -> &mut Self {
        for key in keys {
            if self.error.is_some() {
                return self;
            }
            match key() {
                Ok(kd) => self.push(kd.table, WriteRequest::delete(kd.key)),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    fn push(&mut self, table: String, request: WriteRequest) {
        let needs_new = self
            .groups
            .last()
            .is_none_or(|group| group.len >= MAX_WRITE_ITEMS);
        if needs_new {
            self.groups.push(Group::default());
        }
        if let Some(group) = self.groups.last_mut() {
            group.push(table, request);
        }
    }

    /// Total queued requests across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.len).sum()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns `true` when a resolver failure has latched.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Execute every group in order, resubmitting unprocessed residuals
    /// under `policy`. The builder is drained whether or not this
    /// succeeds; an empty builder is a successful no-op.
    pub async fn run<C>(&mut self, client: &C, policy: &RetryPolicy) -> Result<()>
    where
        C: BatchWriteClient + ?Sized,
    {
        let groups = std::mem::take(&mut self.groups);
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        for group in groups {
            execute_group(client, policy, self.monitor.as_deref(), group.requests).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("groups", &self.groups.len())
            .field("items", &self.len())
            .field("has_error", &self.error.is_some())
            .finish_non_exhaustive()
    }
}

async fn execute_group<C>(
    client: &C,
    policy: &RetryPolicy,
    monitor: Option<&dyn Monitor<BatchWriteItemInput, BatchWriteItemOutput>>,
    requests: HashMap<String, Vec<WriteRequest>>,
) -> Result<()>
where
    C: BatchWriteClient + ?Sized,
{
    if requests.is_empty() {
        return Ok(());
    }
    let mut residual = requests;
    let mut attempts = 0u32;
    loop {
        policy.check_cancelled()?;
        attempts += 1;
        let input = BatchWriteItemInput {
            request_items: residual,
            ..BatchWriteItemInput::default()
        };
        if let Some(monitor) = monitor {
            monitor.dispatched(&input, attempts);
        }
        debug!(tables = input.request_items.len(), attempts, "dispatching batch write group");
        let output = match client.batch_write_item(input).await {
            Ok(output) => output,
            Err(e) => {
                if let Some(monitor) = monitor {
                    monitor.failed(&e, attempts);
                }
                return Err(e.into());
            }
        };
        if let Some(monitor) = monitor {
            monitor.completed(&output);
        }
        if output.unprocessed_items.is_empty() {
            return Ok(());
        }
        if attempts >= policy.max_retry {
            let table = output
                .unprocessed_items
                .keys()
                .next()
                .cloned()
                .unwrap_or_default();
            return Err(Error::RetryExhausted { table, attempts });
        }
        let remaining: usize = output.unprocessed_items.values().map(Vec::len).sum();
        warn!(remaining, attempts, "batch write left unprocessed items, resubmitting");
        policy.wait(attempts).await?;
        residual = output.unprocessed_items;
    }
}
