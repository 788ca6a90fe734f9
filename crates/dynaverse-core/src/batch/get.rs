//! The batch get partitioner and retrying executor.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use dynaverse_model::input::BatchGetItemInput;
use dynaverse_model::output::BatchGetItemOutput;
use dynaverse_model::types::KeysAndAttributes;

use crate::batch::{Monitor, RetryPolicy, MAX_GET_ITEMS};
use crate::client::BatchGetClient;
use crate::expression::Expression;
use crate::ops::GetKeyFn;
use crate::record::Item;
use crate::{Error, Result};

/// Shared observation hook for batch get dispatches.
pub type GetMonitor = Arc<dyn Monitor<BatchGetItemInput, BatchGetItemOutput>>;

#[derive(Debug, Default)]
struct Group {
    requests: HashMap<String, KeysAndAttributes>,
    len: usize,
}

impl Group {
    fn push(&mut self, table: String, key: Item, projection: Option<Vec<String>>) {
        let entry = self.requests.entry(table).or_default();
        entry.keys.push(key);
        if entry.projection_expression.is_none() {
            if let Some(attrs) = projection {
                let expression = Expression::builder().with_projection(attrs).build();
                entry.projection_expression = expression.projection;
                entry.expression_attribute_names = expression.names;
            }
        }
        self.len += 1;
    }
}

/// Accumulates keyed reads into capped groups and executes them.
///
/// Items come back through a per-item callback as each submission
/// returns, before any residual is retried; a callback failure aborts
/// the whole run immediately with no further retries.
#[derive(Default)]
pub struct Builder {
    groups: Vec<Group>,
    error: Option<Error>,
    monitor: Option<GetMonitor>,
}

impl Builder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observation hook.
    #[must_use]
    pub fn with_monitor(mut self, monitor: GetMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Queue keyed reads.
    pub fn get(&mut self, keys: impl IntoIterator<Item = GetKeyFn>) -> &mut Self {
        for key in keys {
            if self.error.is_some() {
                return self;
            }
            match key() {
                Ok(kd) => self.push(kd.table, kd.key, kd.projection),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    fn push(&mut self, table: String, key: Item, projection: Option<Vec<String>>) {
        let needs_new = self
            .groups
            .last()
            .is_none_or(|group| group.len >= MAX_GET_ITEMS);
        if needs_new {
            self.groups.push(Group::default());
        }
        if let Some(group) = self.groups.last_mut() {
            group.push(table, key, projection);
        }
    }

    /// Total queued keys across all groups.
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

    /// Execute every group in order, delivering each returned item to
    /// `fetch` with its table name and resubmitting unprocessed keys
    /// under `policy`.
    pub async fn run<C, F>(&mut self, client: &C, policy: &RetryPolicy, mut fetch: F) -> Result<()>
    where
        C: BatchGetClient + ?Sized,
        F: FnMut(&str, &Item) -> Result<()> + Send,
    {
        let groups = std::mem::take(&mut self.groups);
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        for group in groups {
            execute_group(client, policy, self.monitor.as_deref(), group.requests, &mut fetch)
                .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("groups", &self.groups.len())
            .field("keys", &self.len())
            .field("has_error", &self.error.is_some())
            .finish_non_exhaustive()
    }
}

async fn execute_group<C, F>(
    client: &C,
    policy: &RetryPolicy,
    monitor: Option<&dyn Monitor<BatchGetItemInput, BatchGetItemOutput>>,
    requests: HashMap<String, KeysAndAttributes>,
    fetch: &mut F,
) -> Result<()>
where
    C: BatchGetClient + ?Sized,
    F: FnMut(&str, &Item) -> Result<()> + Send,
{
    if requests.is_empty() {
        return Ok(());
    }
    let mut residual = requests;
    let mut attempts = 0u32;
    loop {
        policy.check_cancelled()?;
        attempts += 1;
        let input = BatchGetItemInput {
            request_items: residual,
            ..BatchGetItemInput::default()
        };
        if let Some(monitor) = monitor {
            monitor.dispatched(&input, attempts);
        }
        debug!(tables = input.request_items.len(), attempts, "dispatching batch get group");
        let output = match client.batch_get_item(input).await {
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
        for (table, items) in &output.responses {
            for item in items {
                fetch(table, item)?;
            }
        }
        if output.unprocessed_keys.is_empty() {
            return Ok(());
        }
        if attempts >= policy.max_retry {
            let table = output
                .unprocessed_keys
                .keys()
                .next()
                .cloned()
                .unwrap_or_default();
            return Err(Error::RetryExhausted { table, attempts });
        }
        let remaining: usize = output.unprocessed_keys.values().map(|k| k.keys.len()).sum();
        warn!(remaining, attempts, "batch get left unprocessed keys, resubmitting");
        policy.wait(attempts).await?;
        residual = output.unprocessed_keys;
    }
}
