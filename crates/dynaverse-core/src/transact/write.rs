//! The transactional write builder.

use std::sync::Arc;

use tracing::debug;

use dynaverse_model::input::TransactWriteItemsInput;
use dynaverse_model::output::TransactWriteItemsOutput;
use dynaverse_model::types::{
    TransactConditionCheck, TransactDelete, TransactPut, TransactUpdate, TransactWriteItem,
};

use crate::batch::Monitor;
use crate::client::TransactWriteClient;
use crate::error::RequestKind;
use crate::ops::WriteSource;
use crate::transact::MAX_TRANSACT_ITEMS;
use crate::{Error, Result};

/// Shared observation hook for transactional write dispatches.
pub type TransactionMonitor = Arc<dyn Monitor<TransactWriteItemsInput, TransactWriteItemsOutput>>;

enum Op {
    Put(WriteSource),
    Update(WriteSource),
    Delete(WriteSource),
    ConditionCheck(WriteSource),
}

/// Accumulates heterogeneous write operations and dispatches them in
/// capped, sequentially-executed atomic groups.
///
/// Operations keep their accumulation order; groups are split at the
/// transact cap when [`run`](Self::run) is called, and deferred sources
/// are resolved immediately before their group is dispatched. Each group
/// applies entirely or not at all, but atomicity never spans groups and
/// nothing is retried: the first failure returns. An empty builder is a
/// successful no-op.
#[derive(Default)]
pub struct TransactionBuilder {
    ops: Vec<Op>,
    monitor: Option<TransactionMonitor>,
}

impl TransactionBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observation hook.
    #[must_use]
    pub fn with_monitor(mut self, monitor: TransactionMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Queue put operations.
    pub fn put(&mut self, sources: impl IntoIterator<Item = impl Into<WriteSource>>) -> &mut Self {
        self.ops
            .extend(sources.into_iter().map(|s| Op::Put(s.into())));
        self
    }

    /// Queue update operations.
    pub fn update(
        &mut self,
        sources: impl IntoIterator<Item = impl Into<WriteSource>>,
    ) -> &mut Self {
        self.ops
            .extend(sources.into_iter().map(|s| Op::Update(s.into())));
        self
    }

    /// Queue delete operations.
    pub fn delete(
        &mut self,
        sources: impl IntoIterator<Item = impl Into<WriteSource>>,
    ) -> &mut Self {
        self.ops
            .extend(sources.into_iter().map(|s| Op::Delete(s.into())));
        self
    }

    /// Queue condition checks: reads that must hold for the group to
    /// apply without writing anything themselves.
    pub fn condition_check(
        &mut self,
        sources: impl IntoIterator<Item = impl Into<WriteSource>>,
    ) -> &mut Self {
        self.ops
            .extend(sources.into_iter().map(|s| Op::ConditionCheck(s.into())));
        self
    }

    /// Total queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Dispatch every group in order. Returns the last group's output.
    pub async fn run<C>(&mut self, client: &C) -> Result<TransactWriteItemsOutput>
    where
        C: TransactWriteClient + ?Sized,
    {
        let ops = std::mem::take(&mut self.ops);
        let mut output = TransactWriteItemsOutput::default();
        let groups = ops.len().div_ceil(MAX_TRANSACT_ITEMS);
        if groups > 1 {
            debug!(operations = ops.len(), groups, "splitting transaction into capped groups");
        }
        let mut ops = ops.into_iter().peekable();
        while ops.peek().is_some() {
            let group: Vec<Op> = ops.by_ref().take(MAX_TRANSACT_ITEMS).collect();
            let items: Vec<TransactWriteItem> = group
                .into_iter()
                .map(resolve_op)
                .collect::<Result<_>>()?;
            output = dispatch(client, self.monitor.as_deref(), items).await?;
        }
        Ok(output)
    }
}

impl std::fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("operations", &self.ops.len())
            .finish_non_exhaustive()
    }
}

fn resolve_op(op: Op) -> Result<TransactWriteItem> {
    Ok(match op {
        Op::Put(source) => {
            let d = source.resolve()?;
            TransactWriteItem {
                put: Some(TransactPut {
                    table_name: d.table,
                    item: d.item,
                    condition_expression: d.expression.condition,
                    expression_attribute_names: d.expression.names,
                    expression_attribute_values: d.expression.values,
                }),
                ..TransactWriteItem::default()
            }
        }
        Op::Update(source) => {
            let d = source.resolve()?;
            TransactWriteItem {
                update: Some(TransactUpdate {
                    table_name: d.table,
                    key: d.item,
                    update_expression: d.expression.update,
                    condition_expression: d.expression.condition,
                    expression_attribute_names: d.expression.names,
                    expression_attribute_values: d.expression.values,
                }),
                ..TransactWriteItem::default()
            }
        }
        Op::Delete(source) => {
            let d = source.resolve()?;
            TransactWriteItem {
                delete: Some(TransactDelete {
                    table_name: d.table,
                    key: d.item,
                    condition_expression: d.expression.condition,
                    expression_attribute_names: d.expression.names,
                    expression_attribute_values: d.expression.values,
                }),
                ..TransactWriteItem::default()
            }
        }
        Op::ConditionCheck(source) => {
            let d = source.resolve()?;
            let condition = d.expression.condition.ok_or_else(|| {
                Error::Construction("condition check requires a condition expression".to_owned())
            })?;
            TransactWriteItem {
                condition_check: Some(TransactConditionCheck {
                    table_name: d.table,
                    key: d.item,
                    condition_expression: condition,
                    expression_attribute_names: d.expression.names,
                    expression_attribute_values: d.expression.values,
                }),
                ..TransactWriteItem::default()
            }
        }
    })
}

async fn dispatch<C>(
    client: &C,
    monitor: Option<&dyn Monitor<TransactWriteItemsInput, TransactWriteItemsOutput>>,
    items: Vec<TransactWriteItem>,
) -> Result<TransactWriteItemsOutput>
where
    C: TransactWriteClient + ?Sized,
{
    if items.len() > MAX_TRANSACT_ITEMS {
        return Err(Error::TooManyItems {
            kind: RequestKind::TransactWrite,
            max: MAX_TRANSACT_ITEMS,
            actual: items.len(),
        });
    }
    let input = TransactWriteItemsInput {
        transact_items: items,
        ..TransactWriteItemsInput::default()
    };
    if let Some(monitor) = monitor {
        monitor.dispatched(&input, 1);
    }
    debug!(items = input.transact_items.len(), "dispatching transactional write group");
    let output = match client.transact_write_items(input).await {
        Ok(output) => output,
        Err(e) => {
            if let Some(monitor) = monitor {
                monitor.failed(&e, 1);
            }
            return Err(e.into());
        }
    };
    if let Some(monitor) = monitor {
        monitor.completed(&output);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use dynaverse_model::{AttributeValue, ServiceError, ServiceErrorKind};

    use super::*;
    use crate::expression::{Condition, Update};
    use crate::ops::{delete_item, key_of, put_item, update_item, WriteItemFn};
    use crate::record::{item_of, Item, ItemExt, MarshalError, Record};

    struct Row {
        id: String,
    }

    impl Record for Row {
        fn to_item(&self) -> std::result::Result<Item, MarshalError> {
            Ok(item_of([("id", AttributeValue::s(&self.id))]))
        }

        fn from_item(item: &Item) -> std::result::Result<Self, MarshalError> {
            Ok(Self {
                id: item.get_s("id")?.to_owned(),
            })
        }
    }

    fn puts(n: usize) -> Vec<WriteItemFn> {
        (0..n)
            .map(|i| {
                put_item(
                    "rows",
                    &Row {
                        id: format!("r-{i}"),
                    },
                )
            })
            .collect()
    }

    #[derive(Default)]
    struct Recording {
        inputs: Mutex<Vec<TransactWriteItemsInput>>,
        fail_from_call: Option<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TransactWriteClient for Recording {
        async fn transact_write_items(
            &self,
            input: TransactWriteItemsInput,
        ) -> std::result::Result<TransactWriteItemsOutput, ServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_from_call.is_some_and(|n| call >= n) {
                return Err(ServiceError::new(
                    ServiceErrorKind::TransactionCanceled,
                    "conditional check failed",
                ));
            }
            self.inputs.lock().push(input);
            Ok(TransactWriteItemsOutput::default())
        }
    }

    #[derive(Default)]
    struct Counting {
        dispatched: AtomicUsize,
        completed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl Monitor<TransactWriteItemsInput, TransactWriteItemsOutput> for Counting {
        fn dispatched(&self, _input: &TransactWriteItemsInput, _attempt: u32) {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
        }

        fn completed(&self, _output: &TransactWriteItemsOutput) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn failed(&self, _error: &ServiceError, _attempt: u32) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_should_notify_monitor_of_failed_group() {
        let monitor = Arc::new(Counting::default());
        let client = Recording {
            fail_from_call: Some(0),
            ..Recording::default()
        };
        let mut builder = TransactionBuilder::new().with_monitor(monitor.clone());
        builder.put(puts(1));
        let err = builder.run(&client).await.unwrap_err();
        assert!(matches!(err, Error::Service(_)));
        assert_eq!(monitor.dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.completed.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_split_thirty_puts_into_two_sequential_groups() {
        let client = Recording::default();
        let mut builder = TransactionBuilder::new();
        builder.put(puts(30));
        builder.run(&client).await.unwrap();
        let inputs = client.inputs.lock();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].transact_items.len(), 25);
        assert_eq!(inputs[1].transact_items.len(), 5);
    }

    #[tokio::test]
    async fn test_should_treat_empty_builder_as_noop() {
        let client = Recording::default();
        let mut builder = TransactionBuilder::new();
        builder.run(&client).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_should_stop_at_first_failed_group() {
        let client = Recording {
            fail_from_call: Some(1),
            ..Recording::default()
        };
        let mut builder = TransactionBuilder::new();
        builder.put(puts(30));
        let err = builder.run(&client).await.unwrap_err();
        assert!(matches!(err, Error::Service(_)));
        // only the first group was applied
        assert_eq!(client.inputs.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_should_compose_heterogeneous_operations_in_order() {
        let client = Recording::default();
        let mut builder = TransactionBuilder::new();
        builder
            .put(puts(1))
            .update(vec![update_item(
                key_of("rows", [("id", AttributeValue::s("r-9"))]),
                Update::new().set("state", "done"),
            )])
            .delete(vec![delete_item(key_of(
                "rows",
                [("id", AttributeValue::s("r-8"))],
            ))]);
        builder.run(&client).await.unwrap();
        let inputs = client.inputs.lock();
        let items = &inputs[0].transact_items;
        assert_eq!(items.len(), 3);
        assert!(items[0].put.is_some());
        assert!(items[1].update.is_some());
        assert!(items[2].delete.is_some());
        assert_eq!(
            items[1].update.as_ref().unwrap().update_expression.as_deref(),
            Some("SET #n0 = :v0")
        );
    }

    #[tokio::test]
    async fn test_should_abort_before_dispatch_on_resolver_error() {
        let client = Recording::default();
        let broken: WriteItemFn = Box::new(|| Err(Error::Construction("bad".to_owned())));
        let mut builder = TransactionBuilder::new();
        builder.put(vec![WriteSource::Deferred(broken)]);
        let err = builder.run(&client).await.unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_should_require_condition_for_condition_check() {
        let client = Recording::default();
        let mut builder = TransactionBuilder::new();
        builder.condition_check(vec![delete_item(key_of(
            "rows",
            [("id", AttributeValue::s("r-1"))],
        ))]);
        assert!(builder.run(&client).await.is_err());

        let mut builder = TransactionBuilder::new();
        builder.condition_check(vec![crate::ops::delete_item_with(
            key_of("rows", [("id", AttributeValue::s("r-1"))]),
            Condition::attribute_exists("id"),
        )]);
        builder.run(&client).await.unwrap();
        let inputs = client.inputs.lock();
        assert!(inputs[0].transact_items[0].condition_check.is_some());
    }
}
