//! Single-table batch convenience.
//!
//! [`Batch`] pins a table name so bulk puts, deletes, and gets take plain
//! records and keys instead of per-item resolvers; everything still runs
//! through the capped, retrying executors. [`truncate`] composes the scan
//! coordinator with a batch delete to empty out matching rows.

use tracing::debug;

use crate::batch::{get, write, RetryPolicy};
use crate::client::{BatchGetClient, BatchWriteClient, ScanClient};
use crate::expression::Condition;
use crate::ops::{self, GetKeyFn, KeyDescriptor, WriteItemFn};
use crate::read::{self, ScanOptions};
use crate::record::{Item, Record};
use crate::Result;

/// Bulk operations against one table.
#[derive(Debug, Clone)]
pub struct Batch {
    table: String,
}

impl Batch {
    /// Bind a table name.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// The bound table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Put every record, partitioned and retried under `policy`.
    pub async fn put<'a, C, R>(
        &self,
        client: &C,
        records: impl IntoIterator<Item = &'a R>,
        policy: &RetryPolicy,
    ) -> Result<()>
    where
        C: BatchWriteClient + ?Sized,
        R: Record + 'a,
    {
        let items: Vec<WriteItemFn> = records
            .into_iter()
            .map(|record| ops::put_item(self.table.clone(), record))
            .collect();
        let mut builder = write::Builder::new();
        builder.put(items);
        builder.run(client, policy).await
    }

    /// Delete every keyed row, partitioned and retried under `policy`.
    pub async fn delete<C>(
        &self,
        client: &C,
        keys: impl IntoIterator<Item = Item>,
        policy: &RetryPolicy,
    ) -> Result<()>
    where
        C: BatchWriteClient + ?Sized,
    {
        let keys: Vec<GetKeyFn> = keys
            .into_iter()
            .map(|key| self.key_fn(key))
            .collect();
        let mut builder = write::Builder::new();
        builder.delete(keys);
        builder.run(client, policy).await
    }

    /// Fetch every keyed row, delivering each found item to `fetch`.
    pub async fn get<C, F>(
        &self,
        client: &C,
        keys: impl IntoIterator<Item = Item>,
        policy: &RetryPolicy,
        mut fetch: F,
    ) -> Result<()>
    where
        C: BatchGetClient + ?Sized,
        F: FnMut(&Item) -> Result<()> + Send,
    {
        let keys: Vec<GetKeyFn> = keys
            .into_iter()
            .map(|key| self.key_fn(key))
            .collect();
        let mut builder = get::Builder::new();
        builder.get(keys);
        builder
            .run(client, policy, |_, item| fetch(item))
            .await
    }

    fn key_fn(&self, key: Item) -> GetKeyFn {
        let table = self.table.clone();
        Box::new(move || {
            Ok(KeyDescriptor {
                table,
                key,
                projection: None,
            })
        })
    }
}

/// Delete every row of `table` matching `filter` (or all rows when
/// `None`), paging the scan and batch-deleting as pages arrive. `key`
/// projects a scanned item down to its primary key. Returns the number
/// of rows deleted.
pub async fn truncate<C, K>(
    client: &C,
    table: &str,
    filter: Option<Condition>,
    key: K,
    policy: &RetryPolicy,
) -> Result<usize>
where
    C: ScanClient + BatchWriteClient,
    K: Fn(&Item) -> Item + Send + Sync,
{
    let mut keys: Vec<Item> = Vec::new();
    read::scan_all(client, table, filter, &ScanOptions::default(), |page| {
        keys.extend(page.items.iter().map(&key));
        Ok(())
    })
    .await?;
    let deleted = keys.len();
    if deleted > 0 {
        debug!(table = %table, rows = deleted, "truncating matched rows");
        Batch::new(table).delete(client, keys, policy).await?;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use dynaverse_model::input::{BatchWriteItemInput, ScanInput};
    use dynaverse_model::output::{BatchWriteItemOutput, ScanOutput};
    use dynaverse_model::{AttributeValue, ServiceError};

    use super::*;
    use crate::record::{item_of, ItemExt, MarshalError};

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

    #[derive(Default)]
    struct Store {
        writes: Mutex<Vec<BatchWriteItemInput>>,
        scan_pages: Mutex<Vec<ScanOutput>>,
    }

    #[async_trait]
    impl BatchWriteClient for Store {
        async fn batch_write_item(
            &self,
            input: BatchWriteItemInput,
        ) -> std::result::Result<BatchWriteItemOutput, ServiceError> {
            self.writes.lock().push(input);
            Ok(BatchWriteItemOutput::default())
        }
    }

    #[async_trait]
    impl ScanClient for Store {
        async fn scan(&self, _input: ScanInput) -> std::result::Result<ScanOutput, ServiceError> {
            Ok(self.scan_pages.lock().pop().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_should_split_thirty_puts_into_two_calls() {
        let client = Store::default();
        let rows: Vec<Row> = (0..30)
            .map(|i| Row {
                id: format!("r-{i}"),
            })
            .collect();
        Batch::new("rows")
            .put(&client, &rows, &RetryPolicy::immediate(3))
            .await
            .unwrap();
        let writes = client.writes.lock();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].request_items["rows"].len(), 25);
        assert_eq!(writes[1].request_items["rows"].len(), 5);
    }

    #[tokio::test]
    async fn test_should_truncate_matched_rows_across_pages() {
        let client = Store::default();
        let page_two = ScanOutput {
            items: vec![item_of([("id", AttributeValue::s("c"))])],
            ..ScanOutput::default()
        };
        let page_one = ScanOutput {
            items: vec![
                item_of([("id", AttributeValue::s("a"))]),
                item_of([("id", AttributeValue::s("b"))]),
            ],
            last_evaluated_key: item_of([("id", AttributeValue::s("b"))]),
            ..ScanOutput::default()
        };
        // popped in reverse order
        *client.scan_pages.lock() = vec![page_two, page_one];
        let deleted = truncate(
            &client,
            "rows",
            None,
            |item| item_of([("id", item["id"].clone())]),
            &RetryPolicy::immediate(3),
        )
        .await
        .unwrap();
        assert_eq!(deleted, 3);
        let writes = client.writes.lock();
        let requests: usize = writes
            .iter()
            .flat_map(|w| w.request_items.values())
            .map(Vec::len)
            .sum();
        assert_eq!(requests, 3);
        assert!(writes
            .iter()
            .flat_map(|w| w.request_items.values().flatten())
            .all(|r| r.delete_request.is_some()));
    }

    #[tokio::test]
    async fn test_should_skip_delete_when_nothing_matches() {
        let client = Store::default();
        let deleted = truncate(
            &client,
            "rows",
            None,
            |item| item.clone(),
            &RetryPolicy::immediate(3),
        )
        .await
        .unwrap();
        assert_eq!(deleted, 0);
        assert!(client.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_should_run_bulk_operations_from_spawned_tasks() {
        let client = std::sync::Arc::new(Store::default());
        let handle = tokio::spawn({
            let client = std::sync::Arc::clone(&client);
            async move {
                let rows = vec![Row {
                    id: "r-0".to_owned(),
                }];
                Batch::new("rows")
                    .put(&*client, &rows, &RetryPolicy::immediate(3))
                    .await?;
                truncate(
                    &*client,
                    "rows",
                    None,
                    |item| item.clone(),
                    &RetryPolicy::immediate(3),
                )
                .await
            }
        });
        let deleted = handle.await.unwrap().unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(client.writes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_should_batch_get_through_bound_table() {
        struct Gets {
            inputs: Mutex<Vec<dynaverse_model::input::BatchGetItemInput>>,
        }

        #[async_trait]
        impl BatchGetClient for Gets {
            async fn batch_get_item(
                &self,
                input: dynaverse_model::input::BatchGetItemInput,
            ) -> std::result::Result<dynaverse_model::output::BatchGetItemOutput, ServiceError>
            {
                let mut responses: HashMap<String, Vec<Item>> = HashMap::new();
                for (table, kaa) in &input.request_items {
                    responses.insert(table.clone(), kaa.keys.clone());
                }
                self.inputs.lock().push(input);
                Ok(dynaverse_model::output::BatchGetItemOutput {
                    responses,
                    ..dynaverse_model::output::BatchGetItemOutput::default()
                })
            }
        }

        let client = Gets {
            inputs: Mutex::new(Vec::new()),
        };
        let keys = vec![
            item_of([("id", AttributeValue::s("a"))]),
            item_of([("id", AttributeValue::s("b"))]),
        ];
        let mut seen = 0;
        Batch::new("rows")
            .get(&client, keys, &RetryPolicy::immediate(3), |item| {
                assert!(item.contains_key("id"));
                seen += 1;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(client.inputs.lock()[0].request_items["rows"].keys.len(), 2);
    }
}
