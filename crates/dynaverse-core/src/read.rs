//! Single-item gets and the paginated scan/query coordinator.
//!
//! Every read takes an explicit fetch callback invoked with the result
//! (once for a get, once per page for scan/query) so callers unmarshal at
//! the point the data arrives instead of re-walking the output. An empty
//! get is the distinguished `NotFound` error; empty scan/query pages are
//! normal unless `error_on_empty` is opted into.

use tracing::debug;

use dynaverse_model::input::{GetItemInput, QueryInput, ScanInput};
use dynaverse_model::output::{GetItemOutput, QueryOutput, ScanOutput};
use dynaverse_model::types::Select;

use crate::client::{GetClient, QueryClient, ScanClient};
use crate::cursor::EvaluatedKey;
use crate::expression::{Condition, Expression};
use crate::ops::GetKeyFn;
use crate::record::Item;
use crate::{Error, Result};

/// Options for a single-item get.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Request a strongly consistent read.
    pub consistent_read: Option<bool>,
}

/// Options for a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Read from a secondary index instead of the base table.
    pub index_name: Option<String>,
    /// Page size cap.
    pub limit: Option<i32>,
    /// Request strongly consistent reads.
    pub consistent_read: Option<bool>,
    /// Resume from a previous page's continuation key.
    pub exclusive_start_key: Option<EvaluatedKey>,
    /// Parallel-scan segment number.
    pub segment: Option<i32>,
    /// Parallel-scan segment count.
    pub total_segments: Option<i32>,
    /// Attribute selection mode.
    pub select: Option<Select>,
    /// Treat an empty result as `NotFound` instead of success.
    pub error_on_empty: bool,
}

/// Options for a query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Read from a secondary index instead of the base table.
    pub index_name: Option<String>,
    /// Page size cap.
    pub limit: Option<i32>,
    /// Request strongly consistent reads.
    pub consistent_read: Option<bool>,
    /// Resume from a previous page's continuation key.
    pub exclusive_start_key: Option<EvaluatedKey>,
    /// Ascending (`true`, default) or descending key order.
    pub scan_index_forward: Option<bool>,
    /// Attribute selection mode.
    pub select: Option<Select>,
    /// Treat an empty result as `NotFound` instead of success.
    pub error_on_empty: bool,
}

/// Fetch one item by key. Absence is the distinguished
/// [`Error::NotFound`], never an `Ok` with nothing in it; `fetch` runs
/// exactly once, with the item, before the output is returned.
pub async fn get<C, F>(
    client: &C,
    key: GetKeyFn,
    options: &GetOptions,
    fetch: F,
) -> Result<GetItemOutput>
where
    C: GetClient + ?Sized,
    F: FnOnce(&Item) -> Result<()> + Send,
{
    let kd = key()?;
    let expression = match kd.projection {
        Some(attrs) => Expression::builder().with_projection(attrs).build(),
        None => Expression::default(),
    };
    let table = kd.table;
    debug!(table = %table, "get item");
    let output = client
        .get_item(GetItemInput {
            table_name: table.clone(),
            key: kd.key,
            projection_expression: expression.projection,
            expression_attribute_names: expression.names,
            consistent_read: options.consistent_read,
            ..GetItemInput::default()
        })
        .await?;
    match &output.item {
        Some(item) => fetch(item)?,
        None => return Err(Error::NotFound { table }),
    }
    Ok(output)
}

/// Fetch one page of a scan; `fetch_page` runs once with the page.
pub async fn scan<C, F>(
    client: &C,
    table: impl Into<String>,
    filter: Option<Condition>,
    options: &ScanOptions,
    fetch_page: F,
) -> Result<ScanOutput>
where
    C: ScanClient + ?Sized,
    F: FnOnce(&ScanOutput) -> Result<()> + Send,
{
    let table = table.into();
    let output = scan_page(client, &table, filter, options, None).await?;
    if options.error_on_empty && output.items.is_empty() {
        return Err(Error::NotFound { table });
    }
    fetch_page(&output)?;
    Ok(output)
}

/// Scan every page, following the continuation key until the service
/// stops returning one; `fetch_page` runs once per page, in order.
/// Returns the final page's output.
pub async fn scan_all<C, F>(
    client: &C,
    table: impl Into<String>,
    filter: Option<Condition>,
    options: &ScanOptions,
    mut fetch_page: F,
) -> Result<ScanOutput>
where
    C: ScanClient + ?Sized,
    F: FnMut(&ScanOutput) -> Result<()> + Send,
{
    let table = table.into();
    let mut start = None;
    let mut seen_items = false;
    loop {
        let output = scan_page(client, &table, filter.clone(), options, start.take()).await?;
        seen_items = seen_items || !output.items.is_empty();
        fetch_page(&output)?;
        if output.last_evaluated_key.is_empty() {
            if options.error_on_empty && !seen_items {
                return Err(Error::NotFound { table });
            }
            return Ok(output);
        }
        start = Some(output.last_evaluated_key);
    }
}

async fn scan_page<C>(
    client: &C,
    table: &str,
    filter: Option<Condition>,
    options: &ScanOptions,
    resume_from: Option<Item>,
) -> Result<ScanOutput>
where
    C: ScanClient + ?Sized,
{
    let expression = match filter {
        Some(condition) => Expression::builder().with_filter(condition).build(),
        None => Expression::default(),
    };
    let start = match resume_from {
        Some(key) => key,
        None => options
            .exclusive_start_key
            .clone()
            .map(EvaluatedKey::into_inner)
            .unwrap_or_default(),
    };
    debug!(table = %table, resumed = !start.is_empty(), "scan page");
    let output = client
        .scan(ScanInput {
            table_name: table.to_owned(),
            index_name: options.index_name.clone(),
            filter_expression: expression.filter,
            expression_attribute_names: expression.names,
            expression_attribute_values: expression.values,
            limit: options.limit,
            exclusive_start_key: start,
            segment: options.segment,
            total_segments: options.total_segments,
            select: options.select,
            consistent_read: options.consistent_read,
            ..ScanInput::default()
        })
        .await?;
    Ok(output)
}

/// Fetch one page of a query; `fetch_page` runs once with the page.
pub async fn query<C, F>(
    client: &C,
    table: impl Into<String>,
    key_condition: Condition,
    filter: Option<Condition>,
    options: &QueryOptions,
    fetch_page: F,
) -> Result<QueryOutput>
where
    C: QueryClient + ?Sized,
    F: FnOnce(&QueryOutput) -> Result<()> + Send,
{
    let table = table.into();
    let mut builder = Expression::builder().with_key_condition(key_condition);
    if let Some(condition) = filter {
        builder = builder.with_filter(condition);
    }
    let expression = builder.build();
    debug!(table = %table, "query page");
    let output = client
        .query(QueryInput {
            table_name: table.clone(),
            index_name: options.index_name.clone(),
            key_condition_expression: expression.key_condition,
            filter_expression: expression.filter,
            expression_attribute_names: expression.names,
            expression_attribute_values: expression.values,
            scan_index_forward: options.scan_index_forward,
            limit: options.limit,
            exclusive_start_key: options
                .exclusive_start_key
                .clone()
                .map(EvaluatedKey::into_inner)
                .unwrap_or_default(),
            select: options.select,
            consistent_read: options.consistent_read,
            ..QueryInput::default()
        })
        .await?;
    if options.error_on_empty && output.items.is_empty() {
        return Err(Error::NotFound { table });
    }
    fetch_page(&output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use dynaverse_model::{AttributeValue, ServiceError};

    use super::*;
    use crate::ops::key_of;
    use crate::record::item_of;

    struct FixedGet {
        item: Option<Item>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GetClient for FixedGet {
        async fn get_item(&self, _input: GetItemInput) -> std::result::Result<GetItemOutput, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GetItemOutput {
                item: self.item.clone(),
                ..GetItemOutput::default()
            })
        }
    }

    struct PagedScan {
        pages: Mutex<Vec<ScanOutput>>,
        calls: AtomicUsize,
    }

    impl PagedScan {
        fn new(pages: Vec<ScanOutput>) -> Self {
            let mut pages = pages;
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ScanClient for PagedScan {
        async fn scan(&self, _input: ScanInput) -> std::result::Result<ScanOutput, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.lock().pop().unwrap_or_default())
        }
    }

    struct EchoQuery {
        last: Mutex<Option<QueryInput>>,
    }

    #[async_trait]
    impl QueryClient for EchoQuery {
        async fn query(&self, input: QueryInput) -> std::result::Result<QueryOutput, ServiceError> {
            let output = QueryOutput {
                items: vec![item_of([("id", AttributeValue::s("q-1"))])],
                count: 1,
                ..QueryOutput::default()
            };
            *self.last.lock() = Some(input);
            Ok(output)
        }
    }

    fn page(ids: &[&str], more: bool) -> ScanOutput {
        let items: Vec<Item> = ids
            .iter()
            .map(|id| item_of([("id", AttributeValue::s(*id))]))
            .collect();
        let last_evaluated_key = if more {
            item_of([("id", AttributeValue::s(ids[ids.len() - 1]))])
        } else {
            Item::new()
        };
        ScanOutput {
            count: i32::try_from(items.len()).unwrap(),
            items,
            last_evaluated_key,
            ..ScanOutput::default()
        }
    }

    #[tokio::test]
    async fn test_should_invoke_fetch_exactly_once_on_hit() {
        let client = FixedGet {
            item: Some(item_of([("id", AttributeValue::s("u-1"))])),
            calls: AtomicUsize::new(0),
        };
        let fetched = AtomicUsize::new(0);
        let key = key_of("users", [("id", AttributeValue::s("u-1"))]);
        get(&client, key, &GetOptions::default(), |item| {
            fetched.fetch_add(1, Ordering::SeqCst);
            assert_eq!(item["id"], AttributeValue::s("u-1"));
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(fetched.load(Ordering::SeqCst), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_report_not_found_on_empty_get() {
        let client = FixedGet {
            item: None,
            calls: AtomicUsize::new(0),
        };
        let key = key_of("users", [("id", AttributeValue::s("nope"))]);
        let err = get(&client, key, &GetOptions::default(), |_| Ok(()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_should_follow_continuation_keys_across_three_pages() {
        let client = PagedScan::new(vec![
            page(&["a", "b"], true),
            page(&["c"], true),
            page(&["d"], false),
        ]);
        let mut seen = Vec::new();
        scan_all(&client, "rows", None, &ScanOptions::default(), |output| {
            seen.push(output.items.len());
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(seen, vec![2, 1, 1]);
    }

    #[tokio::test]
    async fn test_should_error_on_empty_scan_when_opted_in() {
        let client = PagedScan::new(vec![page(&[], false)]);
        let options = ScanOptions {
            error_on_empty: true,
            ..ScanOptions::default()
        };
        let err = scan(&client, "rows", None, &options, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_should_abort_scan_all_on_page_callback_error() {
        let client = PagedScan::new(vec![page(&["a"], true), page(&["b"], false)]);
        let err = scan_all(&client, "rows", None, &ScanOptions::default(), |_| {
            Err(Error::Construction("stop".to_owned()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_compile_query_expressions_into_request() {
        let client = EchoQuery {
            last: Mutex::new(None),
        };
        let condition = Condition::eq("pk", "tenant#1");
        let filter = Condition::gt("created", 100);
        query(
            &client,
            "orders",
            condition,
            Some(filter),
            &QueryOptions::default(),
            |output| {
                assert_eq!(output.items.len(), 1);
                Ok(())
            },
        )
        .await
        .unwrap();
        let input = client.last.lock().take().unwrap();
        assert_eq!(input.key_condition_expression.as_deref(), Some("#n0 = :v0"));
        assert_eq!(input.filter_expression.as_deref(), Some("#n1 > :v1"));
        assert_eq!(input.expression_attribute_names.len(), 2);
    }
}
