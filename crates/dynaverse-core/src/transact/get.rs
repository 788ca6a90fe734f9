//! The transactionally consistent multi-item read builder.

use tracing::debug;

use dynaverse_model::input::TransactGetItemsInput;
use dynaverse_model::output::TransactGetItemsOutput;
use dynaverse_model::types::{TransactGet, TransactGetItem};

use crate::client::TransactGetClient;
use crate::error::RequestKind;
use crate::expression::Expression;
use crate::ops::GetKeyFn;
use crate::record::Item;
use crate::transact::MAX_TRANSACT_GET_ITEMS;
use crate::{Error, Result};

/// Accumulates keyed reads and dispatches them in capped groups, each
/// read from one consistent snapshot.
///
/// Responses are positional: the builder zips them back with the
/// requested tables and hands each found item to the fetch callback.
/// Like the write side, a resolver failure latches and aborts the run
/// before any remote call.
#[derive(Default)]
pub struct TransactGetBuilder {
    items: Vec<TransactGetItem>,
    error: Option<Error>,
}

impl TransactGetBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue keyed reads. A single call may queue at most the transact
    /// get cap; larger sets latch a [`Error::TooManyItems`].
    pub fn get(&mut self, keys: impl IntoIterator<Item = GetKeyFn>) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        let mut keys = keys.into_iter();
        let mut added = 0usize;
        while let Some(key) = keys.next() {
            if added >= MAX_TRANSACT_GET_ITEMS {
                // the popped key plus whatever the caller still has queued
                self.error = Some(Error::TooManyItems {
                    kind: RequestKind::TransactGet,
                    max: MAX_TRANSACT_GET_ITEMS,
                    actual: added + 1 + keys.count(),
                });
                return self;
            }
            match key() {
                Ok(kd) => {
                    let expression = match kd.projection {
                        Some(attrs) => Expression::builder().with_projection(attrs).build(),
                        None => Expression::default(),
                    };
                    self.items.push(TransactGetItem {
                        get: TransactGet {
                            table_name: kd.table,
                            key: kd.key,
                            projection_expression: expression.projection,
                            expression_attribute_names: expression.names,
                        },
                    });
                    added += 1;
                }
                Err(e) => {
                    self.error = Some(e);
                    return self;
                }
            }
        }
        self
    }

    /// Total queued reads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` when a failure has latched.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Dispatch every group in order, delivering each found item to
    /// `fetch` with its table name. Returns the last group's output.
    pub async fn run<C, F>(&mut self, client: &C, mut fetch: F) -> Result<TransactGetItemsOutput>
    where
        C: TransactGetClient + ?Sized,
        F: FnMut(&str, &Item) -> Result<()> + Send,
    {
        let items = std::mem::take(&mut self.items);
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        let mut output = TransactGetItemsOutput::default();
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            let group: Vec<TransactGetItem> =
                items.by_ref().take(MAX_TRANSACT_GET_ITEMS).collect();
            debug!(items = group.len(), "dispatching transactional get group");
            let tables: Vec<String> = group.iter().map(|i| i.get.table_name.clone()).collect();
            output = client
                .transact_get_items(TransactGetItemsInput {
                    transact_items: group,
                    ..TransactGetItemsInput::default()
                })
                .await?;
            for (table, response) in tables.iter().zip(&output.responses) {
                if let Some(item) = &response.item {
                    fetch(table, item)?;
                }
            }
        }
        Ok(output)
    }
}

impl std::fmt::Debug for TransactGetBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactGetBuilder")
            .field("items", &self.items.len())
            .field("has_error", &self.error.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use dynaverse_model::types::ItemResponse;
    use dynaverse_model::{AttributeValue, ServiceError};

    use super::*;
    use crate::ops::key_of;

    fn keys(table: &'static str, n: usize) -> Vec<GetKeyFn> {
        (0..n)
            .map(|i| key_of(table, [("id", AttributeValue::s(format!("{table}-{i}")))]))
            .collect()
    }

    /// Echoes each requested key back as the found item; every third
    /// position is reported absent.
    struct Echo {
        inputs: Mutex<Vec<TransactGetItemsInput>>,
    }

    #[async_trait]
    impl TransactGetClient for Echo {
        async fn transact_get_items(
            &self,
            input: TransactGetItemsInput,
        ) -> std::result::Result<TransactGetItemsOutput, ServiceError> {
            let responses: Vec<ItemResponse> = input
                .transact_items
                .iter()
                .enumerate()
                .map(|(i, item)| ItemResponse {
                    item: (i % 3 != 2).then(|| item.get.key.clone()),
                })
                .collect();
            self.inputs.lock().push(input);
            Ok(TransactGetItemsOutput {
                responses,
                ..TransactGetItemsOutput::default()
            })
        }
    }

    #[tokio::test]
    async fn test_should_zip_positional_responses_with_tables() {
        let client = Echo {
            inputs: Mutex::new(Vec::new()),
        };
        let mut builder = TransactGetBuilder::new();
        builder.get(keys("alpha", 2)).get(keys("beta", 2));
        let mut seen = Vec::new();
        builder
            .run(&client, |table, item| {
                seen.push(format!("{table}/{}", item["id"].as_s().unwrap()));
                Ok(())
            })
            .await
            .unwrap();
        // position 2 (beta-0) is reported absent by the mock
        assert_eq!(seen, vec!["alpha/alpha-0", "alpha/alpha-1", "beta/beta-1"]);
    }

    #[tokio::test]
    async fn test_should_split_oversized_read_sets_into_groups() {
        let client = Echo {
            inputs: Mutex::new(Vec::new()),
        };
        let mut builder = TransactGetBuilder::new();
        builder.get(keys("rows", 100)).get(keys("rows", 50));
        builder.run(&client, |_, _| Ok(())).await.unwrap();
        let inputs = client.inputs.lock();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].transact_items.len(), 100);
        assert_eq!(inputs[1].transact_items.len(), 50);
    }

    #[tokio::test]
    async fn test_should_latch_cap_violation_per_call() {
        let client = Echo {
            inputs: Mutex::new(Vec::new()),
        };
        let mut builder = TransactGetBuilder::new();
        builder.get(keys("rows", 130));
        assert!(builder.has_error());
        let err = builder.run(&client, |_, _| Ok(())).await.unwrap_err();
        assert!(matches!(
            err,
            Error::TooManyItems {
                kind: RequestKind::TransactGet,
                max: 100,
                actual: 130,
            }
        ));
        assert!(client.inputs.lock().is_empty());
    }

    #[tokio::test]
    async fn test_should_abort_on_fetch_error() {
        let client = Echo {
            inputs: Mutex::new(Vec::new()),
        };
        let mut builder = TransactGetBuilder::new();
        builder.get(keys("rows", 2));
        let err = builder
            .run(&client, |_, _| Err(Error::Construction("stop".to_owned())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
    }
}
