//! Single-item write helpers.
//!
//! Thin coordination over [`WriteClient`]: a descriptor (resolved or
//! deferred) is normalized, its expressions are split into the request
//! fields, and the service output passes through untouched.

use tracing::debug;

use dynaverse_model::input::{DeleteItemInput, PutItemInput, UpdateItemInput};
use dynaverse_model::output::{DeleteItemOutput, PutItemOutput, UpdateItemOutput};
use dynaverse_model::types::{
    ReturnConsumedCapacity, ReturnItemCollectionMetrics, ReturnValue,
};

use crate::client::WriteClient;
use crate::ops::WriteSource;
use crate::Result;

/// Options shared by the single-item write family.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Which attribute values to echo back.
    pub return_values: Option<ReturnValue>,
    /// Capacity reporting mode.
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    /// Item-collection metrics reporting mode.
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

/// Insert or replace one item.
pub async fn put<C>(
    client: &C,
    source: impl Into<WriteSource>,
    options: &WriteOptions,
) -> Result<PutItemOutput>
where
    C: WriteClient + ?Sized,
{
    let descriptor = source.into().resolve()?;
    debug!(table = %descriptor.table, "put item");
    let output = client
        .put_item(PutItemInput {
            table_name: descriptor.table,
            item: descriptor.item,
            condition_expression: descriptor.expression.condition,
            expression_attribute_names: descriptor.expression.names,
            expression_attribute_values: descriptor.expression.values,
            return_values: options.return_values,
            return_consumed_capacity: options.return_consumed_capacity,
            return_item_collection_metrics: options.return_item_collection_metrics,
        })
        .await?;
    Ok(output)
}

/// Update one item in place.
pub async fn update<C>(
    client: &C,
    source: impl Into<WriteSource>,
    options: &WriteOptions,
) -> Result<UpdateItemOutput>
where
    C: WriteClient + ?Sized,
{
    let descriptor = source.into().resolve()?;
    debug!(table = %descriptor.table, "update item");
    let output = client
        .update_item(UpdateItemInput {
            table_name: descriptor.table,
            key: descriptor.item,
            update_expression: descriptor.expression.update,
            condition_expression: descriptor.expression.condition,
            expression_attribute_names: descriptor.expression.names,
            expression_attribute_values: descriptor.expression.values,
            return_values: options.return_values,
            return_consumed_capacity: options.return_consumed_capacity,
            return_item_collection_metrics: options.return_item_collection_metrics,
        })
        .await?;
    Ok(output)
}

/// Delete one item by key.
pub async fn delete<C>(
    client: &C,
    source: impl Into<WriteSource>,
    options: &WriteOptions,
) -> Result<DeleteItemOutput>
where
    C: WriteClient + ?Sized,
{
    let descriptor = source.into().resolve()?;
    debug!(table = %descriptor.table, "delete item");
    let output = client
        .delete_item(DeleteItemInput {
            table_name: descriptor.table,
            key: descriptor.item,
            condition_expression: descriptor.expression.condition,
            expression_attribute_names: descriptor.expression.names,
            expression_attribute_values: descriptor.expression.values,
            return_values: options.return_values,
            return_consumed_capacity: options.return_consumed_capacity,
            return_item_collection_metrics: options.return_item_collection_metrics,
        })
        .await?;
    Ok(output)
}
