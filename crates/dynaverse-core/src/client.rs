//! Async capability traits the remote service is consumed through.
//!
//! Each trait covers one narrow capability so test doubles only implement
//! what they exercise. The traits are object-safe (`#[async_trait]`) so a
//! shared client can be passed as `&dyn` or held in an `Arc`.
//!
//! Errors are always [`ServiceError`]; classification into the layer's own
//! taxonomy happens in the calling modules.

use async_trait::async_trait;

use dynaverse_model::input::{
    BatchGetItemInput, BatchWriteItemInput, CreateTableInput, DeleteItemInput, DeleteTableInput,
    DescribeTableInput, DescribeTimeToLiveInput, GetItemInput, PutItemInput, QueryInput, ScanInput,
    TransactGetItemsInput, TransactWriteItemsInput, UpdateItemInput, UpdateTableInput,
    UpdateTimeToLiveInput,
};
use dynaverse_model::output::{
    BatchGetItemOutput, BatchWriteItemOutput, CreateTableOutput, DeleteItemOutput,
    DeleteTableOutput, DescribeTableOutput, DescribeTimeToLiveOutput, GetItemOutput, PutItemOutput,
    QueryOutput, ScanOutput, TransactGetItemsOutput, TransactWriteItemsOutput, UpdateItemOutput,
    UpdateTableOutput, UpdateTimeToLiveOutput,
};
use dynaverse_model::ServiceError;

/// Single-item reads.
#[async_trait]
pub trait GetClient: Send + Sync {
    /// Fetch one item by primary key.
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, ServiceError>;
}

/// Single-item writes.
#[async_trait]
pub trait WriteClient: Send + Sync {
    /// Insert or replace one item.
    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, ServiceError>;
    /// Update one item in place.
    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, ServiceError>;
    /// Delete one item by primary key.
    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, ServiceError>;
}

/// Table scans.
#[async_trait]
pub trait ScanClient: Send + Sync {
    /// Fetch one page of a scan.
    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, ServiceError>;
}

/// Key-condition queries.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Fetch one page of a query.
    async fn query(&self, input: QueryInput) -> Result<QueryOutput, ServiceError>;
}

/// Batched writes with a best-effort completion contract.
#[async_trait]
pub trait BatchWriteClient: Send + Sync {
    /// Submit up to the provider's write cap of put/delete requests.
    /// Unprocessed entries come back for caller-driven retry.
    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, ServiceError>;
}

/// Batched reads with a best-effort completion contract.
#[async_trait]
pub trait BatchGetClient: Send + Sync {
    /// Submit up to the provider's read cap of keys. Unprocessed keys come
    /// back for caller-driven retry.
    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, ServiceError>;
}

/// All-or-nothing transactional writes.
#[async_trait]
pub trait TransactWriteClient: Send + Sync {
    /// Apply every contained operation atomically, or none of them.
    async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, ServiceError>;
}

/// Transactionally consistent multi-item reads.
#[async_trait]
pub trait TransactGetClient: Send + Sync {
    /// Read every contained key from one consistent snapshot.
    async fn transact_get_items(
        &self,
        input: TransactGetItemsInput,
    ) -> Result<TransactGetItemsOutput, ServiceError>;
}

/// The table-management surface the migration driver needs, plus the
/// item operations it uses for its own ledger.
#[async_trait]
pub trait MigrationClient: GetClient + Send + Sync {
    /// Describe a table's live schema.
    async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> Result<DescribeTableOutput, ServiceError>;
    /// Create a table.
    async fn create_table(
        &self,
        input: CreateTableInput,
    ) -> Result<CreateTableOutput, ServiceError>;
    /// Apply schema changes to an existing table.
    async fn update_table(
        &self,
        input: UpdateTableInput,
    ) -> Result<UpdateTableOutput, ServiceError>;
    /// Drop a table.
    async fn delete_table(
        &self,
        input: DeleteTableInput,
    ) -> Result<DeleteTableOutput, ServiceError>;
    /// Report a table's expiry configuration.
    async fn describe_time_to_live(
        &self,
        input: DescribeTimeToLiveInput,
    ) -> Result<DescribeTimeToLiveOutput, ServiceError>;
    /// Enable or disable attribute-based expiry on a table.
    async fn update_time_to_live(
        &self,
        input: UpdateTimeToLiveInput,
    ) -> Result<UpdateTimeToLiveOutput, ServiceError>;
    /// Insert or replace one item (ledger records and seeds).
    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, ServiceError>;
}
