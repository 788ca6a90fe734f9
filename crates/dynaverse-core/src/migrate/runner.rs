//! The migration driver and its applied-migration ledger.

use async_trait::async_trait;
use tracing::{debug, info};

use dynaverse_model::input::{CreateTableInput, DescribeTableInput, GetItemInput, PutItemInput};
use dynaverse_model::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use dynaverse_model::AttributeValue;

use crate::client::MigrationClient;
use crate::migrate::TableSchema;
use crate::record::{item_of, Item};
use crate::Result;

/// The ledger table holding applied migration ids.
pub const MIGRATION_TABLE: &str = "dynamo_migrations";

/// One migration: a stable id, the desired table shape, and optional
/// seed records.
#[derive(Debug, Clone, Default)]
pub struct Migration {
    /// Stable identifier recorded in the ledger once applied.
    pub id: String,
    /// The table to create or reconcile.
    pub table: TableSchema,
    /// Records written after the table is in shape.
    pub records: Vec<Item>,
}

/// Writes one seed record. Supplied by the caller when seeding needs
/// anything beyond a plain put (conditional writes, enrichment, …).
#[async_trait]
pub trait SeedWriter: Send + Sync {
    /// Persist `record` into `table`.
    async fn save(&self, table: &str, record: Item) -> Result<()>;
}

/// Applies a sequence of migrations exactly once each.
///
/// The driver ensures the ledger table exists, skips migrations whose id
/// is already recorded, creates or updates each pending table, seeds its
/// records, and records the id last so a failed migration reruns on the
/// next attempt.
#[derive(Debug, Default)]
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    /// A driver with no migrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a migration. Order is preserved.
    pub fn add(&mut self, migration: Migration) -> &mut Self {
        self.migrations.push(migration);
        self
    }

    /// The number of queued migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Apply every pending migration in order. Seed records go through
    /// `seeds` when given, else a plain put on `client`.
    pub async fn run<C>(&self, client: &C, seeds: Option<&dyn SeedWriter>) -> Result<()>
    where
        C: MigrationClient + ?Sized,
    {
        ensure_ledger(client).await?;
        for migration in &self.migrations {
            if is_recorded(client, &migration.id).await? {
                debug!(id = %migration.id, "migration already applied, skipping");
                continue;
            }
            info!(id = %migration.id, table = %migration.table.table_name, "applying migration");
            match migration.table.exists(client).await? {
                Some(live) => {
                    migration.table.update(client, &live).await?;
                }
                None => {
                    migration.table.create(client).await?;
                }
            }
            for record in &migration.records {
                match seeds {
                    Some(writer) => {
                        writer
                            .save(&migration.table.table_name, record.clone())
                            .await?;
                    }
                    None => {
                        client
                            .put_item(PutItemInput {
                                table_name: migration.table.table_name.clone(),
                                item: record.clone(),
                                ..PutItemInput::default()
                            })
                            .await?;
                    }
                }
            }
            record_migration(client, &migration.id).await?;
            info!(id = %migration.id, "migration applied");
        }
        Ok(())
    }
}

/// Create the ledger table when it does not exist yet.
async fn ensure_ledger<C>(client: &C) -> Result<()>
where
    C: MigrationClient + ?Sized,
{
    match client
        .describe_table(DescribeTableInput {
            table_name: MIGRATION_TABLE.to_owned(),
        })
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            info!(table = MIGRATION_TABLE, "creating migration ledger table");
            client
                .create_table(CreateTableInput {
                    table_name: MIGRATION_TABLE.to_owned(),
                    key_schema: vec![KeySchemaElement {
                        attribute_name: "id".to_owned(),
                        key_type: KeyType::Hash,
                    }],
                    attribute_definitions: vec![AttributeDefinition {
                        attribute_name: "id".to_owned(),
                        attribute_type: ScalarAttributeType::S,
                    }],
                    billing_mode: Some(BillingMode::PayPerRequest),
                    ..CreateTableInput::default()
                })
                .await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn is_recorded<C>(client: &C, id: &str) -> Result<bool>
where
    C: MigrationClient + ?Sized,
{
    match client
        .get_item(GetItemInput {
            table_name: MIGRATION_TABLE.to_owned(),
            key: item_of([("id", AttributeValue::s(id))]),
            ..GetItemInput::default()
        })
        .await
    {
        Ok(output) => Ok(output.item.is_some_and(|item| !item.is_empty())),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn record_migration<C>(client: &C, id: &str) -> Result<()>
where
    C: MigrationClient + ?Sized,
{
    client
        .put_item(PutItemInput {
            table_name: MIGRATION_TABLE.to_owned(),
            item: item_of([("id", AttributeValue::s(id))]),
            ..PutItemInput::default()
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use parking_lot::Mutex;

    use dynaverse_model::input::{
        DeleteTableInput, DescribeTimeToLiveInput, UpdateTableInput, UpdateTimeToLiveInput,
    };
    use dynaverse_model::output::{
        CreateTableOutput, DeleteTableOutput, DescribeTableOutput, DescribeTimeToLiveOutput,
        GetItemOutput, PutItemOutput, UpdateTableOutput, UpdateTimeToLiveOutput,
    };
    use dynaverse_model::types::{TableDescription, TimeToLiveDescription, TimeToLiveStatus};
    use dynaverse_model::ServiceError;

    use super::*;
    use crate::client::GetClient;

    /// In-memory table catalog plus a single-table item store for the
    /// ledger and seeds.
    #[derive(Default)]
    struct Catalog {
        tables: Mutex<HashSet<String>>,
        ttl_enabled: Mutex<HashMap<String, bool>>,
        items: Mutex<HashMap<(String, String), Item>>,
        created: Mutex<Vec<String>>,
        updated: Mutex<Vec<String>>,
        ttl_updates: Mutex<Vec<UpdateTimeToLiveInput>>,
    }

    impl Catalog {
        fn with_tables(names: &[&str]) -> Self {
            let catalog = Self::default();
            catalog
                .tables
                .lock()
                .extend(names.iter().map(|n| (*n).to_owned()));
            catalog
        }

        fn item_key(input: &GetItemInput) -> (String, String) {
            let id = input.key["id"].as_s().unwrap_or_default().to_owned();
            (input.table_name.clone(), id)
        }
    }

    #[async_trait]
    impl GetClient for Catalog {
        async fn get_item(
            &self,
            input: GetItemInput,
        ) -> std::result::Result<GetItemOutput, ServiceError> {
            if !self.tables.lock().contains(&input.table_name) {
                return Err(ServiceError::not_found(&input.table_name));
            }
            let item = self.items.lock().get(&Self::item_key(&input)).cloned();
            Ok(GetItemOutput {
                item,
                ..GetItemOutput::default()
            })
        }
    }

    #[async_trait]
    impl MigrationClient for Catalog {
        async fn describe_table(
            &self,
            input: DescribeTableInput,
        ) -> std::result::Result<DescribeTableOutput, ServiceError> {
            if self.tables.lock().contains(&input.table_name) {
                Ok(DescribeTableOutput {
                    table: Some(TableDescription {
                        table_name: Some(input.table_name),
                        ..TableDescription::default()
                    }),
                })
            } else {
                Err(ServiceError::not_found(&input.table_name))
            }
        }

        async fn create_table(
            &self,
            input: CreateTableInput,
        ) -> std::result::Result<CreateTableOutput, ServiceError> {
            self.tables.lock().insert(input.table_name.clone());
            self.created.lock().push(input.table_name);
            Ok(CreateTableOutput::default())
        }

        async fn update_table(
            &self,
            input: UpdateTableInput,
        ) -> std::result::Result<UpdateTableOutput, ServiceError> {
            self.updated.lock().push(input.table_name);
            Ok(UpdateTableOutput::default())
        }

        async fn delete_table(
            &self,
            input: DeleteTableInput,
        ) -> std::result::Result<DeleteTableOutput, ServiceError> {
            self.tables.lock().remove(&input.table_name);
            Ok(DeleteTableOutput::default())
        }

        async fn describe_time_to_live(
            &self,
            input: DescribeTimeToLiveInput,
        ) -> std::result::Result<DescribeTimeToLiveOutput, ServiceError> {
            let enabled = self
                .ttl_enabled
                .lock()
                .get(&input.table_name)
                .copied()
                .unwrap_or(false);
            Ok(DescribeTimeToLiveOutput {
                time_to_live_description: Some(TimeToLiveDescription {
                    time_to_live_status: Some(if enabled {
                        TimeToLiveStatus::Enabled
                    } else {
                        TimeToLiveStatus::Disabled
                    }),
                    attribute_name: None,
                }),
            })
        }

        async fn update_time_to_live(
            &self,
            input: UpdateTimeToLiveInput,
        ) -> std::result::Result<UpdateTimeToLiveOutput, ServiceError> {
            self.ttl_enabled.lock().insert(
                input.table_name.clone(),
                input.time_to_live_specification.enabled,
            );
            self.ttl_updates.lock().push(input);
            Ok(UpdateTimeToLiveOutput::default())
        }

        async fn put_item(
            &self,
            input: PutItemInput,
        ) -> std::result::Result<PutItemOutput, ServiceError> {
            let id = input.item["id"].as_s().unwrap_or_default().to_owned();
            self.items.lock().insert((input.table_name, id), input.item);
            Ok(PutItemOutput::default())
        }
    }

    fn migration(id: &str, table: &str) -> Migration {
        Migration {
            id: id.to_owned(),
            table: TableSchema {
                table_name: table.to_owned(),
                ..TableSchema::default()
            },
            records: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_should_create_ledger_and_pending_tables() {
        let client = Catalog::default();
        let mut migrator = Migrator::new();
        migrator.add(migration("001_orders", "orders"));
        migrator.run(&client, None).await.unwrap();
        let created = client.created.lock();
        assert_eq!(*created, vec!["dynamo_migrations", "orders"]);
        assert!(client
            .items
            .lock()
            .contains_key(&("dynamo_migrations".to_owned(), "001_orders".to_owned())));
    }

    #[tokio::test]
    async fn test_should_skip_recorded_migrations() {
        let client = Catalog::with_tables(&[MIGRATION_TABLE, "orders"]);
        client.items.lock().insert(
            (MIGRATION_TABLE.to_owned(), "001_orders".to_owned()),
            item_of([("id", AttributeValue::s("001_orders"))]),
        );
        let mut migrator = Migrator::new();
        migrator.add(migration("001_orders", "orders"));
        migrator.run(&client, None).await.unwrap();
        assert!(client.created.lock().is_empty());
        assert!(client.updated.lock().is_empty());
    }

    #[tokio::test]
    async fn test_should_update_existing_tables_instead_of_creating() {
        let client = Catalog::with_tables(&[MIGRATION_TABLE, "orders"]);
        let mut migrator = Migrator::new();
        migrator.add(migration("002_orders_gsi", "orders"));
        migrator.run(&client, None).await.unwrap();
        assert!(client.created.lock().is_empty());
        assert_eq!(*client.updated.lock(), vec!["orders"]);
    }

    #[tokio::test]
    async fn test_should_seed_records_before_recording_the_id() {
        let client = Catalog::default();
        let mut m = migration("003_seed", "settings");
        m.records = vec![item_of([
            ("id", AttributeValue::s("default")),
            ("retention_days", AttributeValue::n(30)),
        ])];
        let mut migrator = Migrator::new();
        migrator.add(m);
        migrator.run(&client, None).await.unwrap();
        let items = client.items.lock();
        assert!(items.contains_key(&("settings".to_owned(), "default".to_owned())));
        assert!(items.contains_key(&(MIGRATION_TABLE.to_owned(), "003_seed".to_owned())));
    }

    #[tokio::test]
    async fn test_should_toggle_expiry_only_on_disagreement() {
        let client = Catalog::with_tables(&[MIGRATION_TABLE, "sessions"]);
        client.ttl_enabled.lock().insert("sessions".to_owned(), true);
        let mut m = migration("004_sessions_ttl", "sessions");
        m.table.time_to_live = Some(dynaverse_model::types::TimeToLiveSpecification {
            attribute_name: "expired_at".to_owned(),
            enabled: true,
        });
        let mut migrator = Migrator::new();
        migrator.add(m);
        migrator.run(&client, None).await.unwrap();
        // live already enabled and schema agrees, so no toggle happened
        assert!(client.ttl_updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_should_route_seeds_through_custom_writer() {
        struct Collect(Mutex<Vec<(String, Item)>>);

        #[async_trait]
        impl SeedWriter for Collect {
            async fn save(&self, table: &str, record: Item) -> Result<()> {
                self.0.lock().push((table.to_owned(), record));
                Ok(())
            }
        }

        let client = Catalog::default();
        let writer = Collect(Mutex::new(Vec::new()));
        let mut m = migration("005_seed", "settings");
        m.records = vec![item_of([("id", AttributeValue::s("row"))])];
        let mut migrator = Migrator::new();
        migrator.add(m);
        migrator.run(&client, Some(&writer)).await.unwrap();
        let seen = writer.0.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "settings");
        // the default put path was not used for the seed
        assert!(!client
            .items
            .lock()
            .contains_key(&("settings".to_owned(), "row".to_owned())));
    }
}
