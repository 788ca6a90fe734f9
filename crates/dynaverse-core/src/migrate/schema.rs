//! Desired table shape and the diff against a live table.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dynaverse_model::input::{
    CreateTableInput, DeleteTableInput, DescribeTableInput, DescribeTimeToLiveInput,
    UpdateTableInput, UpdateTimeToLiveInput,
};
use dynaverse_model::output::{CreateTableOutput, DeleteTableOutput, UpdateTableOutput};
use dynaverse_model::types::{
    AttributeDefinition, BillingMode, CreateGlobalSecondaryIndexAction,
    DeleteGlobalSecondaryIndexAction, GlobalSecondaryIndex, GlobalSecondaryIndexUpdate,
    KeySchemaElement, LocalSecondaryIndex, ProvisionedThroughput, TableClass, TableDescription,
    TimeToLiveSpecification, UpdateGlobalSecondaryIndexAction,
};

use crate::client::MigrationClient;
use crate::Result;

/// The desired shape of one table.
///
/// Field naming matches the wire protocol so parsed schema documents
/// deserialize directly into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TableSchema {
    /// The table name.
    pub table_name: String,
    /// Key attribute definitions.
    #[serde(rename = "AttributeDefinitions")]
    pub attributes: Vec<AttributeDefinition>,
    /// Partition and sort key layout.
    pub key_schema: Vec<KeySchemaElement>,
    /// Capacity, for provisioned tables.
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    /// Explicit billing mode; derived from throughput when absent.
    pub billing_mode: Option<BillingMode>,
    /// Desired global secondary indexes.
    pub global_secondary_indexes: Vec<GlobalSecondaryIndex>,
    /// Desired local secondary indexes.
    pub local_secondary_indexes: Vec<LocalSecondaryIndex>,
    /// Storage class.
    pub table_class: Option<TableClass>,
    /// Desired row expiry configuration.
    #[serde(rename = "TimeToLiveSpecification")]
    pub time_to_live: Option<TimeToLiveSpecification>,
}

impl TableSchema {
    /// The effective billing mode: the explicit one, else provisioned
    /// when read capacity is declared, else on-demand.
    #[must_use]
    pub fn billing_mode(&self) -> BillingMode {
        if let Some(mode) = self.billing_mode {
            return mode;
        }
        match self.provisioned_throughput {
            Some(tp) if tp.read_capacity_units > 0 => BillingMode::Provisioned,
            _ => BillingMode::PayPerRequest,
        }
    }

    /// Look up the live table, mapping service not-found to `None`.
    pub async fn exists<C>(&self, client: &C) -> Result<Option<TableDescription>>
    where
        C: MigrationClient + ?Sized,
    {
        match client
            .describe_table(DescribeTableInput {
                table_name: self.table_name.clone(),
            })
            .await
        {
            Ok(output) => Ok(output.table),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the table, then enable expiry when the schema asks for it.
    pub async fn create<C>(&self, client: &C) -> Result<CreateTableOutput>
    where
        C: MigrationClient + ?Sized,
    {
        info!(table = %self.table_name, "creating table");
        let output = client
            .create_table(CreateTableInput {
                table_name: self.table_name.clone(),
                key_schema: self.key_schema.clone(),
                attribute_definitions: self.attributes.clone(),
                billing_mode: Some(self.billing_mode()),
                provisioned_throughput: self.provisioned_throughput,
                global_secondary_indexes: self.global_secondary_indexes.clone(),
                local_secondary_indexes: self.local_secondary_indexes.clone(),
                table_class: self.table_class,
            })
            .await?;
        if let Some(ttl) = &self.time_to_live {
            client
                .update_time_to_live(UpdateTimeToLiveInput {
                    table_name: self.table_name.clone(),
                    time_to_live_specification: ttl.clone(),
                })
                .await?;
        }
        Ok(output)
    }

    /// Reconcile the live table with this schema: index diff, capacity
    /// and billing/class changes, then the expiry toggle.
    pub async fn update<C>(&self, client: &C, live: &TableDescription) -> Result<UpdateTableOutput>
    where
        C: MigrationClient + ?Sized,
    {
        info!(table = %self.table_name, "updating table");
        let billing_mode = {
            let current = live
                .billing_mode_summary
                .map(|s| s.billing_mode)
                .unwrap_or_default();
            (self.billing_mode() != current).then(|| self.billing_mode())
        };
        let table_class = match (self.table_class, &live.table_class_summary) {
            (Some(desired), Some(summary)) if desired != summary.table_class => Some(desired),
            (Some(desired), None) => Some(desired),
            _ => None,
        };
        let provisioned_throughput = self.provisioned_throughput.filter(|tp| {
            live.provisioned_throughput.is_none_or(|live_tp| {
                live_tp.read_capacity_units != tp.read_capacity_units
                    || live_tp.write_capacity_units != tp.write_capacity_units
            })
        });
        let output = client
            .update_table(UpdateTableInput {
                table_name: self.table_name.clone(),
                attribute_definitions: self.attributes.clone(),
                billing_mode,
                provisioned_throughput,
                global_secondary_index_updates: self.index_updates(live),
                table_class,
            })
            .await?;
        if let Some(ttl) = &self.time_to_live {
            self.reconcile_time_to_live(client, ttl).await?;
        }
        Ok(output)
    }

    /// Drop the table.
    pub async fn delete<C>(&self, client: &C) -> Result<DeleteTableOutput>
    where
        C: MigrationClient + ?Sized,
    {
        info!(table = %self.table_name, "deleting table");
        let output = client
            .delete_table(DeleteTableInput {
                table_name: self.table_name.clone(),
            })
            .await?;
        Ok(output)
    }

    /// Diff desired global secondary indexes against the live ones:
    /// create the missing, re-provision the changed, delete the removed.
    #[must_use]
    pub fn index_updates(&self, live: &TableDescription) -> Vec<GlobalSecondaryIndexUpdate> {
        let mut updates = Vec::new();
        let mut removed: Vec<&str> = live
            .global_secondary_indexes
            .iter()
            .map(|d| d.index_name.as_str())
            .collect();
        for desired in &self.global_secondary_indexes {
            let existing = live
                .global_secondary_indexes
                .iter()
                .find(|d| d.index_name == desired.index_name);
            match existing {
                None => updates.push(GlobalSecondaryIndexUpdate {
                    create: Some(CreateGlobalSecondaryIndexAction {
                        index_name: desired.index_name.clone(),
                        key_schema: desired.key_schema.clone(),
                        projection: desired.projection.clone(),
                        provisioned_throughput: desired.provisioned_throughput,
                    }),
                    ..GlobalSecondaryIndexUpdate::default()
                }),
                Some(description) => {
                    removed.retain(|name| *name != desired.index_name);
                    if let Some(tp) = desired.provisioned_throughput {
                        let changed = description.provisioned_throughput.is_none_or(|live_tp| {
                            live_tp.read_capacity_units != tp.read_capacity_units
                                || live_tp.write_capacity_units != tp.write_capacity_units
                        });
                        if changed {
                            updates.push(GlobalSecondaryIndexUpdate {
                                update: Some(UpdateGlobalSecondaryIndexAction {
                                    index_name: desired.index_name.clone(),
                                    provisioned_throughput: tp,
                                }),
                                ..GlobalSecondaryIndexUpdate::default()
                            });
                        }
                    }
                }
            }
        }
        for name in removed {
            updates.push(GlobalSecondaryIndexUpdate {
                delete: Some(DeleteGlobalSecondaryIndexAction {
                    index_name: name.to_owned(),
                }),
                ..GlobalSecondaryIndexUpdate::default()
            });
        }
        updates
    }

    /// Toggle expiry only when the live status disagrees with the
    /// schema.
    async fn reconcile_time_to_live<C>(
        &self,
        client: &C,
        desired: &TimeToLiveSpecification,
    ) -> Result<()>
    where
        C: MigrationClient + ?Sized,
    {
        let live = client
            .describe_time_to_live(DescribeTimeToLiveInput {
                table_name: self.table_name.clone(),
            })
            .await?;
        let live_enabled = live
            .time_to_live_description
            .and_then(|d| d.time_to_live_status)
            .is_some_and(dynaverse_model::types::TimeToLiveStatus::is_enabled);
        if live_enabled == desired.enabled {
            debug!(table = %self.table_name, enabled = desired.enabled, "expiry already in desired state");
            return Ok(());
        }
        client
            .update_time_to_live(UpdateTimeToLiveInput {
                table_name: self.table_name.clone(),
                time_to_live_specification: desired.clone(),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dynaverse_model::types::{
        GlobalSecondaryIndexDescription, KeyType, Projection, ProvisionedThroughputDescription,
    };

    use super::*;

    fn key(name: &str) -> Vec<KeySchemaElement> {
        vec![KeySchemaElement {
            attribute_name: name.to_owned(),
            key_type: KeyType::Hash,
        }]
    }

    fn desired_index(name: &str, read: i64, write: i64) -> GlobalSecondaryIndex {
        GlobalSecondaryIndex {
            index_name: name.to_owned(),
            key_schema: key("gsi_pk"),
            projection: Projection::default(),
            provisioned_throughput: Some(ProvisionedThroughput {
                read_capacity_units: read,
                write_capacity_units: write,
            }),
        }
    }

    fn live_index(name: &str, read: i64, write: i64) -> GlobalSecondaryIndexDescription {
        GlobalSecondaryIndexDescription {
            index_name: name.to_owned(),
            key_schema: key("gsi_pk"),
            projection: None,
            index_status: None,
            provisioned_throughput: Some(ProvisionedThroughputDescription {
                read_capacity_units: read,
                write_capacity_units: write,
            }),
        }
    }

    #[test]
    fn test_should_derive_billing_mode_from_throughput() {
        let mut schema = TableSchema::default();
        assert_eq!(schema.billing_mode(), BillingMode::PayPerRequest);
        schema.provisioned_throughput = Some(ProvisionedThroughput {
            read_capacity_units: 5,
            write_capacity_units: 5,
        });
        assert_eq!(schema.billing_mode(), BillingMode::Provisioned);
        schema.billing_mode = Some(BillingMode::PayPerRequest);
        assert_eq!(schema.billing_mode(), BillingMode::PayPerRequest);
    }

    #[test]
    fn test_should_diff_indexes_into_create_update_delete() {
        let schema = TableSchema {
            table_name: "orders".to_owned(),
            global_secondary_indexes: vec![
                desired_index("kept", 5, 5),
                desired_index("reprovisioned", 10, 10),
                desired_index("added", 1, 1),
            ],
            ..TableSchema::default()
        };
        let live = TableDescription {
            global_secondary_indexes: vec![
                live_index("kept", 5, 5),
                live_index("reprovisioned", 5, 5),
                live_index("dropped", 5, 5),
            ],
            ..TableDescription::default()
        };
        let updates = schema.index_updates(&live);
        assert_eq!(updates.len(), 3);
        assert!(updates
            .iter()
            .any(|u| u.create.as_ref().is_some_and(|c| c.index_name == "added")));
        assert!(updates.iter().any(|u| u
            .update
            .as_ref()
            .is_some_and(|c| c.index_name == "reprovisioned"
                && c.provisioned_throughput.read_capacity_units == 10)));
        assert!(updates
            .iter()
            .any(|u| u.delete.as_ref().is_some_and(|d| d.index_name == "dropped")));
    }

    #[test]
    fn test_should_delete_every_live_index_when_schema_has_none() {
        let schema = TableSchema::default();
        let live = TableDescription {
            global_secondary_indexes: vec![live_index("a", 1, 1), live_index("b", 1, 1)],
            ..TableDescription::default()
        };
        let updates = schema.index_updates(&live);
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.delete.is_some()));
    }

    #[test]
    fn test_should_deserialize_wire_named_schema_document() {
        let doc = serde_json::json!({
            "TableName": "orders",
            "AttributeDefinitions": [
                {"AttributeName": "id", "AttributeType": "S"}
            ],
            "KeySchema": [
                {"AttributeName": "id", "KeyType": "HASH"}
            ],
            "TimeToLiveSpecification": {
                "AttributeName": "expired_at",
                "Enabled": true
            }
        });
        let schema: TableSchema = serde_json::from_value(doc).unwrap();
        assert_eq!(schema.table_name, "orders");
        assert_eq!(schema.attributes.len(), 1);
        assert!(schema.time_to_live.is_some_and(|ttl| ttl.enabled));
    }
}
