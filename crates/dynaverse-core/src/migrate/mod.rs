//! Declarative schema migration.
//!
//! A [`TableSchema`] states the desired shape of a table; applying it
//! creates the table when absent or diffs it against the live
//! description and issues only the changes. The [`Migrator`] sequences
//! schemas, tracks applied migration ids in a ledger table, and seeds
//! initial records.

pub mod runner;
pub mod schema;

pub use runner::{Migration, Migrator, SeedWriter, MIGRATION_TABLE};
pub use schema::TableSchema;
