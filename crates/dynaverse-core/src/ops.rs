//! Lazily-evaluated operation descriptors.
//!
//! Writes and keyed reads are described by resolver closures rather than
//! eagerly-built requests: marshalling failures are carried inside the
//! closure and surface when the enclosing batch or transaction evaluates
//! it, which lets call sites compose fluently without sprinkling `?`
//! through every builder chain.

use dynaverse_model::AttributeValue;

use crate::expression::{Condition, Expression, Update};
use crate::record::{Item, Record};
use crate::{Error, Result};

/// A fully-resolved single-item write: target table, the item (or key,
/// for updates and deletes), and the compiled expressions. Immutable once
/// evaluated.
#[derive(Debug, Clone)]
pub struct WriteDescriptor {
    /// Target table name.
    pub table: String,
    /// The full item for a put, or the primary key for update/delete.
    pub item: Item,
    /// Compiled condition/update expressions with substitution maps.
    pub expression: Expression,
}

/// A fully-resolved keyed read: target table, primary key, and optional
/// projection.
#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    /// Target table name.
    pub table: String,
    /// The primary key.
    pub key: Item,
    /// Attributes to project, or `None` for the whole item.
    pub projection: Option<Vec<String>>,
}

/// Deferred write resolver. Evaluated once, immediately before the
/// operation is added to a batch or transaction.
pub type WriteItemFn = Box<dyn FnOnce() -> Result<WriteDescriptor> + Send>;

/// Deferred key resolver for reads.
pub type GetKeyFn = Box<dyn FnOnce() -> Result<KeyDescriptor> + Send>;

/// A write contribution that is either already resolved or still deferred.
///
/// Deferred sources are normalized to resolved descriptors immediately
/// before dispatch; a resolver failure aborts the enclosing build before
/// any remote call.
pub enum WriteSource {
    /// An already-evaluated descriptor.
    Resolved(WriteDescriptor),
    /// A resolver evaluated at dispatch-preparation time.
    Deferred(WriteItemFn),
}

impl WriteSource {
    /// Normalize to a resolved descriptor.
    pub fn resolve(self) -> Result<WriteDescriptor> {
        match self {
            Self::Resolved(descriptor) => Ok(descriptor),
            Self::Deferred(f) => f(),
        }
    }
}

impl From<WriteDescriptor> for WriteSource {
    fn from(descriptor: WriteDescriptor) -> Self {
        Self::Resolved(descriptor)
    }
}

impl From<WriteItemFn> for WriteSource {
    fn from(f: WriteItemFn) -> Self {
        Self::Deferred(f)
    }
}

impl std::fmt::Debug for WriteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved(d) => f.debug_tuple("Resolved").field(d).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Describe a put of `record` into `table`.
pub fn put_item<R: Record>(table: impl Into<String>, record: &R) -> WriteItemFn {
    let table = table.into();
    let item = record.to_item();
    Box::new(move || {
        Ok(WriteDescriptor {
            table,
            item: item?,
            expression: Expression::default(),
        })
    })
}

/// Describe a conditional put of `record` into `table`.
pub fn put_item_with<R: Record>(
    table: impl Into<String>,
    record: &R,
    condition: Condition,
) -> WriteItemFn {
    let table = table.into();
    let item = record.to_item();
    Box::new(move || {
        Ok(WriteDescriptor {
            table,
            item: item?,
            expression: Expression::builder().with_condition(condition).build(),
        })
    })
}

/// Describe a delete of the row addressed by `key`.
pub fn delete_item(key: GetKeyFn) -> WriteItemFn {
    Box::new(move || {
        let kd = key()?;
        Ok(WriteDescriptor {
            table: kd.table,
            item: kd.key,
            expression: Expression::default(),
        })
    })
}

/// Describe a conditional delete of the row addressed by `key`.
pub fn delete_item_with(key: GetKeyFn, condition: Condition) -> WriteItemFn {
    Box::new(move || {
        let kd = key()?;
        Ok(WriteDescriptor {
            table: kd.table,
            item: kd.key,
            expression: Expression::builder().with_condition(condition).build(),
        })
    })
}

/// Describe an update of the row addressed by `key`.
pub fn update_item(key: GetKeyFn, update: Update) -> WriteItemFn {
    Box::new(move || {
        let kd = key()?;
        Ok(WriteDescriptor {
            table: kd.table,
            item: kd.key,
            expression: Expression::builder().with_update(update).build(),
        })
    })
}

/// Describe a conditional update of the row addressed by `key`.
pub fn update_item_with(key: GetKeyFn, update: Update, condition: Condition) -> WriteItemFn {
    Box::new(move || {
        let kd = key()?;
        Ok(WriteDescriptor {
            table: kd.table,
            item: kd.key,
            expression: Expression::builder()
                .with_update(update)
                .with_condition(condition)
                .build(),
        })
    })
}

/// Describe an optimistic-locking update: the write applies only when the
/// revision attribute still holds `expected` (or is absent when `expected`
/// is zero), and bumps it by one in the same operation.
pub fn consistent_update_item(
    key: GetKeyFn,
    revision_attr: impl Into<String>,
    expected: i64,
    update: Update,
) -> WriteItemFn {
    let attr = revision_attr.into();
    Box::new(move || {
        let kd = key()?;
        let condition = if expected == 0 {
            Condition::attribute_not_exists(attr.clone())
        } else {
            Condition::eq(attr.clone(), expected)
        };
        let update = update.set(attr, expected + 1);
        Ok(WriteDescriptor {
            table: kd.table,
            item: kd.key,
            expression: Expression::builder()
                .with_update(update)
                .with_condition(condition)
                .build(),
        })
    })
}

/// Describe a keyed read from `table` with the given key attributes.
pub fn key_of<const N: usize>(
    table: impl Into<String>,
    pairs: [(&str, AttributeValue); N],
) -> GetKeyFn {
    let table = table.into();
    let key: Item = pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();
    Box::new(move || {
        Ok(KeyDescriptor {
            table,
            key,
            projection: None,
        })
    })
}

/// Describe a keyed, projected read from `table`.
pub fn key_of_projected<const N: usize>(
    table: impl Into<String>,
    pairs: [(&str, AttributeValue); N],
    projection: impl IntoIterator<Item = impl Into<String>>,
) -> GetKeyFn {
    let table = table.into();
    let key: Item = pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();
    let projection: Vec<String> = projection.into_iter().map(Into::into).collect();
    Box::new(move || {
        Ok(KeyDescriptor {
            table,
            key,
            projection: Some(projection),
        })
    })
}

/// Wrap a fallible caller-supplied key resolver, mapping its error into
/// the construction taxonomy.
pub fn try_key_of<F, E>(f: F) -> GetKeyFn
where
    F: FnOnce() -> std::result::Result<KeyDescriptor, E> + Send + 'static,
    E: std::fmt::Display,
{
    Box::new(move || f().map_err(|e| Error::Construction(e.to_string())))
}
