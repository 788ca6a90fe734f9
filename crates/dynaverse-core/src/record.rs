//! Record marshalling: entity structs to and from attribute-value items.
//!
//! There is no reflection here. A type opts in by implementing [`Record`]
//! with explicit field-by-field mapping; [`ItemExt`] keeps those
//! implementations terse. Post-fetch processing is an explicit callback on
//! the fetch operations, not a capability detected on the record type.

use std::str::FromStr;

use dynaverse_model::AttributeValue;

/// An attribute-name-to-value map, re-exported from the wire model.
pub type Item = dynaverse_model::Item;

/// A record ↔ item conversion failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    /// A required attribute was absent from the item.
    #[error("missing attribute: {0}")]
    MissingAttribute(String),

    /// An attribute was present with an unexpected wire type.
    #[error("attribute '{attr}' has wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// The attribute name.
        attr: String,
        /// The expected wire type tag.
        expected: &'static str,
        /// The actual wire type tag.
        actual: &'static str,
    },

    /// A number attribute failed to parse into the requested Rust type.
    #[error("attribute '{attr}' is not a valid number: {value}")]
    InvalidNumber {
        /// The attribute name.
        attr: String,
        /// The offending string-encoded value.
        value: String,
    },
}

/// Field-by-field mapping between an entity and its item form.
pub trait Record: Sized {
    /// Marshal this record into an item.
    fn to_item(&self) -> Result<Item, MarshalError>;

    /// Unmarshal a record from an item.
    fn from_item(item: &Item) -> Result<Self, MarshalError>;
}

/// Typed attribute extraction helpers for hand-written [`Record`] impls.
pub trait ItemExt {
    /// A required string attribute.
    fn get_s(&self, attr: &str) -> Result<&str, MarshalError>;

    /// An optional string attribute; absent and null both map to `None`.
    fn get_s_opt(&self, attr: &str) -> Result<Option<&str>, MarshalError>;

    /// A required boolean attribute.
    fn get_bool(&self, attr: &str) -> Result<bool, MarshalError>;

    /// A required number attribute, parsed into `T`.
    fn get_n<T: FromStr>(&self, attr: &str) -> Result<T, MarshalError>;
}

impl ItemExt for Item {
    fn get_s(&self, attr: &str) -> Result<&str, MarshalError> {
        let value = self
            .get(attr)
            .ok_or_else(|| MarshalError::MissingAttribute(attr.to_owned()))?;
        value.as_s().ok_or_else(|| MarshalError::WrongType {
            attr: attr.to_owned(),
            expected: "S",
            actual: value.type_tag(),
        })
    }

    fn get_s_opt(&self, attr: &str) -> Result<Option<&str>, MarshalError> {
        match self.get(attr) {
            None => Ok(None),
            Some(v) if v.is_null() => Ok(None),
            Some(value) => value
                .as_s()
                .map(Some)
                .ok_or_else(|| MarshalError::WrongType {
                    attr: attr.to_owned(),
                    expected: "S",
                    actual: value.type_tag(),
                }),
        }
    }

    fn get_bool(&self, attr: &str) -> Result<bool, MarshalError> {
        let value = self
            .get(attr)
            .ok_or_else(|| MarshalError::MissingAttribute(attr.to_owned()))?;
        value.as_bool().ok_or_else(|| MarshalError::WrongType {
            attr: attr.to_owned(),
            expected: "BOOL",
            actual: value.type_tag(),
        })
    }

    fn get_n<T: FromStr>(&self, attr: &str) -> Result<T, MarshalError> {
        let value = self
            .get(attr)
            .ok_or_else(|| MarshalError::MissingAttribute(attr.to_owned()))?;
        let raw = value.as_n().ok_or_else(|| MarshalError::WrongType {
            attr: attr.to_owned(),
            expected: "N",
            actual: value.type_tag(),
        })?;
        raw.parse().map_err(|_| MarshalError::InvalidNumber {
            attr: attr.to_owned(),
            value: raw.to_owned(),
        })
    }
}

/// Build an item from `(name, value)` pairs.
pub fn item_of<const N: usize>(pairs: [(&str, AttributeValue); N]) -> Item {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}
