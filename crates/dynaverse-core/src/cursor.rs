//! Opaque continuation-key cursor.
//!
//! A page's last evaluated key is an attribute map; callers hand it back
//! as an opaque string token. The token is URL-safe base64 (no padding)
//! over a JSON map of `{attr: {"t": tag, "v": value}}` entries, so it can
//! ride in a query parameter unescaped. Only the scalar key attribute
//! types round-trip: strings, numbers, and booleans.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use dynaverse_model::AttributeValue;

use crate::record::Item;
use crate::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    t: String,
    v: String,
}

/// A continuation key: the attribute map a paged read stopped at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatedKey(pub Item);

impl EvaluatedKey {
    /// Wrap a raw attribute map.
    #[must_use]
    pub fn new(key: Item) -> Self {
        Self(key)
    }

    /// Returns `true` when there is no continuation point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the wrapper, yielding the raw attribute map.
    #[must_use]
    pub fn into_inner(self) -> Item {
        self.0
    }

    /// Encode into an opaque URL-safe token.
    ///
    /// # Errors
    ///
    /// Fails when a key attribute is not a string, number, or boolean.
    pub fn encode(&self) -> Result<String> {
        let mut entries = BTreeMap::new();
        for (attr, value) in &self.0 {
            let entry = match value {
                AttributeValue::S(s) => Entry {
                    t: "s".to_owned(),
                    v: s.clone(),
                },
                AttributeValue::N(n) => Entry {
                    t: "n".to_owned(),
                    v: n.clone(),
                },
                AttributeValue::Bool(b) => Entry {
                    t: "b".to_owned(),
                    v: b.to_string(),
                },
                other => {
                    return Err(Error::InvalidCursor(format!(
                        "unsupported key attribute type {} for '{attr}'",
                        other.type_tag()
                    )));
                }
            };
            entries.insert(attr.clone(), entry);
        }
        let json = serde_json::to_vec(&entries)
            .map_err(|e| Error::InvalidCursor(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a token produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Fails on malformed base64, malformed JSON, or an unknown type tag.
    pub fn decode(token: &str) -> Result<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| Error::InvalidCursor(e.to_string()))?;
        let entries: BTreeMap<String, Entry> =
            serde_json::from_slice(&raw).map_err(|e| Error::InvalidCursor(e.to_string()))?;
        let mut key = Item::new();
        for (attr, entry) in entries {
            let value = match entry.t.as_str() {
                "s" => AttributeValue::S(entry.v),
                "n" => AttributeValue::N(entry.v),
                "b" => AttributeValue::Bool(entry.v == "true"),
                other => {
                    return Err(Error::InvalidCursor(format!(
                        "unknown type tag '{other}' for '{attr}'"
                    )));
                }
            };
            key.insert(attr, value);
        }
        Ok(Self(key))
    }
}

impl From<Item> for EvaluatedKey {
    fn from(key: Item) -> Self {
        Self(key)
    }
}
