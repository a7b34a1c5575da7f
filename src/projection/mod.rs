//! Resource projection
//!
//! Builds the canonical outbound representation: secret fields stripped for
//! every principal (owners included), explicit stable ordering, and the
//! pagination envelope with metadata in headers.

mod pagination;

pub use pagination::{Page, PaginationMeta};

use crate::error::DispatchError;
use crate::store::Item;
use serde_json::{Map, Value, json};

/// Representation types and their secret-field sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Badge,
    Branch,
    ProtectedBranch,
    Member,
    Package,
}

impl Representation {
    /// Fields that must never appear in any projection of this type,
    /// whoever is asking.
    pub fn secret_fields(&self) -> &'static [&'static str] {
        match self {
            Representation::Badge => &["token"],
            Representation::Branch => &[],
            Representation::ProtectedBranch => &[],
            Representation::Member => &["password", "email_token"],
            Representation::Package => &["deploy_token", "signing_key"],
        }
    }
}

/// Project a stored item into its outbound JSON form.
pub fn project_item(kind: Representation, item: &Item) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), json!(item.id));
    out.insert("name".to_string(), json!(item.name));
    if let Value::Object(fields) = &item.fields {
        for (key, value) in fields {
            out.insert(key.clone(), value.clone());
        }
    }
    let mut value = Value::Object(out);
    redact(&mut value, kind.secret_fields());
    value
}

/// Project a full page of items.
pub fn project_items(kind: Representation, items: &[Item]) -> Value {
    Value::Array(items.iter().map(|i| project_item(kind, i)).collect())
}

/// Remove secret fields recursively (nested objects and arrays included).
fn redact(value: &mut Value, secrets: &[&str]) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !secrets.contains(&key.as_str()));
            for child in map.values_mut() {
                redact(child, secrets);
            }
        }
        Value::Array(items) => {
            for child in items {
                redact(child, secrets);
            }
        }
        _ => {}
    }
}

/// Validated sort specification for a list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Name,
    CreatedAt,
}

impl SortSpec {
    /// Parse `order_by`/`sort` params. Unknown values are a 400, not a
    /// silent fallback.
    pub fn parse(order_by: Option<&str>, sort: Option<&str>) -> Result<Self, DispatchError> {
        let key = match order_by {
            None | Some("id") => SortKey::Id,
            Some("name") => SortKey::Name,
            Some("created_at") => SortKey::CreatedAt,
            Some(other) => {
                return Err(DispatchError::BadRequest(format!(
                    "order_by does not have a valid value: {}",
                    other
                )));
            }
        };
        let ascending = match sort {
            None | Some("asc") => true,
            Some("desc") => false,
            Some(other) => {
                return Err(DispatchError::BadRequest(format!(
                    "sort does not have a valid value: {}",
                    other
                )));
            }
        };
        Ok(Self { key, ascending })
    }

    /// Stable sort; ids tie-break so ordering is total.
    pub fn apply(&self, items: &mut [Item]) {
        items.sort_by(|a, b| {
            let ordering = match self.key {
                SortKey::Id => a.id.cmp(&b.id),
                SortKey::Name => a.name.cmp(&b.name).then(a.id.cmp(&b.id)),
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
            };
            if self.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }
}
