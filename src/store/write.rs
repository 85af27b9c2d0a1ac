use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{CollectionPath, Document, DocumentPath, Fields, StoreError};

/// How a single field changes when a write is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTransform {
    Set(Value),
    /// Replaced by the commit time of the batch.
    ServerTimestamp,
    Increment(i64),
    /// Appends every value not already present (by equality).
    ArrayUnion(Vec<Value>),
    /// Appends `element` unless an existing element agrees with it on all `key`
    /// fields. When `stamp` is set the appended element receives the commit time
    /// under that field name.
    ArrayUnionBy {
        key: Vec<String>,
        element: Fields,
        stamp: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub transform: FieldTransform,
}

impl FieldChange {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            transform: FieldTransform::Set(value.into()),
        }
    }

    pub fn server_timestamp(field: &str) -> Self {
        Self {
            field: field.to_string(),
            transform: FieldTransform::ServerTimestamp,
        }
    }

    pub fn increment(field: &str, by: i64) -> Self {
        Self {
            field: field.to_string(),
            transform: FieldTransform::Increment(by),
        }
    }

    pub fn array_union(field: &str, values: Vec<Value>) -> Self {
        Self {
            field: field.to_string(),
            transform: FieldTransform::ArrayUnion(values),
        }
    }

    pub fn array_union_by(field: &str, key: &[&str], element: Fields, stamp: Option<&str>) -> Self {
        Self {
            field: field.to_string(),
            transform: FieldTransform::ArrayUnionBy {
                key: key.iter().map(|k| k.to_string()).collect(),
                element,
                stamp: stamp.map(str::to_string),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Create or overwrite the whole document, then apply the field changes.
    Set(Fields),
    /// Apply the field changes to a document that must already exist.
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub path: DocumentPath,
    pub kind: WriteKind,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    Exists(DocumentPath),
    /// The document must still carry this update time.
    UnchangedSince(DocumentPath, DateTime<Utc>),
}

impl Precondition {
    fn path(&self) -> &DocumentPath {
        match self {
            Precondition::Exists(path) | Precondition::UnchangedSince(path, _) => path,
        }
    }
}

/// Writes committed together: either every write lands or none does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
    preconditions: Vec<Precondition>,
}

/// Final state of a written document after a batch is resolved. `None` removes it.
pub type Mutation = (DocumentPath, Option<Fields>);

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.set_with(path, fields, Vec::new())
    }

    pub fn set_with(
        &mut self,
        path: DocumentPath,
        fields: Fields,
        changes: Vec<FieldChange>,
    ) -> &mut Self {
        self.writes.push(Write {
            path,
            kind: WriteKind::Set(fields),
            changes,
        });
        self
    }

    pub fn update(&mut self, path: DocumentPath, changes: Vec<FieldChange>) -> &mut Self {
        self.writes.push(Write {
            path,
            kind: WriteKind::Update,
            changes,
        });
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.writes.push(Write {
            path,
            kind: WriteKind::Delete,
            changes: Vec::new(),
        });
        self
    }

    pub fn require_exists(&mut self, path: DocumentPath) -> &mut Self {
        self.preconditions.push(Precondition::Exists(path));
        self
    }

    pub fn require_unchanged(&mut self, path: DocumentPath, since: DateTime<Utc>) -> &mut Self {
        self.preconditions
            .push(Precondition::UnchangedSince(path, since));
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Every path a backend must read before resolving the batch.
    pub fn paths(&self) -> Vec<DocumentPath> {
        let mut paths: Vec<DocumentPath> = self
            .writes
            .iter()
            .map(|w| w.path.clone())
            .chain(self.preconditions.iter().map(|p| p.path().clone()))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn collections(&self) -> Vec<CollectionPath> {
        let mut collections: Vec<CollectionPath> = self
            .writes
            .iter()
            .map(|w| w.path.parent().clone())
            .collect();
        collections.sort();
        collections.dedup();
        collections
    }

    /// Checks preconditions against `current` and computes the final state of
    /// every written document. Backends persist the returned mutations inside
    /// their own transaction.
    pub fn resolve(
        &self,
        current: &BTreeMap<DocumentPath, Document>,
        commit_time: DateTime<Utc>,
    ) -> Result<Vec<Mutation>, StoreError> {
        for precondition in &self.preconditions {
            match precondition {
                Precondition::Exists(path) => {
                    if !current.contains_key(path) {
                        return Err(StoreError::NotFound(path.to_string()));
                    }
                }
                Precondition::UnchangedSince(path, since) => match current.get(path) {
                    Some(doc) if doc.update_time == *since => {}
                    Some(_) => return Err(StoreError::Conflict(path.to_string())),
                    None => return Err(StoreError::NotFound(path.to_string())),
                },
            }
        }

        let stamp = serde_json::to_value(commit_time).map_err(StoreError::Encode)?;
        let mut staged: BTreeMap<DocumentPath, Option<Fields>> = BTreeMap::new();
        for write in &self.writes {
            let existing = match staged.get(&write.path) {
                Some(state) => state.clone(),
                None => current.get(&write.path).map(|doc| doc.fields.clone()),
            };
            let next = match &write.kind {
                WriteKind::Set(fields) => {
                    let mut fields = fields.clone();
                    apply_changes(&mut fields, &write.changes, &stamp);
                    Some(fields)
                }
                WriteKind::Update => {
                    let mut fields =
                        existing.ok_or_else(|| StoreError::NotFound(write.path.to_string()))?;
                    apply_changes(&mut fields, &write.changes, &stamp);
                    Some(fields)
                }
                WriteKind::Delete => None,
            };
            staged.insert(write.path.clone(), next);
        }
        Ok(staged.into_iter().collect())
    }
}

fn apply_changes(fields: &mut Fields, changes: &[FieldChange], stamp: &Value) {
    for change in changes {
        match &change.transform {
            FieldTransform::Set(value) => {
                fields.insert(change.field.clone(), value.clone());
            }
            FieldTransform::ServerTimestamp => {
                fields.insert(change.field.clone(), stamp.clone());
            }
            FieldTransform::Increment(by) => {
                let next = match fields.get(&change.field) {
                    Some(Value::Number(n)) if n.is_i64() => {
                        Value::from(n.as_i64().unwrap_or_default().saturating_add(*by))
                    }
                    Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or_default() + *by as f64),
                    _ => Value::from(*by),
                };
                fields.insert(change.field.clone(), next);
            }
            FieldTransform::ArrayUnion(values) => {
                let items = array_field(fields, &change.field);
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
            FieldTransform::ArrayUnionBy {
                key,
                element,
                stamp: stamp_field,
            } => {
                let items = array_field(fields, &change.field);
                let present = items.iter().any(|item| {
                    key.iter()
                        .all(|k| item.get(k).is_some() && item.get(k) == element.get(k))
                });
                if !present {
                    let mut element = element.clone();
                    if let Some(name) = stamp_field {
                        element.insert(name.clone(), stamp.clone());
                    }
                    items.push(Value::Object(element));
                }
            }
        }
    }
}

fn array_field<'a>(fields: &'a mut Fields, name: &str) -> &'a mut Vec<Value> {
    let slot = fields
        .entry(name.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just made an array"),
    }
}
