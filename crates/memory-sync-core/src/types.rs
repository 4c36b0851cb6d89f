use crate::error::ValidationError;
use crate::utils::{coerce_float, coerce_seconds, is_falsy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::hash::{Hash, Hasher};

/// One remembered fact.
///
/// Identity is the `content` string alone: two records with the same text are
/// the same memory no matter what their timestamps or provenance say. Every
/// other field is metadata carried alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub weight: Option<f64>,
    pub model: Option<String>,
    /// Only set for records that came from the remote store.
    pub server_id: Option<String>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.content.hash(state);
    }
}

fn require_content(content: String) -> Result<String, ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::new("content", "memory text is empty"));
    }
    Ok(content)
}

fn optional_weight(value: Option<&Value>) -> Result<Option<f64>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => coerce_float(raw)
            .map(Some)
            .ok_or_else(|| ValidationError::new("weight", format!("expected a number, got {raw}"))),
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn export_timestamp(
    field: &'static str,
    value: Option<&Value>,
    now: i64,
) -> Result<i64, ValidationError> {
    match value {
        None => Ok(now),
        Some(raw) if is_falsy(raw) => Ok(now),
        Some(raw) => coerce_seconds(raw)
            .ok_or_else(|| ValidationError::new(field, format!("expected unix seconds, got {raw}"))),
    }
}

fn server_timestamp(
    field: &'static str,
    value: Option<&Value>,
    now: i64,
) -> Result<i64, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(now),
        Some(raw) => coerce_seconds(raw)
            .ok_or_else(|| ValidationError::new(field, format!("expected unix seconds, got {raw}"))),
    }
}

impl Record {
    /// Builds a record from a `message` object of a conversation export.
    ///
    /// `content.parts` are joined with newlines. Missing or zero timestamps
    /// fall back to `now`.
    pub fn from_export_message(message: &Value, now: i64) -> Result<Self, ValidationError> {
        let parts = match message.get("content") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(content)) => match content.get("parts") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(parts)) => parts
                    .iter()
                    .map(|part| {
                        part.as_str().ok_or_else(|| {
                            ValidationError::new("content", format!("non-text part {part}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(other) => {
                    return Err(ValidationError::new(
                        "content",
                        format!("parts must be a list, got {other}"),
                    ));
                }
            },
            Some(other) => {
                return Err(ValidationError::new(
                    "content",
                    format!("expected an object, got {other}"),
                ));
            }
        };

        Ok(Self {
            content: require_content(parts.join("\n"))?,
            created_at: export_timestamp("created_at", message.get("create_time"), now)?,
            updated_at: export_timestamp("updated_at", message.get("update_time"), now)?,
            weight: optional_weight(message.get("weight"))?,
            model: optional_text(message.get("metadata").and_then(|m| m.get("model_slug"))),
            server_id: None,
        })
    }

    /// Builds a record from one element of the remote list endpoint.
    pub fn from_server_json(raw: &Value, now: i64) -> Result<Self, ValidationError> {
        if !raw.is_object() {
            return Err(ValidationError::new(
                "memory",
                format!("expected an object, got {raw}"),
            ));
        }

        let content = match raw.get("content") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => {
                return Err(ValidationError::new(
                    "content",
                    format!("expected text, got {other}"),
                ));
            }
            None => return Err(ValidationError::new("content", "missing")),
        };

        let server_id = match raw.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(ValidationError::new("id", "server memory has no id")),
        };

        Ok(Self {
            content: require_content(content)?,
            created_at: server_timestamp("created_at", raw.get("created_at"), now)?,
            updated_at: server_timestamp("updated_at", raw.get("updated_at"), now)?,
            weight: optional_weight(raw.get("weight"))?,
            model: optional_text(raw.get("model")),
            server_id: Some(server_id),
        })
    }
}

/// Records keyed by their content.
///
/// Inserting a record whose content is already present replaces the earlier
/// one. Iteration is ordered by content.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    by_content: BTreeMap<String, Record>,
}

impl RecordSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        records.into_iter().collect()
    }

    /// Returns the record that was displaced, if any.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        self.by_content.insert(record.content.clone(), record)
    }

    #[must_use]
    pub fn get(&self, content: &str) -> Option<&Record> {
        self.by_content.get(content)
    }

    #[must_use]
    pub fn contains(&self, content: &str) -> bool {
        self.by_content.contains_key(content)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_content.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_content.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Record> {
        self.by_content.iter()
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        let mut set = Self::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = (&'a String, &'a Record);
    type IntoIter = btree_map::Iter<'a, String, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
