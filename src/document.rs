use crate::error::{DecodeError, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

pub type Fields = Map<String, Value>;

/// Slash-delimited store path. Odd segment counts address collections,
/// even counts address documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        let segments: Vec<String> = trimmed.split('/').map(|s| s.to_string()).collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn document(raw: &str) -> Result<Self, StoreError> {
        let path = Self::parse(raw)?;
        if !path.is_document() {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(path)
    }

    pub fn collection(raw: &str) -> Result<Self, StoreError> {
        let path = Self::parse(raw)?;
        if !path.is_collection() {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(path)
    }

    pub fn is_document(&self) -> bool {
        self.segments.len() % 2 == 0
    }

    pub fn is_collection(&self) -> bool {
        !self.is_document()
    }

    /// Last segment: the document id for document paths, the collection id otherwise.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn child(&self, segment: &str) -> Result<Self, StoreError> {
        if segment.trim().is_empty() || segment.contains('/') {
            return Err(StoreError::InvalidPath(format!("{}/{}", self, segment)));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True when `self` is a document directly inside the `collection` path.
    pub fn is_child_of(&self, collection: &DocPath) -> bool {
        self.segments.len() == collection.segments.len() + 1
            && self.segments.starts_with(&collection.segments)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Raw document as it crosses the store boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub path: DocPath,
    pub fields: Fields,
}

impl Document {
    pub fn new(path: DocPath, fields: Fields) -> Self {
        Self {
            id: path.id().to_string(),
            path,
            fields,
        }
    }

    /// Decodes the fields with the document id merged under `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| DecodeError::new(self.path.to_string(), e))
    }
}

/// Serializes a value into top-level document fields. Non-object values are rejected.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value).map_err(|e| StoreError::Encode(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Encode(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
