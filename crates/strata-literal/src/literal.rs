use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named literals, e.g. the inputs or outputs of a task.
pub type LiteralMap = BTreeMap<String, Literal>;

/// A scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Primitive {
  Integer(i64),
  Float(f64),
  String(String),
  Boolean(bool),
  Datetime(DateTime<Utc>),
}

/// A reference to externally stored data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
  /// Local path or `<scheme>://<key>` remote reference.
  pub uri: String,
  /// Optional format tag, e.g. `csv` or `parquet`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,
  /// Name of the registered hash method that identifies this value's content
  /// for cache keys. Set by the engine from the producing task's output type.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hash_method: Option<String>,
  /// Result of `hash_method`, computed while the data was still local.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub digest: Option<String>,
}

impl Blob {
  pub fn new(uri: impl Into<String>) -> Self {
    Self {
      uri: uri.into(),
      format: None,
      hash_method: None,
      digest: None,
    }
  }

  pub fn with_format(mut self, format: impl Into<String>) -> Self {
    self.format = Some(format.into());
    self
  }

  /// Whether the uri points at the local filesystem.
  pub fn is_local(&self) -> bool {
    self.uri.starts_with("file://") || !self.uri.contains("://")
  }

  /// Local filesystem path, if the uri is local.
  pub fn local_path(&self) -> Option<PathBuf> {
    if !self.is_local() {
      return None;
    }
    let path = self.uri.strip_prefix("file://").unwrap_or(&self.uri);
    Some(PathBuf::from(path))
  }
}

/// A typed value flowing between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
  Primitive(Primitive),
  Collection(Vec<Literal>),
  Record(BTreeMap<String, Literal>),
  /// A single file.
  Blob(Blob),
  /// A directory of files, stored as many objects under one prefix.
  MultiPartBlob(Blob),
}

impl Literal {
  pub fn integer(value: i64) -> Self {
    Literal::Primitive(Primitive::Integer(value))
  }

  pub fn float(value: f64) -> Self {
    Literal::Primitive(Primitive::Float(value))
  }

  pub fn string(value: impl Into<String>) -> Self {
    Literal::Primitive(Primitive::String(value.into()))
  }

  pub fn boolean(value: bool) -> Self {
    Literal::Primitive(Primitive::Boolean(value))
  }

  pub fn datetime(value: DateTime<Utc>) -> Self {
    Literal::Primitive(Primitive::Datetime(value))
  }

  pub fn blob(uri: impl Into<String>) -> Self {
    Literal::Blob(Blob::new(uri))
  }

  pub fn multipart_blob(uri: impl Into<String>) -> Self {
    Literal::MultiPartBlob(Blob::new(uri))
  }

  pub fn collection(items: impl IntoIterator<Item = Literal>) -> Self {
    Literal::Collection(items.into_iter().collect())
  }

  pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Literal)>) -> Self {
    Literal::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Literal::Primitive(Primitive::Integer(v)) => Some(*v),
      _ => None,
    }
  }

  pub fn as_float(&self) -> Option<f64> {
    match self {
      Literal::Primitive(Primitive::Float(v)) => Some(*v),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Literal::Primitive(Primitive::String(v)) => Some(v),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Literal::Primitive(Primitive::Boolean(v)) => Some(*v),
      _ => None,
    }
  }

  pub fn as_collection(&self) -> Option<&[Literal]> {
    match self {
      Literal::Collection(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_record(&self) -> Option<&BTreeMap<String, Literal>> {
    match self {
      Literal::Record(fields) => Some(fields),
      _ => None,
    }
  }

  /// The blob reference of a `Blob` or `MultiPartBlob`.
  pub fn as_blob(&self) -> Option<&Blob> {
    match self {
      Literal::Blob(blob) | Literal::MultiPartBlob(blob) => Some(blob),
      _ => None,
    }
  }

  /// Short name of the literal's shape, used in error messages.
  pub fn kind(&self) -> &'static str {
    match self {
      Literal::Primitive(Primitive::Integer(_)) => "integer",
      Literal::Primitive(Primitive::Float(_)) => "float",
      Literal::Primitive(Primitive::String(_)) => "string",
      Literal::Primitive(Primitive::Boolean(_)) => "boolean",
      Literal::Primitive(Primitive::Datetime(_)) => "datetime",
      Literal::Collection(_) => "collection",
      Literal::Record(_) => "record",
      Literal::Blob(_) => "blob",
      Literal::MultiPartBlob(_) => "multipart_blob",
    }
  }

  /// Visit every blob reference in this literal, mutably.
  pub fn blobs_mut(&mut self, f: &mut impl FnMut(&mut Blob, bool)) {
    match self {
      Literal::Blob(blob) => f(blob, false),
      Literal::MultiPartBlob(blob) => f(blob, true),
      Literal::Collection(items) => {
        for item in items {
          item.blobs_mut(&mut *f);
        }
      }
      Literal::Record(fields) => {
        for value in fields.values_mut() {
          value.blobs_mut(&mut *f);
        }
      }
      Literal::Primitive(_) => {}
    }
  }
}

impl From<i64> for Literal {
  fn from(value: i64) -> Self {
    Literal::integer(value)
  }
}

impl From<f64> for Literal {
  fn from(value: f64) -> Self {
    Literal::float(value)
  }
}

impl From<bool> for Literal {
  fn from(value: bool) -> Self {
    Literal::boolean(value)
  }
}

impl From<&str> for Literal {
  fn from(value: &str) -> Self {
    Literal::string(value)
  }
}

impl From<String> for Literal {
  fn from(value: String) -> Self {
    Literal::string(value)
  }
}

impl fmt::Display for Literal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Literal::Primitive(Primitive::Integer(v)) => write!(f, "{v}"),
      Literal::Primitive(Primitive::Float(v)) => write!(f, "{v}"),
      Literal::Primitive(Primitive::String(v)) => write!(f, "{v:?}"),
      Literal::Primitive(Primitive::Boolean(v)) => write!(f, "{v}"),
      Literal::Primitive(Primitive::Datetime(v)) => write!(f, "{}", v.to_rfc3339()),
      Literal::Collection(items) => {
        write!(f, "[")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{item}")?;
        }
        write!(f, "]")
      }
      Literal::Record(fields) => {
        write!(f, "{{")?;
        for (i, (name, value)) in fields.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
      }
      Literal::Blob(blob) => write!(f, "blob({})", blob.uri),
      Literal::MultiPartBlob(blob) => write!(f, "multipart_blob({})", blob.uri),
    }
  }
}
