use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeMismatch;
use crate::literal::{Blob, Literal, Primitive};

/// Declared type of a blob or multi-part blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobType {
  /// Required format tag. `None` accepts any format.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,
}

impl BlobType {
  pub fn any() -> Self {
    Self { format: None }
  }

  pub fn format(format: impl Into<String>) -> Self {
    Self {
      format: Some(format.into()),
    }
  }

  fn accepts_format(&self, other: Option<&str>) -> bool {
    match (self.format.as_deref(), other) {
      (Some(expected), Some(actual)) => expected == actual,
      _ => true,
    }
  }
}

/// Field schema of a record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordSchema {
  pub fields: BTreeMap<String, LiteralType>,
}

impl RecordSchema {
  pub fn new<K: Into<String>>(fields: impl IntoIterator<Item = (K, LiteralType)>) -> Self {
    Self {
      fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    }
  }
}

/// The declared type of a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum LiteralType {
  Integer,
  Float,
  String,
  Boolean,
  Datetime,
  Collection(Box<LiteralType>),
  Record(RecordSchema),
  Blob(BlobType),
  MultiPartBlob(BlobType),
}

impl LiteralType {
  pub fn collection_of(element: LiteralType) -> Self {
    LiteralType::Collection(Box::new(element))
  }

  /// Check that `literal` conforms to this type.
  pub fn validate(&self, literal: &Literal) -> Result<(), TypeMismatch> {
    self.validate_at("", literal)
  }

  /// Check that `literal` conforms to this type, reporting mismatches
  /// relative to `path` (typically the variable name).
  pub fn validate_at(&self, path: &str, literal: &Literal) -> Result<(), TypeMismatch> {
    match (self, literal) {
      (LiteralType::Integer, Literal::Primitive(Primitive::Integer(_)))
      | (LiteralType::Float, Literal::Primitive(Primitive::Float(_)))
      | (LiteralType::String, Literal::Primitive(Primitive::String(_)))
      | (LiteralType::Boolean, Literal::Primitive(Primitive::Boolean(_)))
      | (LiteralType::Datetime, Literal::Primitive(Primitive::Datetime(_))) => Ok(()),

      (LiteralType::Collection(element), Literal::Collection(items)) => {
        for (i, item) in items.iter().enumerate() {
          element.validate_at(&format!("{path}[{i}]"), item)?;
        }
        Ok(())
      }

      (LiteralType::Record(schema), Literal::Record(fields)) => {
        for (name, field_type) in &schema.fields {
          let field_path = join_path(path, name);
          let value = fields
            .get(name)
            .ok_or_else(|| TypeMismatch::new(&field_path, field_type.to_string(), "missing"))?;
          field_type.validate_at(&field_path, value)?;
        }
        if let Some(extra) = fields.keys().find(|k| !schema.fields.contains_key(*k)) {
          return Err(TypeMismatch::new(
            &join_path(path, extra),
            "no such field",
            "unexpected field",
          ));
        }
        Ok(())
      }

      (LiteralType::Blob(blob_type), Literal::Blob(blob))
      | (LiteralType::MultiPartBlob(blob_type), Literal::MultiPartBlob(blob)) => {
        check_blob_format(self, blob_type, blob, path)
      }

      (expected, actual) => Err(TypeMismatch::new(path, expected.to_string(), actual.kind())),
    }
  }

  /// Whether a value declared as `produced` may be bound to this type.
  ///
  /// Used for static edge checks when no value exists yet.
  pub fn is_compatible(&self, produced: &LiteralType) -> bool {
    match (self, produced) {
      (LiteralType::Collection(a), LiteralType::Collection(b)) => a.is_compatible(b),
      (LiteralType::Record(a), LiteralType::Record(b)) => {
        a.fields.len() == b.fields.len()
          && a
            .fields
            .iter()
            .all(|(name, t)| b.fields.get(name).is_some_and(|u| t.is_compatible(u)))
      }
      (LiteralType::Blob(a), LiteralType::Blob(b))
      | (LiteralType::MultiPartBlob(a), LiteralType::MultiPartBlob(b)) => {
        a.accepts_format(b.format.as_deref())
      }
      (a, b) => a == b,
    }
  }
}

fn check_blob_format(
  declared: &LiteralType,
  blob_type: &BlobType,
  blob: &Blob,
  path: &str,
) -> Result<(), TypeMismatch> {
  if blob_type.accepts_format(blob.format.as_deref()) {
    return Ok(());
  }
  let actual = match &blob.format {
    Some(f) => format!("blob[{f}]"),
    None => "blob".to_string(),
  };
  Err(TypeMismatch::new(path, declared.to_string(), actual))
}

fn join_path(path: &str, field: &str) -> String {
  if path.is_empty() {
    field.to_string()
  } else {
    format!("{path}.{field}")
  }
}

impl fmt::Display for LiteralType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LiteralType::Integer => write!(f, "integer"),
      LiteralType::Float => write!(f, "float"),
      LiteralType::String => write!(f, "string"),
      LiteralType::Boolean => write!(f, "boolean"),
      LiteralType::Datetime => write!(f, "datetime"),
      LiteralType::Collection(element) => write!(f, "collection<{element}>"),
      LiteralType::Record(schema) => {
        write!(f, "record{{")?;
        for (i, (name, t)) in schema.fields.iter().enumerate() {
          if i > 0 {
            write!(f, ",")?;
          }
          write!(f, "{name}:{t}")?;
        }
        write!(f, "}}")
      }
      LiteralType::Blob(b) => match &b.format {
        Some(format) => write!(f, "blob[{format}]"),
        None => write!(f, "blob"),
      },
      LiteralType::MultiPartBlob(b) => match &b.format {
        Some(format) => write!(f, "multipart_blob[{format}]"),
        None => write!(f, "multipart_blob"),
      },
    }
  }
}
