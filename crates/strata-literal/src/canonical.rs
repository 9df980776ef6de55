//! Canonical string representation of literals.
//!
//! The representation is type-tagged and length-prefixed so that distinct
//! values never render identically (`"1"` vs `1`, `["a,b"]` vs `["a","b"]`).
//! Record fields are emitted in sorted order and floats by bit pattern, so the
//! output is stable across processes and platforms.

use std::convert::Infallible;
use std::fmt::Write;

use crate::literal::{Blob, Literal, Primitive};

impl Literal {
  /// Canonical representation where blobs are represented by their uri.
  pub fn canonical(&self) -> String {
    let result: Result<String, Infallible> =
      self.canonical_with(&mut |blob: &Blob, _multipart: bool| Ok(blob.uri.clone()));
    match result {
      Ok(repr) => repr,
      Err(never) => match never {},
    }
  }

  /// Canonical representation with a caller-supplied representation for
  /// blob references (e.g. a content hash instead of the uri).
  pub fn canonical_with<E>(
    &self,
    blob_repr: &mut impl FnMut(&Blob, bool) -> Result<String, E>,
  ) -> Result<String, E> {
    let mut out = String::new();
    self.write_canonical(&mut out, blob_repr)?;
    Ok(out)
  }

  fn write_canonical<E>(
    &self,
    out: &mut String,
    blob_repr: &mut impl FnMut(&Blob, bool) -> Result<String, E>,
  ) -> Result<(), E> {
    // Writing to a String never fails.
    match self {
      Literal::Primitive(Primitive::Integer(v)) => {
        let _ = write!(out, "i:{v}");
      }
      Literal::Primitive(Primitive::Float(v)) => {
        let _ = write!(out, "f:{:016x}", v.to_bits());
      }
      Literal::Primitive(Primitive::String(v)) => {
        let _ = write!(out, "s:{}:{v}", v.len());
      }
      Literal::Primitive(Primitive::Boolean(v)) => {
        let _ = write!(out, "b:{v}");
      }
      Literal::Primitive(Primitive::Datetime(v)) => {
        let _ = write!(out, "t:{}.{:09}", v.timestamp(), v.timestamp_subsec_nanos());
      }
      Literal::Collection(items) => {
        let _ = write!(out, "c:{}[", items.len());
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            out.push(',');
          }
          item.write_canonical(out, &mut *blob_repr)?;
        }
        out.push(']');
      }
      Literal::Record(fields) => {
        let _ = write!(out, "r:{}{{", fields.len());
        for (i, (name, value)) in fields.iter().enumerate() {
          if i > 0 {
            out.push(',');
          }
          let _ = write!(out, "{}:{name}=", name.len());
          value.write_canonical(out, &mut *blob_repr)?;
        }
        out.push('}');
      }
      Literal::Blob(blob) => {
        let repr = blob_repr(blob, false)?;
        out.push_str("blob:");
        write_format(out, blob);
        let _ = write!(out, "{}:{repr}", repr.len());
      }
      Literal::MultiPartBlob(blob) => {
        let repr = blob_repr(blob, true)?;
        out.push_str("mpb:");
        write_format(out, blob);
        let _ = write!(out, "{}:{repr}", repr.len());
      }
    }
    Ok(())
  }
}

/// `_:` for an untyped blob, `<len>:<format>:` otherwise.
fn write_format(out: &mut String, blob: &Blob) {
  match &blob.format {
    Some(format) => {
      let _ = write!(out, "{}:{format}:", format.len());
    }
    None => out.push_str("_:"),
  }
}
