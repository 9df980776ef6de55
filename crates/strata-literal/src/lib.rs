//! Strata Literal
//!
//! The engine-native value model. Every value that flows between workflow
//! nodes is a [`Literal`]: a primitive scalar, a collection, a record, or a
//! reference to externally stored data (a blob or a multi-part blob).
//!
//! Literals are paired with a declared [`LiteralType`]. The engine validates
//! each literal against its declared type at every node boundary, so a task
//! body never sees a value of the wrong shape.
//!
//! Blob literals never carry inline data. They hold a `uri` that points at a
//! local path or a remote object, and the engine moves the bytes as needed.

mod canonical;
mod error;
mod literal;
mod types;

pub use error::TypeMismatch;
pub use literal::{Blob, Literal, LiteralMap, Primitive};
pub use types::{BlobType, LiteralType, RecordSchema};
