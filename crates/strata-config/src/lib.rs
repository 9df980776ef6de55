//! Strata Config
//!
//! This crate contains the serializable configuration types shared across the
//! Strata workspace. They describe *where* work happens and *how* it is
//! retried, not the work itself:
//!
//! - [`Scope`] partitions cache entries and execution records by project and domain
//! - [`RetryPolicy`] and [`RetryBackoff`] control how failed attempts are retried
//! - [`Settings`] selects backends and limits for the execution engine
//!
//! Settings can be loaded from JSON files (via the CLI with `--config=settings.json`)
//! or built in code with [`Settings::default`].

mod enums;
mod retry;
mod scope;
mod settings;

pub use enums::{CacheBackend, RetryBackoff, StoreBackend};
pub use retry::RetryPolicy;
pub use scope::Scope;
pub use settings::{ConfigError, Settings};
