//! Strata Execution Engine
//!
//! Runs validated workflows: dispatches ready nodes with bounded parallelism,
//! memoizes task results through a cache store, retries failed attempts and
//! records every state transition in an execution store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - launch(workflow, inputs) → ExecutionHandle               │
//! │  - validates inputs, creates the execution record           │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Scheduler                            │
//! │  - FIFO ready queue, JoinSet bounded by max_parallelism     │
//! │  - failure propagation, cancellation, workflow outputs      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         NodeRun                             │
//! │  - cache lookup, blob download, attempt loop with timeout   │
//! │  - output validation, hash stamping, blob upload, cache put │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let engine = Engine::new(
//!   EngineConfig::default(),
//!   Arc::new(InMemoryCacheStore::new()),
//!   Arc::new(InMemoryExecutionStore::new()),
//! );
//!
//! let handle = engine.launch(&workflow, inputs).await?;
//! let record = handle.wait().await?;
//! assert_eq!(record.state, ExecutionState::Succeeded);
//! ```

mod blobs;
mod config;
mod engine;
mod error;
mod events;
mod handle;
mod node;
mod options;
mod scheduler;

pub use config::EngineConfig;
pub use engine::{Engine, TASK_NODE_ID};
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use handle::ExecutionHandle;
pub use options::LaunchOptions;
