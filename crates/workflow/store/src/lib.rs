//! Persistence layer for the order workflow engine
//!
//! The [`WorkflowStore`] trait is the engine's only suspension point:
//! everything the engine persists or reads goes through it. The crate
//! ships an in-memory reference implementation
//! ([`InMemoryWorkflowStore`]) that is deterministic and test-friendly,
//! and a PostgreSQL adapter behind the `postgres` feature for
//! source-of-truth deployments.
//!
//! The core contract is [`WorkflowStore::commit_transition`]: the
//! instance mutation and its history append land atomically, guarded by
//! an optimistic version check, so per-instance mutations serialize and
//! history never diverges from current state.

#![deny(unsafe_code)]

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use memory::InMemoryWorkflowStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresWorkflowStore;
pub use traits::WorkflowStore;
