//! Trace storage reader.
//!
//! This module reads spans written by the trace ingester from three tables:
//! an index table searched for trace IDs, a span table holding serialized
//! span payloads, and an operations table listing services and operations.
//! The [`QueryExecutor`] trait is the seam to the backing store, allowing
//! different implementations (`ClickHouse`, in-memory, test doubles).

pub mod assembler;
pub mod error;
pub mod executor;
pub mod memory;
pub mod reader;
pub mod statement;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::assemble;
pub use error::{BoxError, MissingTable, ReaderError};
pub use executor::{ClickHouseExecutor, QueryExecutor};
pub use memory::{InMemoryStore, InMemoryStoreError};
pub use reader::TraceReader;
pub use statement::{Plan, Predicate, PredicateBuilder, SqlArg, Statement, PREDICATE_BUILDERS};
