//! Market data contract and the in-memory implementation.

pub mod memory;
pub mod source;

pub use memory::InMemoryDataSource;
pub use source::{DataError, DataSource};
