pub mod connection;
pub mod tables;

pub use connection::{check_vector_capability, connect, MemnonPool};
pub use tables::resolve_dimension_table;
