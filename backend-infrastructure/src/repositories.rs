pub mod clickhouse_repo;
pub mod memory_repo;
mod write_plan;

pub use clickhouse_repo::*;
pub use memory_repo::*;
