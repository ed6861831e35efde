// Pure domain services: no I/O, safe to call from any task

pub mod backoff;
pub mod dedup;
pub mod dispatch;
pub mod framer;
pub mod row_validation;
pub mod transformer;

pub use backoff::*;
pub use dedup::*;
pub use dispatch::*;
pub use framer::*;
pub use row_validation::*;
pub use transformer::*;
