pub mod backfill_service;
pub mod watch_service;

pub use backfill_service::*;
pub use watch_service::*;
