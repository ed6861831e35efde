// Domain value objects
pub mod connection_status;
pub mod event_kind;
pub mod identifiers;

pub use connection_status::*;
pub use event_kind::*;
pub use identifiers::*;
