pub mod ops_handlers;
pub mod stream_handlers;

pub use ops_handlers::*;
pub use stream_handlers::*;
