pub mod error;
pub mod stream_client;

pub use error::*;
pub use stream_client::*;
