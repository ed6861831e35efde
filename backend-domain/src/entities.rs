// Domain entities

pub mod config;
pub mod killmail;
pub mod persistence;
pub mod stream;

pub use config::*;
pub use killmail::*;
pub use persistence::*;
pub use stream::*;
