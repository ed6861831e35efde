pub mod killmail_stream_hub;

pub use killmail_stream_hub::*;
