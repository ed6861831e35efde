pub mod config;
pub mod repositories;
pub mod services;
pub mod stream;
pub mod utils;

pub use config::*;
pub use repositories::*;
pub use services::*;
pub use stream::*;
pub use utils::*;

#[cfg(test)]
pub(crate) mod test_support;
