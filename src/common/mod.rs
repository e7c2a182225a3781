pub mod error;
pub(crate) mod persist;
pub mod types;
pub(crate) mod utils;
