pub mod logger;
pub mod network;
