pub mod common;
pub mod comms;
pub mod config;
pub mod manager;
pub mod offer;
pub mod offerer;
pub mod services;
pub mod storage;
pub mod taker;
pub mod task_runner;
pub mod testing;
pub mod trade;
pub mod trade_msg;
