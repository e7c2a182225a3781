mod trade_msg;

pub use trade_msg::*;
