mod state;
mod taker;
mod tasks;

pub use state::TakerState;
pub use taker::{TakerNotif, TakerProtocol, TakerProtocolAccess};
