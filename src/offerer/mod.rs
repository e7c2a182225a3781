mod offerer;
mod state;
mod tasks;

pub use offerer::{OffererNotif, OffererProtocol, OffererProtocolAccess};
pub use state::OffererState;
