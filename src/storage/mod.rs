mod payload_store;
mod trade_statistics;

pub use payload_store::{PayloadHash, PersistableNetworkPayload, PersistableNetworkPayloadStore};
pub use trade_statistics::TradeStatistics;
