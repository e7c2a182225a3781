mod contract;
mod data;
mod notifier;
mod process_model;
mod services;
mod trade;
mod verify;

pub use contract::Contract;
pub(crate) use data::TradeData;
pub(crate) use notifier::TradeNotifier;
pub use process_model::{TradeProcessModel, TradingPeer};
pub use services::{Collaborators, TradeServices};
pub use trade::{Trade, TradeNotif, TradeState};
pub(crate) use verify::{verify_contract_signature, verify_peer_account};
