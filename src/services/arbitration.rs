use serde::{Deserialize, Serialize};

use crate::common::types::PeerAddress;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arbitrator {
    pub id: String,
    pub pub_key: Vec<u8>,
    pub address: Option<PeerAddress>,
}

pub trait ArbitrationRepository: Send + Sync {
    // Consulted once per trade, when its process model is created
    fn default_arbitrator(&self) -> Option<Arbitrator>;
}
