use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{common::error::TradeError, services::BlockChainService};

/// Shared view of the chain. Wallets built on it record what they broadcast.
#[derive(Clone, Default)]
pub struct InMemoryBlockChain {
    confirmations: Arc<Mutex<HashMap<String, u32>>>,
}

impl InMemoryBlockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        match self.confirmations.lock() {
            Ok(confirmations) => confirmations,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_tx(&self, tx_id: impl Into<String>, confirmations: u32) {
        self.lock().insert(tx_id.into(), confirmations);
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.lock().contains_key(tx_id)
    }
}

#[async_trait]
impl BlockChainService for InMemoryBlockChain {
    async fn tx_confirmations(&self, tx_id: &str) -> Result<Option<u32>, TradeError> {
        Ok(self.lock().get(tx_id).copied())
    }
}
