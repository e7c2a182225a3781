use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::common::error::TradeError;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlockChainService: Send + Sync {
    /// `None` if the transaction is unknown to the chain backend.
    async fn tx_confirmations(&self, tx_id: &str) -> Result<Option<u32>, TradeError>;
}
