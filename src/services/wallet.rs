use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::common::{
    error::TradeError,
    types::{DepositInputs, PayoutAmounts, TradeId, Transaction},
};

/// Transaction building, signing and broadcasting for both roles of a trade.
///
/// Every call resolves once the wallet is done with it, which may include waiting for the
/// network to accept a broadcast.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TradeWalletService: Send + Sync {
    async fn payout_address(&self, trade_id: &TradeId) -> Result<String, TradeError>;

    async fn create_take_offer_fee_tx(&self, trade_id: &TradeId)
        -> Result<Transaction, TradeError>;

    async fn broadcast_tx(&self, tx: &Transaction) -> Result<(), TradeError>;

    async fn create_offerer_deposit_inputs(
        &self,
        trade_id: &TradeId,
        amount_sat: u64,
    ) -> Result<DepositInputs, TradeError>;

    // Taker combines the offerer inputs with its own and signs its side of the 2-of-3 deposit
    async fn create_and_sign_taker_deposit_tx(
        &self,
        trade_id: &TradeId,
        offerer_inputs: &DepositInputs,
        taker_amount_sat: u64,
        arbitrator_pub_key: &[u8],
    ) -> Result<Transaction, TradeError>;

    async fn sign_and_publish_deposit_tx(
        &self,
        taker_deposit_tx: &Transaction,
    ) -> Result<Transaction, TradeError>;

    // True when the published tx is the taker's deposit tx completed with the offerer signature
    async fn verify_published_deposit_tx(
        &self,
        taker_deposit_tx: &Transaction,
        published_tx: &Transaction,
    ) -> Result<bool, TradeError>;

    async fn commit_tx(&self, tx: &Transaction) -> Result<(), TradeError>;

    async fn sign_payout_tx(
        &self,
        deposit_tx: &Transaction,
        payout: &PayoutAmounts,
    ) -> Result<Vec<u8>, TradeError>;

    async fn sign_and_publish_payout_tx(
        &self,
        deposit_tx: &Transaction,
        payout: &PayoutAmounts,
        offerer_signature: &[u8],
    ) -> Result<Transaction, TradeError>;
}
