use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    common::{
        error::TradeError,
        types::{DepositInputs, PayoutAmounts, TradeId, Transaction},
    },
    services::TradeWalletService,
};

use super::InMemoryBlockChain;

#[derive(Default)]
struct WalletState {
    calls: Vec<&'static str>,
    fail_on: HashSet<&'static str>,
}

/// Deterministic wallet fake. Every call is logged, any call can be made to fail, and
/// broadcasts land on the shared `InMemoryBlockChain`.
#[derive(Clone)]
pub struct InMemoryTradeWallet {
    label: String,
    chain: InMemoryBlockChain,
    state: Arc<Mutex<WalletState>>,
}

impl InMemoryTradeWallet {
    pub fn new(label: impl Into<String>, chain: InMemoryBlockChain) -> Self {
        Self {
            label: label.into(),
            chain,
            state: Arc::new(Mutex::new(WalletState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WalletState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.to_owned()
    }

    pub fn fail_on(&self, call: &'static str) {
        self.lock().fail_on.insert(call);
    }

    fn record(&self, call: &'static str) -> Result<(), TradeError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.fail_on.contains(call) {
            return Err(TradeError::Service(format!(
                "Wallet {} {} failed",
                self.label, call
            )));
        }
        Ok(())
    }

    fn publish(&self, tx: &Transaction) {
        self.chain.add_tx(tx.tx_id.to_owned(), 0);
    }
}

#[async_trait]
impl TradeWalletService for InMemoryTradeWallet {
    async fn payout_address(&self, trade_id: &TradeId) -> Result<String, TradeError> {
        self.record("payout_address")?;
        Ok(format!("{}-payout-{}", self.label, trade_id))
    }

    async fn create_take_offer_fee_tx(
        &self,
        trade_id: &TradeId,
    ) -> Result<Transaction, TradeError> {
        self.record("create_take_offer_fee_tx")?;
        Ok(Transaction::from_raw(
            format!("take-offer-fee:{}:{}", self.label, trade_id).into_bytes(),
        ))
    }

    async fn broadcast_tx(&self, tx: &Transaction) -> Result<(), TradeError> {
        self.record("broadcast_tx")?;
        self.publish(tx);
        Ok(())
    }

    async fn create_offerer_deposit_inputs(
        &self,
        trade_id: &TradeId,
        amount_sat: u64,
    ) -> Result<DepositInputs, TradeError> {
        self.record("create_offerer_deposit_inputs")?;
        Ok(DepositInputs {
            outpoints: vec![format!("{}-utxo-{}:0", self.label, trade_id)],
            amount_sat,
            change_address: Some(format!("{}-change-{}", self.label, trade_id)),
        })
    }

    async fn create_and_sign_taker_deposit_tx(
        &self,
        trade_id: &TradeId,
        offerer_inputs: &DepositInputs,
        taker_amount_sat: u64,
        arbitrator_pub_key: &[u8],
    ) -> Result<Transaction, TradeError> {
        self.record("create_and_sign_taker_deposit_tx")?;
        if arbitrator_pub_key.is_empty() {
            return Err(TradeError::Service(
                "Deposit tx needs an arbitrator key".to_string(),
            ));
        }
        let raw = format!(
            "deposit:{}:{}:{}:{}:taker-signed",
            trade_id,
            offerer_inputs.outpoints.join(","),
            offerer_inputs.amount_sat + taker_amount_sat,
            hex::encode(arbitrator_pub_key)
        );
        Ok(Transaction::from_raw(raw.into_bytes()))
    }

    async fn sign_and_publish_deposit_tx(
        &self,
        taker_deposit_tx: &Transaction,
    ) -> Result<Transaction, TradeError> {
        self.record("sign_and_publish_deposit_tx")?;
        let mut raw = taker_deposit_tx.raw.to_owned();
        raw.extend_from_slice(b":offerer-signed");
        let deposit_tx = Transaction::from_raw(raw);
        self.publish(&deposit_tx);
        Ok(deposit_tx)
    }

    async fn verify_published_deposit_tx(
        &self,
        taker_deposit_tx: &Transaction,
        published_tx: &Transaction,
    ) -> Result<bool, TradeError> {
        self.record("verify_published_deposit_tx")?;
        let mut raw = taker_deposit_tx.raw.to_owned();
        raw.extend_from_slice(b":offerer-signed");
        Ok(Transaction::from_raw(raw) == *published_tx)
    }

    async fn commit_tx(&self, _tx: &Transaction) -> Result<(), TradeError> {
        self.record("commit_tx")
    }

    async fn sign_payout_tx(
        &self,
        deposit_tx: &Transaction,
        payout: &PayoutAmounts,
    ) -> Result<Vec<u8>, TradeError> {
        self.record("sign_payout_tx")?;
        Ok(format!("payout-sig:{}:{}", deposit_tx.tx_id, payout.total_sat()).into_bytes())
    }

    async fn sign_and_publish_payout_tx(
        &self,
        deposit_tx: &Transaction,
        payout: &PayoutAmounts,
        offerer_signature: &[u8],
    ) -> Result<Transaction, TradeError> {
        self.record("sign_and_publish_payout_tx")?;
        if offerer_signature.is_empty() {
            return Err(TradeError::Service(
                "Payout tx needs the offerer signature".to_string(),
            ));
        }
        let raw = format!(
            "payout:{}:{}:{}:{}:{}",
            deposit_tx.tx_id,
            payout.offerer_address,
            payout.offerer_sat,
            payout.taker_address,
            payout.taker_sat
        );
        let payout_tx = Transaction::from_raw(raw.into_bytes());
        self.publish(&payout_tx);
        Ok(payout_tx)
    }
}
