use serde::{Deserialize, Serialize};

use crate::{
    common::{
        error::TradeError,
        types::{DepositInputs, FiatAccount, PayoutAmounts, PeerAddress, TradeId, Transaction, TxIdString},
    },
    offer::Offer,
    services::ArbitrationRepository,
    trade_msg::{TradeEnvelope, TradeMessage},
};

use super::Contract;

/// What one side of the trade knows about a trading peer, including itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingPeer {
    pub address: Option<PeerAddress>,
    pub pub_key: Option<Vec<u8>>,
    pub account: Option<FiatAccount>,
    pub account_signature: Option<Vec<u8>>,
    pub deposit_inputs: Option<DepositInputs>,
    pub payout_address: Option<String>,
    pub contract_signature: Option<Vec<u8>>,
}

/// Persisted working state of one trade, shared by every task the protocol runs.
///
/// The trade ID, offer and arbitrator key are fixed at construction. Everything the tasks
/// record afterwards is optional so that files written by older versions keep loading.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeProcessModel {
    id: TradeId,
    offer: Offer,
    arbitrator_pub_key: Vec<u8>,

    #[serde(default)]
    last_message: Option<TradeMessage>,
    #[serde(default)]
    last_message_sender: Option<PeerAddress>,
    #[serde(skip)]
    mailbox_message: Option<TradeEnvelope>,

    #[serde(default)]
    pub offerer: TradingPeer,
    #[serde(default)]
    pub taker: TradingPeer,
    #[serde(default)]
    pub take_offer_fee_tx: Option<Transaction>,
    #[serde(default)]
    pub take_offer_fee_tx_id: Option<TxIdString>,
    #[serde(default)]
    pub contract: Option<Contract>,
    #[serde(default)]
    pub deposit_tx: Option<Transaction>,
    #[serde(default)]
    pub payout: Option<PayoutAmounts>,
    #[serde(default)]
    pub offerer_payout_signature: Option<Vec<u8>>,
    #[serde(default)]
    pub payout_tx: Option<Transaction>,
}

impl TradeProcessModel {
    pub fn new(offer: Offer, arbitration: &dyn ArbitrationRepository) -> Result<Self, TradeError> {
        let id = offer.trade_id()?;
        let Some(arbitrator) = arbitration.default_arbitrator() else {
            return Err(TradeError::Validation(format!(
                "No default arbitrator available for TradeID {}",
                id
            )));
        };

        Ok(TradeProcessModel {
            id,
            offer,
            arbitrator_pub_key: arbitrator.pub_key,
            last_message: None,
            last_message_sender: None,
            mailbox_message: None,
            offerer: TradingPeer::default(),
            taker: TradingPeer::default(),
            take_offer_fee_tx: None,
            take_offer_fee_tx_id: None,
            contract: None,
            deposit_tx: None,
            payout: None,
            offerer_payout_signature: None,
            payout_tx: None,
        })
    }

    pub fn id(&self) -> &TradeId {
        &self.id
    }

    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    pub fn arbitrator_pub_key(&self) -> &[u8] {
        &self.arbitrator_pub_key
    }

    pub fn set_last_message(&mut self, envelope: &TradeEnvelope) {
        self.last_message = Some(envelope.message.to_owned());
        self.last_message_sender = Some(envelope.sender.to_owned());
    }

    pub fn last_message(&self) -> Option<&TradeMessage> {
        self.last_message.as_ref()
    }

    pub fn last_message_sender(&self) -> Option<&PeerAddress> {
        self.last_message_sender.as_ref()
    }

    /// Returns whether this was the first mailbox message. Later ones leave the slot untouched.
    pub fn set_mailbox_message(&mut self, envelope: TradeEnvelope) -> bool {
        if self.mailbox_message.is_some() {
            return false;
        }
        self.mailbox_message = Some(envelope);
        true
    }

    pub fn mailbox_message(&self) -> Option<&TradeEnvelope> {
        self.mailbox_message.as_ref()
    }
}
