use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::{
    common::{
        error::TradeError,
        types::{DepositInputs, FiatAccount, PayoutAmounts, PeerAddress, TradeId, Transaction},
    },
    trade::Contract,
};

// Trade Message Data Structures

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestDepositTxInputsMessage {
    pub trade_amount_sat: u64,
    pub take_offer_fee_tx_id: String,
    pub taker_pub_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestTakerDepositPaymentMessage {
    pub offerer_deposit_inputs: DepositInputs,
    pub offerer_pub_key: Vec<u8>,
    pub offerer_account: FiatAccount,
    pub offerer_account_signature: Vec<u8>,
    pub offerer_payout_address: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestOffererPublishDepositTxMessage {
    pub taker_deposit_tx: Transaction,
    pub taker_account: FiatAccount,
    pub taker_account_signature: Vec<u8>,
    pub taker_payout_address: String,
    pub contract: Contract,
    pub taker_contract_signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositTxPublishedMessage {
    pub deposit_tx: Transaction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiatTransferStartedMessage {
    pub offerer_payout_signature: Vec<u8>,
    pub payout: PayoutAmounts,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoutTxPublishedMessage {
    pub payout_tx: Transaction,
}

/// Every message the two sides of a trade exchange. Anything else on the wire lands in
/// `Unsupported` instead of failing deserialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type")]
pub enum TradeMessage {
    RequestDepositTxInputs(RequestDepositTxInputsMessage),
    RequestTakerDepositPayment(RequestTakerDepositPaymentMessage),
    RequestOffererPublishDepositTx(RequestOffererPublishDepositTxMessage),
    DepositTxPublished(DepositTxPublishedMessage),
    FiatTransferStarted(FiatTransferStartedMessage),
    PayoutTxPublished(PayoutTxPublishedMessage),
    #[serde(other)]
    Unsupported,
}

impl TradeMessage {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    // Messages that may be stored and forwarded when the peer is offline
    pub fn is_mailbox_message(&self) -> bool {
        matches!(
            self,
            TradeMessage::DepositTxPublished(_)
                | TradeMessage::FiatTransferStarted(_)
                | TradeMessage::PayoutTxPublished(_)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeEnvelope {
    pub trade_id: String,
    pub sender: PeerAddress,
    pub message: TradeMessage,
}

impl TradeEnvelope {
    pub fn new(trade_id: &TradeId, sender: PeerAddress, message: TradeMessage) -> Self {
        TradeEnvelope {
            trade_id: trade_id.to_string(),
            sender,
            message,
        }
    }

    /// `Err` for an envelope without a trade ID, `Ok(false)` for one addressed to another trade.
    pub fn is_addressed_to(&self, trade_id: &TradeId) -> Result<bool, TradeError> {
        if self.trade_id.trim().is_empty() {
            return Err(TradeError::Validation(format!(
                "{} message from {} carries an empty trade ID",
                self.message.kind(),
                self.sender
            )));
        }
        Ok(self.trade_id == trade_id.as_str())
    }
}
