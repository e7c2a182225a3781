use std::{borrow::Borrow, fmt};

use iso_currency::Currency;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::common::error::TradeError;

pub type PeerAddress = url::Url;
pub type TxIdString = String;

// Trade IDs are derived from the Offer ID and never change after construction
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradeId(String);

impl TradeId {
    pub fn new(id: impl Into<String>) -> Result<Self, TradeError> {
        let id: String = id.into();
        if id.trim().is_empty() {
            return Err(TradeError::Validation("Trade ID must not be empty".to_string()));
        }
        Ok(TradeId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TradeId {
    type Error = TradeError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        TradeId::new(id)
    }
}

impl From<TradeId> for String {
    fn from(trade_id: TradeId) -> String {
        trade_id.0
    }
}

impl Borrow<str> for TradeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: TxIdString,
    pub raw: Vec<u8>,
}

impl Transaction {
    // The wallet owns the real encoding. Here the ID is only a digest of whatever raw bytes it hands us
    pub fn from_raw(raw: Vec<u8>) -> Self {
        let tx_id = hex::encode(Sha256::digest(&raw));
        Transaction { tx_id, raw }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositInputs {
    pub outpoints: Vec<String>,
    pub amount_sat: u64,
    pub change_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAmounts {
    pub offerer_sat: u64,
    pub taker_sat: u64,
    pub offerer_address: String,
    pub taker_address: String,
}

impl PayoutAmounts {
    pub fn total_sat(&self) -> u64 {
        self.offerer_sat + self.taker_sat
    }
}

// Subset of the fiat payment methods from
// https://github.com/bisq-network/bisq/blob/release/v1.9.10/core/src/main/java/bisq/core/payment/payload/PaymentMethod.java

#[derive(
    PartialEq, Eq, Hash, Clone, Copy, Debug, Serialize, Deserialize, EnumString, Display, IntoStaticStr,
)]
pub enum FiatPaymentMethod {
    Sepa,
    SepaInstant,
    FasterPayments,
    NationalBank,
    Revolut,
    Swish,
    Zelle,
    InteracETransfer,
    TransferWise,
    Pix,
    Strike,
    SWIFT,
    CashApp,
    Venmo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiatAccount {
    pub id: String,
    pub holder_name: String,
    pub payment_method: FiatPaymentMethod,
    pub currency: Currency,
    pub account_number: String,
}

impl FiatAccount {
    pub(crate) fn signing_bytes(&self) -> Result<Vec<u8>, TradeError> {
        Ok(serde_json::to_vec(self)?)
    }
}
