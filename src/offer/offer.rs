use iso_currency::Currency;
use serde::{Deserialize, Serialize};

use crate::common::{
    error::TradeError,
    types::{FiatPaymentMethod, PeerAddress, TradeId, TxIdString},
};

/// A published offer to buy Bitcoin for fiat. Taking it starts a trade with the same ID.
///
/// The taker sells the Bitcoin. It funds the trade amount and both peers lock a security
/// deposit into the 2-of-3 deposit tx shared with the arbitrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub amount_sat: u64,
    pub security_deposit_sat: u64,
    pub price: u64, // Fiat minor units per whole Bitcoin
    pub currency: Currency,
    pub payment_method: FiatPaymentMethod,
    pub offerer_address: PeerAddress,
    pub offerer_pub_key: Vec<u8>,
    pub offer_fee_tx_id: TxIdString,
}

impl Offer {
    const SATS_PER_BTC: u128 = 100_000_000;

    pub fn trade_id(&self) -> Result<TradeId, TradeError> {
        TradeId::new(self.id.as_str())
    }

    // Fiat minor units owed by the taker for the full amount
    pub fn fiat_volume(&self) -> u64 {
        let volume = self.amount_sat as u128 * self.price as u128 / Self::SATS_PER_BTC;
        u64::try_from(volume).unwrap_or(u64::MAX)
    }

    pub fn offerer_deposit_sat(&self) -> u64 {
        self.security_deposit_sat
    }

    pub fn taker_deposit_sat(&self) -> u64 {
        self.amount_sat + self.security_deposit_sat
    }

    // Offerer receives the traded amount, both get their security deposit back
    pub fn offerer_payout_sat(&self) -> u64 {
        self.amount_sat + self.security_deposit_sat
    }

    pub fn taker_payout_sat(&self) -> u64 {
        self.security_deposit_sat
    }

    pub fn validate(&self) -> Result<(), TradeError> {
        self.trade_id()?;
        if self.amount_sat == 0 {
            return Err(TradeError::Validation(format!(
                "Offer {} has zero amount",
                self.id
            )));
        }
        if self.price == 0 {
            return Err(TradeError::Validation(format!("Offer {} has zero price", self.id)));
        }
        if self.offerer_pub_key.is_empty() {
            return Err(TradeError::Validation(format!(
                "Offer {} has no offerer pub key",
                self.id
            )));
        }
        if self.offer_fee_tx_id.is_empty() {
            return Err(TradeError::Validation(format!(
                "Offer {} has no offer fee tx ID",
                self.id
            )));
        }
        Ok(())
    }
}
