use iso_currency::Currency;
use serde::{Deserialize, Serialize};

use crate::common::{
    error::TradeError,
    types::{FiatAccount, FiatPaymentMethod, TradeId, TxIdString},
};

use super::TradeProcessModel;

/// Terms both peers sign before any deposit is published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub trade_id: TradeId,
    pub offer_id: String,
    pub amount_sat: u64,
    pub security_deposit_sat: u64,
    pub price: u64,
    pub currency: Currency,
    pub payment_method: FiatPaymentMethod,
    pub take_offer_fee_tx_id: TxIdString,
    pub arbitrator_pub_key: Vec<u8>,
    pub offerer_pub_key: Vec<u8>,
    pub taker_pub_key: Vec<u8>,
    pub offerer_account: FiatAccount,
    pub taker_account: FiatAccount,
    pub offerer_payout_address: String,
    pub taker_payout_address: String,
}

impl Contract {
    // Both peers build the contract from their own copy of the trade data. Equal data, equal contract
    pub fn from_process_model(model: &TradeProcessModel) -> Result<Self, TradeError> {
        let offer = model.offer();
        let missing = |field: &str| {
            TradeError::Validation(format!(
                "Contract for TradeID {} missing {}",
                model.id(),
                field
            ))
        };

        Ok(Contract {
            trade_id: model.id().to_owned(),
            offer_id: offer.id.to_owned(),
            amount_sat: offer.amount_sat,
            security_deposit_sat: offer.security_deposit_sat,
            price: offer.price,
            currency: offer.currency.to_owned(),
            payment_method: offer.payment_method,
            take_offer_fee_tx_id: model
                .take_offer_fee_tx_id
                .to_owned()
                .ok_or_else(|| missing("take offer fee tx ID"))?,
            arbitrator_pub_key: model.arbitrator_pub_key().to_vec(),
            offerer_pub_key: model
                .offerer
                .pub_key
                .to_owned()
                .ok_or_else(|| missing("offerer pub key"))?,
            taker_pub_key: model
                .taker
                .pub_key
                .to_owned()
                .ok_or_else(|| missing("taker pub key"))?,
            offerer_account: model
                .offerer
                .account
                .to_owned()
                .ok_or_else(|| missing("offerer account"))?,
            taker_account: model
                .taker
                .account
                .to_owned()
                .ok_or_else(|| missing("taker account"))?,
            offerer_payout_address: model
                .offerer
                .payout_address
                .to_owned()
                .ok_or_else(|| missing("offerer payout address"))?,
            taker_payout_address: model
                .taker
                .payout_address
                .to_owned()
                .ok_or_else(|| missing("taker payout address"))?,
        })
    }

    pub(crate) fn signing_bytes(&self) -> Result<Vec<u8>, TradeError> {
        Ok(serde_json::to_vec(self)?)
    }
}
