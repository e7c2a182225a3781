use std::any::Any;

use iso_currency::Currency;
use serde::{Deserialize, Serialize};

use crate::{
    common::{
        error::TradeError,
        types::{FiatPaymentMethod, TxIdString},
    },
    offer::Offer,
};

use super::PersistableNetworkPayload;

/// Published once per completed trade. Both trading peers derive the same content, so the
/// network ends up with a single entry per trade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeStatistics {
    pub offer_id: String,
    pub currency: Currency,
    pub payment_method: FiatPaymentMethod,
    pub price: u64,
    pub amount_sat: u64,
    pub deposit_tx_id: TxIdString,
}

impl TradeStatistics {
    pub fn new(offer: &Offer, deposit_tx_id: impl Into<TxIdString>) -> Result<Self, TradeError> {
        let deposit_tx_id = deposit_tx_id.into();
        if deposit_tx_id.is_empty() {
            return Err(TradeError::Validation(format!(
                "Trade statistics for offer {} without deposit tx ID",
                offer.id
            )));
        }
        Ok(TradeStatistics {
            offer_id: offer.id.to_owned(),
            currency: offer.currency.to_owned(),
            payment_method: offer.payment_method,
            price: offer.price,
            amount_sat: offer.amount_sat,
            deposit_tx_id,
        })
    }
}

#[typetag::serde(name = "trade_statistics")]
impl PersistableNetworkPayload for TradeStatistics {
    fn any_ref(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::PersistableNetworkPayloadStore, testing::SomeTestOfferParams};

    #[test]
    fn test_both_peers_publish_one_entry() {
        let offer = SomeTestOfferParams::default_builder().build().unwrap();
        let store = PersistableNetworkPayloadStore::new();

        let from_taker = TradeStatistics::new(&offer, "some-deposit-tx").unwrap();
        let from_offerer = TradeStatistics::new(&offer, "some-deposit-tx").unwrap();
        let hash = store.upsert(Box::new(from_taker)).unwrap();
        store.upsert(Box::new(from_offerer)).unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get(&hash).unwrap();
        let statistics = stored.downcast_ref::<TradeStatistics>().unwrap();
        assert_eq!(statistics.offer_id, offer.id);
        assert_eq!(statistics.deposit_tx_id, "some-deposit-tx");
    }

    #[test]
    fn test_requires_deposit_tx_id() {
        let offer = SomeTestOfferParams::default_builder().build().unwrap();
        assert!(TradeStatistics::new(&offer, "").is_err());
    }
}
