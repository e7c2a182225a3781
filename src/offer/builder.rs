use std::result::Result;

use iso_currency::Currency;
use uuid::Uuid;

use crate::common::{
    error::TradeError,
    types::{FiatPaymentMethod, PeerAddress},
};

use super::Offer;

pub struct OfferBuilder {
    id: Option<String>,
    amount_sat: Option<u64>,
    security_deposit_sat: Option<u64>,
    price: Option<u64>,
    currency: Option<Currency>,
    payment_method: Option<FiatPaymentMethod>,
    offerer_address: Option<PeerAddress>,
    offerer_pub_key: Option<Vec<u8>>,
    offer_fee_tx_id: Option<String>,
}

impl OfferBuilder {
    pub fn new() -> Self {
        Self {
            id: None,
            amount_sat: None,
            security_deposit_sat: None,
            price: None,
            currency: None,
            payment_method: None,
            offerer_address: None,
            offerer_pub_key: None,
            offer_fee_tx_id: None,
        }
    }

    pub fn id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    pub fn amount_sat(&mut self, amount_sat: impl Into<u64>) -> &mut Self {
        self.amount_sat = Some(amount_sat.into());
        self
    }

    pub fn security_deposit_sat(&mut self, security_deposit_sat: impl Into<u64>) -> &mut Self {
        self.security_deposit_sat = Some(security_deposit_sat.into());
        self
    }

    pub fn price(&mut self, price: impl Into<u64>) -> &mut Self {
        self.price = Some(price.into());
        self
    }

    pub fn currency(&mut self, currency: Currency) -> &mut Self {
        self.currency = Some(currency);
        self
    }

    pub fn payment_method(&mut self, payment_method: FiatPaymentMethod) -> &mut Self {
        self.payment_method = Some(payment_method);
        self
    }

    pub fn offerer_address(&mut self, offerer_address: impl Into<PeerAddress>) -> &mut Self {
        self.offerer_address = Some(offerer_address.into());
        self
    }

    pub fn offerer_pub_key(&mut self, offerer_pub_key: impl Into<Vec<u8>>) -> &mut Self {
        self.offerer_pub_key = Some(offerer_pub_key.into());
        self
    }

    pub fn offer_fee_tx_id(&mut self, offer_fee_tx_id: impl Into<String>) -> &mut Self {
        self.offer_fee_tx_id = Some(offer_fee_tx_id.into());
        self
    }

    pub fn build(&mut self) -> Result<Offer, TradeError> {
        let id = if let Some(explicit_id) = self.id.as_ref() {
            explicit_id.to_owned()
        } else {
            Uuid::new_v4().to_string()
        };

        let Some(amount_sat) = self.amount_sat else {
            return Err(TradeError::Validation("No amount defined".to_string()));
        };

        let Some(price) = self.price else {
            return Err(TradeError::Validation("No price defined".to_string()));
        };

        let Some(currency) = self.currency.take() else {
            return Err(TradeError::Validation("No currency defined".to_string()));
        };

        let Some(payment_method) = self.payment_method else {
            return Err(TradeError::Validation("No payment method defined".to_string()));
        };

        let Some(offerer_address) = self.offerer_address.take() else {
            return Err(TradeError::Validation("No offerer address defined".to_string()));
        };

        let Some(offerer_pub_key) = self.offerer_pub_key.take() else {
            return Err(TradeError::Validation("No offerer pub key defined".to_string()));
        };

        let Some(offer_fee_tx_id) = self.offer_fee_tx_id.take() else {
            return Err(TradeError::Validation("No offer fee tx ID defined".to_string()));
        };

        let offer = Offer {
            id,
            amount_sat,
            security_deposit_sat: self.security_deposit_sat.unwrap_or(0),
            price,
            currency,
            payment_method,
            offerer_address,
            offerer_pub_key,
            offer_fee_tx_id,
        };

        offer.validate()?;
        Ok(offer)
    }
}
