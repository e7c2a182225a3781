use iso_currency::Currency;

use crate::{common::types::FiatPaymentMethod, offer::OfferBuilder};

use super::SomeTestParams;

pub struct SomeTestOfferParams {}

impl SomeTestOfferParams {
    pub fn amount_sat() -> u64 {
        10_000_000
    }

    pub fn security_deposit_sat() -> u64 {
        1_000_000
    }

    pub fn price() -> u64 {
        6_000_000 // 60,000.00 EUR per BTC
    }

    pub fn offer_fee_tx_id() -> String {
        "some-offer-fee-tx".to_string()
    }

    pub fn default_builder() -> OfferBuilder {
        let mut builder = OfferBuilder::new();
        builder
            .amount_sat(Self::amount_sat())
            .security_deposit_sat(Self::security_deposit_sat())
            .price(Self::price())
            .currency(Currency::EUR)
            .payment_method(FiatPaymentMethod::Sepa)
            .offerer_address(SomeTestParams::offerer_address())
            .offerer_pub_key(SomeTestParams::offerer_pub_key())
            .offer_fee_tx_id(Self::offer_fee_tx_id());
        builder
    }
}
