use crate::{
    common::error::TradeError, offer::Offer, services::SignatureService,
};

use super::{Contract, TradingPeer};

// Peer account must be signed by the peer key and match the offer's currency and method
pub(crate) fn verify_peer_account(
    signature_service: &dyn SignatureService,
    peer: &TradingPeer,
    offer: &Offer,
) -> Result<(), TradeError> {
    let (Some(pub_key), Some(account), Some(signature)) = (
        peer.pub_key.as_ref(),
        peer.account.as_ref(),
        peer.account_signature.as_ref(),
    ) else {
        return Err(TradeError::Validation(
            "Peer account, pub key and account signature required".to_string(),
        ));
    };

    if account.currency != offer.currency {
        return Err(TradeError::Validation(format!(
            "Peer account currency {} does not match offer currency {}",
            account.currency, offer.currency
        )));
    }

    if account.payment_method != offer.payment_method {
        return Err(TradeError::Validation(format!(
            "Peer account payment method {} does not match offer payment method {}",
            account.payment_method, offer.payment_method
        )));
    }

    if !signature_service.verify(pub_key, &account.signing_bytes()?, signature)? {
        return Err(TradeError::Validation(format!(
            "Peer account {} signature invalid",
            account.id
        )));
    }
    Ok(())
}

pub(crate) fn verify_contract_signature(
    signature_service: &dyn SignatureService,
    contract: &Contract,
    pub_key: &[u8],
    signature: &[u8],
) -> Result<(), TradeError> {
    if !signature_service.verify(pub_key, &contract.signing_bytes()?, signature)? {
        return Err(TradeError::Validation(format!(
            "Contract signature for TradeID {} invalid",
            contract.trade_id
        )));
    }
    Ok(())
}
