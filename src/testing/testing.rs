use std::{str::FromStr, sync::Arc};

use iso_currency::Currency;
use secp256k1::SecretKey;
use url::Url;

use crate::{
    comms::{InMemoryMailbox, MessageBus},
    common::types::{FiatAccount, FiatPaymentMethod, PeerAddress},
    services::{Arbitrator, Secp256k1SignatureService, SignatureService},
    storage::PersistableNetworkPayloadStore,
    trade::{Collaborators, TradeServices},
};

use super::{InMemoryBlockChain, InMemoryTradeWallet, StaticArbitrationRepository};

pub struct SomeTestParams {}

impl SomeTestParams {
    pub fn taker_address() -> PeerAddress {
        Url::parse("tor://some-taker.onion:9999").unwrap()
    }

    pub fn offerer_address() -> PeerAddress {
        Url::parse("tor://some-offerer.onion:9999").unwrap()
    }

    pub fn taker_secret_key() -> SecretKey {
        SecretKey::from_str("01010101010101010001020304050607ffff0000ffff00006363636363636363")
            .unwrap()
    }

    pub fn offerer_secret_key() -> SecretKey {
        SecretKey::from_str("0202020202020202000102030405060700000000ffffffff6464646464646464")
            .unwrap()
    }

    pub fn offerer_pub_key() -> Vec<u8> {
        Secp256k1SignatureService::new(Self::offerer_secret_key()).pub_key()
    }

    pub fn arbitrator() -> Arbitrator {
        Arbitrator {
            id: "some-arbitrator".to_string(),
            pub_key: vec![3, 7, 7, 7],
            address: Some(Url::parse("tor://some-arbitrator.onion:9999").unwrap()),
        }
    }

    pub fn taker_account() -> FiatAccount {
        FiatAccount {
            id: "taker-sepa".to_string(),
            holder_name: "Some Taker".to_string(),
            payment_method: FiatPaymentMethod::Sepa,
            currency: Currency::EUR,
            account_number: "DE89 3704 0044 0532 0130 00".to_string(),
        }
    }

    pub fn offerer_account() -> FiatAccount {
        FiatAccount {
            id: "offerer-sepa".to_string(),
            holder_name: "Some Offerer".to_string(),
            payment_method: FiatPaymentMethod::Sepa,
            currency: Currency::EUR,
            account_number: "FR14 2004 1010 0505 0001 3M02 606".to_string(),
        }
    }

    /// Collaborators for one peer on a shared bus, mailbox and chain.
    pub fn some_collaborators(
        bus: &MessageBus,
        mailbox: &InMemoryMailbox,
        chain: &InMemoryBlockChain,
        address: PeerAddress,
        secret_key: SecretKey,
    ) -> (Collaborators, InMemoryTradeWallet) {
        let wallet = InMemoryTradeWallet::new(address.host_str().unwrap_or("peer"), chain.clone());
        let collaborators = Collaborators {
            message: Arc::new(bus.connect(address)),
            mailbox: Arc::new(mailbox.clone()),
            wallet: Arc::new(wallet.clone()),
            block_chain: Arc::new(chain.clone()),
            signature: Arc::new(Secp256k1SignatureService::new(secret_key)),
            arbitration: Arc::new(StaticArbitrationRepository::new(Some(Self::arbitrator()))),
        };
        (collaborators, wallet)
    }

    pub fn some_trade_services(address: PeerAddress) -> TradeServices {
        let (collaborators, _) = Self::some_collaborators(
            &MessageBus::new(),
            &InMemoryMailbox::new(),
            &InMemoryBlockChain::new(),
            address,
            Self::taker_secret_key(),
        );
        collaborators.into_services(Arc::new(PersistableNetworkPayloadStore::new()))
    }
}
