use std::{path::PathBuf, time::Duration};

use secp256k1::SecretKey;
use tokio::time::{sleep, Instant};

use crusty_trade_protocol::{
    comms::{InMemoryMailbox, MessageBus},
    common::types::PeerAddress,
    config::ProtocolConfig,
    manager::Manager,
    offerer::{OffererProtocolAccess, OffererState},
    taker::{TakerProtocolAccess, TakerState},
    testing::{InMemoryBlockChain, InMemoryTradeWallet, SomeTestOfferParams, SomeTestParams},
    trade::Collaborators,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared bus, mailbox and chain plus a scratch data directory per node.
pub struct TestNetwork {
    pub bus: MessageBus,
    pub mailbox: InMemoryMailbox,
    pub chain: InMemoryBlockChain,
    dir: PathBuf,
}

impl TestNetwork {
    pub fn new() -> Self {
        let chain = InMemoryBlockChain::new();
        chain.add_tx(SomeTestOfferParams::offer_fee_tx_id(), 6);
        TestNetwork {
            bus: MessageBus::new(),
            mailbox: InMemoryMailbox::new(),
            chain,
            dir: std::env::temp_dir().join(format!("trade-network-{}", uuid::Uuid::new_v4())),
        }
    }

    pub fn config(&self, node: &str) -> ProtocolConfig {
        ProtocolConfig::with_data_dir(self.dir.join(node))
    }

    pub fn collaborators(
        &self,
        address: PeerAddress,
        secret_key: SecretKey,
    ) -> (Collaborators, InMemoryTradeWallet) {
        SomeTestParams::some_collaborators(
            &self.bus,
            &self.mailbox,
            &self.chain,
            address,
            secret_key,
        )
    }

    pub async fn taker_node(&self) -> (Manager, InMemoryTradeWallet) {
        let (collaborators, wallet) = self.collaborators(
            SomeTestParams::taker_address(),
            SomeTestParams::taker_secret_key(),
        );
        let manager = Manager::new(self.config("taker"), collaborators)
            .await
            .unwrap();
        (manager, wallet)
    }

    pub async fn offerer_node(&self) -> (Manager, InMemoryTradeWallet) {
        let (collaborators, wallet) = self.collaborators(
            SomeTestParams::offerer_address(),
            SomeTestParams::offerer_secret_key(),
        );
        let manager = Manager::new(self.config("offerer"), collaborators)
            .await
            .unwrap();
        (manager, wallet)
    }

    pub fn remove_data(self) {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).unwrap();
        }
    }
}

pub async fn wait_for_taker_state(access: &TakerProtocolAccess, expected: TakerState) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        let state = access.process_state().await.unwrap();
        if state == expected {
            return;
        }
        if let Some(error) = access.error_message().await.unwrap() {
            panic!("Taker faulted in state {} - {}", state, error);
        }
        assert!(
            Instant::now() < deadline,
            "Taker stuck in state {}, expected {}",
            state,
            expected
        );
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_offerer_state(access: &OffererProtocolAccess, expected: OffererState) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        let state = access.process_state().await.unwrap();
        if state == expected {
            return;
        }
        if let Some(error) = access.error_message().await.unwrap() {
            panic!("Offerer faulted in state {} - {}", state, error);
        }
        assert!(
            Instant::now() < deadline,
            "Offerer stuck in state {}, expected {}",
            state,
            expected
        );
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_taker_fault(access: &TakerProtocolAccess) -> String {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        if let Some(error) = access.error_message().await.unwrap() {
            return error;
        }
        assert!(Instant::now() < deadline, "Taker never faulted");
        sleep(Duration::from_millis(10)).await;
    }
}
