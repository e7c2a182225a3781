use std::sync::Arc;

use tracing::info;

use crate::{
    common::{
        error::TradeError,
        types::{PeerAddress, TradeId},
    },
    services::{
        ArbitrationRepository, BlockChainService, MailboxService, MessageService,
        SignatureService, TradeWalletService,
    },
    storage::PersistableNetworkPayloadStore,
    trade_msg::{TradeEnvelope, TradeMessage},
};

/// Collaborator handles a node supplies once for all of its trades.
#[derive(Clone)]
pub struct Collaborators {
    pub message: Arc<dyn MessageService>,
    pub mailbox: Arc<dyn MailboxService>,
    pub wallet: Arc<dyn TradeWalletService>,
    pub block_chain: Arc<dyn BlockChainService>,
    pub signature: Arc<dyn SignatureService>,
    pub arbitration: Arc<dyn ArbitrationRepository>,
}

impl Collaborators {
    pub fn into_services(self, payload_store: Arc<PersistableNetworkPayloadStore>) -> TradeServices {
        TradeServices {
            message: self.message,
            mailbox: self.mailbox,
            wallet: self.wallet,
            block_chain: self.block_chain,
            signature: self.signature,
            arbitration: self.arbitration,
            payload_store,
        }
    }
}

// Runtime half of a trade. Never persisted, re-attached on restore
#[derive(Clone)]
pub struct TradeServices {
    pub message: Arc<dyn MessageService>,
    pub mailbox: Arc<dyn MailboxService>,
    pub wallet: Arc<dyn TradeWalletService>,
    pub block_chain: Arc<dyn BlockChainService>,
    pub signature: Arc<dyn SignatureService>,
    pub arbitration: Arc<dyn ArbitrationRepository>,
    pub payload_store: Arc<PersistableNetworkPayloadStore>,
}

impl TradeServices {
    // Mailbox capable messages fall back to the mailbox when the peer is offline
    pub(crate) async fn send_to_peer(
        &self,
        trade_id: &TradeId,
        peer: &PeerAddress,
        message: TradeMessage,
    ) -> Result<(), TradeError> {
        let envelope = TradeEnvelope::new(trade_id, self.message.address(), message);
        match self.message.send_message(peer, envelope.clone()).await {
            Err(TradeError::PeerOffline(_)) if envelope.message.is_mailbox_message() => {
                info!(
                    "Trade w/ TradeID {} peer {} offline, {} message sent to mailbox",
                    trade_id,
                    peer,
                    envelope.message.kind()
                );
                self.mailbox.send_mailbox_message(peer, envelope).await
            }
            result => result,
        }
    }
}
