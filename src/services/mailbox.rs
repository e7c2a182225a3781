use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::{
    common::{error::TradeError, types::PeerAddress},
    trade_msg::TradeEnvelope,
};

// Store-and-forward for peers that are offline when a message is sent
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MailboxService: Send + Sync {
    async fn send_mailbox_message(
        &self,
        peer: &PeerAddress,
        envelope: TradeEnvelope,
    ) -> Result<(), TradeError>;
}
