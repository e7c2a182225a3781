use async_trait::async_trait;
use tokio::sync::mpsc;

#[cfg(test)]
use mockall::automock;

use crate::{
    common::{
        error::TradeError,
        types::{PeerAddress, TradeId},
    },
    trade_msg::TradeEnvelope,
};

pub type MessageHandler = mpsc::Sender<TradeEnvelope>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageService: Send + Sync {
    fn address(&self) -> PeerAddress;

    // Handlers are keyed by trade so the transport can route without asking every trade
    fn add_message_handler(
        &self,
        trade_id: &TradeId,
        handler: MessageHandler,
    ) -> Result<(), TradeError>;

    fn remove_message_handler(&self, trade_id: &TradeId) -> Result<(), TradeError>;

    /// Fails with `TradeError::PeerOffline` if the peer cannot be reached right now.
    async fn send_message(
        &self,
        peer: &PeerAddress,
        envelope: TradeEnvelope,
    ) -> Result<(), TradeError>;
}
