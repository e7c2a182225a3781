use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    common::{error::TradeError, types::PeerAddress},
    services::MailboxService,
    trade_msg::TradeEnvelope,
};

/// Store-and-forward mailbox kept in memory. Recipients drain their messages with `fetch`.
#[derive(Clone, Default)]
pub struct InMemoryMailbox {
    boxes: Arc<Mutex<HashMap<PeerAddress, Vec<TradeEnvelope>>>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_boxes(&self) -> MutexGuard<'_, HashMap<PeerAddress, Vec<TradeEnvelope>>> {
        match self.boxes.lock() {
            Ok(boxes) => boxes,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn fetch(&self, peer: &PeerAddress) -> Vec<TradeEnvelope> {
        self.lock_boxes().remove(peer).unwrap_or_default()
    }

    pub fn pending_count(&self, peer: &PeerAddress) -> usize {
        self.lock_boxes().get(peer).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl MailboxService for InMemoryMailbox {
    async fn send_mailbox_message(
        &self,
        peer: &PeerAddress,
        envelope: TradeEnvelope,
    ) -> Result<(), TradeError> {
        debug!(
            "Mailbox storing {} message for {} w/ TradeID {}",
            envelope.message.kind(),
            peer,
            envelope.trade_id
        );
        self.lock_boxes()
            .entry(peer.clone())
            .or_default()
            .push(envelope);
        Ok(())
    }
}
