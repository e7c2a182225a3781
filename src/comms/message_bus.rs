use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::{
    common::{
        error::TradeError,
        types::{PeerAddress, TradeId},
    },
    services::{MessageHandler, MessageService},
    trade_msg::TradeEnvelope,
};

use super::router::Router;

struct BusNode {
    online: bool,
    router: Router,
}

/// In-process transport connecting any number of peers by address.
///
/// Peers can be taken offline, in which case direct sends to them fail with
/// `TradeError::PeerOffline` and the sender is expected to fall back to the mailbox.
#[derive(Clone, Default)]
pub struct MessageBus {
    nodes: Arc<Mutex<HashMap<PeerAddress, BusNode>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_nodes(&self) -> MutexGuard<'_, HashMap<PeerAddress, BusNode>> {
        match self.nodes.lock() {
            Ok(nodes) => nodes,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Reconnecting an existing address brings it back online with its handlers intact
    pub fn connect(&self, address: PeerAddress) -> BusEndpoint {
        let mut nodes = self.lock_nodes();
        nodes
            .entry(address.clone())
            .and_modify(|node| node.online = true)
            .or_insert_with(|| BusNode {
                online: true,
                router: Router::new(),
            });
        debug!("MessageBus peer {} connected", address);

        BusEndpoint {
            address,
            bus: self.clone(),
        }
    }

    pub fn set_online(&self, address: &PeerAddress, online: bool) -> Result<(), TradeError> {
        let mut nodes = self.lock_nodes();
        let Some(node) = nodes.get_mut(address) else {
            return Err(TradeError::Simple(format!(
                "MessageBus has no peer at {}",
                address
            )));
        };
        node.online = online;
        debug!("MessageBus peer {} online: {}", address, online);
        Ok(())
    }

    pub fn handler_count(&self, address: &PeerAddress) -> usize {
        self.lock_nodes()
            .get(address)
            .map(|node| node.router.handler_count())
            .unwrap_or(0)
    }

    fn deliverable_handler(
        &self,
        peer: &PeerAddress,
        trade_id: &str,
    ) -> Result<Option<MessageHandler>, TradeError> {
        let nodes = self.lock_nodes();
        match nodes.get(peer) {
            Some(node) if node.online => Ok(node.router.route(trade_id)),
            _ => Err(TradeError::PeerOffline(peer.to_string())),
        }
    }
}

/// One peer's attachment to a `MessageBus`.
#[derive(Clone)]
pub struct BusEndpoint {
    address: PeerAddress,
    bus: MessageBus,
}

#[async_trait]
impl MessageService for BusEndpoint {
    fn address(&self) -> PeerAddress {
        self.address.clone()
    }

    fn add_message_handler(
        &self,
        trade_id: &TradeId,
        handler: MessageHandler,
    ) -> Result<(), TradeError> {
        let mut nodes = self.bus.lock_nodes();
        let node = nodes.entry(self.address.clone()).or_insert_with(|| BusNode {
            online: true,
            router: Router::new(),
        });
        node.router.register(trade_id, handler)
    }

    fn remove_message_handler(&self, trade_id: &TradeId) -> Result<(), TradeError> {
        let mut nodes = self.bus.lock_nodes();
        match nodes.get_mut(&self.address) {
            Some(node) => node.router.unregister(trade_id),
            None => Err(TradeError::NotRegistered(format!(
                "MessageBus has no peer at {}",
                self.address
            ))),
        }
    }

    async fn send_message(
        &self,
        peer: &PeerAddress,
        envelope: TradeEnvelope,
    ) -> Result<(), TradeError> {
        trace!(
            "MessageBus {} -> {} message {} for TradeID {}",
            self.address,
            peer,
            envelope.message.kind(),
            envelope.trade_id
        );

        // Lock is released before awaiting on the handler channel
        let handler = self.bus.deliverable_handler(peer, &envelope.trade_id)?;
        match handler {
            Some(handler) => handler.send(envelope).await?,
            None => warn!(
                "MessageBus peer {} has no handler for TradeID {}, {} message dropped",
                peer,
                envelope.trade_id,
                envelope.message.kind()
            ),
        }
        Ok(())
    }
}
