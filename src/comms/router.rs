use std::collections::HashMap;
use tracing::debug;

use crate::{
    common::{error::TradeError, types::TradeId},
    services::MessageHandler,
};

// One handler per trade. Lookups are by the raw trade ID string carried on the wire
pub(crate) struct Router {
    handlers: HashMap<TradeId, MessageHandler>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Router {
            handlers: HashMap::new(),
        }
    }

    pub(crate) fn register(
        &mut self,
        trade_id: &TradeId,
        handler: MessageHandler,
    ) -> Result<(), TradeError> {
        debug!("Router register() for TradeID {}", trade_id);
        if self.handlers.contains_key(trade_id) {
            return Err(TradeError::AlreadyRegistered(format!(
                "Message handler for TradeID {} already registered",
                trade_id
            )));
        }
        self.handlers.insert(trade_id.to_owned(), handler);
        Ok(())
    }

    pub(crate) fn unregister(&mut self, trade_id: &TradeId) -> Result<(), TradeError> {
        debug!("Router unregister() for TradeID {}", trade_id);
        if self.handlers.remove(trade_id).is_none() {
            return Err(TradeError::NotRegistered(format!(
                "Message handler for TradeID {} expected to already be registered",
                trade_id
            )));
        }
        Ok(())
    }

    pub(crate) fn route(&self, trade_id: &str) -> Option<MessageHandler> {
        self.handlers.get(trade_id).cloned()
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
