use std::fmt::{Debug, Display};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::{
    common::{
        error::TradeError,
        types::{PeerAddress, TradeId},
    },
    services::MessageHandler,
    storage::{PayloadHash, TradeStatistics},
    trade_msg::TradeMessage,
};

use super::{TradeData, TradeProcessModel, TradeServices};

/// Process state of one trading role. States are declared in workflow order.
pub trait TradeState:
    Clone
    + Copy
    + Debug
    + Display
    + PartialEq
    + Eq
    + PartialOrd
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const ROLE: &'static str;

    // Log prefix, as in "Taker w/ TradeID ..."
    const LABEL: &'static str;

    fn initial() -> Self;

    fn completed() -> Self;

    fn is_completed(&self) -> bool {
        *self == Self::completed()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TradeNotif<S: TradeState> {
    StateChanged { trade_id: TradeId, state: S },
    Fault { trade_id: TradeId, error: String },
}

/// The shared context every task of a trade runs against.
pub struct Trade<S: TradeState> {
    pub(crate) data: TradeData<S>,
    pub(crate) services: TradeServices,
    registered: bool,
}

impl<S: TradeState> Trade<S> {
    pub(crate) fn new(data: TradeData<S>, services: TradeServices) -> Self {
        Trade {
            data,
            services,
            registered: false,
        }
    }

    pub fn trade_id(&self) -> &TradeId {
        &self.data.trade_id
    }

    pub fn process_state(&self) -> S {
        self.data.process_state()
    }

    pub fn set_process_state(&mut self, process_state: S) {
        let previous = self.data.process_state();
        if previous != process_state {
            info!(
                "Trade w/ TradeID {} {} state {} -> {}",
                self.data.trade_id,
                S::ROLE,
                previous,
                process_state
            );
        }
        self.data.set_process_state(process_state);
    }

    pub fn process_model(&self) -> TradeProcessModel {
        self.data.process_model()
    }

    pub fn update_model<R>(&mut self, update: impl FnOnce(&mut TradeProcessModel) -> R) -> R {
        self.data.update_model(update)
    }

    pub fn error_message(&self) -> Option<String> {
        self.data.error_message()
    }

    pub(crate) fn set_error_message(&mut self, error_message: impl Into<String>) {
        self.data.set_error_message(error_message);
    }

    pub fn services(&self) -> &TradeServices {
        &self.services
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn register_message_handler(
        &mut self,
        handler: MessageHandler,
    ) -> Result<(), TradeError> {
        self.services
            .message
            .add_message_handler(&self.data.trade_id, handler)?;
        self.registered = true;
        Ok(())
    }

    // Safe to call repeatedly. An unregistered trade takes no further part in the protocol
    pub(crate) fn unregister_message_handler(&mut self) {
        if !self.registered {
            debug!(
                "{} w/ TradeID {} cleanup() with no message handler registered",
                S::LABEL,
                self.data.trade_id
            );
            return;
        }

        if let Some(error) = self
            .services
            .message
            .remove_message_handler(&self.data.trade_id)
            .err()
        {
            warn!(
                "{} w/ TradeID {} failed to remove message handler - {}",
                S::LABEL,
                self.data.trade_id,
                error
            );
        }
        self.registered = false;
    }

    pub(crate) fn check_active(&self) -> Result<(), TradeError> {
        if self.registered {
            Ok(())
        } else {
            Err(TradeError::Simple(format!(
                "{} w/ TradeID {} is no longer active",
                S::LABEL,
                self.data.trade_id
            )))
        }
    }

    pub(crate) fn check_state(&self, expected: S, action: &str) -> Result<(), TradeError> {
        let state = self.process_state();
        if state == expected {
            Ok(())
        } else {
            Err(TradeError::Simple(format!(
                "{} w/ TradeID {} cannot {} in state {}, expected {}",
                S::LABEL,
                self.data.trade_id,
                action,
                state,
                expected
            )))
        }
    }

    pub(crate) async fn send_to_peer(
        &self,
        peer: &PeerAddress,
        message: TradeMessage,
    ) -> Result<(), TradeError> {
        self.services
            .send_to_peer(&self.data.trade_id, peer, message)
            .await
    }

    pub(crate) fn publish_trade_statistics(&self) -> Result<PayloadHash, TradeError> {
        let model = self.process_model();
        let Some(deposit_tx) = model.deposit_tx.as_ref() else {
            return Err(TradeError::Validation(format!(
                "Trade w/ TradeID {} has no deposit tx for trade statistics",
                self.data.trade_id
            )));
        };
        let statistics = TradeStatistics::new(model.offer(), deposit_tx.tx_id.as_str())?;
        self.services.payload_store.upsert(Box::new(statistics))
    }

    pub(crate) fn terminate(self) -> Result<(), TradeError> {
        self.data.terminate()
    }
}
