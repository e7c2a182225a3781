use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::common::{error::TradeError, types::TradeId};

use super::{TradeNotif, TradeState};

/// The user's optional notification channel for one trade.
pub(crate) struct TradeNotifier<S: TradeState> {
    trade_id: TradeId,
    notif_tx: Option<mpsc::Sender<TradeNotif<S>>>,
}

impl<S: TradeState> TradeNotifier<S> {
    pub(crate) fn new(trade_id: TradeId) -> Self {
        TradeNotifier {
            trade_id,
            notif_tx: None,
        }
    }

    // A second registration replaces the first but is still reported
    pub(crate) fn register(&mut self, tx: mpsc::Sender<TradeNotif<S>>) -> Result<(), TradeError> {
        let mut result = Ok(());
        if self.notif_tx.is_some() {
            result = Err(TradeError::Simple(format!(
                "{} w/ TradeID {} already have notif_tx registered",
                S::LABEL,
                self.trade_id
            )));
        }
        self.notif_tx = Some(tx);
        result
    }

    pub(crate) fn unregister(&mut self) -> Result<(), TradeError> {
        let mut result = Ok(());
        if self.notif_tx.is_none() {
            result = Err(TradeError::Simple(format!(
                "{} w/ TradeID {} does not have notif_tx registered",
                S::LABEL,
                self.trade_id
            )));
        }
        self.notif_tx = None;
        result
    }

    pub(crate) async fn state_changed(&self, previous: S, state: S) {
        if state != previous {
            self.notify(TradeNotif::StateChanged {
                trade_id: self.trade_id.to_owned(),
                state,
            })
            .await;
        }
    }

    pub(crate) async fn fault(&self, error: String) {
        self.notify(TradeNotif::Fault {
            trade_id: self.trade_id.to_owned(),
            error,
        })
        .await;
    }

    async fn notify(&self, notif: TradeNotif<S>) {
        if let Some(tx) = &self.notif_tx {
            if let Some(error) = tx.send(notif).await.err() {
                error!(
                    "{} w/ TradeID {} failed in notifying user - {}",
                    S::LABEL,
                    self.trade_id,
                    error
                );
            }
        } else {
            trace!(
                "{} w/ TradeID {} do not have notif_tx registered",
                S::LABEL,
                self.trade_id
            );
        }
    }
}
