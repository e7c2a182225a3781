use std::{path::Path, time::Duration};
use tracing::{debug, error, info, trace, warn};

use strum_macros::{Display, IntoStaticStr};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};

use super::{tasks, tasks::OffererTask, OffererState};

use crate::{
    common::{
        error::TradeError,
        types::{FiatAccount, TradeId},
        utils::reply,
    },
    config::ProtocolConfig,
    offer::Offer,
    task_runner::TaskRunner,
    trade::{
        Trade, TradeData, TradeNotif, TradeNotifier, TradeProcessModel, TradeServices, TradeState,
    },
    trade_msg::{TradeEnvelope, TradeMessage},
};

pub type OffererNotif = TradeNotif<OffererState>;

#[derive(Clone)]
pub struct OffererProtocolAccess {
    tx: mpsc::Sender<OffererRequest>,
}

impl OffererProtocolAccess {
    pub(super) fn new(tx: mpsc::Sender<OffererRequest>) -> Self {
        Self { tx }
    }

    pub async fn fiat_payment_started(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = OffererRequest::FiatPaymentStarted { rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn set_mailbox_message(&self, envelope: TradeEnvelope) -> Result<bool, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<bool, TradeError>>();
        let request = OffererRequest::SetMailboxMessage { envelope, rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn process_state(&self) -> Result<OffererState, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<OffererState>();
        let request = OffererRequest::QueryProcessState { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn process_model(&self) -> Result<TradeProcessModel, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<TradeProcessModel>();
        let request = OffererRequest::QueryProcessModel { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn error_message(&self) -> Result<Option<String>, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Option<String>>();
        let request = OffererRequest::QueryErrorMessage { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn register_notif_tx(
        &self,
        tx: mpsc::Sender<OffererNotif>,
    ) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = OffererRequest::RegisterNotifTx { tx, rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn unregister_notif_tx(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = OffererRequest::UnregisterNotifTx { rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn cleanup(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<()>();
        let request = OffererRequest::Cleanup { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn shutdown(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<()>();
        let request = OffererRequest::Shutdown { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }
}

pub struct OffererProtocol {
    tx: mpsc::Sender<OffererRequest>,
    pub(crate) task_handle: tokio::task::JoinHandle<()>,
}

impl OffererProtocol {
    pub(crate) fn new(
        config: &ProtocolConfig,
        offer: Offer,
        offerer_account: FiatAccount,
        services: TradeServices,
    ) -> Result<Self, TradeError> {
        if offer.offerer_pub_key != services.signature.pub_key() {
            return Err(TradeError::Validation(format!(
                "Offer {} was not published with this node's signing key",
                offer.id
            )));
        }

        let mut process_model = TradeProcessModel::new(offer, services.arbitration.as_ref())?;
        process_model.offerer.address = Some(services.message.address());
        process_model.offerer.account = Some(offerer_account);
        process_model.offerer.pub_key = Some(process_model.offer().offerer_pub_key.to_owned());

        let data = TradeData::new(&config.data_dir, process_model);
        Self::spawn(config, Trade::new(data, services), true)
    }

    pub(crate) fn restore(
        config: &ProtocolConfig,
        data_path: impl AsRef<Path>,
        services: TradeServices,
    ) -> Result<(TradeId, Self), TradeError> {
        let (trade_id, data) = TradeData::<OffererState>::restore(data_path)?;
        let trade = Trade::new(data, services);

        let active = !trade.process_state().is_completed() && trade.error_message().is_none();
        let offerer = Self::spawn(config, trade, active)?;
        Ok((trade_id, offerer))
    }

    fn spawn(
        config: &ProtocolConfig,
        mut trade: Trade<OffererState>,
        register: bool,
    ) -> Result<Self, TradeError> {
        let (tx, rx) = mpsc::channel::<OffererRequest>(config.request_channel_size);
        let (peer_tx, peer_rx) = mpsc::channel::<TradeEnvelope>(config.peer_channel_size);

        if register {
            if let Err(error) = trade.register_message_handler(peer_tx) {
                error!(
                    "Offerer w/ TradeID {} failed to register message handler - {}",
                    trade.trade_id(),
                    error
                );
                if let Some(terminate_error) = trade.terminate().err() {
                    error!("Offerer persistence terminate - {}", terminate_error);
                }
                return Err(error);
            }
        }

        let actor = OffererProtocolActor {
            rx,
            peer_rx,
            notifier: TradeNotifier::new(trade.trade_id().to_owned()),
            trade,
            task_timeout: config.task_timeout(),
        };
        let task_handle = tokio::spawn(async move { actor.run().await });
        Ok(Self { tx, task_handle })
    }

    pub fn new_accessor(&self) -> OffererProtocolAccess {
        OffererProtocolAccess::new(self.tx.clone())
    }
}

#[derive(Display, IntoStaticStr)]
pub(super) enum OffererRequest {
    FiatPaymentStarted {
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    SetMailboxMessage {
        envelope: TradeEnvelope,
        rsp_tx: oneshot::Sender<Result<bool, TradeError>>,
    },
    QueryProcessState {
        rsp_tx: oneshot::Sender<OffererState>,
    },
    QueryProcessModel {
        rsp_tx: oneshot::Sender<TradeProcessModel>,
    },
    QueryErrorMessage {
        rsp_tx: oneshot::Sender<Option<String>>,
    },
    RegisterNotifTx {
        tx: mpsc::Sender<OffererNotif>,
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    UnregisterNotifTx {
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    Cleanup {
        rsp_tx: oneshot::Sender<()>,
    },
    Shutdown {
        rsp_tx: oneshot::Sender<()>,
    },
}

struct OffererProtocolActor {
    rx: mpsc::Receiver<OffererRequest>,
    peer_rx: mpsc::Receiver<TradeEnvelope>,
    trade: Trade<OffererState>,
    notifier: TradeNotifier<OffererState>,
    task_timeout: Option<Duration>,
}

impl OffererProtocolActor {
    async fn run(mut self) {
        loop {
            select! {
                Some(request) = self.rx.recv() => {
                    if self.handle_request(request).await {
                        break;
                    }
                },
                Some(envelope) = self.peer_rx.recv() => {
                    self.handle_peer_envelope(envelope).await;
                },
                else => break,
            }
        }

        info!("Offerer w/ TradeID {} terminating", self.trade.trade_id());
        if let Some(error) = self.trade.terminate().err() {
            error!("Offerer persistence terminate - {}", error);
        }
    }

    // Top-down Requests Handling

    async fn handle_request(&mut self, request: OffererRequest) -> bool {
        let mut terminate = false;
        debug!(
            "Offerer w/ TradeID {} handle_request() of type {}",
            self.trade.trade_id(),
            request
        );

        match request {
            OffererRequest::FiatPaymentStarted { rsp_tx } => {
                let result = self.fiat_payment_started().await;
                reply("Offerer fiat_payment_started()", rsp_tx, result);
            }
            OffererRequest::SetMailboxMessage { envelope, rsp_tx } => {
                let result = self.set_mailbox_message(envelope).await;
                reply("Offerer set_mailbox_message()", rsp_tx, result);
            }
            OffererRequest::QueryProcessState { rsp_tx } => {
                reply("Offerer process_state()", rsp_tx, self.trade.process_state());
            }
            OffererRequest::QueryProcessModel { rsp_tx } => {
                reply("Offerer process_model()", rsp_tx, self.trade.process_model());
            }
            OffererRequest::QueryErrorMessage { rsp_tx } => {
                reply("Offerer error_message()", rsp_tx, self.trade.error_message());
            }
            OffererRequest::RegisterNotifTx { tx, rsp_tx } => {
                let result = self.notifier.register(tx);
                reply("Offerer register_notif_tx()", rsp_tx, result);
            }
            OffererRequest::UnregisterNotifTx { rsp_tx } => {
                let result = self.notifier.unregister();
                reply("Offerer unregister_notif_tx()", rsp_tx, result);
            }
            OffererRequest::Cleanup { rsp_tx } => {
                self.cleanup();
                reply("Offerer cleanup()", rsp_tx, ());
            }
            OffererRequest::Shutdown { rsp_tx } => {
                self.cleanup();
                reply("Offerer shutdown()", rsp_tx, ());
                terminate = true;
            }
        }
        terminate
    }

    async fn fiat_payment_started(&mut self) -> Result<(), TradeError> {
        self.trade.check_active()?;
        self.trade.check_state(OffererState::DepositPublished, "start fiat payment")?;

        let previous = self.trade.process_state();
        self.trade.set_process_state(OffererState::FiatStarted);
        self.notifier
            .state_changed(previous, self.trade.process_state())
            .await;

        self.run_sequence("FiatPaymentStarted", tasks::fiat_started_tasks())
            .await
    }

    async fn set_mailbox_message(&mut self, envelope: TradeEnvelope) -> Result<bool, TradeError> {
        if !envelope.is_addressed_to(self.trade.trade_id())? {
            return Err(TradeError::Validation(format!(
                "Offerer w/ TradeID {} given mailbox message for TradeID {}",
                self.trade.trade_id(),
                envelope.trade_id
            )));
        }

        // An inactive trade must not use up its one mailbox slot
        if !self.trade.is_registered() {
            debug!(
                "Offerer w/ TradeID {} inactive, mailbox message {} not accepted",
                self.trade.trade_id(),
                envelope.message.kind()
            );
            return Ok(false);
        }

        let first = self
            .trade
            .update_model(|model| model.set_mailbox_message(envelope.to_owned()));
        if !first {
            debug!(
                "Offerer w/ TradeID {} already has a mailbox message, {} ignored",
                self.trade.trade_id(),
                envelope.message.kind()
            );
            return Ok(false);
        }

        match &envelope.message {
            TradeMessage::PayoutTxPublished(_) => {
                self.handle_peer_envelope(envelope).await;
            }
            _ => {
                warn!(
                    "Offerer w/ TradeID {} does not handle {} from mailbox",
                    self.trade.trade_id(),
                    envelope.message.kind()
                );
            }
        }
        Ok(true)
    }

    fn cleanup(&mut self) {
        self.trade.unregister_message_handler();
    }

    // Bottom-up Peer Message Handling

    async fn handle_peer_envelope(&mut self, envelope: TradeEnvelope) {
        if !self.trade.is_registered() {
            debug!(
                "Offerer w/ TradeID {} inactive, {} message dropped",
                self.trade.trade_id(),
                envelope.message.kind()
            );
            return;
        }

        match envelope.is_addressed_to(self.trade.trade_id()) {
            Ok(true) => {}
            Ok(false) => {
                trace!(
                    "Offerer w/ TradeID {} dropped message for TradeID {}",
                    self.trade.trade_id(),
                    envelope.trade_id
                );
                return;
            }
            Err(error) => {
                warn!(
                    "Offerer w/ TradeID {} dropped message - {}",
                    self.trade.trade_id(),
                    error
                );
                return;
            }
        }

        debug!(
            "Offerer w/ TradeID {} handle_peer_envelope() from {} of type {}",
            self.trade.trade_id(),
            envelope.sender,
            envelope.message.kind()
        );

        let (label, sequence, expected, completes) = match &envelope.message {
            TradeMessage::RequestDepositTxInputs(_) => (
                "RequestDepositTxInputs",
                tasks::deposit_inputs_tasks(),
                OffererState::OfferOpen,
                false,
            ),
            TradeMessage::RequestOffererPublishDepositTx(_) => (
                "RequestOffererPublishDepositTx",
                tasks::publish_deposit_tasks(),
                OffererState::DepositInputsSent,
                false,
            ),
            TradeMessage::PayoutTxPublished(_) => (
                "PayoutTxPublished",
                tasks::payout_published_tasks(),
                OffererState::FiatStarted,
                true,
            ),
            TradeMessage::Unsupported => {
                warn!(
                    "{}",
                    TradeError::UnsupportedMessage(format!(
                        "Offerer w/ TradeID {} received message of unknown type from {}",
                        self.trade.trade_id(),
                        envelope.sender
                    ))
                );
                return;
            }
            TradeMessage::RequestTakerDepositPayment(_)
            | TradeMessage::DepositTxPublished(_)
            | TradeMessage::FiatTransferStarted(_) => {
                warn!(
                    "{}",
                    TradeError::UnsupportedMessage(format!(
                        "Offerer w/ TradeID {} does not handle {} messages",
                        self.trade.trade_id(),
                        envelope.message.kind()
                    ))
                );
                return;
            }
        };

        if let Err(error) =
            self.trade.check_state(expected, &format!("handle {}", envelope.message.kind()))
        {
            warn!("{}", error);
            return;
        }

        self.trade
            .update_model(|model| model.set_last_message(&envelope));
        match self.run_sequence(label, sequence).await {
            Ok(()) if completes => self.complete_trade().await,
            Ok(()) => {}
            Err(error) => debug!(
                "Offerer w/ TradeID {} {} handling failed - {}",
                self.trade.trade_id(),
                label,
                error
            ),
        }
    }

    // Task Sequences

    async fn run_sequence(
        &mut self,
        label: &'static str,
        tasks: Vec<OffererTask>,
    ) -> Result<(), TradeError> {
        let previous = self.trade.process_state();
        let trade_id = self.trade.trade_id().to_owned();
        let fault_trade_id = trade_id.clone();

        let runner = TaskRunner::new(
            label,
            move || debug!("Offerer w/ TradeID {} {} sequence completed", trade_id, label),
            move |error| {
                warn!(
                    "Offerer w/ TradeID {} {} sequence faulted - {}",
                    fault_trade_id, label, error
                )
            },
        );
        let mut runner = match self.task_timeout {
            Some(deadline) => runner.with_deadline(deadline),
            None => runner,
        };
        runner.add_tasks(tasks);

        let result = runner.run(&mut self.trade).await;
        if let Err(error) = &result {
            self.handle_fault(error.to_string()).await;
        }
        self.notifier
            .state_changed(previous, self.trade.process_state())
            .await;
        result
    }

    async fn handle_fault(&mut self, error_message: String) {
        error!(
            "Offerer w/ TradeID {} faulted, trade will not progress - {}",
            self.trade.trade_id(),
            error_message
        );
        self.trade.set_error_message(error_message.to_owned());
        self.cleanup();
        self.notifier.fault(error_message).await;
    }

    async fn complete_trade(&mut self) {
        let previous = self.trade.process_state();
        self.trade.set_process_state(OffererState::Completed);

        match self.trade.publish_trade_statistics() {
            Ok(hash) => info!(
                "Offerer w/ TradeID {} published trade statistics {}",
                self.trade.trade_id(),
                hash
            ),
            Err(error) => error!(
                "Offerer w/ TradeID {} failed to publish trade statistics - {}",
                self.trade.trade_id(),
                error
            ),
        }
        self.cleanup();
        self.notifier
            .state_changed(previous, self.trade.process_state())
            .await;
    }
}
