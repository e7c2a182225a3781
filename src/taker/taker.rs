use std::{path::Path, time::Duration};
use tracing::{debug, error, info, trace, warn};

use strum_macros::{Display, IntoStaticStr};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};

use super::{tasks, tasks::TakerTask, TakerState};

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

pub type TakerNotif = TradeNotif<TakerState>;

#[derive(Clone)]
pub struct TakerProtocolAccess {
    tx: mpsc::Sender<TakerRequest>,
}

impl TakerProtocolAccess {
    pub(super) fn new(tx: mpsc::Sender<TakerRequest>) -> Self {
        Self { tx }
    }

    pub async fn take_offer(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TakerRequest::TakeOffer { rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn fiat_payment_received(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TakerRequest::FiatPaymentReceived { rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    /// Hands over a message fetched from the mailbox. Returns `false` when a mailbox message
    /// was already accepted for this trade and this one was ignored.
    pub async fn set_mailbox_message(&self, envelope: TradeEnvelope) -> Result<bool, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<bool, TradeError>>();
        let request = TakerRequest::SetMailboxMessage { envelope, rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn process_state(&self) -> Result<TakerState, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<TakerState>();
        let request = TakerRequest::QueryProcessState { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn process_model(&self) -> Result<TradeProcessModel, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<TradeProcessModel>();
        let request = TakerRequest::QueryProcessModel { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn error_message(&self) -> Result<Option<String>, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Option<String>>();
        let request = TakerRequest::QueryErrorMessage { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn register_notif_tx(&self, tx: mpsc::Sender<TakerNotif>) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TakerRequest::RegisterNotifTx { tx, rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn unregister_notif_tx(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TakerRequest::UnregisterNotifTx { rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn cleanup(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<()>();
        let request = TakerRequest::Cleanup { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn shutdown(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<()>();
        let request = TakerRequest::Shutdown { rsp_tx };
        self.tx.send(request).await?; // Shutdown is allowed to fail if already shutdown
        Ok(rsp_rx.await?)
    }
}

pub struct TakerProtocol {
    tx: mpsc::Sender<TakerRequest>,
    pub(crate) task_handle: tokio::task::JoinHandle<()>,
}

impl TakerProtocol {
    pub(crate) fn new(
        config: &ProtocolConfig,
        offer: Offer,
        taker_account: FiatAccount,
        services: TradeServices,
    ) -> Result<Self, TradeError> {
        let mut process_model = TradeProcessModel::new(offer, services.arbitration.as_ref())?;
        process_model.taker.address = Some(services.message.address());
        process_model.taker.account = Some(taker_account);
        process_model.offerer.address = Some(process_model.offer().offerer_address.to_owned());
        process_model.offerer.pub_key = Some(process_model.offer().offerer_pub_key.to_owned());

        let data = TradeData::new(&config.data_dir, process_model);
        Self::spawn(config, Trade::new(data, services), true)
    }

    pub(crate) fn restore(
        config: &ProtocolConfig,
        data_path: impl AsRef<Path>,
        services: TradeServices,
    ) -> Result<(TradeId, Self), TradeError> {
        let (trade_id, data) = TradeData::<TakerState>::restore(data_path)?;
        let trade = Trade::new(data, services);

        // Finished or faulted trades come back read-only
        let active = !trade.process_state().is_completed() && trade.error_message().is_none();
        let taker = Self::spawn(config, trade, active)?;
        Ok((trade_id, taker))
    }

    fn spawn(
        config: &ProtocolConfig,
        mut trade: Trade<TakerState>,
        register: bool,
    ) -> Result<Self, TradeError> {
        let (tx, rx) = mpsc::channel::<TakerRequest>(config.request_channel_size);
        let (peer_tx, peer_rx) = mpsc::channel::<TradeEnvelope>(config.peer_channel_size);

        if register {
            if let Err(error) = trade.register_message_handler(peer_tx) {
                error!(
                    "Taker w/ TradeID {} failed to register message handler - {}",
                    trade.trade_id(),
                    error
                );
                if let Some(terminate_error) = trade.terminate().err() {
                    error!("Taker persistence terminate - {}", terminate_error);
                }
                return Err(error);
            }
        }

        let actor = TakerProtocolActor {
            rx,
            peer_rx,
            notifier: TradeNotifier::new(trade.trade_id().to_owned()),
            trade,
            task_timeout: config.task_timeout(),
        };
        let task_handle = tokio::spawn(async move { actor.run().await });
        Ok(Self { tx, task_handle })
    }

    pub fn new_accessor(&self) -> TakerProtocolAccess {
        TakerProtocolAccess::new(self.tx.clone())
    }
}

#[derive(Display, IntoStaticStr)]
pub(super) enum TakerRequest {
    TakeOffer {
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    FiatPaymentReceived {
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    SetMailboxMessage {
        envelope: TradeEnvelope,
        rsp_tx: oneshot::Sender<Result<bool, TradeError>>,
    },
    QueryProcessState {
        rsp_tx: oneshot::Sender<TakerState>,
    },
    QueryProcessModel {
        rsp_tx: oneshot::Sender<TradeProcessModel>,
    },
    QueryErrorMessage {
        rsp_tx: oneshot::Sender<Option<String>>,
    },
    RegisterNotifTx {
        tx: mpsc::Sender<TakerNotif>,
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

struct TakerProtocolActor {
    rx: mpsc::Receiver<TakerRequest>,
    peer_rx: mpsc::Receiver<TradeEnvelope>,
    trade: Trade<TakerState>,
    notifier: TradeNotifier<TakerState>,
    task_timeout: Option<Duration>,
}

impl TakerProtocolActor {
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

        info!("Taker w/ TradeID {} terminating", self.trade.trade_id());
        if let Some(error) = self.trade.terminate().err() {
            error!("Taker persistence terminate - {}", error);
        }
    }

    // Top-down Requests Handling

    async fn handle_request(&mut self, request: TakerRequest) -> bool {
        let mut terminate = false;
        debug!(
            "Taker w/ TradeID {} handle_request() of type {}",
            self.trade.trade_id(),
            request
        );

        match request {
            TakerRequest::TakeOffer { rsp_tx } => {
                let result = self.take_offer().await;
                reply("Taker take_offer()", rsp_tx, result);
            }
            TakerRequest::FiatPaymentReceived { rsp_tx } => {
                let result = self.fiat_payment_received().await;
                reply("Taker fiat_payment_received()", rsp_tx, result);
            }
            TakerRequest::SetMailboxMessage { envelope, rsp_tx } => {
                let result = self.set_mailbox_message(envelope).await;
                reply("Taker set_mailbox_message()", rsp_tx, result);
            }
            TakerRequest::QueryProcessState { rsp_tx } => {
                reply("Taker process_state()", rsp_tx, self.trade.process_state());
            }
            TakerRequest::QueryProcessModel { rsp_tx } => {
                reply("Taker process_model()", rsp_tx, self.trade.process_model());
            }
            TakerRequest::QueryErrorMessage { rsp_tx } => {
                reply("Taker error_message()", rsp_tx, self.trade.error_message());
            }
            TakerRequest::RegisterNotifTx { tx, rsp_tx } => {
                let result = self.notifier.register(tx);
                reply("Taker register_notif_tx()", rsp_tx, result);
            }
            TakerRequest::UnregisterNotifTx { rsp_tx } => {
                let result = self.notifier.unregister();
                reply("Taker unregister_notif_tx()", rsp_tx, result);
            }
            TakerRequest::Cleanup { rsp_tx } => {
                self.cleanup();
                reply("Taker cleanup()", rsp_tx, ());
            }
            TakerRequest::Shutdown { rsp_tx } => {
                self.shutdown();
                reply("Taker shutdown()", rsp_tx, ());
                terminate = true;
            }
        }
        terminate
    }

    async fn take_offer(&mut self) -> Result<(), TradeError> {
        self.trade.check_active()?;
        self.trade.check_state(TakerState::Created, "take offer")?;
        self.run_sequence("TakeOffer", tasks::take_offer_tasks())
            .await
    }

    async fn fiat_payment_received(&mut self) -> Result<(), TradeError> {
        self.trade.check_active()?;
        self.trade.check_state(TakerState::FiatStarted, "confirm fiat payment received")?;

        // State moves before the payout sequence runs, whatever its outcome
        let previous = self.trade.process_state();
        self.trade.set_process_state(TakerState::FiatReceived);
        self.notifier
            .state_changed(previous, self.trade.process_state())
            .await;

        self.run_sequence("FiatPaymentReceived", tasks::payout_tasks())
            .await?;
        self.complete_trade().await;
        Ok(())
    }

    async fn set_mailbox_message(&mut self, envelope: TradeEnvelope) -> Result<bool, TradeError> {
        if !envelope.is_addressed_to(self.trade.trade_id())? {
            return Err(TradeError::Validation(format!(
                "Taker w/ TradeID {} given mailbox message for TradeID {}",
                self.trade.trade_id(),
                envelope.trade_id
            )));
        }

        // An inactive trade must not use up its one mailbox slot
        if !self.trade.is_registered() {
            debug!(
                "Taker w/ TradeID {} inactive, mailbox message {} not accepted",
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
                "Taker w/ TradeID {} already has a mailbox message, {} ignored",
                self.trade.trade_id(),
                envelope.message.kind()
            );
            return Ok(false);
        }

        match &envelope.message {
            TradeMessage::DepositTxPublished(_) | TradeMessage::FiatTransferStarted(_) => {
                self.handle_peer_envelope(envelope).await;
            }
            _ => {
                warn!(
                    "Taker w/ TradeID {} does not handle {} from mailbox",
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

    fn shutdown(&mut self) {
        self.cleanup();
    }

    // Bottom-up Peer Message Handling

    async fn handle_peer_envelope(&mut self, envelope: TradeEnvelope) {
        if !self.trade.is_registered() {
            debug!(
                "Taker w/ TradeID {} inactive, {} message dropped",
                self.trade.trade_id(),
                envelope.message.kind()
            );
            return;
        }

        match envelope.is_addressed_to(self.trade.trade_id()) {
            Ok(true) => {}
            Ok(false) => {
                trace!(
                    "Taker w/ TradeID {} dropped message for TradeID {}",
                    self.trade.trade_id(),
                    envelope.trade_id
                );
                return;
            }
            Err(error) => {
                warn!(
                    "Taker w/ TradeID {} dropped message - {}",
                    self.trade.trade_id(),
                    error
                );
                return;
            }
        }

        debug!(
            "Taker w/ TradeID {} handle_peer_envelope() from {} of type {}",
            self.trade.trade_id(),
            envelope.sender,
            envelope.message.kind()
        );

        let (label, sequence, expected) = match &envelope.message {
            TradeMessage::RequestTakerDepositPayment(_) => (
                "RequestTakerDepositPayment",
                tasks::deposit_payment_tasks(),
                TakerState::DepositRequested,
            ),
            TradeMessage::DepositTxPublished(_) => (
                "DepositTxPublished",
                tasks::deposit_published_tasks(),
                TakerState::DepositRequested,
            ),
            TradeMessage::FiatTransferStarted(_) => (
                "FiatTransferStarted",
                tasks::fiat_transfer_started_tasks(),
                TakerState::DepositPublished,
            ),
            TradeMessage::Unsupported => {
                let error = TradeError::UnsupportedMessage(format!(
                    "Taker w/ TradeID {} received message of unknown type from {}",
                    self.trade.trade_id(),
                    envelope.sender
                ));
                warn!("{}", error);
                return;
            }
            TradeMessage::RequestDepositTxInputs(_)
            | TradeMessage::RequestOffererPublishDepositTx(_)
            | TradeMessage::PayoutTxPublished(_) => {
                let error = TradeError::UnsupportedMessage(format!(
                    "Taker w/ TradeID {} does not handle {} messages",
                    self.trade.trade_id(),
                    envelope.message.kind()
                ));
                warn!("{}", error);
                return;
            }
        };

        if let Err(error) = self.check_inbound(&envelope.message, expected) {
            warn!("{}", error);
            return;
        }

        self.trade
            .update_model(|model| model.set_last_message(&envelope));
        if let Some(error) = self.run_sequence(label, sequence).await.err() {
            debug!(
                "Taker w/ TradeID {} {} handling failed - {}",
                self.trade.trade_id(),
                label,
                error
            );
        }
    }

    // Inbound messages are only acted on at their point in the workflow. Covers redelivery
    fn check_inbound(&self, message: &TradeMessage, expected: TakerState) -> Result<(), TradeError> {
        self.trade
            .check_state(expected, &format!("handle {}", message.kind()))?;

        let model = self.trade.process_model();
        match message {
            TradeMessage::RequestTakerDepositPayment(_) if model.contract.is_some() => {
                Err(TradeError::Simple(format!(
                    "Taker w/ TradeID {} already handled RequestTakerDepositPayment",
                    self.trade.trade_id()
                )))
            }
            // DepositRequested covers both sides of the deposit payment step
            TradeMessage::DepositTxPublished(_)
                if model.contract.is_none() || model.deposit_tx.is_none() =>
            {
                Err(TradeError::Simple(format!(
                    "Taker w/ TradeID {} has not signed a deposit tx, DepositTxPublished too early",
                    self.trade.trade_id()
                )))
            }
            _ => Ok(()),
        }
    }

    // Task Sequences

    async fn run_sequence(
        &mut self,
        label: &'static str,
        tasks: Vec<TakerTask>,
    ) -> Result<(), TradeError> {
        let previous = self.trade.process_state();
        let trade_id = self.trade.trade_id().to_owned();
        let fault_trade_id = trade_id.clone();

        let runner = TaskRunner::new(
            label,
            move || debug!("Taker w/ TradeID {} {} sequence completed", trade_id, label),
            move |error| {
                warn!(
                    "Taker w/ TradeID {} {} sequence faulted - {}",
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
            "Taker w/ TradeID {} faulted, trade will not progress - {}",
            self.trade.trade_id(),
            error_message
        );
        self.trade.set_error_message(error_message.to_owned());
        self.cleanup();
        self.notifier.fault(error_message).await;
    }

    async fn complete_trade(&mut self) {
        let previous = self.trade.process_state();
        self.trade.set_process_state(TakerState::Completed);

        match self.trade.publish_trade_statistics() {
            Ok(hash) => info!(
                "Taker w/ TradeID {} published trade statistics {}",
                self.trade.trade_id(),
                hash
            ),
            Err(error) => error!(
                "Taker w/ TradeID {} failed to publish trade statistics - {}",
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

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use super::*;
    use crate::{
        comms::{BusEndpoint, InMemoryMailbox, MessageBus},
        common::types::{DepositInputs, PayoutAmounts, Transaction},
        services::{MessageService, Secp256k1SignatureService, SignatureService},
        storage::PersistableNetworkPayloadStore,
        testing::{InMemoryBlockChain, InMemoryTradeWallet, SomeTestOfferParams, SomeTestParams},
        trade_msg::{
            DepositTxPublishedMessage, FiatTransferStartedMessage,
            RequestTakerDepositPaymentMessage,
        },
    };

    struct SomeTakerHarness {
        dir: PathBuf,
        bus: MessageBus,
        mailbox: InMemoryMailbox,
        offerer: BusEndpoint,
        offerer_rx: mpsc::Receiver<TradeEnvelope>,
        wallet: InMemoryTradeWallet,
        payload_store: Arc<PersistableNetworkPayloadStore>,
        offer: Offer,
        trade_id: TradeId,
        taker: TakerProtocol,
        access: TakerProtocolAccess,
        notif_rx: mpsc::Receiver<TakerNotif>,
    }

    impl SomeTakerHarness {
        async fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("taker-test-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            let config = ProtocolConfig::with_data_dir(&dir);

            let bus = MessageBus::new();
            let mailbox = InMemoryMailbox::new();
            let chain = InMemoryBlockChain::new();
            chain.add_tx(SomeTestOfferParams::offer_fee_tx_id(), 6);

            let (collaborators, wallet) = SomeTestParams::some_collaborators(
                &bus,
                &mailbox,
                &chain,
                SomeTestParams::taker_address(),
                SomeTestParams::taker_secret_key(),
            );
            let payload_store = Arc::new(PersistableNetworkPayloadStore::new());
            let services = collaborators.into_services(payload_store.clone());

            let offer = SomeTestOfferParams::default_builder().build().unwrap();
            let trade_id = offer.trade_id().unwrap();

            let offerer = bus.connect(SomeTestParams::offerer_address());
            let (offerer_tx, offerer_rx) = mpsc::channel(10);
            offerer.add_message_handler(&trade_id, offerer_tx).unwrap();

            let taker = TakerProtocol::new(
                &config,
                offer.clone(),
                SomeTestParams::taker_account(),
                services,
            )
            .unwrap();
            let access = taker.new_accessor();
            let (notif_tx, notif_rx) = mpsc::channel(20);
            access.register_notif_tx(notif_tx).await.unwrap();

            SomeTakerHarness {
                dir,
                bus,
                mailbox,
                offerer,
                offerer_rx,
                wallet,
                payload_store,
                offer,
                trade_id,
                taker,
                access,
                notif_rx,
            }
        }

        fn taker_handler_count(&self) -> usize {
            self.bus.handler_count(&SomeTestParams::taker_address())
        }

        async fn send_from_offerer(&self, message: TradeMessage) {
            let envelope =
                TradeEnvelope::new(&self.trade_id, SomeTestParams::offerer_address(), message);
            self.offerer
                .send_message(&SomeTestParams::taker_address(), envelope)
                .await
                .unwrap();
        }

        async fn next_outbound(&mut self) -> TradeMessage {
            let envelope = tokio::time::timeout(Duration::from_secs(2), self.offerer_rx.recv())
                .await
                .expect("No message reached the offerer in time")
                .unwrap();
            assert_eq!(envelope.sender, SomeTestParams::taker_address());
            envelope.message
        }

        async fn wait_for_state(&mut self, expected: TakerState) {
            loop {
                let notif = tokio::time::timeout(Duration::from_secs(2), self.notif_rx.recv())
                    .await
                    .expect("Timed out waiting for state notification")
                    .unwrap();
                match notif {
                    TradeNotif::StateChanged { state, .. } if state == expected => return,
                    TradeNotif::StateChanged { .. } => continue,
                    TradeNotif::Fault { error, .. } => panic!("Unexpected fault - {}", error),
                }
            }
        }

        async fn wait_for_fault(&mut self) -> String {
            loop {
                let notif = tokio::time::timeout(Duration::from_secs(2), self.notif_rx.recv())
                    .await
                    .expect("Timed out waiting for fault notification")
                    .unwrap();
                if let TradeNotif::Fault { error, .. } = notif {
                    return error;
                }
            }
        }

        fn deposit_payment_message(&self) -> TradeMessage {
            let signer = Secp256k1SignatureService::new(SomeTestParams::offerer_secret_key());
            let account = SomeTestParams::offerer_account();
            let signature = signer.sign(&account.signing_bytes().unwrap()).unwrap();
            TradeMessage::RequestTakerDepositPayment(RequestTakerDepositPaymentMessage {
                offerer_deposit_inputs: DepositInputs {
                    outpoints: vec!["offerer-utxo:0".to_string()],
                    amount_sat: self.offer.offerer_deposit_sat(),
                    change_address: None,
                },
                offerer_pub_key: SomeTestParams::offerer_pub_key(),
                offerer_account: account,
                offerer_account_signature: signature,
                offerer_payout_address: "offerer-payout".to_string(),
            })
        }

        // What the offerer's wallet publishes after adding its signature
        async fn published_deposit_message(&self) -> TradeMessage {
            let model = self.access.process_model().await.unwrap();
            let mut raw = model.deposit_tx.unwrap().raw;
            raw.extend_from_slice(b":offerer-signed");
            TradeMessage::DepositTxPublished(DepositTxPublishedMessage {
                deposit_tx: Transaction::from_raw(raw),
            })
        }

        async fn advance_to_deposit_signed(&mut self) {
            self.access.take_offer().await.unwrap();
            assert!(matches!(
                self.next_outbound().await,
                TradeMessage::RequestDepositTxInputs(_)
            ));

            self.send_from_offerer(self.deposit_payment_message()).await;
            assert!(matches!(
                self.next_outbound().await,
                TradeMessage::RequestOffererPublishDepositTx(_)
            ));
        }

        async fn advance_to_deposit_published(&mut self) {
            self.advance_to_deposit_signed().await;
            self.send_from_offerer(self.published_deposit_message().await)
                .await;
            self.wait_for_state(TakerState::DepositPublished).await;
        }

        fn commit_count(&self) -> usize {
            self.wallet
                .calls()
                .into_iter()
                .filter(|call| *call == "commit_tx")
                .count()
        }

        async fn assert_no_outbound(&mut self) {
            let outbound =
                tokio::time::timeout(Duration::from_millis(200), self.offerer_rx.recv()).await;
            assert!(outbound.is_err());
        }

        async fn fiat_transfer_started_message(&self, taker_sat: u64) -> TradeMessage {
            let model = self.access.process_model().await.unwrap();
            TradeMessage::FiatTransferStarted(FiatTransferStartedMessage {
                offerer_payout_signature: vec![1, 2, 3],
                payout: PayoutAmounts {
                    offerer_sat: self.offer.offerer_payout_sat(),
                    taker_sat,
                    offerer_address: "offerer-payout".to_string(),
                    taker_address: model.taker.payout_address.unwrap(),
                },
            })
        }

        async fn shutdown(self) {
            self.access.shutdown().await.unwrap();
            self.taker.task_handle.await.unwrap();
            std::fs::remove_dir_all(&self.dir).unwrap();
        }
    }

    #[tokio::test]
    async fn test_construction_registers_one_handler_and_cleanup_removes_it() {
        let harness = SomeTakerHarness::new().await;
        assert_eq!(harness.taker_handler_count(), 1);
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::Created
        );

        harness.access.cleanup().await.unwrap();
        assert_eq!(harness.taker_handler_count(), 0);

        // Second cleanup is a no-op
        harness.access.cleanup().await.unwrap();
        assert_eq!(harness.taker_handler_count(), 0);

        // Inactive trades refuse user actions
        assert!(harness.access.take_offer().await.is_err());
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_same_trade_cannot_be_taken_twice_on_one_node() {
        let harness = SomeTakerHarness::new().await;
        let config = ProtocolConfig::with_data_dir(&harness.dir);
        let services = SomeTestParams::some_trade_services(SomeTestParams::taker_address());

        // Same bus address needed for the clash
        let services = TradeServices {
            message: Arc::new(harness.bus.connect(SomeTestParams::taker_address())),
            ..services
        };
        let result = TakerProtocol::new(
            &config,
            harness.offer.clone(),
            SomeTestParams::taker_account(),
            services,
        );
        assert!(matches!(result, Err(TradeError::AlreadyRegistered(_))));
        assert_eq!(harness.taker_handler_count(), 1);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_take_offer_requests_deposit_inputs() {
        let mut harness = SomeTakerHarness::new().await;
        harness.access.take_offer().await.unwrap();
        harness.wait_for_state(TakerState::DepositRequested).await;

        match harness.next_outbound().await {
            TradeMessage::RequestDepositTxInputs(message) => {
                assert_eq!(message.trade_amount_sat, SomeTestOfferParams::amount_sat());
                assert_eq!(
                    message.taker_pub_key,
                    Secp256k1SignatureService::new(SomeTestParams::taker_secret_key()).pub_key()
                );
                let model = harness.access.process_model().await.unwrap();
                assert_eq!(
                    model.take_offer_fee_tx_id,
                    Some(message.take_offer_fee_tx_id)
                );
            }
            other => panic!("Unexpected message {:?}", other),
        }
        assert_eq!(
            harness.wallet.calls(),
            vec!["create_take_offer_fee_tx", "broadcast_tx"]
        );

        // Taking twice is refused
        assert!(harness.access.take_offer().await.is_err());
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_deposit_payment_request_runs_once() {
        let mut harness = SomeTakerHarness::new().await;
        harness.access.take_offer().await.unwrap();
        harness.next_outbound().await;

        harness
            .send_from_offerer(harness.deposit_payment_message())
            .await;
        match harness.next_outbound().await {
            TradeMessage::RequestOffererPublishDepositTx(message) => {
                assert_eq!(message.contract.trade_id, harness.trade_id);
                assert_eq!(message.contract.amount_sat, SomeTestOfferParams::amount_sat());
                assert_eq!(
                    message.contract.arbitrator_pub_key,
                    SomeTestParams::arbitrator().pub_key
                );
                assert_eq!(message.taker_account, SomeTestParams::taker_account());
                assert!(!message.taker_contract_signature.is_empty());
            }
            other => panic!("Unexpected message {:?}", other),
        }

        // Redelivery does not start a second deposit
        harness
            .send_from_offerer(harness.deposit_payment_message())
            .await;
        let redelivered =
            tokio::time::timeout(Duration::from_millis(200), harness.offerer_rx.recv()).await;
        assert!(redelivered.is_err());

        let deposit_calls = harness
            .wallet
            .calls()
            .into_iter()
            .filter(|call| *call == "create_and_sign_taker_deposit_tx")
            .count();
        assert_eq!(deposit_calls, 1);
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::DepositRequested
        );
        assert_eq!(harness.access.error_message().await.unwrap(), None);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_wrong_role_message_is_ignored() {
        let mut harness = SomeTakerHarness::new().await;
        harness
            .send_from_offerer(TradeMessage::PayoutTxPublished(
                crate::trade_msg::PayoutTxPublishedMessage {
                    payout_tx: Transaction::from_raw(vec![9]),
                },
            ))
            .await;

        harness.access.take_offer().await.unwrap();
        harness.wait_for_state(TakerState::DepositRequested).await;
        assert_eq!(harness.access.error_message().await.unwrap(), None);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_mailbox_message_first_write_wins() {
        let mut harness = SomeTakerHarness::new().await;
        harness.advance_to_deposit_signed().await;

        let deposit_published = TradeEnvelope::new(
            &harness.trade_id,
            SomeTestParams::offerer_address(),
            harness.published_deposit_message().await,
        );

        assert!(harness
            .access
            .set_mailbox_message(deposit_published.clone())
            .await
            .unwrap());
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::DepositPublished
        );

        assert!(!harness
            .access
            .set_mailbox_message(deposit_published.clone())
            .await
            .unwrap());
        let model = harness.access.process_model().await.unwrap();
        assert_eq!(model.mailbox_message(), Some(&deposit_published));
        assert_eq!(harness.commit_count(), 1);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_deposit_published_before_signing_is_dropped() {
        let mut harness = SomeTakerHarness::new().await;
        harness.access.take_offer().await.unwrap();
        harness.wait_for_state(TakerState::DepositRequested).await;
        harness.next_outbound().await;

        harness
            .send_from_offerer(TradeMessage::DepositTxPublished(DepositTxPublishedMessage {
                deposit_tx: Transaction::from_raw(b"deposit:offerer-signed".to_vec()),
            }))
            .await;

        // Once the deposit payment sequence has run the early message is known to be handled
        harness
            .send_from_offerer(harness.deposit_payment_message())
            .await;
        assert!(matches!(
            harness.next_outbound().await,
            TradeMessage::RequestOffererPublishDepositTx(_)
        ));

        assert_eq!(harness.commit_count(), 0);
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::DepositRequested
        );
        assert_eq!(harness.access.error_message().await.unwrap(), None);
        assert_eq!(harness.taker_handler_count(), 1);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_published_deposit_must_match_signed_deposit() {
        let mut harness = SomeTakerHarness::new().await;
        harness.advance_to_deposit_signed().await;

        harness
            .send_from_offerer(TradeMessage::DepositTxPublished(DepositTxPublishedMessage {
                deposit_tx: Transaction::from_raw(b"some-other-deposit".to_vec()),
            }))
            .await;

        let error = harness.wait_for_fault().await;
        assert!(error.contains("ProcessDepositTxPublished"));
        assert_eq!(harness.commit_count(), 0);
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::DepositRequested
        );
        assert_eq!(harness.taker_handler_count(), 0);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_inactive_trade_does_not_take_mailbox_message() {
        let mut harness = SomeTakerHarness::new().await;
        harness.advance_to_deposit_signed().await;
        let deposit_published = TradeEnvelope::new(
            &harness.trade_id,
            SomeTestParams::offerer_address(),
            harness.published_deposit_message().await,
        );
        harness.access.cleanup().await.unwrap();

        assert!(!harness
            .access
            .set_mailbox_message(deposit_published)
            .await
            .unwrap());
        let model = harness.access.process_model().await.unwrap();
        assert!(model.mailbox_message().is_none());
        assert_eq!(harness.commit_count(), 0);
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::DepositRequested
        );
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_tasks_run_after_cleanup() {
        let mut harness = SomeTakerHarness::new().await;
        harness.access.take_offer().await.unwrap();
        harness.wait_for_state(TakerState::DepositRequested).await;
        harness.next_outbound().await;

        harness.access.cleanup().await.unwrap();
        let calls_before = harness.wallet.calls();

        harness
            .send_from_offerer(harness.deposit_payment_message())
            .await;
        harness.assert_no_outbound().await;

        assert_eq!(harness.wallet.calls(), calls_before);
        let model = harness.access.process_model().await.unwrap();
        assert!(model.contract.is_none());
        assert!(model.last_message().is_none());
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::DepositRequested
        );
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_unsupported_message_is_not_fatal() {
        let mut harness = SomeTakerHarness::new().await;
        harness.access.take_offer().await.unwrap();
        harness.wait_for_state(TakerState::DepositRequested).await;
        harness.next_outbound().await;

        harness.send_from_offerer(TradeMessage::Unsupported).await;
        harness.assert_no_outbound().await;

        assert_eq!(harness.taker_handler_count(), 1);
        assert_eq!(harness.access.error_message().await.unwrap(), None);
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::DepositRequested
        );

        // Trade carries on with the next expected message
        harness
            .send_from_offerer(harness.deposit_payment_message())
            .await;
        assert!(matches!(
            harness.next_outbound().await,
            TradeMessage::RequestOffererPublishDepositTx(_)
        ));
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_mailbox_message_for_other_trade_rejected() {
        let harness = SomeTakerHarness::new().await;
        let mut envelope = TradeEnvelope::new(
            &harness.trade_id,
            SomeTestParams::offerer_address(),
            TradeMessage::DepositTxPublished(DepositTxPublishedMessage {
                deposit_tx: Transaction::from_raw(vec![1]),
            }),
        );
        envelope.trade_id = "some-other-trade".to_string();

        let result = harness.access.set_mailbox_message(envelope).await;
        assert!(matches!(result, Err(TradeError::Validation(_))));

        let model = harness.access.process_model().await.unwrap();
        assert!(model.mailbox_message().is_none());
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::Created
        );
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_payout_faults_trade() {
        let mut harness = SomeTakerHarness::new().await;
        harness.advance_to_deposit_published().await;

        let message = harness
            .fiat_transfer_started_message(harness.offer.taker_payout_sat() + 1)
            .await;
        harness.send_from_offerer(message).await;

        let error = harness.wait_for_fault().await;
        assert!(error.contains("ProcessFiatTransferStarted"));
        assert_eq!(harness.access.error_message().await.unwrap(), Some(error));
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::DepositPublished
        );
        assert_eq!(harness.taker_handler_count(), 0);
        assert!(harness.access.fiat_payment_received().await.is_err());
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_fiat_received_state_set_even_when_payout_fails() {
        let mut harness = SomeTakerHarness::new().await;
        harness.advance_to_deposit_published().await;

        let message = harness
            .fiat_transfer_started_message(harness.offer.taker_payout_sat())
            .await;
        harness.send_from_offerer(message).await;
        harness.wait_for_state(TakerState::FiatStarted).await;

        harness.wallet.fail_on("sign_and_publish_payout_tx");
        let result = harness.access.fiat_payment_received().await;
        assert!(matches!(
            result,
            Err(TradeError::TaskFailure {
                task: "SignAndPublishPayoutTx",
                ..
            })
        ));

        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::FiatReceived
        );
        assert!(harness.access.error_message().await.unwrap().is_some());
        assert_eq!(harness.taker_handler_count(), 0);
        assert!(harness.payload_store.is_empty());
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_payout_completes_trade() {
        let mut harness = SomeTakerHarness::new().await;
        harness.advance_to_deposit_published().await;

        let message = harness
            .fiat_transfer_started_message(harness.offer.taker_payout_sat())
            .await;
        harness.send_from_offerer(message).await;
        harness.wait_for_state(TakerState::FiatStarted).await;

        harness.access.fiat_payment_received().await.unwrap();
        assert!(matches!(
            harness.next_outbound().await,
            TradeMessage::PayoutTxPublished(_)
        ));
        assert_eq!(
            harness.access.process_state().await.unwrap(),
            TakerState::Completed
        );
        assert_eq!(harness.access.error_message().await.unwrap(), None);
        assert_eq!(harness.payload_store.len(), 1);
        assert_eq!(harness.taker_handler_count(), 0);
        assert_eq!(harness.mailbox.pending_count(&SomeTestParams::offerer_address()), 0);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_payout_goes_to_mailbox_when_offerer_offline() {
        let mut harness = SomeTakerHarness::new().await;
        harness.advance_to_deposit_published().await;

        let message = harness
            .fiat_transfer_started_message(harness.offer.taker_payout_sat())
            .await;
        harness.send_from_offerer(message).await;
        harness.wait_for_state(TakerState::FiatStarted).await;

        harness
            .bus
            .set_online(&SomeTestParams::offerer_address(), false)
            .unwrap();
        harness.access.fiat_payment_received().await.unwrap();

        let pending = harness.mailbox.fetch(&SomeTestParams::offerer_address());
        assert_eq!(pending.len(), 1);
        assert!(matches!(pending[0].message, TradeMessage::PayoutTxPublished(_)));
        assert_eq!(pending[0].trade_id, harness.trade_id.as_str());
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_restore_resumes_registered() {
        let mut harness = SomeTakerHarness::new().await;
        harness.access.take_offer().await.unwrap();
        harness.wait_for_state(TakerState::DepositRequested).await;

        harness.access.shutdown().await.unwrap();
        let SomeTakerHarness {
            dir,
            bus,
            taker,
            trade_id,
            ..
        } = harness;
        taker.task_handle.await.unwrap();
        assert_eq!(bus.handler_count(&SomeTestParams::taker_address()), 0);

        let config = ProtocolConfig::with_data_dir(&dir);
        let services = TradeServices {
            message: Arc::new(bus.connect(SomeTestParams::taker_address())),
            ..SomeTestParams::some_trade_services(SomeTestParams::taker_address())
        };
        let data_path = TradeData::<TakerState>::data_path(&dir, &trade_id);
        let (restored_id, restored) = TakerProtocol::restore(&config, data_path, services).unwrap();
        assert_eq!(restored_id, trade_id);
        assert_eq!(bus.handler_count(&SomeTestParams::taker_address()), 1);

        let access = restored.new_accessor();
        assert_eq!(
            access.process_state().await.unwrap(),
            TakerState::DepositRequested
        );
        let model = access.process_model().await.unwrap();
        assert_eq!(model.arbitrator_pub_key().to_vec(), SomeTestParams::arbitrator().pub_key);
        assert!(model.take_offer_fee_tx_id.is_some());

        access.shutdown().await.unwrap();
        restored.task_handle.await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
