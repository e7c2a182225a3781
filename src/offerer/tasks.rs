use async_trait::async_trait;
use tracing::debug;

use crate::{
    common::{
        error::TradeError,
        types::{PayoutAmounts, TradeId},
    },
    task_runner::Task,
    trade::{verify_contract_signature, verify_peer_account, Contract, Trade},
    trade_msg::{
        DepositTxPublishedMessage, FiatTransferStartedMessage, RequestTakerDepositPaymentMessage,
        TradeMessage,
    },
};

use super::OffererState;

type OffererTrade = Trade<OffererState>;
pub(super) type OffererTask = Box<dyn Task<OffererTrade>>;

fn missing(trade_id: &TradeId, what: &str) -> TradeError {
    TradeError::Validation(format!("Offerer w/ TradeID {} missing {}", trade_id, what))
}

fn unexpected_message(trade_id: &TradeId, expected: &str, found: Option<&TradeMessage>) -> TradeError {
    TradeError::Validation(format!(
        "Offerer w/ TradeID {} expected {} message, found {}",
        trade_id,
        expected,
        found.map(|message| message.kind()).unwrap_or("none")
    ))
}

// Task sequences, one per trigger

pub(super) fn deposit_inputs_tasks() -> Vec<OffererTask> {
    vec![
        Box::new(ProcessRequestDepositTxInputs),
        Box::new(CreateOffererDepositTxInputs),
        Box::new(SendRequestTakerDepositPayment),
    ]
}

pub(super) fn publish_deposit_tasks() -> Vec<OffererTask> {
    vec![
        Box::new(ProcessRequestOffererPublishDepositTx),
        Box::new(VerifyTakerAccount),
        Box::new(VerifyAndSignContract),
        Box::new(SignAndPublishDepositTx),
        Box::new(SendDepositTxPublished),
    ]
}

pub(super) fn fiat_started_tasks() -> Vec<OffererTask> {
    vec![
        Box::new(CreateAndSignPayoutTx),
        Box::new(VerifyTakeOfferFeePayment),
        Box::new(SendFiatTransferStarted),
    ]
}

pub(super) fn payout_published_tasks() -> Vec<OffererTask> {
    vec![
        Box::new(ProcessPayoutTxPublished),
        Box::new(CommitPayoutTx),
    ]
}

fn taker_address(trade: &OffererTrade) -> Result<crate::common::types::PeerAddress, TradeError> {
    trade
        .process_model()
        .taker
        .address
        .ok_or_else(|| missing(trade.trade_id(), "taker address"))
}

// Inbound RequestDepositTxInputs

pub(super) struct ProcessRequestDepositTxInputs;

#[async_trait]
impl Task<OffererTrade> for ProcessRequestDepositTxInputs {
    fn name(&self) -> &'static str {
        "ProcessRequestDepositTxInputs"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(TradeMessage::RequestDepositTxInputs(message)) = model.last_message() else {
            return Err(unexpected_message(
                trade.trade_id(),
                "RequestDepositTxInputs",
                model.last_message(),
            ));
        };
        let Some(sender) = model.last_message_sender() else {
            return Err(missing(trade.trade_id(), "taker address"));
        };

        if message.trade_amount_sat != model.offer().amount_sat {
            return Err(TradeError::Validation(format!(
                "Offerer w/ TradeID {} requested amount {} sat does not match offer amount {} sat",
                trade.trade_id(),
                message.trade_amount_sat,
                model.offer().amount_sat
            )));
        }
        if message.take_offer_fee_tx_id.is_empty() {
            return Err(missing(trade.trade_id(), "take offer fee tx ID"));
        }
        if message.taker_pub_key.is_empty() {
            return Err(missing(trade.trade_id(), "taker pub key"));
        }

        let message = message.to_owned();
        let sender = sender.to_owned();
        trade.update_model(|model| {
            model.taker.address = Some(sender);
            model.taker.pub_key = Some(message.taker_pub_key);
            model.take_offer_fee_tx_id = Some(message.take_offer_fee_tx_id);
        });
        Ok(())
    }
}

pub(super) struct CreateOffererDepositTxInputs;

#[async_trait]
impl Task<OffererTrade> for CreateOffererDepositTxInputs {
    fn name(&self) -> &'static str {
        "CreateOffererDepositTxInputs"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let wallet = trade.services().wallet.to_owned();
        let deposit_inputs = wallet
            .create_offerer_deposit_inputs(model.id(), model.offer().offerer_deposit_sat())
            .await?;
        let payout_address = wallet.payout_address(model.id()).await?;

        trade.update_model(|model| {
            model.offerer.deposit_inputs = Some(deposit_inputs);
            model.offerer.payout_address = Some(payout_address);
        });
        Ok(())
    }
}

pub(super) struct SendRequestTakerDepositPayment;

#[async_trait]
impl Task<OffererTrade> for SendRequestTakerDepositPayment {
    fn name(&self) -> &'static str {
        "SendRequestTakerDepositPayment"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let trade_id = model.id();
        let offerer = &model.offerer;
        let offerer_account = offerer
            .account
            .to_owned()
            .ok_or_else(|| missing(trade_id, "offerer account"))?;
        let offerer_account_signature = trade
            .services()
            .signature
            .sign(&offerer_account.signing_bytes()?)?;

        let message = RequestTakerDepositPaymentMessage {
            offerer_deposit_inputs: offerer
                .deposit_inputs
                .to_owned()
                .ok_or_else(|| missing(trade_id, "offerer deposit inputs"))?,
            offerer_pub_key: model.offer().offerer_pub_key.to_owned(),
            offerer_account,
            offerer_account_signature: offerer_account_signature.to_owned(),
            offerer_payout_address: offerer
                .payout_address
                .to_owned()
                .ok_or_else(|| missing(trade_id, "offerer payout address"))?,
        };

        let taker_address = taker_address(trade)?;
        trade
            .send_to_peer(
                &taker_address,
                TradeMessage::RequestTakerDepositPayment(message),
            )
            .await?;
        trade.update_model(|model| model.offerer.account_signature = Some(offerer_account_signature));
        trade.set_process_state(OffererState::DepositInputsSent);
        Ok(())
    }
}

// Inbound RequestOffererPublishDepositTx

pub(super) struct ProcessRequestOffererPublishDepositTx;

#[async_trait]
impl Task<OffererTrade> for ProcessRequestOffererPublishDepositTx {
    fn name(&self) -> &'static str {
        "ProcessRequestOffererPublishDepositTx"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(TradeMessage::RequestOffererPublishDepositTx(message)) = model.last_message()
        else {
            return Err(unexpected_message(
                trade.trade_id(),
                "RequestOffererPublishDepositTx",
                model.last_message(),
            ));
        };

        if message.taker_deposit_tx.raw.is_empty() {
            return Err(missing(trade.trade_id(), "taker deposit tx content"));
        }
        if message.taker_payout_address.is_empty() {
            return Err(missing(trade.trade_id(), "taker payout address"));
        }
        if message.taker_contract_signature.is_empty() {
            return Err(missing(trade.trade_id(), "taker contract signature"));
        }

        let message = message.to_owned();
        trade.update_model(|model| {
            model.taker.account = Some(message.taker_account);
            model.taker.account_signature = Some(message.taker_account_signature);
            model.taker.payout_address = Some(message.taker_payout_address);
            model.taker.contract_signature = Some(message.taker_contract_signature);
            model.contract = Some(message.contract);
            model.deposit_tx = Some(message.taker_deposit_tx);
        });
        Ok(())
    }
}

pub(super) struct VerifyTakerAccount;

#[async_trait]
impl Task<OffererTrade> for VerifyTakerAccount {
    fn name(&self) -> &'static str {
        "VerifyTakerAccount"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        verify_peer_account(
            trade.services().signature.as_ref(),
            &model.taker,
            model.offer(),
        )
    }
}

pub(super) struct VerifyAndSignContract;

#[async_trait]
impl Task<OffererTrade> for VerifyAndSignContract {
    fn name(&self) -> &'static str {
        "VerifyAndSignContract"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let trade_id = model.id();
        let Some(received) = model.contract.as_ref() else {
            return Err(missing(trade_id, "contract"));
        };

        let expected = Contract::from_process_model(&model)?;
        if &expected != received {
            return Err(TradeError::Validation(format!(
                "Offerer w/ TradeID {} contract from taker does not match local trade data",
                trade_id
            )));
        }

        let signature_service = trade.services().signature.to_owned();
        let taker_pub_key = model
            .taker
            .pub_key
            .as_ref()
            .ok_or_else(|| missing(trade_id, "taker pub key"))?;
        let taker_signature = model
            .taker
            .contract_signature
            .as_ref()
            .ok_or_else(|| missing(trade_id, "taker contract signature"))?;
        verify_contract_signature(
            signature_service.as_ref(),
            received,
            taker_pub_key,
            taker_signature,
        )?;

        let contract_signature = signature_service.sign(&expected.signing_bytes()?)?;
        trade.update_model(|model| model.offerer.contract_signature = Some(contract_signature));
        Ok(())
    }
}

pub(super) struct SignAndPublishDepositTx;

#[async_trait]
impl Task<OffererTrade> for SignAndPublishDepositTx {
    fn name(&self) -> &'static str {
        "SignAndPublishDepositTx"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(taker_deposit_tx) = model.deposit_tx.as_ref() else {
            return Err(missing(trade.trade_id(), "taker deposit tx"));
        };
        let deposit_tx = trade
            .services()
            .wallet
            .sign_and_publish_deposit_tx(taker_deposit_tx)
            .await?;
        debug!(
            "Offerer w/ TradeID {} published deposit tx {}",
            trade.trade_id(),
            deposit_tx.tx_id
        );
        trade.update_model(|model| model.deposit_tx = Some(deposit_tx));
        Ok(())
    }
}

pub(super) struct SendDepositTxPublished;

#[async_trait]
impl Task<OffererTrade> for SendDepositTxPublished {
    fn name(&self) -> &'static str {
        "SendDepositTxPublished"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(deposit_tx) = model.deposit_tx.to_owned() else {
            return Err(missing(trade.trade_id(), "deposit tx"));
        };
        let taker_address = taker_address(trade)?;
        trade
            .send_to_peer(
                &taker_address,
                TradeMessage::DepositTxPublished(DepositTxPublishedMessage { deposit_tx }),
            )
            .await?;
        trade.set_process_state(OffererState::DepositPublished);
        Ok(())
    }
}

// User started the fiat transfer

pub(super) struct CreateAndSignPayoutTx;

#[async_trait]
impl Task<OffererTrade> for CreateAndSignPayoutTx {
    fn name(&self) -> &'static str {
        "CreateAndSignPayoutTx"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let trade_id = model.id();
        let offer = model.offer();
        let deposit_tx = model
            .deposit_tx
            .as_ref()
            .ok_or_else(|| missing(trade_id, "deposit tx"))?;

        let payout = PayoutAmounts {
            offerer_sat: offer.offerer_payout_sat(),
            taker_sat: offer.taker_payout_sat(),
            offerer_address: model
                .offerer
                .payout_address
                .to_owned()
                .ok_or_else(|| missing(trade_id, "offerer payout address"))?,
            taker_address: model
                .taker
                .payout_address
                .to_owned()
                .ok_or_else(|| missing(trade_id, "taker payout address"))?,
        };

        let signature = trade
            .services()
            .wallet
            .sign_payout_tx(deposit_tx, &payout)
            .await?;
        trade.update_model(|model| {
            model.offerer_payout_signature = Some(signature);
            model.payout = Some(payout);
        });
        Ok(())
    }
}

pub(super) struct VerifyTakeOfferFeePayment;

#[async_trait]
impl Task<OffererTrade> for VerifyTakeOfferFeePayment {
    fn name(&self) -> &'static str {
        "VerifyTakeOfferFeePayment"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(fee_tx_id) = model.take_offer_fee_tx_id.as_ref() else {
            return Err(missing(trade.trade_id(), "take offer fee tx ID"));
        };
        match trade.services().block_chain.tx_confirmations(fee_tx_id).await? {
            Some(confirmations) => {
                debug!(
                    "Offerer w/ TradeID {} take offer fee tx {} has {} confirmations",
                    trade.trade_id(),
                    fee_tx_id,
                    confirmations
                );
                Ok(())
            }
            None => Err(TradeError::Validation(format!(
                "Offerer w/ TradeID {} take offer fee tx {} not found",
                trade.trade_id(),
                fee_tx_id
            ))),
        }
    }
}

pub(super) struct SendFiatTransferStarted;

#[async_trait]
impl Task<OffererTrade> for SendFiatTransferStarted {
    fn name(&self) -> &'static str {
        "SendFiatTransferStarted"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let trade_id = model.id();
        let message = FiatTransferStartedMessage {
            offerer_payout_signature: model
                .offerer_payout_signature
                .to_owned()
                .ok_or_else(|| missing(trade_id, "offerer payout signature"))?,
            payout: model
                .payout
                .to_owned()
                .ok_or_else(|| missing(trade_id, "payout amounts"))?,
        };
        let taker_address = taker_address(trade)?;
        trade
            .send_to_peer(&taker_address, TradeMessage::FiatTransferStarted(message))
            .await
    }
}

// Inbound PayoutTxPublished

pub(super) struct ProcessPayoutTxPublished;

#[async_trait]
impl Task<OffererTrade> for ProcessPayoutTxPublished {
    fn name(&self) -> &'static str {
        "ProcessPayoutTxPublished"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(TradeMessage::PayoutTxPublished(message)) = model.last_message() else {
            return Err(unexpected_message(
                trade.trade_id(),
                "PayoutTxPublished",
                model.last_message(),
            ));
        };
        if message.payout_tx.raw.is_empty() {
            return Err(missing(trade.trade_id(), "payout tx content"));
        }
        let payout_tx = message.payout_tx.to_owned();
        trade.update_model(|model| model.payout_tx = Some(payout_tx));
        Ok(())
    }
}

pub(super) struct CommitPayoutTx;

#[async_trait]
impl Task<OffererTrade> for CommitPayoutTx {
    fn name(&self) -> &'static str {
        "CommitPayoutTx"
    }

    async fn run(&self, trade: &mut OffererTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(payout_tx) = model.payout_tx.as_ref() else {
            return Err(missing(trade.trade_id(), "payout tx"));
        };
        trade.services().wallet.commit_tx(payout_tx).await?;
        trade.set_process_state(OffererState::PayoutReceived);
        Ok(())
    }
}
