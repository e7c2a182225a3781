use async_trait::async_trait;
use tracing::debug;

use crate::{
    common::{error::TradeError, types::TradeId},
    task_runner::Task,
    trade::{verify_peer_account, Contract, Trade},
    trade_msg::{
        PayoutTxPublishedMessage, RequestDepositTxInputsMessage,
        RequestOffererPublishDepositTxMessage, TradeMessage,
    },
};

use super::TakerState;

type TakerTrade = Trade<TakerState>;
pub(super) type TakerTask = Box<dyn Task<TakerTrade>>;

fn missing(trade_id: &TradeId, what: &str) -> TradeError {
    TradeError::Validation(format!("Taker w/ TradeID {} missing {}", trade_id, what))
}

fn unexpected_message(trade_id: &TradeId, expected: &str, found: Option<&TradeMessage>) -> TradeError {
    TradeError::Validation(format!(
        "Taker w/ TradeID {} expected {} message, found {}",
        trade_id,
        expected,
        found.map(|message| message.kind()).unwrap_or("none")
    ))
}

// Task sequences, one per trigger

pub(super) fn take_offer_tasks() -> Vec<TakerTask> {
    vec![
        Box::new(CreateTakeOfferFeeTx),
        Box::new(BroadcastTakeOfferFeeTx),
        Box::new(SendRequestDepositTxInputs),
    ]
}

pub(super) fn deposit_payment_tasks() -> Vec<TakerTask> {
    vec![
        Box::new(ProcessRequestTakerDepositPayment),
        Box::new(VerifyOffererAccount),
        Box::new(CreateAndSignContract),
        Box::new(CreateAndSignDepositTx),
        Box::new(SendSignedDepositTx),
    ]
}

pub(super) fn deposit_published_tasks() -> Vec<TakerTask> {
    vec![
        Box::new(ProcessDepositTxPublished),
        Box::new(CommitDepositTx),
    ]
}

pub(super) fn fiat_transfer_started_tasks() -> Vec<TakerTask> {
    vec![Box::new(ProcessFiatTransferStarted)]
}

pub(super) fn payout_tasks() -> Vec<TakerTask> {
    vec![
        Box::new(SignAndPublishPayoutTx),
        Box::new(VerifyOfferFeePayment),
        Box::new(SendPayoutTxToOfferer),
    ]
}

// Take offer

pub(super) struct CreateTakeOfferFeeTx;

#[async_trait]
impl Task<TakerTrade> for CreateTakeOfferFeeTx {
    fn name(&self) -> &'static str {
        "CreateTakeOfferFeeTx"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let trade_id = trade.trade_id().to_owned();
        let fee_tx = trade
            .services()
            .wallet
            .create_take_offer_fee_tx(&trade_id)
            .await?;
        debug!("Taker w/ TradeID {} take offer fee tx {}", trade_id, fee_tx.tx_id);

        trade.update_model(|model| {
            model.take_offer_fee_tx_id = Some(fee_tx.tx_id.to_owned());
            model.take_offer_fee_tx = Some(fee_tx);
        });
        Ok(())
    }
}

pub(super) struct BroadcastTakeOfferFeeTx;

#[async_trait]
impl Task<TakerTrade> for BroadcastTakeOfferFeeTx {
    fn name(&self) -> &'static str {
        "BroadcastTakeOfferFeeTx"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(fee_tx) = model.take_offer_fee_tx.as_ref() else {
            return Err(missing(trade.trade_id(), "take offer fee tx"));
        };
        trade.services().wallet.broadcast_tx(fee_tx).await?;
        trade.set_process_state(TakerState::FeePublished);
        Ok(())
    }
}

pub(super) struct SendRequestDepositTxInputs;

#[async_trait]
impl Task<TakerTrade> for SendRequestDepositTxInputs {
    fn name(&self) -> &'static str {
        "SendRequestDepositTxInputs"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(take_offer_fee_tx_id) = model.take_offer_fee_tx_id.to_owned() else {
            return Err(missing(trade.trade_id(), "take offer fee tx ID"));
        };
        let taker_pub_key = trade.services().signature.pub_key();
        let message = TradeMessage::RequestDepositTxInputs(RequestDepositTxInputsMessage {
            trade_amount_sat: model.offer().amount_sat,
            take_offer_fee_tx_id,
            taker_pub_key: taker_pub_key.to_owned(),
        });

        trade
            .send_to_peer(&model.offer().offerer_address, message)
            .await?;
        trade.update_model(|model| model.taker.pub_key = Some(taker_pub_key));
        trade.set_process_state(TakerState::DepositRequested);
        Ok(())
    }
}

// Inbound RequestTakerDepositPayment

pub(super) struct ProcessRequestTakerDepositPayment;

#[async_trait]
impl Task<TakerTrade> for ProcessRequestTakerDepositPayment {
    fn name(&self) -> &'static str {
        "ProcessRequestTakerDepositPayment"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(TradeMessage::RequestTakerDepositPayment(message)) = model.last_message() else {
            return Err(unexpected_message(
                trade.trade_id(),
                "RequestTakerDepositPayment",
                model.last_message(),
            ));
        };

        if message.offerer_pub_key != model.offer().offerer_pub_key {
            return Err(TradeError::Validation(format!(
                "Taker w/ TradeID {} offerer pub key does not match the offer",
                trade.trade_id()
            )));
        }
        if message.offerer_deposit_inputs.outpoints.is_empty() {
            return Err(missing(trade.trade_id(), "offerer deposit inputs"));
        }
        if message.offerer_deposit_inputs.amount_sat < model.offer().offerer_deposit_sat() {
            return Err(TradeError::Validation(format!(
                "Taker w/ TradeID {} offerer deposit inputs of {} sat below required {} sat",
                trade.trade_id(),
                message.offerer_deposit_inputs.amount_sat,
                model.offer().offerer_deposit_sat()
            )));
        }
        if message.offerer_payout_address.is_empty() {
            return Err(missing(trade.trade_id(), "offerer payout address"));
        }

        let message = message.to_owned();
        trade.update_model(|model| {
            model.offerer.pub_key = Some(message.offerer_pub_key);
            model.offerer.deposit_inputs = Some(message.offerer_deposit_inputs);
            model.offerer.account = Some(message.offerer_account);
            model.offerer.account_signature = Some(message.offerer_account_signature);
            model.offerer.payout_address = Some(message.offerer_payout_address);
        });
        Ok(())
    }
}

pub(super) struct VerifyOffererAccount;

#[async_trait]
impl Task<TakerTrade> for VerifyOffererAccount {
    fn name(&self) -> &'static str {
        "VerifyOffererAccount"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        verify_peer_account(
            trade.services().signature.as_ref(),
            &model.offerer,
            model.offer(),
        )
    }
}

pub(super) struct CreateAndSignContract;

#[async_trait]
impl Task<TakerTrade> for CreateAndSignContract {
    fn name(&self) -> &'static str {
        "CreateAndSignContract"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let trade_id = trade.trade_id().to_owned();
        let payout_address = trade.services().wallet.payout_address(&trade_id).await?;
        trade.update_model(|model| model.taker.payout_address = Some(payout_address));

        let model = trade.process_model();
        let Some(taker_account) = model.taker.account.as_ref() else {
            return Err(missing(&trade_id, "taker account"));
        };

        let signature_service = trade.services().signature.to_owned();
        let account_signature = signature_service.sign(&taker_account.signing_bytes()?)?;
        let contract = Contract::from_process_model(&model)?;
        let contract_signature = signature_service.sign(&contract.signing_bytes()?)?;

        trade.update_model(|model| {
            model.taker.account_signature = Some(account_signature);
            model.taker.contract_signature = Some(contract_signature);
            model.contract = Some(contract);
        });
        Ok(())
    }
}

pub(super) struct CreateAndSignDepositTx;

#[async_trait]
impl Task<TakerTrade> for CreateAndSignDepositTx {
    fn name(&self) -> &'static str {
        "CreateAndSignDepositTx"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(offerer_inputs) = model.offerer.deposit_inputs.as_ref() else {
            return Err(missing(trade.trade_id(), "offerer deposit inputs"));
        };

        let deposit_tx = trade
            .services()
            .wallet
            .create_and_sign_taker_deposit_tx(
                model.id(),
                offerer_inputs,
                model.offer().taker_deposit_sat(),
                model.arbitrator_pub_key(),
            )
            .await?;

        trade.update_model(|model| model.deposit_tx = Some(deposit_tx));
        Ok(())
    }
}

pub(super) struct SendSignedDepositTx;

#[async_trait]
impl Task<TakerTrade> for SendSignedDepositTx {
    fn name(&self) -> &'static str {
        "SendSignedDepositTx"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let trade_id = model.id();
        let taker = &model.taker;

        let message = RequestOffererPublishDepositTxMessage {
            taker_deposit_tx: model
                .deposit_tx
                .to_owned()
                .ok_or_else(|| missing(trade_id, "deposit tx"))?,
            taker_account: taker
                .account
                .to_owned()
                .ok_or_else(|| missing(trade_id, "taker account"))?,
            taker_account_signature: taker
                .account_signature
                .to_owned()
                .ok_or_else(|| missing(trade_id, "taker account signature"))?,
            taker_payout_address: taker
                .payout_address
                .to_owned()
                .ok_or_else(|| missing(trade_id, "taker payout address"))?,
            contract: model
                .contract
                .to_owned()
                .ok_or_else(|| missing(trade_id, "contract"))?,
            taker_contract_signature: taker
                .contract_signature
                .to_owned()
                .ok_or_else(|| missing(trade_id, "taker contract signature"))?,
        };

        trade
            .send_to_peer(
                &model.offer().offerer_address,
                TradeMessage::RequestOffererPublishDepositTx(message),
            )
            .await
    }
}

// Inbound DepositTxPublished

pub(super) struct ProcessDepositTxPublished;

#[async_trait]
impl Task<TakerTrade> for ProcessDepositTxPublished {
    fn name(&self) -> &'static str {
        "ProcessDepositTxPublished"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(TradeMessage::DepositTxPublished(message)) = model.last_message() else {
            return Err(unexpected_message(
                trade.trade_id(),
                "DepositTxPublished",
                model.last_message(),
            ));
        };
        if message.deposit_tx.tx_id.is_empty() || message.deposit_tx.raw.is_empty() {
            return Err(missing(trade.trade_id(), "published deposit tx content"));
        }
        let Some(signed_tx) = model.deposit_tx.as_ref() else {
            return Err(missing(trade.trade_id(), "signed deposit tx"));
        };

        let matches = trade
            .services()
            .wallet
            .verify_published_deposit_tx(signed_tx, &message.deposit_tx)
            .await?;
        if !matches {
            return Err(TradeError::Validation(format!(
                "Published deposit tx {} is not the deposit tx {} signed for TradeID {}",
                message.deposit_tx.tx_id,
                signed_tx.tx_id,
                trade.trade_id()
            )));
        }

        let deposit_tx = message.deposit_tx.to_owned();
        trade.update_model(|model| model.deposit_tx = Some(deposit_tx));
        Ok(())
    }
}

pub(super) struct CommitDepositTx;

#[async_trait]
impl Task<TakerTrade> for CommitDepositTx {
    fn name(&self) -> &'static str {
        "CommitDepositTx"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(deposit_tx) = model.deposit_tx.as_ref() else {
            return Err(missing(trade.trade_id(), "deposit tx"));
        };
        trade.services().wallet.commit_tx(deposit_tx).await?;
        trade.set_process_state(TakerState::DepositPublished);
        Ok(())
    }
}

// Inbound FiatTransferStarted

pub(super) struct ProcessFiatTransferStarted;

#[async_trait]
impl Task<TakerTrade> for ProcessFiatTransferStarted {
    fn name(&self) -> &'static str {
        "ProcessFiatTransferStarted"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(TradeMessage::FiatTransferStarted(message)) = model.last_message() else {
            return Err(unexpected_message(
                trade.trade_id(),
                "FiatTransferStarted",
                model.last_message(),
            ));
        };

        let offer = model.offer();
        let payout = &message.payout;
        if payout.offerer_sat != offer.offerer_payout_sat()
            || payout.taker_sat != offer.taker_payout_sat()
        {
            return Err(TradeError::Validation(format!(
                "Taker w/ TradeID {} payout amounts {}/{} sat do not match the offer",
                trade.trade_id(),
                payout.offerer_sat,
                payout.taker_sat
            )));
        }
        if model.taker.payout_address.as_ref() != Some(&payout.taker_address) {
            return Err(TradeError::Validation(format!(
                "Taker w/ TradeID {} payout to unexpected address {}",
                trade.trade_id(),
                payout.taker_address
            )));
        }
        if message.offerer_payout_signature.is_empty() {
            return Err(missing(trade.trade_id(), "offerer payout signature"));
        }

        let message = message.to_owned();
        trade.update_model(|model| {
            model.offerer_payout_signature = Some(message.offerer_payout_signature);
            model.payout = Some(message.payout);
        });
        trade.set_process_state(TakerState::FiatStarted);
        Ok(())
    }
}

// User confirmed fiat payment received

pub(super) struct SignAndPublishPayoutTx;

#[async_trait]
impl Task<TakerTrade> for SignAndPublishPayoutTx {
    fn name(&self) -> &'static str {
        "SignAndPublishPayoutTx"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let trade_id = model.id();
        let deposit_tx = model
            .deposit_tx
            .as_ref()
            .ok_or_else(|| missing(trade_id, "deposit tx"))?;
        let payout = model
            .payout
            .as_ref()
            .ok_or_else(|| missing(trade_id, "payout amounts"))?;
        let offerer_signature = model
            .offerer_payout_signature
            .as_ref()
            .ok_or_else(|| missing(trade_id, "offerer payout signature"))?;

        let payout_tx = trade
            .services()
            .wallet
            .sign_and_publish_payout_tx(deposit_tx, payout, offerer_signature)
            .await?;
        trade.update_model(|model| model.payout_tx = Some(payout_tx));
        Ok(())
    }
}

pub(super) struct VerifyOfferFeePayment;

#[async_trait]
impl Task<TakerTrade> for VerifyOfferFeePayment {
    fn name(&self) -> &'static str {
        "VerifyOfferFeePayment"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let offer_fee_tx_id = &model.offer().offer_fee_tx_id;
        match trade
            .services()
            .block_chain
            .tx_confirmations(offer_fee_tx_id)
            .await?
        {
            Some(confirmations) => {
                debug!(
                    "Taker w/ TradeID {} offer fee tx {} has {} confirmations",
                    trade.trade_id(),
                    offer_fee_tx_id,
                    confirmations
                );
                Ok(())
            }
            None => Err(TradeError::Validation(format!(
                "Taker w/ TradeID {} offer fee tx {} not found",
                trade.trade_id(),
                offer_fee_tx_id
            ))),
        }
    }
}

pub(super) struct SendPayoutTxToOfferer;

#[async_trait]
impl Task<TakerTrade> for SendPayoutTxToOfferer {
    fn name(&self) -> &'static str {
        "SendPayoutTxToOfferer"
    }

    async fn run(&self, trade: &mut TakerTrade) -> Result<(), TradeError> {
        let model = trade.process_model();
        let Some(payout_tx) = model.payout_tx.to_owned() else {
            return Err(missing(trade.trade_id(), "payout tx"));
        };
        trade
            .send_to_peer(
                &model.offer().offerer_address,
                TradeMessage::PayoutTxPublished(PayoutTxPublishedMessage { payout_tx }),
            )
            .await?;
        trade.set_process_state(TakerState::PayoutSent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use super::*;
    use crate::{
        common::types::Transaction,
        services::{MockBlockChainService, MockTradeWalletService},
        testing::{SomeTestOfferParams, SomeTestParams},
        trade::{TradeData, TradeProcessModel, TradeServices},
        trade_msg::{DepositTxPublishedMessage, TradeEnvelope},
    };

    fn some_trade(
        dir: &Path,
        wallet: MockTradeWalletService,
        block_chain: MockBlockChainService,
    ) -> TakerTrade {
        let services = TradeServices {
            wallet: Arc::new(wallet),
            block_chain: Arc::new(block_chain),
            ..SomeTestParams::some_trade_services(SomeTestParams::taker_address())
        };
        let offer = SomeTestOfferParams::default_builder().build().unwrap();
        let model = TradeProcessModel::new(offer, services.arbitration.as_ref()).unwrap();
        Trade::new(TradeData::new(dir, model), services)
    }

    fn some_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("taker-tasks-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn names(tasks: &[TakerTask]) -> Vec<&'static str> {
        tasks.iter().map(|task| task.name()).collect()
    }

    #[test]
    fn test_task_sequences() {
        assert_eq!(
            names(&take_offer_tasks()),
            vec![
                "CreateTakeOfferFeeTx",
                "BroadcastTakeOfferFeeTx",
                "SendRequestDepositTxInputs"
            ]
        );
        assert_eq!(
            names(&deposit_payment_tasks()),
            vec![
                "ProcessRequestTakerDepositPayment",
                "VerifyOffererAccount",
                "CreateAndSignContract",
                "CreateAndSignDepositTx",
                "SendSignedDepositTx"
            ]
        );
        assert_eq!(
            names(&deposit_published_tasks()),
            vec!["ProcessDepositTxPublished", "CommitDepositTx"]
        );
        assert_eq!(
            names(&fiat_transfer_started_tasks()),
            vec!["ProcessFiatTransferStarted"]
        );
        assert_eq!(
            names(&payout_tasks()),
            vec![
                "SignAndPublishPayoutTx",
                "VerifyOfferFeePayment",
                "SendPayoutTxToOfferer"
            ]
        );
    }

    #[tokio::test]
    async fn test_fee_tx_recorded_on_model() {
        let dir = some_dir();
        let fee_tx = Transaction::from_raw(b"some-fee".to_vec());
        let returned = fee_tx.clone();

        let mut wallet = MockTradeWalletService::new();
        wallet
            .expect_create_take_offer_fee_tx()
            .times(1)
            .returning(move |_| Ok(returned.clone()));
        let mut trade = some_trade(&dir, wallet, MockBlockChainService::new());

        CreateTakeOfferFeeTx.run(&mut trade).await.unwrap();
        let model = trade.process_model();
        assert_eq!(model.take_offer_fee_tx_id, Some(fee_tx.tx_id.to_owned()));
        assert_eq!(model.take_offer_fee_tx, Some(fee_tx));
        assert_eq!(trade.process_state(), TakerState::Created);

        trade.terminate().unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_broadcast_keeps_state() {
        let dir = some_dir();
        let mut wallet = MockTradeWalletService::new();
        wallet
            .expect_broadcast_tx()
            .times(1)
            .returning(|_| Err(TradeError::Service("network rejected tx".to_string())));
        let mut trade = some_trade(&dir, wallet, MockBlockChainService::new());
        trade.update_model(|model| {
            model.take_offer_fee_tx = Some(Transaction::from_raw(b"some-fee".to_vec()))
        });

        let result = BroadcastTakeOfferFeeTx.run(&mut trade).await;
        assert!(matches!(result, Err(TradeError::Service(_))));
        assert_eq!(trade.process_state(), TakerState::Created);

        trade.terminate().unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_offer_fee_must_be_on_chain() {
        let dir = some_dir();
        let mut block_chain = MockBlockChainService::new();
        block_chain
            .expect_tx_confirmations()
            .withf(|tx_id| tx_id == SomeTestOfferParams::offer_fee_tx_id())
            .times(1)
            .returning(|_| Ok(None));
        let mut trade = some_trade(&dir, MockTradeWalletService::new(), block_chain);

        let result = VerifyOfferFeePayment.run(&mut trade).await;
        assert!(matches!(result, Err(TradeError::Validation(_))));

        trade.terminate().unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_published_deposit_checked_against_signed_one() {
        let dir = some_dir();
        let signed_tx = Transaction::from_raw(b"deposit:taker-signed".to_vec());
        let published_tx = Transaction::from_raw(b"deposit:something-else".to_vec());

        let mut wallet = MockTradeWalletService::new();
        let expected_signed = signed_tx.clone();
        wallet
            .expect_verify_published_deposit_tx()
            .withf(move |signed, _| *signed == expected_signed)
            .times(1)
            .returning(|_, _| Ok(false));
        let mut trade = some_trade(&dir, wallet, MockBlockChainService::new());

        let envelope = TradeEnvelope::new(
            trade.trade_id(),
            SomeTestParams::offerer_address(),
            TradeMessage::DepositTxPublished(DepositTxPublishedMessage {
                deposit_tx: published_tx,
            }),
        );
        trade.update_model(|model| {
            model.deposit_tx = Some(signed_tx.clone());
            model.set_last_message(&envelope);
        });

        let result = ProcessDepositTxPublished.run(&mut trade).await;
        assert!(matches!(result, Err(TradeError::Validation(_))));
        assert_eq!(trade.process_model().deposit_tx, Some(signed_tx));

        trade.terminate().unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
