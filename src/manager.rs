use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    common::{
        error::TradeError,
        types::{FiatAccount, TradeId},
    },
    config::ProtocolConfig,
    offer::Offer,
    offerer::{OffererProtocol, OffererProtocolAccess, OffererState},
    storage::PersistableNetworkPayloadStore,
    taker::{TakerProtocol, TakerProtocolAccess, TakerState},
    trade::{Collaborators, TradeServices, TradeState},
    trade_msg::TradeEnvelope,
};

const PAYLOAD_STORE_FILE: &str = "payloads.json";

/// Owns every trade of one node along with the node's payload store.
pub struct Manager {
    config: ProtocolConfig,
    collaborators: Collaborators,
    payload_store: Arc<PersistableNetworkPayloadStore>,
    takers: RwLock<HashMap<TradeId, TakerProtocol>>,
    offerers: RwLock<HashMap<TradeId, OffererProtocol>>,
}

impl Manager {
    // Constructors

    pub async fn new(
        config: ProtocolConfig,
        collaborators: Collaborators,
    ) -> Result<Manager, TradeError> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let payload_store = Arc::new(Self::setup_payload_store(&config.data_dir)?);
        let services = collaborators.clone().into_services(payload_store.clone());
        let (takers, offerers) = Self::restore_trades(&config, &services)?;
        info!(
            "Manager w/ data dir {} restored {} takers and {} offerers",
            config.data_dir.display(),
            takers.len(),
            offerers.len()
        );

        Ok(Manager {
            config,
            collaborators,
            payload_store,
            takers: RwLock::new(takers),
            offerers: RwLock::new(offerers),
        })
    }

    fn setup_payload_store(
        data_dir: impl AsRef<Path>,
    ) -> Result<PersistableNetworkPayloadStore, TradeError> {
        let data_path = data_dir.as_ref().join(PAYLOAD_STORE_FILE);
        if data_path.exists() {
            PersistableNetworkPayloadStore::restore(&data_path)
        } else {
            let payload_store = PersistableNetworkPayloadStore::new();
            payload_store.attach_persister(&data_path);
            Ok(payload_store)
        }
    }

    fn trade_files(data_dir: impl AsRef<Path>, role: &str) -> Result<Vec<PathBuf>, TradeError> {
        let suffix = format!("-{}.json", role);
        let mut paths = Vec::new();
        for entry in fs::read_dir(data_dir.as_ref())? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(&suffix))
                .unwrap_or(false);
            if path.is_file() && matches {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    // A corrupt trade file is logged and skipped, the rest of the node still comes up
    fn restore_trades(
        config: &ProtocolConfig,
        services: &TradeServices,
    ) -> Result<
        (
            HashMap<TradeId, TakerProtocol>,
            HashMap<TradeId, OffererProtocol>,
        ),
        TradeError,
    > {
        let mut takers = HashMap::new();
        for path in Self::trade_files(&config.data_dir, TakerState::ROLE)? {
            match TakerProtocol::restore(config, &path, services.clone()) {
                Ok((trade_id, taker)) => {
                    debug!("Manager restored Taker w/ TradeID {}", trade_id);
                    takers.insert(trade_id, taker);
                }
                Err(error) => error!(
                    "Manager failed to restore Taker from {} - {}",
                    path.display(),
                    error
                ),
            }
        }

        let mut offerers = HashMap::new();
        for path in Self::trade_files(&config.data_dir, OffererState::ROLE)? {
            match OffererProtocol::restore(config, &path, services.clone()) {
                Ok((trade_id, offerer)) => {
                    debug!("Manager restored Offerer w/ TradeID {}", trade_id);
                    offerers.insert(trade_id, offerer);
                }
                Err(error) => error!(
                    "Manager failed to restore Offerer from {} - {}",
                    path.display(),
                    error
                ),
            }
        }
        Ok((takers, offerers))
    }

    fn services(&self) -> TradeServices {
        self.collaborators
            .clone()
            .into_services(self.payload_store.clone())
    }

    // Trade Management

    pub async fn new_taker(
        &self,
        offer: Offer,
        taker_account: FiatAccount,
    ) -> Result<TakerProtocolAccess, TradeError> {
        offer.validate()?;
        let trade_id = offer.trade_id()?;

        let mut takers = self.takers.write().await;
        if takers.contains_key(&trade_id) {
            return Err(TradeError::AlreadyRegistered(format!(
                "Manager already has Taker w/ TradeID {}",
                trade_id
            )));
        }

        let taker = TakerProtocol::new(&self.config, offer, taker_account, self.services())?;
        let access = taker.new_accessor();
        takers.insert(trade_id, taker);
        Ok(access)
    }

    pub async fn new_offerer(
        &self,
        offer: Offer,
        offerer_account: FiatAccount,
    ) -> Result<OffererProtocolAccess, TradeError> {
        offer.validate()?;
        let trade_id = offer.trade_id()?;

        let mut offerers = self.offerers.write().await;
        if offerers.contains_key(&trade_id) {
            return Err(TradeError::AlreadyRegistered(format!(
                "Manager already has Offerer w/ TradeID {}",
                trade_id
            )));
        }

        let offerer =
            OffererProtocol::new(&self.config, offer, offerer_account, self.services())?;
        let access = offerer.new_accessor();
        offerers.insert(trade_id, offerer);
        Ok(access)
    }

    pub async fn get_takers(&self) -> HashMap<TradeId, TakerProtocolAccess> {
        let takers = self.takers.read().await;
        takers
            .iter()
            .map(|(trade_id, taker)| (trade_id.to_owned(), taker.new_accessor()))
            .collect()
    }

    pub async fn get_offerers(&self) -> HashMap<TradeId, OffererProtocolAccess> {
        let offerers = self.offerers.read().await;
        offerers
            .iter()
            .map(|(trade_id, offerer)| (trade_id.to_owned(), offerer.new_accessor()))
            .collect()
    }

    /// Hands an envelope fetched from the mailbox to the trade it is addressed to.
    pub async fn deliver_mailbox_message(
        &self,
        envelope: TradeEnvelope,
    ) -> Result<bool, TradeError> {
        let trade_id = TradeId::new(envelope.trade_id.to_owned())?;

        let taker = self
            .takers
            .read()
            .await
            .get(&trade_id)
            .map(|taker| taker.new_accessor());
        if let Some(taker) = taker {
            return taker.set_mailbox_message(envelope).await;
        }

        let offerer = self
            .offerers
            .read()
            .await
            .get(&trade_id)
            .map(|offerer| offerer.new_accessor());
        if let Some(offerer) = offerer {
            return offerer.set_mailbox_message(envelope).await;
        }

        Err(TradeError::NotRegistered(format!(
            "Manager has no trade w/ TradeID {} for mailbox message {}",
            trade_id,
            envelope.message.kind()
        )))
    }

    pub fn payload_store(&self) -> Arc<PersistableNetworkPayloadStore> {
        self.payload_store.clone()
    }

    pub async fn shutdown(self) -> Result<(), TradeError> {
        info!("Manager w/ data dir {} shutting down", self.config.data_dir.display());

        for (trade_id, taker) in self.takers.into_inner() {
            if let Some(error) = taker.new_accessor().shutdown().await.err() {
                warn!("Manager Taker w/ TradeID {} shutdown - {}", trade_id, error);
            }
            taker.task_handle.await?;
        }

        for (trade_id, offerer) in self.offerers.into_inner() {
            if let Some(error) = offerer.new_accessor().shutdown().await.err() {
                warn!("Manager Offerer w/ TradeID {} shutdown - {}", trade_id, error);
            }
            offerer.task_handle.await?;
        }

        self.payload_store.terminate_persistence()
    }
}
