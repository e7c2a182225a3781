use std::{
    path::Path,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};

use crate::common::{
    error::TradeError,
    persist::{Persistable, Persister},
    types::TradeId,
};

use super::{TradeProcessModel, TradeState};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "S: TradeState")]
struct TradeDataStore<S: TradeState> {
    process_state: S,
    process_model: TradeProcessModel,
    #[serde(default)]
    error_message: Option<String>,
}

pub(crate) struct TradeData<S: TradeState> {
    pub(crate) trade_id: TradeId,
    store: Arc<RwLock<TradeDataStore<S>>>,
    persister: Persister,
}

impl<S: TradeState> TradeData<S> {
    pub(crate) fn data_path(dir_path: impl AsRef<Path>, trade_id: &TradeId) -> std::path::PathBuf {
        dir_path
            .as_ref()
            .join(format!("{}-{}.json", trade_id, S::ROLE))
    }

    pub(crate) fn new(dir_path: impl AsRef<Path>, process_model: TradeProcessModel) -> Self {
        let trade_id = process_model.id().to_owned();
        let data_path = Self::data_path(dir_path, &trade_id);

        let store = TradeDataStore {
            process_state: S::initial(),
            process_model,
            error_message: None,
        };

        let store = Arc::new(RwLock::new(store));
        let persistable: Arc<dyn Persistable> = store.clone();
        let persister = Persister::new(persistable, data_path);
        persister.queue();

        Self {
            trade_id,
            store,
            persister,
        }
    }

    pub(crate) fn restore(data_path: impl AsRef<Path>) -> Result<(TradeId, Self), TradeError> {
        let json = Persister::restore(&data_path)?;
        let store: TradeDataStore<S> = serde_json::from_str(&json)?;
        let trade_id = store.process_model.id().to_owned();

        let store = Arc::new(RwLock::new(store));
        let persistable: Arc<dyn Persistable> = store.clone();
        let persister = Persister::new(persistable, &data_path);
        persister.queue();

        let data = Self {
            trade_id: trade_id.to_owned(),
            store,
            persister,
        };
        Ok((trade_id, data))
    }

    fn read_store(&self) -> RwLockReadGuard<'_, TradeDataStore<S>> {
        match self.store.read() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, TradeDataStore<S>> {
        match self.store.write() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Getter methods

    pub(crate) fn process_state(&self) -> S {
        self.read_store().process_state
    }

    pub(crate) fn process_model(&self) -> TradeProcessModel {
        self.read_store().process_model.to_owned()
    }

    pub(crate) fn error_message(&self) -> Option<String> {
        self.read_store().error_message.to_owned()
    }

    // Setter methods

    pub(crate) fn set_process_state(&mut self, process_state: S) {
        self.write_store().process_state = process_state;
        self.persister.queue();
    }

    pub(crate) fn update_model<R>(&mut self, update: impl FnOnce(&mut TradeProcessModel) -> R) -> R {
        let result = update(&mut self.write_store().process_model);
        self.persister.queue();
        result
    }

    pub(crate) fn set_error_message(&mut self, error_message: impl Into<String>) {
        self.write_store().error_message = Some(error_message.into());
        self.persister.queue();
    }

    pub(crate) fn terminate(self) -> Result<(), TradeError> {
        self.persister.terminate()
    }
}
