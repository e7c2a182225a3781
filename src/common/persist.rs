use serde::Serialize;
use std::{
    fs,
    path::Path,
    sync::{
        mpsc::{self, TrySendError},
        Arc, RwLock,
    },
};
use tracing::{debug, error, trace};

use crate::common::error::TradeError;

// Anything that can hand the Persister a JSON snapshot of itself
pub(crate) trait Persistable: Send + Sync + 'static {
    fn to_json(&self) -> Result<String, TradeError>;
}

impl<T: Serialize + Send + Sync + 'static> Persistable for RwLock<T> {
    fn to_json(&self) -> Result<String, TradeError> {
        let store = match self.read() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(serde_json::to_string(&*store)?)
    }
}

enum PersisterMsg {
    Persist,
    Close,
}

pub(crate) struct Persister {
    persist_tx: mpsc::SyncSender<PersisterMsg>,
    task_handle: std::thread::JoinHandle<()>,
}

impl Persister {
    pub(crate) fn restore(data_path: impl AsRef<Path>) -> Result<String, TradeError> {
        let json: String = fs::read_to_string(data_path.as_ref())?;
        Ok(json)
    }

    pub(crate) fn new(store: Arc<dyn Persistable>, data_path: impl AsRef<Path>) -> Self {
        let (persist_tx, task_handle) = Self::setup_persistence(store, data_path);

        Self {
            persist_tx,
            task_handle,
        }
    }

    fn setup_persistence(
        store: Arc<dyn Persistable>,
        data_path: impl AsRef<Path>,
    ) -> (mpsc::SyncSender<PersisterMsg>, std::thread::JoinHandle<()>) {
        let data_path_buf = data_path.as_ref().to_path_buf();

        // No more than 1 persistence request is allowed nor needed.
        // This is essentially a debounce mechanism
        let (persist_tx, persist_rx) = mpsc::sync_channel(1);
        let task_handle = std::thread::spawn(move || {
            let data_path = data_path_buf;
            loop {
                match persist_rx.recv() {
                    Ok(PersisterMsg::Persist) => {
                        if let Some(error) = Self::persist(store.as_ref(), &data_path).err() {
                            error!(
                                "Error persisting data to path {} - {}",
                                data_path.display(),
                                error
                            );
                        }
                    }
                    Ok(PersisterMsg::Close) => {
                        break;
                    }
                    Err(err) => {
                        error!("Persistence channel recv Error - {}", err);
                        break;
                    }
                }
            }
            debug!("Persistence thread for {} exiting", data_path.display());
        });
        (persist_tx, task_handle)
    }

    fn persist(store: &dyn Persistable, data_path: &Path) -> Result<(), TradeError> {
        let json = store.to_json()?;
        trace!("Persisting JSON to path: {} - {}", data_path.display(), json);

        // Readers only ever see a complete file
        let tmp_path = data_path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, data_path)?;
        Ok(())
    }

    pub(crate) fn queue(&self) {
        match self.persist_tx.try_send(PersisterMsg::Persist) {
            Ok(_) => {}
            Err(error) => match error {
                TrySendError::Full(_) => {
                    trace!("Persistence channel full")
                }
                TrySendError::Disconnected(_) => {
                    error!("Persistence channel disconnected")
                }
            },
        }
    }

    // Any Persist already queued is handled before Close is seen
    pub(crate) fn terminate(self) -> Result<(), TradeError> {
        if self.persist_tx.send(PersisterMsg::Close).is_err() {
            return Err(TradeError::MpscSend(
                "Persistence thread already exited".to_string(),
            ));
        }
        self.task_handle.join().map_err(|error| {
            TradeError::Simple(format!("Error terminating persistence thread - {:?}", error))
        })
    }
}
