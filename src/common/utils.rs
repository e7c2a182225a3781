use tokio::sync::oneshot;
use tracing::warn;

// Requester may have given up waiting. Nothing to do but note it
pub(crate) fn reply<T>(context: &str, rsp_tx: oneshot::Sender<T>, response: T) {
    if rsp_tx.send(response).is_err() {
        warn!("{} - requester dropped before response was sent", context);
    }
}
