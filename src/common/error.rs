use std::{error::Error, fmt, time::Duration};

#[derive(Debug)]
pub enum TradeError {
    Simple(String),
    Validation(String),
    UnsupportedMessage(String),
    TaskFailure { task: &'static str, reason: String },
    TaskTimeout { task: &'static str, timeout: Duration },
    Service(String),
    PeerOffline(String),
    AlreadyRegistered(String),
    NotRegistered(String),
    Io(std::io::Error),
    SerdesJson(serde_json::Error),
    Secp256k1(secp256k1::Error),
    Hex(hex::FromHexError),
    MpscSend(String),
    OneshotRecv(tokio::sync::oneshot::error::RecvError),
    Join(tokio::task::JoinError),
}

impl Error for TradeError {}

impl fmt::Display for TradeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_string = match self {
            TradeError::Simple(msg) => format!("TradeProtocol-Error | Other - {}", msg),
            TradeError::Validation(msg) => format!("TradeProtocol-Error | Validation - {}", msg),
            TradeError::UnsupportedMessage(msg) => {
                format!("TradeProtocol-Error | UnsupportedMessage - {}", msg)
            }
            TradeError::TaskFailure { task, reason } => {
                format!("TradeProtocol-Error | TaskFailure - {} failed: {}", task, reason)
            }
            TradeError::TaskTimeout { task, timeout } => {
                format!(
                    "TradeProtocol-Error | TaskTimeout - {} did not finish within {:?}",
                    task, timeout
                )
            }
            TradeError::Service(msg) => format!("TradeProtocol-Error | Service - {}", msg),
            TradeError::PeerOffline(peer) => {
                format!("TradeProtocol-Error | PeerOffline - {} not reachable", peer)
            }
            TradeError::AlreadyRegistered(msg) => {
                format!("TradeProtocol-Error | AlreadyRegistered - {}", msg)
            }
            TradeError::NotRegistered(msg) => {
                format!("TradeProtocol-Error | NotRegistered - {}", msg)
            }
            TradeError::Io(err) => format!("TradeProtocol-Error | IoError - {}", err),
            TradeError::SerdesJson(err) => {
                format!("TradeProtocol-Error | SerdesJsonError - {}", err)
            }
            TradeError::Secp256k1(err) => {
                format!("TradeProtocol-Error | Secp256k1Error - {}", err)
            }
            TradeError::Hex(err) => format!("TradeProtocol-Error | HexError - {}", err),
            TradeError::MpscSend(msg) => format!("TradeProtocol-Error | MpscSendError - {}", msg),
            TradeError::OneshotRecv(err) => {
                format!("TradeProtocol-Error | OneshotRecvError - {}", err)
            }
            TradeError::Join(err) => format!("TradeProtocol-Error | JoinError - {}", err),
        };
        write!(f, "{}", error_string)
    }
}

impl From<std::io::Error> for TradeError {
    fn from(e: std::io::Error) -> TradeError {
        TradeError::Io(e)
    }
}

impl From<serde_json::Error> for TradeError {
    fn from(e: serde_json::Error) -> TradeError {
        TradeError::SerdesJson(e)
    }
}

impl From<secp256k1::Error> for TradeError {
    fn from(e: secp256k1::Error) -> TradeError {
        TradeError::Secp256k1(e)
    }
}

impl From<hex::FromHexError> for TradeError {
    fn from(e: hex::FromHexError) -> TradeError {
        TradeError::Hex(e)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TradeError {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> TradeError {
        TradeError::MpscSend(e.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for TradeError {
    fn from(e: tokio::sync::oneshot::error::RecvError) -> TradeError {
        TradeError::OneshotRecv(e)
    }
}

impl From<tokio::task::JoinError> for TradeError {
    fn from(e: tokio::task::JoinError) -> TradeError {
        TradeError::Join(e)
    }
}
