mod arbitration;
mod block_chain;
mod mailbox;
mod messaging;
mod signature;
mod wallet;

pub use arbitration::{Arbitrator, ArbitrationRepository};
pub use block_chain::BlockChainService;
pub use mailbox::MailboxService;
pub use messaging::{MessageHandler, MessageService};
pub use signature::{Secp256k1SignatureService, SignatureService};
pub use wallet::TradeWalletService;

#[cfg(test)]
pub(crate) use block_chain::MockBlockChainService;
#[cfg(test)]
pub(crate) use mailbox::MockMailboxService;
#[cfg(test)]
pub(crate) use messaging::MockMessageService;
#[cfg(test)]
pub(crate) use wallet::MockTradeWalletService;
