mod mailbox;
mod message_bus;
mod router;

pub use mailbox::InMemoryMailbox;
pub use message_bus::{BusEndpoint, MessageBus};
