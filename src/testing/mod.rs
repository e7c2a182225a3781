mod arbitration;
mod block_chain;
mod offer;
mod testing;
mod wallet;

pub use arbitration::StaticArbitrationRepository;
pub use block_chain::InMemoryBlockChain;
pub use offer::SomeTestOfferParams;
pub use testing::SomeTestParams;
pub use wallet::InMemoryTradeWallet;
