pub mod abi;
pub mod chain;
pub mod evm;
pub mod signer;

pub use chain::ChainClient;
pub use evm::{EvmChainClient, HttpEvmRpcClient};
pub use signer::{LocalKeySigner, SignerAdapter, SignerPort};
