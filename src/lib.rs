//! Orchestration of multisig wallets, proxy upgrades, module registrations
//! and governance proposals for EVM protocol deployments.
//!
//! Every component takes its [`ChainClient`] explicitly. [`EvmChainClient`]
//! talks JSON-RPC to a node; tests use the in-memory chain in
//! `test_support` (enabled by the `testutils` feature).
pub mod clash;
pub mod config;
pub mod domain;
pub mod events;
pub mod features;
pub mod governance;
pub mod multisig;
pub mod upgrade;

#[cfg(any(test, feature = "testutils"))]
pub mod test_support;

pub use clash::{resolve_report, ModuleClashResolver};
pub use config::{DeploymentConfig, NetworkConfig};
pub use domain::error::OrchestratorError;
pub use domain::types::{
    GovernanceProposal, LogEntry, LogQuery, ModuleClashReport, ModuleReplacement,
    MultisigCallOutcome, MultisigTransaction, NetworkTier, NoReplacementReason, Selector,
    TxFormat, TxReceipt, TxRequest, UpgradeDecision, UpgradeOutcome, UpgradeRequest,
};
pub use events::{decode_event_from_receipt, query_events, EventInterface, ParsedEvent};
pub use features::{ChainClient, EvmChainClient, HttpEvmRpcClient, LocalKeySigner};
pub use governance::{GovernanceProposalSubmitter, ProposalCreated};
pub use multisig::MultisigOrchestrator;
pub use upgrade::UpgradeRouter;
