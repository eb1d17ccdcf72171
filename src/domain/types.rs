use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Four-byte function selector.
pub type Selector = FixedBytes<4>;

/// A state-changing call to be signed by `from` and submitted to the chain.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub log_index: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
    pub gas_used: u64,
    pub logs: Vec<LogEntry>,
}

/// Historical log filter: logs emitted by `address` whose first topic is
/// `topic0`, inside the inclusive block range.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub topic0: B256,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

/// Snapshot of a multisig wallet transaction as stored by the wallet contract.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MultisigTransaction {
    pub tx_id: U256,
    pub destination: Address,
    pub value: U256,
    pub data: Bytes,
    pub confirmation_count: U256,
    pub executed: bool,
    pub confirmations: Vec<Address>,
}

/// Envelope the chain client signs transactions in.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxFormat {
    /// Untyped transaction with EIP-155 replay protection. Chains without a
    /// base fee (RSK) only accept this form.
    #[default]
    Legacy,
    /// Type-2 envelope with a priority fee on top of the base fee.
    Eip1559,
}

/// A mined confirm, revoke or execute call on a multisig wallet.
///
/// `status` is the wallet's view of the transaction read after the receipt;
/// it is `None` when that read failed, which does not undo the mined call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MultisigCallOutcome {
    pub tx_id: U256,
    pub tx_hash: B256,
    pub status: Option<MultisigTransaction>,
}

/// Output of the registry's `checkClashingFuncSelectors` for a candidate module.
///
/// `clashing_modules` holds one entry per clashing selector, so the same
/// module address usually appears several times.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleClashReport {
    pub clashing_modules: Vec<Address>,
    pub clashing_module_selectors: Vec<Selector>,
    pub clashing_reserved_selectors: Vec<Selector>,
}

impl ModuleClashReport {
    /// Reserved selector clashes with the zero-selector padding removed.
    pub fn reserved_clashes(&self) -> Vec<Selector> {
        self.clashing_reserved_selectors
            .iter()
            .filter(|selector| **selector != Selector::ZERO)
            .copied()
            .collect()
    }

    /// Clashing module addresses, deduplicated in first-seen order.
    pub fn distinct_modules(&self) -> Vec<Address> {
        let mut distinct: Vec<Address> = Vec::new();
        for module in &self.clashing_modules {
            if !distinct.contains(module) {
                distinct.push(*module);
            }
        }
        distinct
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoReplacementReason {
    /// No registered module shares a selector with the candidate.
    FreshRegistration,
    /// The only clashing module is the candidate itself.
    AlreadyRegistered,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleReplacement {
    Replace(Address),
    NoReplacement(NoReplacementReason),
}

/// Trust tier of a network, derived from its configured tags.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkTier {
    Local,
    Testnet,
    Mainnet,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeDecision {
    DirectApply,
    MultisigGated,
    GovernanceProposal,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeRequest {
    /// Point a custom proxy at a new logic contract.
    LogicSwap { proxy: Address, new_logic: Address },
    /// Register a pluggable module behind a modules proxy registry.
    ModuleRegistration { registry: Address, module: Address },
}

impl UpgradeRequest {
    pub const fn target(&self) -> Address {
        match self {
            Self::LogicSwap { proxy, .. } => *proxy,
            Self::ModuleRegistration { registry, .. } => *registry,
        }
    }

    pub const fn implementation(&self) -> Address {
        match self {
            Self::LogicSwap { new_logic, .. } => *new_logic,
            Self::ModuleRegistration { module, .. } => *module,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Applied {
        target: Address,
        implementation: Address,
    },
    PendingMultisigSignatures {
        multisig: Address,
        tx_id: U256,
    },
    RequiresGovernanceProposal {
        draft: GovernanceProposal,
    },
    Skipped {
        target: Address,
        implementation: Address,
    },
}

/// Arguments of a governor `propose` call. The four sequences are expected to
/// have equal length; the governor reverts otherwise.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GovernanceProposal {
    pub targets: Vec<Address>,
    pub values: Vec<U256>,
    pub signatures: Vec<String>,
    pub calldatas: Vec<Bytes>,
    pub description: String,
}
