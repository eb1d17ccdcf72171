use crate::domain::types::{NetworkTier, UpgradeDecision};

const TESTNET_TAG: &str = "testnet";
const MAINNET_TAG: &str = "mainnet";

impl NetworkTier {
    /// Classifies a network from its tags. `testnet` wins over `mainnet` when a
    /// network carries both, matching the order the upgrade paths are checked.
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        let has_tag = |wanted: &str| {
            tags.iter()
                .any(|tag| tag.as_ref().trim().eq_ignore_ascii_case(wanted))
        };
        if has_tag(TESTNET_TAG) {
            Self::Testnet
        } else if has_tag(MAINNET_TAG) {
            Self::Mainnet
        } else {
            Self::Local
        }
    }
}

impl UpgradeDecision {
    pub const fn for_network(tier: NetworkTier, multisig_owner_override: bool) -> Self {
        decide_upgrade_path(tier, multisig_owner_override)
    }
}

pub const fn decide_upgrade_path(
    tier: NetworkTier,
    multisig_owner_override: bool,
) -> UpgradeDecision {
    match (tier, multisig_owner_override) {
        (_, true) => UpgradeDecision::MultisigGated,
        (NetworkTier::Testnet, false) => UpgradeDecision::MultisigGated,
        (NetworkTier::Mainnet, false) => UpgradeDecision::GovernanceProposal,
        (NetworkTier::Local, false) => UpgradeDecision::DirectApply,
    }
}
