//! Routes proxy and module upgrades by network trust.
//!
//! Local networks are upgraded directly by the deployer and verified by
//! reading the new state back. Testnets (or any network when the multisig
//! override is set) get a multisig submission that owners still have to
//! confirm. Mainnet upgrades never touch the chain: the caller receives a
//! ready-to-submit governance proposal instead.
use crate::clash::ModuleClashResolver;
use crate::config::DeploymentConfig;
use crate::domain::error::OrchestratorError;
use crate::domain::gas_policy::{GasPolicy, DEFAULT_GAS_MARGIN_BPS};
use crate::domain::types::{
    GovernanceProposal, ModuleReplacement, NoReplacementReason, TxRequest, UpgradeDecision,
    UpgradeOutcome, UpgradeRequest,
};
use crate::features::abi::{ICustomProxy, IModulesProxyRegistry};
use crate::features::chain::{read_contract, submit_transaction, ChainClient};
use crate::multisig::MultisigOrchestrator;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, LogPriorityLevels)]
enum UpgradeLogPriority {
    #[log_level(capacity = 1000, name = "UPGRADE_INFO")]
    Info,
    #[log_level(capacity = 500, name = "UPGRADE_ERROR")]
    Error,
}

impl GetLogFilter for UpgradeLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

/// A single contract call an upgrade boils down to.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PlannedCall {
    target: Address,
    signature: &'static str,
    calldata: Vec<u8>,
}

impl PlannedCall {
    fn new<T: SolCall>(target: Address, call: &T) -> Self {
        Self {
            target,
            signature: T::SIGNATURE,
            calldata: call.abi_encode(),
        }
    }

    fn arguments(&self) -> Bytes {
        Bytes::from(self.calldata.get(4..).unwrap_or_default().to_vec())
    }
}

pub struct UpgradeRouter<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    multisig: MultisigOrchestrator<'a, C>,
    deployer: Address,
    gas_margin_bps: u32,
}

impl<'a, C: ChainClient + ?Sized> UpgradeRouter<'a, C> {
    /// `deployer` sends direct upgrades and, on gated networks, submits the
    /// multisig transaction, so it must be a multisig owner there.
    pub fn new(
        client: &'a C,
        multisig: MultisigOrchestrator<'a, C>,
        deployer: Address,
    ) -> Self {
        Self {
            client,
            multisig,
            deployer,
            gas_margin_bps: DEFAULT_GAS_MARGIN_BPS,
        }
    }

    pub fn from_config(client: &'a C, config: &DeploymentConfig, deployer: Address) -> Self {
        Self::new(
            client,
            MultisigOrchestrator::from_config(client, config),
            deployer,
        )
        .with_gas_margin_bps(config.gas_margin_bps)
    }

    pub fn with_gas_margin_bps(mut self, gas_margin_bps: u32) -> Self {
        self.gas_margin_bps = gas_margin_bps;
        self
    }

    pub async fn current_implementation(
        &self,
        proxy: Address,
    ) -> Result<Address, OrchestratorError> {
        let current =
            read_contract(self.client, proxy, &ICustomProxy::getImplementationCall {}).await?;
        Ok(current.implementation)
    }

    pub async fn apply(
        &self,
        request: UpgradeRequest,
        decision: UpgradeDecision,
    ) -> Result<UpgradeOutcome, OrchestratorError> {
        let Some(planned) = self.plan(request).await? else {
            log!(
                UpgradeLogPriority::Info,
                "target={} implementation={} already current, skipping",
                request.target(),
                request.implementation()
            );
            return Ok(UpgradeOutcome::Skipped {
                target: request.target(),
                implementation: request.implementation(),
            });
        };

        log!(
            UpgradeLogPriority::Info,
            "target={} call={} implementation={} path={:?}",
            planned.target,
            planned.signature,
            request.implementation(),
            decision
        );

        match decision {
            UpgradeDecision::DirectApply => self.apply_directly(request, &planned).await,
            UpgradeDecision::MultisigGated => {
                let tx_id = self
                    .multisig
                    .submit(
                        planned.target,
                        U256::ZERO,
                        Bytes::from(planned.calldata.clone()),
                        self.deployer,
                    )
                    .await?;
                Ok(UpgradeOutcome::PendingMultisigSignatures {
                    multisig: self.multisig.address(),
                    tx_id,
                })
            }
            UpgradeDecision::GovernanceProposal => {
                let draft = GovernanceProposal {
                    targets: vec![planned.target],
                    values: vec![U256::ZERO],
                    signatures: vec![planned.signature.to_string()],
                    calldatas: vec![planned.arguments()],
                    description: proposal_description(request),
                };
                log!(
                    UpgradeLogPriority::Info,
                    "target={} governance proposal required: {}",
                    planned.target,
                    draft.description
                );
                Ok(UpgradeOutcome::RequiresGovernanceProposal { draft })
            }
        }
    }

    /// `None` when the chain already reflects the request.
    async fn plan(
        &self,
        request: UpgradeRequest,
    ) -> Result<Option<PlannedCall>, OrchestratorError> {
        match request {
            UpgradeRequest::LogicSwap { proxy, new_logic } => {
                if self.current_implementation(proxy).await? == new_logic {
                    return Ok(None);
                }
                Ok(Some(PlannedCall::new(
                    proxy,
                    &ICustomProxy::setImplementationCall {
                        implementation: new_logic,
                    },
                )))
            }
            UpgradeRequest::ModuleRegistration { registry, module } => {
                let resolver = ModuleClashResolver::new(self.client);
                match resolver.resolve(registry, module).await? {
                    ModuleReplacement::NoReplacement(NoReplacementReason::AlreadyRegistered) => {
                        Ok(None)
                    }
                    ModuleReplacement::NoReplacement(NoReplacementReason::FreshRegistration) => {
                        Ok(Some(PlannedCall::new(
                            registry,
                            &IModulesProxyRegistry::addModuleCall { newModule: module },
                        )))
                    }
                    ModuleReplacement::Replace(old_module) => Ok(Some(PlannedCall::new(
                        registry,
                        &IModulesProxyRegistry::replaceModuleCall {
                            oldModule: old_module,
                            newModule: module,
                        },
                    ))),
                }
            }
        }
    }

    async fn apply_directly(
        &self,
        request: UpgradeRequest,
        planned: &PlannedCall,
    ) -> Result<UpgradeOutcome, OrchestratorError> {
        let tx = TxRequest {
            from: self.deployer,
            to: planned.target,
            value: U256::ZERO,
            data: Bytes::from(planned.calldata.clone()),
        };
        let operation = format!("{} on {}", planned.signature, planned.target);
        submit_transaction(
            self.client,
            tx,
            GasPolicy::EstimateWithMargin {
                margin_bps: self.gas_margin_bps,
            },
            &operation,
        )
        .await?;

        let expected = request.implementation();
        let actual = match request {
            UpgradeRequest::LogicSwap { proxy, .. } => self.current_implementation(proxy).await?,
            UpgradeRequest::ModuleRegistration { registry, module } => {
                match ModuleClashResolver::new(self.client)
                    .resolve(registry, module)
                    .await?
                {
                    ModuleReplacement::NoReplacement(NoReplacementReason::AlreadyRegistered) => {
                        module
                    }
                    ModuleReplacement::Replace(other) => other,
                    ModuleReplacement::NoReplacement(NoReplacementReason::FreshRegistration) => {
                        Address::ZERO
                    }
                }
            }
        };
        if actual != expected {
            log!(
                UpgradeLogPriority::Error,
                "target={} expected={} actual={} readback mismatch",
                request.target(),
                expected,
                actual
            );
            return Err(OrchestratorError::ReadbackMismatch {
                target: request.target(),
                expected,
                actual,
            });
        }

        log!(
            UpgradeLogPriority::Info,
            "target={} implementation={} applied",
            request.target(),
            expected
        );
        Ok(UpgradeOutcome::Applied {
            target: request.target(),
            implementation: expected,
        })
    }
}

fn proposal_description(request: UpgradeRequest) -> String {
    match request {
        UpgradeRequest::LogicSwap { proxy, new_logic } => {
            format!("Upgrade proxy {proxy} to implementation {new_logic}")
        }
        UpgradeRequest::ModuleRegistration { registry, module } => {
            format!("Register module {module} in modules proxy {registry}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Selector;
    use crate::test_support::{block_on_with_spin, MockChain};
    use alloy_primitives::{address, fixed_bytes};

    const DEPLOYER: Address = address!("de00000000000000000000000000000000000001");
    const COSIGNER: Address = address!("c050000000000000000000000000000000000002");
    const WALLET: Address = address!("189ecd23e9e34cfc07bfc3b7f5711a23f43f8a57");
    const PROXY: Address = address!("9000000000000000000000000000000000000003");
    const OLD_LOGIC: Address = address!("1000000000000000000000000000000000000004");
    const NEW_LOGIC: Address = address!("2000000000000000000000000000000000000005");
    const REGISTRY: Address = address!("7e00000000000000000000000000000000000006");
    const MODULE_A: Address = address!("a000000000000000000000000000000000000007");
    const MODULE_B: Address = address!("b000000000000000000000000000000000000008");

    const STAKE: Selector = fixed_bytes!("a694fc3a");
    const OWNER_FN: Selector = fixed_bytes!("8da5cb5b");

    fn chain(proxy_owner: Address, registry_owner: Address) -> MockChain {
        MockChain::new()
            .with_account(DEPLOYER)
            .with_account(COSIGNER)
            .with_multisig(WALLET, &[DEPLOYER, COSIGNER], 2)
            .with_proxy(PROXY, proxy_owner, OLD_LOGIC)
            .with_registry(REGISTRY, registry_owner, &[OWNER_FN])
    }

    fn router(chain: &MockChain) -> UpgradeRouter<'_, MockChain> {
        UpgradeRouter::new(chain, MultisigOrchestrator::new(chain, WALLET), DEPLOYER)
    }

    const SWAP: UpgradeRequest = UpgradeRequest::LogicSwap {
        proxy: PROXY,
        new_logic: NEW_LOGIC,
    };

    #[test]
    fn direct_swap_applies_and_reads_back() {
        let chain = chain(DEPLOYER, DEPLOYER);
        let outcome = block_on_with_spin(router(&chain).apply(SWAP, UpgradeDecision::DirectApply))
            .expect("direct swap should succeed");
        assert_eq!(
            outcome,
            UpgradeOutcome::Applied {
                target: PROXY,
                implementation: NEW_LOGIC,
            }
        );
        assert_eq!(chain.implementation_of(PROXY), Some(NEW_LOGIC));
        assert_eq!(chain.sent_transactions()[0].gas_limit, Some(130_000));
    }

    #[test]
    fn swap_to_current_implementation_is_skipped() {
        let chain = chain(DEPLOYER, DEPLOYER);
        let request = UpgradeRequest::LogicSwap {
            proxy: PROXY,
            new_logic: OLD_LOGIC,
        };
        for decision in [
            UpgradeDecision::DirectApply,
            UpgradeDecision::MultisigGated,
            UpgradeDecision::GovernanceProposal,
        ] {
            let outcome = block_on_with_spin(router(&chain).apply(request, decision))
                .expect("skip should succeed");
            assert_eq!(
                outcome,
                UpgradeOutcome::Skipped {
                    target: PROXY,
                    implementation: OLD_LOGIC,
                }
            );
        }
        assert!(chain.sent_transactions().is_empty());
    }

    #[test]
    fn gated_swap_is_submitted_to_multisig() {
        let chain = chain(WALLET, WALLET);
        let outcome = block_on_with_spin(router(&chain).apply(SWAP, UpgradeDecision::MultisigGated))
            .expect("multisig submission should succeed");
        assert_eq!(
            outcome,
            UpgradeOutcome::PendingMultisigSignatures {
                multisig: WALLET,
                tx_id: U256::ZERO,
            }
        );
        assert_eq!(chain.implementation_of(PROXY), Some(OLD_LOGIC));
        let sent = chain.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request.to, WALLET);
    }

    #[test]
    fn governance_path_only_drafts_a_proposal() {
        let chain = chain(DEPLOYER, DEPLOYER);
        let outcome =
            block_on_with_spin(router(&chain).apply(SWAP, UpgradeDecision::GovernanceProposal))
                .expect("draft should be produced");
        let UpgradeOutcome::RequiresGovernanceProposal { draft } = outcome else {
            panic!("expected a governance draft, got {outcome:?}");
        };
        assert_eq!(draft.targets, vec![PROXY]);
        assert_eq!(draft.values, vec![U256::ZERO]);
        assert_eq!(draft.signatures, vec!["setImplementation(address)".to_string()]);
        assert_eq!(draft.calldatas.len(), 1);
        assert_eq!(draft.calldatas[0].len(), 32);
        assert_eq!(&draft.calldatas[0][12..], NEW_LOGIC.as_slice());
        assert!(chain.sent_transactions().is_empty());
        assert_eq!(chain.implementation_of(PROXY), Some(OLD_LOGIC));
    }

    #[test]
    fn fresh_module_is_added_and_verified() {
        let chain = chain(DEPLOYER, DEPLOYER).with_module(MODULE_A, &[STAKE]);
        let request = UpgradeRequest::ModuleRegistration {
            registry: REGISTRY,
            module: MODULE_A,
        };
        let outcome =
            block_on_with_spin(router(&chain).apply(request, UpgradeDecision::DirectApply))
                .expect("registration should succeed");
        assert_eq!(
            outcome,
            UpgradeOutcome::Applied {
                target: REGISTRY,
                implementation: MODULE_A,
            }
        );
        assert_eq!(chain.registered_modules(REGISTRY), vec![MODULE_A]);

        let again = block_on_with_spin(router(&chain).apply(request, UpgradeDecision::DirectApply))
            .expect("second registration should be skipped");
        assert_eq!(
            again,
            UpgradeOutcome::Skipped {
                target: REGISTRY,
                implementation: MODULE_A,
            }
        );
    }

    #[test]
    fn clashing_module_is_replaced() {
        let chain = chain(DEPLOYER, DEPLOYER)
            .with_module(MODULE_A, &[STAKE])
            .with_module(MODULE_B, &[STAKE])
            .with_registered_module(REGISTRY, MODULE_A);
        let request = UpgradeRequest::ModuleRegistration {
            registry: REGISTRY,
            module: MODULE_B,
        };
        block_on_with_spin(router(&chain).apply(request, UpgradeDecision::DirectApply))
            .expect("replacement should succeed");
        assert_eq!(chain.registered_modules(REGISTRY), vec![MODULE_B]);
    }

    #[test]
    fn reserved_clash_aborts_before_any_transaction() {
        let chain = chain(DEPLOYER, DEPLOYER).with_module(MODULE_A, &[OWNER_FN]);
        let request = UpgradeRequest::ModuleRegistration {
            registry: REGISTRY,
            module: MODULE_A,
        };
        let error =
            block_on_with_spin(router(&chain).apply(request, UpgradeDecision::MultisigGated))
                .expect_err("reserved clash must abort");
        assert!(matches!(error, OrchestratorError::ReservedSelectorClash { .. }));
        assert!(chain.sent_transactions().is_empty());
    }

    #[test]
    fn module_without_selectors_fails_readback() {
        let chain = chain(DEPLOYER, DEPLOYER).with_module(MODULE_A, &[]);
        let request = UpgradeRequest::ModuleRegistration {
            registry: REGISTRY,
            module: MODULE_A,
        };
        let error = block_on_with_spin(router(&chain).apply(request, UpgradeDecision::DirectApply))
            .expect_err("registration of an empty module cannot be verified");
        assert_eq!(
            error,
            OrchestratorError::ReadbackMismatch {
                target: REGISTRY,
                expected: MODULE_A,
                actual: Address::ZERO,
            }
        );
    }

    #[test]
    fn direct_apply_by_non_owner_reverts_during_estimation() {
        let chain = chain(WALLET, WALLET);
        let error = block_on_with_spin(router(&chain).apply(SWAP, UpgradeDecision::DirectApply))
            .expect_err("deployer does not own the proxy");
        assert!(matches!(error, OrchestratorError::ChainCallFailed { .. }));
        assert_eq!(chain.implementation_of(PROXY), Some(OLD_LOGIC));
    }
}
