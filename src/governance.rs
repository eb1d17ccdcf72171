//! Submits governance proposals to a `GovernorAlpha`-style governor.
use crate::domain::error::OrchestratorError;
use crate::domain::gas_policy::GasPolicy;
use crate::domain::types::{GovernanceProposal, TxRequest};
use crate::events::{decode_event_from_receipt, EventInterface, ParsedEvent};
use crate::features::abi::{IGovernorAlpha, PROPOSAL_CREATED_EVENT};
use crate::features::chain::{submit_transaction, ChainClient};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, LogPriorityLevels)]
enum GovernanceLogPriority {
    #[log_level(capacity = 500, name = "GOVERNANCE_INFO")]
    Info,
    #[log_level(capacity = 500, name = "GOVERNANCE_ERROR")]
    Error,
}

impl GetLogFilter for GovernanceLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

/// A proposal accepted by the governor, as reported by its `ProposalCreated` event.
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalCreated {
    pub id: U256,
    pub event: ParsedEvent,
}

pub struct GovernanceProposalSubmitter<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    governor: Address,
}

impl<'a, C: ChainClient + ?Sized> GovernanceProposalSubmitter<'a, C> {
    pub const fn new(client: &'a C, governor: Address) -> Self {
        Self { client, governor }
    }

    pub const fn governor(&self) -> Address {
        self.governor
    }

    pub async fn propose(
        &self,
        proposal: &GovernanceProposal,
        proposer: Address,
    ) -> Result<ProposalCreated, OrchestratorError> {
        log!(
            GovernanceLogPriority::Info,
            "governor={} proposer={} targets=[{}] values=[{}] signatures=[{}] calldatas=[{}] description={:?} creating proposal",
            self.governor,
            proposer,
            join(&proposal.targets),
            join(&proposal.values),
            proposal.signatures.join(","),
            join(&proposal.calldatas),
            proposal.description
        );

        let call = IGovernorAlpha::proposeCall {
            targets: proposal.targets.clone(),
            values: proposal.values.clone(),
            signatures: proposal.signatures.clone(),
            calldatas: proposal.calldatas.clone(),
            description: proposal.description.clone(),
        };
        let request = TxRequest {
            from: proposer,
            to: self.governor,
            value: U256::ZERO,
            data: Bytes::from(call.abi_encode()),
        };
        let operation = format!("propose on governor {}", self.governor);
        let receipt =
            submit_transaction(self.client, request, GasPolicy::ClientDefault, &operation).await?;

        let interface = EventInterface::parse(PROPOSAL_CREATED_EVENT)?;
        let event = match decode_event_from_receipt(&receipt, &interface) {
            Ok(event) => event,
            Err(OrchestratorError::EventNotFound { tx_hash, .. }) => {
                log!(
                    GovernanceLogPriority::Error,
                    "governor={} tx={} no ProposalCreated event",
                    self.governor,
                    tx_hash
                );
                return Err(OrchestratorError::ProposalSubmissionFailed {
                    governor: self.governor,
                    tx_hash,
                });
            }
            Err(other) => return Err(other),
        };
        let id = event.uint("id")?;

        log!(
            GovernanceLogPriority::Info,
            "governor={} proposal_id={} {}",
            self.governor,
            id,
            event.render()
        );
        Ok(ProposalCreated { id, event })
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{block_on_with_spin, MockChain};
    use alloy_primitives::address;

    const GOVERNOR: Address = address!("6496df39d000478a7a7352c01e0e713835051ccd");
    const PROPOSER: Address = address!("de00000000000000000000000000000000000001");
    const PROXY: Address = address!("9000000000000000000000000000000000000003");

    fn proposal() -> GovernanceProposal {
        GovernanceProposal {
            targets: vec![PROXY],
            values: vec![U256::ZERO],
            signatures: vec!["setImplementation(address)".to_string()],
            calldatas: vec![Bytes::from(vec![0u8; 32])],
            description: "SIP-0042: upgrade staking logic".to_string(),
        }
    }

    #[test]
    fn propose_returns_decoded_proposal_created_event() {
        let chain = MockChain::new()
            .with_account(PROPOSER)
            .with_governor(GOVERNOR);
        let submitter = GovernanceProposalSubmitter::new(&chain, GOVERNOR);

        let created = block_on_with_spin(submitter.propose(&proposal(), PROPOSER))
            .expect("proposal should be created");
        assert_eq!(created.id, U256::from(1u64));
        assert_eq!(created.event.address("proposer"), Ok(PROPOSER));
        assert_eq!(created.event.addresses("targets"), Ok(vec![PROXY]));
        assert_eq!(
            created.event.strings("signatures"),
            Ok(vec!["setImplementation(address)".to_string()])
        );
        assert_eq!(
            created.event.string("description"),
            Ok("SIP-0042: upgrade staking logic".to_string())
        );
        assert_eq!(chain.proposal_count(GOVERNOR), 1);
        assert_eq!(chain.sent_transactions()[0].gas_limit, None);
    }

    #[test]
    fn missing_event_is_a_submission_failure() {
        let chain = MockChain::new()
            .with_account(PROPOSER)
            .with_governor(GOVERNOR);
        chain.silence_governor_events();
        let submitter = GovernanceProposalSubmitter::new(&chain, GOVERNOR);

        let error = block_on_with_spin(submitter.propose(&proposal(), PROPOSER))
            .expect_err("missing event should fail");
        assert!(matches!(
            error,
            OrchestratorError::ProposalSubmissionFailed { governor, .. } if governor == GOVERNOR
        ));
    }

    #[test]
    fn mismatched_lengths_revert_on_chain() {
        let chain = MockChain::new()
            .with_account(PROPOSER)
            .with_governor(GOVERNOR);
        let submitter = GovernanceProposalSubmitter::new(&chain, GOVERNOR);
        let mut lopsided = proposal();
        lopsided.values.push(U256::from(1u64));

        let error = block_on_with_spin(submitter.propose(&lopsided, PROPOSER))
            .expect_err("governor should revert");
        assert!(matches!(error, OrchestratorError::ChainCallFailed { .. }));
        assert_eq!(chain.proposal_count(GOVERNOR), 0);
    }
}
