use crate::domain::types::Selector;
use alloy_primitives::{Address, B256};
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("event {event} (topic {topic}) not found in receipt of {tx_hash}")]
    EventNotFound {
        event: String,
        topic: B256,
        tx_hash: B256,
    },
    #[error("failed to decode {context}: {reason}")]
    DecodeError { context: String, reason: String },
    #[error(
        "module {candidate} clashes with proxy registry function selectors: {}",
        join_selectors(.selectors)
    )]
    ReservedSelectorClash {
        candidate: Address,
        selectors: Vec<Selector>,
    },
    #[error(
        "module {candidate} cannot replace multiple modules at once: {}",
        join_addresses(.modules)
    )]
    MultiModuleClash {
        candidate: Address,
        modules: Vec<Address>,
    },
    #[error("governor {governor} accepted {tx_hash} but emitted no ProposalCreated event")]
    ProposalSubmissionFailed { governor: Address, tx_hash: B256 },
    #[error("{operation} failed: {reason}")]
    ChainCallFailed { operation: String, reason: String },
    #[error("readback of {target} returned {actual}, expected {expected}")]
    ReadbackMismatch {
        target: Address,
        expected: Address,
        actual: Address,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OrchestratorError {
    pub(crate) fn chain_call(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChainCallFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::DecodeError {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

fn join_selectors(selectors: &[Selector]) -> String {
    selectors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, fixed_bytes};

    #[test]
    fn clash_errors_list_every_offending_item() {
        let error = OrchestratorError::ReservedSelectorClash {
            candidate: address!("1111111111111111111111111111111111111111"),
            selectors: vec![fixed_bytes!("12345678"), fixed_bytes!("deadbeef")],
        };
        let rendered = error.to_string();
        assert!(rendered.contains("0x12345678"));
        assert!(rendered.contains("0xdeadbeef"));

        let error = OrchestratorError::MultiModuleClash {
            candidate: address!("1111111111111111111111111111111111111111"),
            modules: vec![
                address!("2222222222222222222222222222222222222222"),
                address!("3333333333333333333333333333333333333333"),
            ],
        };
        let rendered = error.to_string();
        assert!(rendered.contains("0x2222222222222222222222222222222222222222"));
        assert!(rendered.contains("0x3333333333333333333333333333333333333333"));
    }

    #[test]
    fn chain_call_errors_keep_operation_context() {
        let error = OrchestratorError::chain_call("confirmTransaction(7)", "execution reverted");
        assert_eq!(
            error.to_string(),
            "confirmTransaction(7) failed: execution reverted"
        );
    }
}
