//! Drives an already deployed Gnosis-style multisig wallet.
//!
//! Every mutating call is a single shot: estimate gas, pad it by the
//! configured margin, send from the given owner and wait for the receipt.
//! The wallet's view of the transaction is then read back for logging. That
//! read is advisory: when it fails the error is logged and the mined call
//! still succeeds.
use crate::config::DeploymentConfig;
use crate::domain::error::OrchestratorError;
use crate::domain::gas_policy::{GasPolicy, DEFAULT_GAS_MARGIN_BPS};
use crate::domain::types::{MultisigCallOutcome, MultisigTransaction, TxReceipt, TxRequest};
use crate::events::{decode_event_from_receipt, EventInterface};
use crate::features::abi::{IMultiSigWallet, SUBMISSION_EVENT};
use crate::features::chain::{read_contract, submit_transaction, ChainClient};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, LogPriorityLevels)]
enum MultisigLogPriority {
    #[log_level(capacity = 1000, name = "MULTISIG_INFO")]
    Info,
    #[log_level(capacity = 500, name = "MULTISIG_ERROR")]
    Error,
}

impl GetLogFilter for MultisigLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

pub struct MultisigOrchestrator<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    multisig: Address,
    gas_margin_bps: u32,
}

impl<'a, C: ChainClient + ?Sized> MultisigOrchestrator<'a, C> {
    pub const fn new(client: &'a C, multisig: Address) -> Self {
        Self {
            client,
            multisig,
            gas_margin_bps: DEFAULT_GAS_MARGIN_BPS,
        }
    }

    pub fn from_config(client: &'a C, config: &DeploymentConfig) -> Self {
        Self::new(client, config.multisig_address).with_gas_margin_bps(config.gas_margin_bps)
    }

    pub fn with_gas_margin_bps(mut self, gas_margin_bps: u32) -> Self {
        self.gas_margin_bps = gas_margin_bps;
        self
    }

    pub const fn address(&self) -> Address {
        self.multisig
    }

    const fn padded(&self) -> GasPolicy {
        GasPolicy::EstimateWithMargin {
            margin_bps: self.gas_margin_bps,
        }
    }

    /// Submits `destination.call{value}(data)` to the wallet and returns the
    /// transaction id taken from the `Submission` event.
    pub async fn submit(
        &self,
        destination: Address,
        value: U256,
        data: Bytes,
        sender: Address,
    ) -> Result<U256, OrchestratorError> {
        let call = IMultiSigWallet::submitTransactionCall {
            destination,
            value,
            data,
        };
        let receipt = self
            .send(&call, sender, self.padded(), "submitTransaction")
            .await?;

        let submission = EventInterface::parse(SUBMISSION_EVENT)?;
        let tx_id = decode_event_from_receipt(&receipt, &submission)?.uint("transactionId")?;
        log!(
            MultisigLogPriority::Info,
            "multisig={} tx_id={} destination={} tx={} submitted",
            self.multisig,
            tx_id,
            destination,
            receipt.tx_hash
        );
        self.read_back_status(tx_id).await;
        Ok(tx_id)
    }

    pub async fn confirm(
        &self,
        tx_id: U256,
        sender: Address,
    ) -> Result<MultisigCallOutcome, OrchestratorError> {
        let call = IMultiSigWallet::confirmTransactionCall {
            transactionId: tx_id,
        };
        let receipt = self
            .send(&call, sender, self.padded(), "confirmTransaction")
            .await?;
        Ok(self.outcome(tx_id, &receipt).await)
    }

    pub async fn revoke(
        &self,
        tx_id: U256,
        sender: Address,
    ) -> Result<MultisigCallOutcome, OrchestratorError> {
        let call = IMultiSigWallet::revokeConfirmationCall {
            transactionId: tx_id,
        };
        let receipt = self
            .send(&call, sender, GasPolicy::ClientDefault, "revokeConfirmation")
            .await?;
        Ok(self.outcome(tx_id, &receipt).await)
    }

    pub async fn execute(
        &self,
        tx_id: U256,
        sender: Address,
    ) -> Result<MultisigCallOutcome, OrchestratorError> {
        let call = IMultiSigWallet::executeTransactionCall {
            transactionId: tx_id,
        };
        let receipt = self
            .send(&call, sender, self.padded(), "executeTransaction")
            .await?;
        Ok(self.outcome(tx_id, &receipt).await)
    }

    pub async fn status(&self, tx_id: U256) -> Result<MultisigTransaction, OrchestratorError> {
        let transaction = read_contract(
            self.client,
            self.multisig,
            &IMultiSigWallet::transactionsCall {
                transactionId: tx_id,
            },
        )
        .await?;
        let count = read_contract(
            self.client,
            self.multisig,
            &IMultiSigWallet::getConfirmationCountCall {
                transactionId: tx_id,
            },
        )
        .await?;
        let confirmations = read_contract(
            self.client,
            self.multisig,
            &IMultiSigWallet::getConfirmationsCall {
                transactionId: tx_id,
            },
        )
        .await?;

        Ok(MultisigTransaction {
            tx_id,
            destination: transaction.destination,
            value: transaction.value,
            data: transaction.data,
            confirmation_count: count.count,
            executed: transaction.executed,
            confirmations: confirmations.confirmations,
        })
    }

    pub async fn is_owner(&self, address: Address) -> Result<bool, OrchestratorError> {
        let owner = read_contract(
            self.client,
            self.multisig,
            &IMultiSigWallet::isOwnerCall { owner: address },
        )
        .await?;
        Ok(owner._0)
    }

    /// Proposes adding `new_owner`; the wallet only accepts owner changes
    /// from itself, so this goes through `submit`.
    pub async fn add_owner(
        &self,
        new_owner: Address,
        sender: Address,
    ) -> Result<U256, OrchestratorError> {
        let data = IMultiSigWallet::addOwnerCall { owner: new_owner }.abi_encode();
        log!(
            MultisigLogPriority::Info,
            "multisig={} owner={} proposing addOwner",
            self.multisig,
            new_owner
        );
        self.submit(self.multisig, U256::ZERO, Bytes::from(data), sender)
            .await
    }

    pub async fn remove_owner(
        &self,
        owner: Address,
        sender: Address,
    ) -> Result<U256, OrchestratorError> {
        let data = IMultiSigWallet::removeOwnerCall { owner }.abi_encode();
        log!(
            MultisigLogPriority::Info,
            "multisig={} owner={} proposing removeOwner",
            self.multisig,
            owner
        );
        self.submit(self.multisig, U256::ZERO, Bytes::from(data), sender)
            .await
    }

    async fn send<T: SolCall>(
        &self,
        call: &T,
        sender: Address,
        gas_policy: GasPolicy,
        name: &str,
    ) -> Result<TxReceipt, OrchestratorError> {
        let request = TxRequest {
            from: sender,
            to: self.multisig,
            value: U256::ZERO,
            data: Bytes::from(call.abi_encode()),
        };
        let operation = format!("{name} on multisig {}", self.multisig);
        submit_transaction(self.client, request, gas_policy, &operation)
            .await
            .inspect_err(|error| {
                log!(
                    MultisigLogPriority::Error,
                    "multisig={} sender={} op={} error={}",
                    self.multisig,
                    sender,
                    name,
                    error
                );
            })
    }

    async fn outcome(&self, tx_id: U256, receipt: &TxReceipt) -> MultisigCallOutcome {
        MultisigCallOutcome {
            tx_id,
            tx_hash: receipt.tx_hash,
            status: self.read_back_status(tx_id).await,
        }
    }

    async fn read_back_status(&self, tx_id: U256) -> Option<MultisigTransaction> {
        let status = match self.status(tx_id).await {
            Ok(status) => status,
            Err(error) => {
                log!(
                    MultisigLogPriority::Error,
                    "multisig={} tx_id={} status_unavailable error={}",
                    self.multisig,
                    tx_id,
                    error
                );
                return None;
            }
        };
        log!(
            MultisigLogPriority::Info,
            "multisig={} tx_id={} destination={} value={} confirmations={} executed={} confirmed_by=[{}]",
            self.multisig,
            status.tx_id,
            status.destination,
            status.value,
            status.confirmation_count,
            status.executed,
            status
                .confirmations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        );
        Some(status)
    }
}
