use crate::domain::error::OrchestratorError;
use crate::domain::gas_policy::{gas_limit_with_margin, GasPolicy};
use crate::domain::types::{LogEntry, LogQuery, TxReceipt, TxRequest};
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use async_trait::async_trait;

/// Capabilities the orchestrator needs from a blockchain client.
///
/// Implementations own signing: `send_transaction` signs with the identity
/// registered for `request.from`, submits, and resolves once the receipt is
/// available. A `None` gas limit lets the client pick one.
#[async_trait(?Send)]
pub trait ChainClient {
    fn has_signer(&self, address: Address) -> bool;

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, String>;

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, String>;

    async fn send_transaction(
        &self,
        request: &TxRequest,
        gas_limit: Option<u64>,
    ) -> Result<TxReceipt, String>;

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, String>;
}

/// `eth_call` a typed contract function and decode its return values.
pub(crate) async fn read_contract<C, T>(
    client: &C,
    to: Address,
    call: &T,
) -> Result<T::Return, OrchestratorError>
where
    C: ChainClient + ?Sized,
    T: SolCall,
{
    let operation = format!("{} on {to}", T::SIGNATURE);
    let raw = client
        .call(to, Bytes::from(call.abi_encode()))
        .await
        .map_err(|reason| OrchestratorError::chain_call(operation.as_str(), reason))?;
    T::abi_decode_returns(&raw, true).map_err(|error| OrchestratorError::decode(operation, error))
}

/// Submit a transaction once and require a successful receipt.
pub(crate) async fn submit_transaction<C>(
    client: &C,
    request: TxRequest,
    gas_policy: GasPolicy,
    operation: &str,
) -> Result<TxReceipt, OrchestratorError>
where
    C: ChainClient + ?Sized,
{
    if !client.has_signer(request.from) {
        return Err(OrchestratorError::chain_call(
            operation,
            format!("no signer available for {}", request.from),
        ));
    }

    let gas_limit = match gas_policy {
        GasPolicy::EstimateWithMargin { margin_bps } => {
            let estimated = client
                .estimate_gas(&request)
                .await
                .map_err(|reason| {
                    OrchestratorError::chain_call(format!("gas estimation for {operation}"), reason)
                })?;
            Some(gas_limit_with_margin(estimated, margin_bps).gas_limit)
        }
        GasPolicy::ClientDefault => None,
    };

    let receipt = client
        .send_transaction(&request, gas_limit)
        .await
        .map_err(|reason| OrchestratorError::chain_call(operation, reason))?;
    if !receipt.success {
        return Err(OrchestratorError::chain_call(
            operation,
            format!(
                "transaction {} reverted in block {}",
                receipt.tx_hash, receipt.block_number
            ),
        ));
    }
    Ok(receipt)
}
