use crate::config::{DeploymentConfig, NetworkConfig};
use crate::domain::error::OrchestratorError;
use crate::domain::types::{LogEntry, LogQuery, TxFormat, TxReceipt, TxRequest};
use crate::features::chain::ChainClient;
use crate::features::signer::{address_from_verifying_key, SignerAdapter};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{length_of_length, BufMut, Encodable, Header};
use async_trait::async_trait;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

const MAX_EVM_RPC_RESPONSE_BYTES: u64 = 2 * 1024 * 1024;
const CONTROL_PLANE_MAX_RESPONSE_BYTES: u64 = 4 * 1024;
const EMPTY_ACCESS_LIST_RLP_LEN: usize = 1;
const DEFAULT_PRIORITY_FEE_WEI: u64 = 1_000_000_000;
pub const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_RECEIPT_MAX_POLLS: u32 = 120;

#[derive(Clone, Copy, Serialize, Deserialize, LogPriorityLevels)]
enum EvmLogPriority {
    #[log_level(capacity = 1000, name = "EVM_INFO")]
    Info,
    #[log_level(capacity = 500, name = "EVM_ERROR")]
    Error,
}

impl GetLogFilter for EvmLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

#[derive(Clone, Debug)]
pub struct HttpEvmRpcClient {
    rpc_url: String,
    fallback_rpc_url: Option<String>,
    max_response_bytes: u64,
}

impl HttpEvmRpcClient {
    pub fn new(
        rpc_url: &str,
        fallback_rpc_url: Option<String>,
        max_response_bytes: u64,
    ) -> Result<Self, String> {
        let rpc_url = rpc_url.trim();
        if rpc_url.is_empty() {
            return Err("evm rpc url is not configured".to_string());
        }
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            fallback_rpc_url: fallback_rpc_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            max_response_bytes: clamp_response_bytes(max_response_bytes),
        })
    }

    pub fn from_network(network: &NetworkConfig, max_response_bytes: u64) -> Result<Self, String> {
        Self::new(
            &network.rpc_url,
            network.fallback_rpc_url.clone(),
            max_response_bytes,
        )
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    const fn control_plane_max_response_bytes(&self) -> u64 {
        CONTROL_PLANE_MAX_RESPONSE_BYTES
    }

    pub async fn eth_chain_id(&self) -> Result<u64, String> {
        let response = self
            .rpc_call(
                "eth_chainId",
                json!([]),
                self.control_plane_max_response_bytes(),
            )
            .await
            .map_err(|error| format!("eth_chainId failed: {error}"))?;
        parse_hex_u64(result_str(&response, "eth_chainId")?, "eth_chainId")
    }

    pub async fn eth_call(&self, to: Address, data: &Bytes) -> Result<Bytes, String> {
        let response = self
            .rpc_call(
                "eth_call",
                json!([{"to": to, "data": data}, "latest"]),
                self.max_response_bytes,
            )
            .await
            .map_err(|error| format!("eth_call failed: {error}"))?;
        parse_hex_bytes(result_str(&response, "eth_call")?, "eth_call result")
    }

    pub async fn eth_get_transaction_count(&self, address: Address) -> Result<u64, String> {
        let response = self
            .rpc_call(
                "eth_getTransactionCount",
                json!([address, "pending"]),
                self.control_plane_max_response_bytes(),
            )
            .await
            .map_err(|error| format!("eth_getTransactionCount failed: {error}"))?;
        parse_hex_u64(
            result_str(&response, "eth_getTransactionCount")?,
            "eth_getTransactionCount",
        )
    }

    pub async fn eth_gas_price(&self) -> Result<U256, String> {
        let response = self
            .rpc_call(
                "eth_gasPrice",
                json!([]),
                self.control_plane_max_response_bytes(),
            )
            .await
            .map_err(|error| format!("eth_gasPrice failed: {error}"))?;
        parse_hex_u256(result_str(&response, "eth_gasPrice")?, "eth_gasPrice")
    }

    pub async fn eth_estimate_gas(&self, request: &TxRequest) -> Result<u64, String> {
        let response = self
            .rpc_call(
                "eth_estimateGas",
                json!([{
                    "from": request.from,
                    "to": request.to,
                    "value": format!("0x{:x}", request.value),
                    "data": request.data
                }]),
                self.control_plane_max_response_bytes(),
            )
            .await
            .map_err(|error| format!("eth_estimateGas failed: {error}"))?;
        parse_hex_u64(result_str(&response, "eth_estimateGas")?, "eth_estimateGas")
    }

    pub async fn eth_send_raw_transaction(&self, raw_tx: &[u8]) -> Result<B256, String> {
        let payload = format!("0x{}", hex::encode(raw_tx));
        let response = self
            .rpc_call(
                "eth_sendRawTransaction",
                json!([payload]),
                self.control_plane_max_response_bytes(),
            )
            .await
            .map_err(|error| format!("eth_sendRawTransaction failed: {error}"))?;
        parse_hex_b256(
            result_str(&response, "eth_sendRawTransaction")?,
            "eth_sendRawTransaction result",
        )
    }

    /// `Ok(None)` while the transaction is still pending.
    pub async fn eth_get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TxReceipt>, String> {
        let response = self
            .rpc_call(
                "eth_getTransactionReceipt",
                json!([tx_hash]),
                self.max_response_bytes,
            )
            .await
            .map_err(|error| format!("eth_getTransactionReceipt failed: {error}"))?;
        let raw = response
            .get("result")
            .cloned()
            .ok_or_else(|| "eth_getTransactionReceipt result was missing".to_string())?;
        if raw.is_null() {
            return Ok(None);
        }
        let receipt = serde_json::from_value::<RpcReceipt>(raw).map_err(|error| {
            format!("failed to decode eth_getTransactionReceipt result: {error}")
        })?;
        receipt.into_receipt().map(Some)
    }

    pub async fn eth_get_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, String> {
        let to_block = query
            .to_block
            .map_or_else(|| "latest".to_string(), |block| format!("0x{block:x}"));
        let filter = json!({
            "address": query.address,
            "fromBlock": format!("0x{:x}", query.from_block),
            "toBlock": to_block,
            "topics": [query.topic0],
        });

        let response = self
            .rpc_call(
                "eth_getLogs",
                Value::Array(vec![filter]),
                self.max_response_bytes,
            )
            .await
            .map_err(|error| format!("eth_getLogs failed: {error}"))?;

        let raw_logs = response
            .get("result")
            .cloned()
            .ok_or_else(|| "eth_getLogs result was missing".to_string())?;
        serde_json::from_value::<Vec<RpcLog>>(raw_logs)
            .map_err(|error| format!("failed to decode eth_getLogs result: {error}"))?
            .into_iter()
            .map(RpcLog::into_entry)
            .collect()
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: Value,
        max_response_bytes: u64,
    ) -> Result<Value, String> {
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .map_err(|error| format!("failed to serialize {method} request: {error}"))?;

        let raw = self.http_post(&body, max_response_bytes).await?;
        let value: Value = serde_json::from_slice(&raw)
            .map_err(|error| format!("failed to parse {method} response JSON: {error}"))?;
        if let Some(error) = value.get("error") {
            return Err(format!("rpc returned error for {method}: {error}"));
        }
        Ok(value)
    }

    async fn http_post(&self, body: &[u8], max_response_bytes: u64) -> Result<Vec<u8>, String> {
        let normalized_max = clamp_response_bytes(max_response_bytes);
        match self.try_http_post(&self.rpc_url, body, normalized_max) {
            Ok(body) => Ok(body),
            Err(primary_error) => {
                if let Some(fallback_url) = self.fallback_rpc_url.as_deref() {
                    log!(
                        EvmLogPriority::Error,
                        "rpc={} error={} retrying_on_fallback",
                        self.rpc_url,
                        primary_error
                    );
                    self.try_http_post(fallback_url, body, normalized_max)
                        .map_err(|fallback_error| {
                            format!(
                                "primary rpc failed: {primary_error}; fallback rpc failed: {fallback_error}"
                            )
                        })
                } else {
                    Err(primary_error)
                }
            }
        }
    }

    fn try_http_post(
        &self,
        url: &str,
        body: &[u8],
        max_response_bytes: u64,
    ) -> Result<Vec<u8>, String> {
        let response = ureq::post(url)
            .set("content-type", "application/json")
            .send_bytes(body)
            .map_err(|error| match error {
                ureq::Error::Status(status, _) => {
                    format!("evm rpc returned status {status}")
                }
                ureq::Error::Transport(transport) => {
                    format!("evm rpc transport failed: {transport}")
                }
            })?;

        let mut raw = Vec::new();
        response
            .into_reader()
            .take(max_response_bytes.saturating_add(1))
            .read_to_end(&mut raw)
            .map_err(|error| format!("failed to read rpc response body: {error}"))?;
        if u64::try_from(raw.len()).unwrap_or(u64::MAX) > max_response_bytes {
            return Err(format!(
                "rpc response exceeded max_response_bytes={max_response_bytes}"
            ));
        }
        Ok(raw)
    }
}

/// `ChainClient` over JSON-RPC. Transactions are signed locally by the
/// signer registered for the sending address, in the network's `TxFormat`.
pub struct EvmChainClient {
    rpc: HttpEvmRpcClient,
    chain_id: u64,
    tx_format: TxFormat,
    signers: BTreeMap<Address, Box<dyn SignerAdapter>>,
    receipt_poll_interval: Duration,
    receipt_max_polls: u32,
}

impl EvmChainClient {
    pub fn new(rpc: HttpEvmRpcClient, chain_id: u64) -> Self {
        Self {
            rpc,
            chain_id,
            tx_format: TxFormat::default(),
            signers: BTreeMap::new(),
            receipt_poll_interval: Duration::from_millis(DEFAULT_RECEIPT_POLL_INTERVAL_MS),
            receipt_max_polls: DEFAULT_RECEIPT_MAX_POLLS,
        }
    }

    pub fn from_config(
        config: &DeploymentConfig,
        network: &str,
    ) -> Result<Self, OrchestratorError> {
        let selected = config.network(network)?;
        let rpc = HttpEvmRpcClient::from_network(&selected, config.max_response_bytes)
            .map_err(OrchestratorError::InvalidConfig)?;
        Ok(Self::new(rpc, selected.chain_id)
            .with_tx_format(selected.tx_format)
            .with_receipt_polling(
                Duration::from_millis(config.receipt_poll_interval_ms),
                config.receipt_max_polls,
            ))
    }

    pub const fn with_tx_format(mut self, tx_format: TxFormat) -> Self {
        self.tx_format = tx_format;
        self
    }

    pub fn with_signer(mut self, signer: Box<dyn SignerAdapter>) -> Self {
        self.signers.insert(signer.derive_address(), signer);
        self
    }

    pub fn with_receipt_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_max_polls = max_polls.max(1);
        self
    }

    pub const fn rpc(&self) -> &HttpEvmRpcClient {
        &self.rpc
    }

    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub const fn tx_format(&self) -> TxFormat {
        self.tx_format
    }

    /// Fails when the node behind the RPC URL serves a different chain.
    pub async fn verify_chain_id(&self) -> Result<(), String> {
        let remote = self.rpc.eth_chain_id().await?;
        if remote != self.chain_id {
            return Err(format!(
                "rpc {} serves chain {remote}, expected {}",
                self.rpc.rpc_url(),
                self.chain_id
            ));
        }
        Ok(())
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, String> {
        for attempt in 0..self.receipt_max_polls {
            if let Some(receipt) = self.rpc.eth_get_transaction_receipt(tx_hash).await? {
                log!(
                    EvmLogPriority::Info,
                    "tx={} block={} success={} gas_used={} mined",
                    receipt.tx_hash,
                    receipt.block_number,
                    receipt.success,
                    receipt.gas_used
                );
                return Ok(receipt);
            }
            if attempt + 1 < self.receipt_max_polls {
                Delay::new(self.receipt_poll_interval).await;
            }
        }
        log!(
            EvmLogPriority::Error,
            "tx={} polls={} receipt_missing",
            tx_hash,
            self.receipt_max_polls
        );
        Err(format!(
            "receipt for {tx_hash} not available after {} polls",
            self.receipt_max_polls
        ))
    }
}

#[async_trait(?Send)]
impl ChainClient for EvmChainClient {
    fn has_signer(&self, address: Address) -> bool {
        self.signers.contains_key(&address)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, String> {
        self.rpc.eth_call(to, &data).await
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, String> {
        self.rpc.eth_estimate_gas(request).await
    }

    async fn send_transaction(
        &self,
        request: &TxRequest,
        gas_limit: Option<u64>,
    ) -> Result<TxReceipt, String> {
        let signer = self
            .signers
            .get(&request.from)
            .ok_or_else(|| format!("no signer registered for {}", request.from))?;

        let nonce = self.rpc.eth_get_transaction_count(request.from).await?;
        let gas_limit = match gas_limit {
            Some(limit) => limit,
            None => self.rpc.eth_estimate_gas(request).await?,
        };
        let gas_price = self.rpc.eth_gas_price().await?;

        let tx = UnsignedTx::new(
            self.tx_format,
            self.chain_id,
            nonce,
            gas_price,
            gas_limit,
            request,
        );
        let tx_hash = keccak256(tx.signing_payload());
        let message_hash = format!("0x{}", hex::encode(tx_hash.as_slice()));
        let signature = parse_compact_signature(&signer.sign_message(&message_hash).await?)?;
        let y_parity = recover_y_parity(&tx_hash, &signature, request.from)?;
        let r = U256::from_be_slice(&signature[..32]);
        let s = U256::from_be_slice(&signature[32..]);
        let signed = tx.encode_signed(y_parity, r, s);

        let sent_hash = self.rpc.eth_send_raw_transaction(&signed).await?;
        log!(
            EvmLogPriority::Info,
            "tx={} from={} to={} nonce={} gas_limit={} format={:?} submitted",
            sent_hash,
            request.from,
            request.to,
            nonce,
            gas_limit,
            self.tx_format
        );
        self.wait_for_receipt(sent_hash).await
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, String> {
        self.rpc.eth_get_logs(query).await
    }
}

fn clamp_response_bytes(max_response_bytes: u64) -> u64 {
    max_response_bytes.clamp(256, MAX_EVM_RPC_RESPONSE_BYTES)
}

fn result_str<'a>(response: &'a Value, method: &str) -> Result<&'a str, String> {
    response
        .get("result")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{method} result was missing"))
}

fn strip_hex_prefix<'a>(raw: &'a str, field: &str) -> Result<&'a str, String> {
    let value = raw.trim();
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| format!("{field} must be 0x-prefixed hex"))
}

fn parse_hex_u64(raw: &str, field: &str) -> Result<u64, String> {
    let without_prefix = strip_hex_prefix(raw, field)?;
    u64::from_str_radix(without_prefix, 16)
        .map_err(|error| format!("failed to parse {field} as hex u64: {error}"))
}

fn parse_hex_u256(raw: &str, field: &str) -> Result<U256, String> {
    let without_prefix = strip_hex_prefix(raw, field)?;
    if without_prefix.is_empty() {
        return Ok(U256::ZERO);
    }
    if without_prefix.len() > 64 {
        return Err(format!("{field} exceeds 32 bytes"));
    }
    U256::from_str_radix(without_prefix, 16)
        .map_err(|error| format!("failed to parse {field} as hex u256: {error}"))
}

fn parse_hex_bytes(raw: &str, field: &str) -> Result<Bytes, String> {
    let without_prefix = strip_hex_prefix(raw, field)?;
    if without_prefix.len() % 2 != 0 {
        return Err(format!("{field} hex length must be even"));
    }
    hex::decode(without_prefix)
        .map(Bytes::from)
        .map_err(|error| format!("{field} must be valid hex: {error}"))
}

fn parse_hex_b256(raw: &str, field: &str) -> Result<B256, String> {
    let bytes = parse_hex_bytes(raw, field)?;
    if bytes.len() != 32 {
        return Err(format!("{field} must be 32 bytes"));
    }
    Ok(B256::from_slice(&bytes))
}

#[derive(Deserialize)]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
    #[serde(rename = "logIndex")]
    log_index: Option<String>,
}

impl RpcLog {
    fn into_entry(self) -> Result<LogEntry, String> {
        Ok(LogEntry {
            address: self.address,
            topics: self.topics,
            data: self.data,
            block_number: self
                .block_number
                .as_deref()
                .map(|raw| parse_hex_u64(raw, "log blockNumber"))
                .transpose()?,
            log_index: self
                .log_index
                .as_deref()
                .map(|raw| parse_hex_u64(raw, "log logIndex"))
                .transpose()?,
        })
    }
}

#[derive(Deserialize)]
struct RpcReceipt {
    #[serde(rename = "transactionHash")]
    transaction_hash: B256,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "gasUsed")]
    gas_used: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<TxReceipt, String> {
        // Pre-Byzantium receipts carry no status; treat them as successful.
        let success = match self.status.as_deref() {
            Some(raw) => parse_hex_u64(raw, "receipt status")? == 1,
            None => true,
        };
        Ok(TxReceipt {
            tx_hash: self.transaction_hash,
            block_number: parse_hex_u64(&self.block_number, "receipt blockNumber")?,
            success,
            gas_used: parse_hex_u64(&self.gas_used, "receipt gasUsed")?,
            logs: self
                .logs
                .into_iter()
                .map(RpcLog::into_entry)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

/// Resolves once its deadline has passed. The first pending poll arms a
/// timer thread that wakes the task, so the executor thread never sleeps.
struct Delay {
    deadline: Instant,
    armed: bool,
}

impl Delay {
    fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            armed: false,
        }
    }
}

impl Future for Delay {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let now = Instant::now();
        if now >= self.deadline {
            return Poll::Ready(());
        }
        if !self.armed {
            self.armed = true;
            let remaining = self.deadline - now;
            let waker = cx.waker().clone();
            std::thread::spawn(move || {
                std::thread::sleep(remaining);
                waker.wake();
            });
        }
        Poll::Pending
    }
}

enum UnsignedTx {
    Legacy(LegacyUnsignedTx),
    Eip1559(Eip1559UnsignedTx),
}

impl UnsignedTx {
    fn new(
        format: TxFormat,
        chain_id: u64,
        nonce: u64,
        gas_price: U256,
        gas_limit: u64,
        request: &TxRequest,
    ) -> Self {
        match format {
            TxFormat::Legacy => Self::Legacy(LegacyUnsignedTx {
                chain_id,
                nonce: U256::from(nonce),
                gas_price,
                gas_limit: U256::from(gas_limit),
                to: request.to,
                value: request.value,
                data: request.data.clone(),
            }),
            TxFormat::Eip1559 => {
                let max_priority_fee_per_gas = U256::from(DEFAULT_PRIORITY_FEE_WEI);
                Self::Eip1559(Eip1559UnsignedTx {
                    chain_id: U256::from(chain_id),
                    nonce: U256::from(nonce),
                    max_priority_fee_per_gas,
                    max_fee_per_gas: gas_price.saturating_add(max_priority_fee_per_gas),
                    gas_limit: U256::from(gas_limit),
                    to: request.to,
                    value: request.value,
                    data: request.data.clone(),
                })
            }
        }
    }

    /// Bytes whose keccak256 hash the sender signs.
    fn signing_payload(&self) -> Vec<u8> {
        match self {
            Self::Legacy(tx) => encode_legacy_unsigned(tx),
            Self::Eip1559(tx) => encode_eip1559_unsigned(tx),
        }
    }

    fn encode_signed(&self, y_parity: u8, r: U256, s: U256) -> Vec<u8> {
        match self {
            Self::Legacy(tx) => encode_legacy_signed(tx, y_parity, r, s),
            Self::Eip1559(tx) => encode_eip1559_signed(tx, y_parity, r, s),
        }
    }
}

#[derive(Clone, Debug)]
struct LegacyUnsignedTx {
    chain_id: u64,
    nonce: U256,
    gas_price: U256,
    gas_limit: U256,
    to: Address,
    value: U256,
    data: Bytes,
}

impl LegacyUnsignedTx {
    fn fields_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
    }
}

/// EIP-155 signing payload: the six fields followed by `chain_id, 0, 0`.
fn encode_legacy_unsigned(tx: &LegacyUnsignedTx) -> Vec<u8> {
    let chain_id = U256::from(tx.chain_id);
    let payload_length = tx.fields_length() + chain_id.length() + 2 * U256::ZERO.length();
    let mut out = Vec::with_capacity(payload_length + length_of_length(payload_length));
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    tx.encode_fields(&mut out);
    chain_id.encode(&mut out);
    U256::ZERO.encode(&mut out);
    U256::ZERO.encode(&mut out);
    out
}

fn encode_legacy_signed(tx: &LegacyUnsignedTx, y_parity: u8, r: U256, s: U256) -> Vec<u8> {
    let v = U256::from(tx.chain_id)
        .saturating_mul(U256::from(2u8))
        .saturating_add(U256::from(35u8 + y_parity));
    let payload_length = tx.fields_length() + v.length() + r.length() + s.length();
    let mut out = Vec::with_capacity(payload_length + length_of_length(payload_length));
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    tx.encode_fields(&mut out);
    v.encode(&mut out);
    r.encode(&mut out);
    s.encode(&mut out);
    out
}

#[derive(Clone, Debug)]
struct Eip1559UnsignedTx {
    chain_id: U256,
    nonce: U256,
    max_priority_fee_per_gas: U256,
    max_fee_per_gas: U256,
    gas_limit: U256,
    to: Address,
    value: U256,
    data: Bytes,
}

impl Eip1559UnsignedTx {
    fn payload_length(&self) -> usize {
        self.chain_id.length()
            + self.nonce.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
            + EMPTY_ACCESS_LIST_RLP_LEN
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
        Header {
            list: true,
            payload_length: 0,
        }
        .encode(out);
    }
}

impl Encodable for Eip1559UnsignedTx {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + length_of_length(payload_length)
    }
}

struct Eip1559SignedTx<'a> {
    tx: &'a Eip1559UnsignedTx,
    y_parity: u8,
    r: U256,
    s: U256,
}

impl Eip1559SignedTx<'_> {
    fn payload_length(&self) -> usize {
        self.tx.payload_length() + self.y_parity.length() + self.r.length() + self.s.length()
    }
}

impl Encodable for Eip1559SignedTx<'_> {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.tx.encode_fields(out);
        self.y_parity.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + length_of_length(payload_length)
    }
}

fn parse_compact_signature(raw: &str) -> Result<[u8; 64], String> {
    let without_prefix = strip_hex_prefix(raw, "signature")?;
    if without_prefix.len() != 128 {
        return Err("signature must be 64 bytes (r||s)".to_string());
    }
    let mut out = [0u8; 64];
    hex::decode_to_slice(without_prefix, &mut out)
        .map_err(|error| format!("failed to decode signature: {error}"))?;
    Ok(out)
}

fn encode_eip1559_unsigned(tx: &Eip1559UnsignedTx) -> Vec<u8> {
    let payload = alloy_rlp::encode(tx);
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(0x02);
    out.extend_from_slice(&payload);
    out
}

fn encode_eip1559_signed(tx: &Eip1559UnsignedTx, y_parity: u8, r: U256, s: U256) -> Vec<u8> {
    let payload = alloy_rlp::encode(Eip1559SignedTx { tx, y_parity, r, s });
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(0x02);
    out.extend_from_slice(&payload);
    out
}

fn recover_y_parity(
    tx_hash: &B256,
    signature_compact: &[u8; 64],
    expected_address: Address,
) -> Result<u8, String> {
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    let signature = Signature::from_slice(signature_compact)
        .map_err(|error| format!("invalid compact signature bytes: {error}"))?;

    for candidate in [0u8, 1u8] {
        let Some(recovery_id) = RecoveryId::from_byte(candidate) else {
            continue;
        };
        let recovered =
            match VerifyingKey::recover_from_prehash(tx_hash.as_slice(), &signature, recovery_id) {
                Ok(key) => key,
                Err(_) => continue,
            };
        if address_from_verifying_key(&recovered) == expected_address {
            return Ok(candidate);
        }
    }

    Err(format!("failed to recover y_parity for signature by {expected_address}"))
}
