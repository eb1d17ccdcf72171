//! Event log decoding for transaction receipts and historical log queries.
//!
//! Event interfaces are described by their human-readable Solidity signature,
//! e.g. `event Submission(uint256 indexed transactionId)`. Decoding produces a
//! [`ParsedEvent`] that keeps every declared parameter alongside its value.
use crate::domain::error::OrchestratorError;
use crate::domain::types::{LogEntry, LogQuery, TxReceipt};
use crate::features::chain::ChainClient;
use alloy_dyn_abi::{DynSolEvent, DynSolValue, EventExt, Specifier};
use alloy_json_abi::{Event, EventParam};
use alloy_primitives::{Address, Bytes, B256, U256};

const MAX_INDEXED_PARAMS: usize = 3;

/// A non-anonymous event declaration whose parameters all have distinct
/// names. Unnamed parameters are called `arg<N>` after their position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventInterface {
    event: Event,
}

impl EventInterface {
    pub fn parse(signature: &str) -> Result<Self, OrchestratorError> {
        let signature = signature.trim();
        let context = format!("event signature `{signature}`");
        let mut event = Event::parse(signature)
            .map_err(|error| OrchestratorError::decode(context.as_str(), error))?;
        if event.name.is_empty() {
            return Err(OrchestratorError::decode(context, "missing event name"));
        }
        if event.anonymous {
            return Err(OrchestratorError::decode(
                context,
                "anonymous events carry no topic to match",
            ));
        }

        for (index, param) in event.inputs.iter_mut().enumerate() {
            if param.name.is_empty() {
                param.name = format!("arg{index}");
            }
        }
        for (index, param) in event.inputs.iter().enumerate() {
            if event.inputs[..index]
                .iter()
                .any(|earlier| earlier.name == param.name)
            {
                return Err(OrchestratorError::decode(
                    context,
                    format!("duplicate parameter name `{}`", param.name),
                ));
            }
        }
        if event.inputs.iter().filter(|param| param.indexed).count() > MAX_INDEXED_PARAMS {
            return Err(OrchestratorError::decode(
                context,
                "an event may declare at most 3 indexed parameters",
            ));
        }

        Specifier::<DynSolEvent>::resolve(&event)
            .map_err(|error| OrchestratorError::decode(context.as_str(), error))?;
        Ok(Self { event })
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    pub fn inputs(&self) -> &[EventParam] {
        &self.event.inputs
    }

    pub const fn event(&self) -> &Event {
        &self.event
    }

    pub fn canonical_signature(&self) -> String {
        self.event.signature()
    }

    /// First topic of every log emitted for this event.
    pub fn topic(&self) -> B256 {
        self.event.selector()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedField {
    pub param: EventParam,
    pub value: DynSolValue,
}

/// A decoded event: one field per declared parameter, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedEvent {
    pub name: String,
    pub fields: Vec<ParsedField>,
}

impl ParsedEvent {
    pub fn names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|field| field.param.name.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ParsedField> {
        self.fields.iter().find(|field| field.param.name == name)
    }

    pub fn value(&self, name: &str) -> Result<&DynSolValue, OrchestratorError> {
        self.get(name).map(|field| &field.value).ok_or_else(|| {
            OrchestratorError::decode(
                format!("{}.{name}", self.name),
                "field is not declared by the event",
            )
        })
    }

    pub fn uint(&self, name: &str) -> Result<U256, OrchestratorError> {
        match self.value(name)? {
            DynSolValue::Uint(value, _) => Ok(*value),
            other => Err(self.type_mismatch(name, "uint", other)),
        }
    }

    pub fn address(&self, name: &str) -> Result<Address, OrchestratorError> {
        match self.value(name)? {
            DynSolValue::Address(value) => Ok(*value),
            other => Err(self.type_mismatch(name, "address", other)),
        }
    }

    pub fn string(&self, name: &str) -> Result<String, OrchestratorError> {
        match self.value(name)? {
            DynSolValue::String(value) => Ok(value.clone()),
            other => Err(self.type_mismatch(name, "string", other)),
        }
    }

    pub fn addresses(&self, name: &str) -> Result<Vec<Address>, OrchestratorError> {
        self.array(name)?
            .iter()
            .map(|item| match item {
                DynSolValue::Address(value) => Ok(*value),
                other => Err(self.type_mismatch(name, "address[]", other)),
            })
            .collect()
    }

    pub fn uints(&self, name: &str) -> Result<Vec<U256>, OrchestratorError> {
        self.array(name)?
            .iter()
            .map(|item| match item {
                DynSolValue::Uint(value, _) => Ok(*value),
                other => Err(self.type_mismatch(name, "uint[]", other)),
            })
            .collect()
    }

    pub fn strings(&self, name: &str) -> Result<Vec<String>, OrchestratorError> {
        self.array(name)?
            .iter()
            .map(|item| match item {
                DynSolValue::String(value) => Ok(value.clone()),
                other => Err(self.type_mismatch(name, "string[]", other)),
            })
            .collect()
    }

    pub fn bytes_list(&self, name: &str) -> Result<Vec<Bytes>, OrchestratorError> {
        self.array(name)?
            .iter()
            .map(|item| match item {
                DynSolValue::Bytes(value) => Ok(Bytes::copy_from_slice(value)),
                other => Err(self.type_mismatch(name, "bytes[]", other)),
            })
            .collect()
    }

    /// `name=value` pairs in declaration order, for audit logs.
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|field| format!("{}={}", field.param.name, render_value(&field.value)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn array(&self, name: &str) -> Result<&[DynSolValue], OrchestratorError> {
        match self.value(name)? {
            DynSolValue::Array(items) | DynSolValue::FixedArray(items) => Ok(items.as_slice()),
            other => Err(self.type_mismatch(name, "array", other)),
        }
    }

    fn type_mismatch(&self, name: &str, expected: &str, actual: &DynSolValue) -> OrchestratorError {
        OrchestratorError::decode(
            format!("{}.{name}", self.name),
            format!("expected {expected}, got {}", render_value(actual)),
        )
    }
}

/// Decode the first log of `receipt` whose topics contain the event topic.
pub fn decode_event_from_receipt(
    receipt: &TxReceipt,
    interface: &EventInterface,
) -> Result<ParsedEvent, OrchestratorError> {
    let topic = interface.topic();
    let log = receipt
        .logs
        .iter()
        .find(|log| log.topics.contains(&topic))
        .ok_or_else(|| OrchestratorError::EventNotFound {
            event: interface.name().to_string(),
            topic,
            tx_hash: receipt.tx_hash,
        })?;
    decode_log(log, interface)
}

pub fn decode_log(
    log: &LogEntry,
    interface: &EventInterface,
) -> Result<ParsedEvent, OrchestratorError> {
    let context = format!("{} log emitted by {}", interface.name(), log.address);
    let decoded = interface
        .event
        .decode_log_parts(log.topics.iter().copied(), &log.data, false)
        .map_err(|error| OrchestratorError::decode(context.as_str(), error))?;

    let mut indexed_values = decoded.indexed.into_iter();
    let mut body_values = decoded.body.into_iter();
    let mut fields = Vec::with_capacity(interface.inputs().len());
    for param in interface.inputs() {
        let value = (if param.indexed {
            indexed_values.next()
        } else {
            body_values.next()
        })
        .ok_or_else(|| {
            OrchestratorError::decode(context.as_str(), format!("missing value for {}", param.name))
        })?;
        fields.push(ParsedField {
            param: param.clone(),
            value,
        });
    }

    Ok(ParsedEvent {
        name: interface.name().to_string(),
        fields,
    })
}

/// Fetch and decode every historical `interface` log emitted by `address`.
pub async fn query_events<C>(
    client: &C,
    address: Address,
    interface: &EventInterface,
    from_block: u64,
    to_block: Option<u64>,
) -> Result<Vec<ParsedEvent>, OrchestratorError>
where
    C: ChainClient + ?Sized,
{
    let query = LogQuery {
        address,
        topic0: interface.topic(),
        from_block,
        to_block,
    };
    let logs = client.get_logs(&query).await.map_err(|reason| {
        let operation = format!("eth_getLogs for {} on {address}", interface.name());
        OrchestratorError::chain_call(operation, reason)
    })?;
    logs.iter().map(|log| decode_log(log, interface)).collect()
}

pub fn render_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(flag) => flag.to_string(),
        DynSolValue::Int(number, _) => number.to_string(),
        DynSolValue::Uint(number, _) => number.to_string(),
        DynSolValue::FixedBytes(word, size) => {
            format!("0x{}", hex::encode(&word.as_slice()[..(*size).min(32)]))
        }
        DynSolValue::Address(address) => address.to_string(),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::String(text) => text.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => format!(
            "[{}]",
            items.iter().map(render_value).collect::<Vec<_>>().join(", ")
        ),
        DynSolValue::Tuple(items) => format!(
            "({})",
            items.iter().map(render_value).collect::<Vec<_>>().join(", ")
        ),
        other => format!("{other:?}"),
    }
}
