//! Per-contract log decoding.
//!
//! Each [`ContractDecoder`] is built from a contract's human-readable event
//! signatures and maps `topic0` to the matching event. Logs that fail to
//! decode are foreign events or signature mismatches and are skipped.

use std::collections::{HashMap, HashSet};

use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::Event;
use alloy::primitives::{Address, LogData, B256};
use common::ContractName;
use serde_json::{Map, Value};

use crate::error::IndexerError;
use crate::provider::RawLog;

/// A successfully decoded, tracked log.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub name: String,
    /// Canonical signature, e.g. `Transfer(address,address,uint256)`
    pub signature: String,
    pub args: Map<String, Value>,
}

/// Decoder bound to one contract's ABI and tracked event names.
#[derive(Debug, Clone)]
pub struct ContractDecoder {
    contract: ContractName,
    address: Address,
    events: HashMap<B256, Event>,
    tracked: HashSet<String>,
}

impl ContractDecoder {
    pub fn new(
        contract: ContractName,
        address: Address,
        abi: &[&str],
        tracked: &[String],
    ) -> Result<Self, IndexerError> {
        let mut events = HashMap::new();
        for signature in abi {
            let event = Event::parse(signature).map_err(|e| IndexerError::InvalidAbi {
                contract,
                reason: format!("{}: {}", signature, e),
            })?;
            events.insert(event.selector(), event);
        }

        Ok(Self {
            contract,
            address,
            events,
            tracked: tracked.iter().cloned().collect(),
        })
    }

    /// Decoder for a contract using its built-in ABI table.
    pub fn for_contract(
        contract: ContractName,
        address: Address,
        tracked: &[String],
    ) -> Result<Self, IndexerError> {
        Self::new(contract, address, contract.event_abi(), tracked)
    }

    pub fn contract(&self) -> ContractName {
        self.contract
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Decode `log`, returning `None` for untracked, foreign or malformed logs.
    pub fn decode(&self, log: &RawLog) -> Option<DecodedLog> {
        let topic0 = log.topics.first()?;
        let event = self.events.get(topic0)?;
        if !self.tracked.contains(&event.name) {
            return None;
        }

        let data = LogData::new(log.topics.clone(), log.data.clone())?;
        let decoded = match event.decode_log(&data) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(
                    contract = %self.contract,
                    event = %event.name,
                    error = %e,
                    "Skipping log that does not match event signature"
                );
                return None;
            }
        };

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut args = Map::new();
        for (position, input) in event.inputs.iter().enumerate() {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            }?;
            let name = if input.name.is_empty() {
                position.to_string()
            } else {
                input.name.clone()
            };
            args.insert(name, to_json(&value));
        }

        Some(DecodedLog {
            name: event.name.clone(),
            signature: event.signature(),
            args,
        })
    }
}

/// JSON form of a decoded value: lowercase hex addresses, decimal integers,
/// `0x` hex bytes.
pub fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::Address(a) => Value::String(format!("0x{}", hex::encode(a.as_slice()))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U256};
    use alloy::sol;
    use alloy::sol_types::SolEvent;

    sol! {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Staked(address indexed user, uint256 indexed poolId, uint256 amount);
    }

    const TOKEN: Address = address!("00000000000000000000000000000000000000aa");

    fn raw(data: LogData) -> RawLog {
        RawLog {
            address: TOKEN,
            topics: data.topics().to_vec(),
            data: data.data.clone(),
            block_number: Some(10),
            block_hash: Some(B256::repeat_byte(1)),
            transaction_hash: Some(B256::repeat_byte(2)),
            transaction_index: Some(0),
            log_index: Some(0),
            removed: false,
        }
    }

    fn token_decoder(tracked: &[&str]) -> ContractDecoder {
        let tracked: Vec<String> = tracked.iter().map(|s| s.to_string()).collect();
        ContractDecoder::for_contract(ContractName::Token, TOKEN, &tracked).unwrap()
    }

    #[test]
    fn test_decode_transfer() {
        let event = Transfer {
            from: address!("abcdef0000000000000000000000000000000001"),
            to: address!("00000000000000000000000000000000000000b2"),
            value: U256::from(1_000u64),
        };
        let decoder = token_decoder(&["Transfer"]);

        let decoded = decoder.decode(&raw(event.encode_log_data())).unwrap();
        assert_eq!(decoded.name, "Transfer");
        assert_eq!(decoded.signature, "Transfer(address,address,uint256)");
        assert_eq!(decoded.args["from"], "0xabcdef0000000000000000000000000000000001");
        assert_eq!(decoded.args["to"], "0x00000000000000000000000000000000000000b2");
        assert_eq!(decoded.args["value"], "1000");
    }

    #[test]
    fn test_untracked_event_skipped() {
        let event = Transfer {
            from: Address::ZERO,
            to: Address::ZERO,
            value: U256::from(1u64),
        };
        let decoder = token_decoder(&["Approval"]);
        assert!(decoder.decode(&raw(event.encode_log_data())).is_none());
    }

    #[test]
    fn test_foreign_event_skipped() {
        let event = Staked {
            user: Address::ZERO,
            poolId: U256::ZERO,
            amount: U256::from(5u64),
        };
        let decoder = token_decoder(&["Transfer", "Approval"]);
        assert!(decoder.decode(&raw(event.encode_log_data())).is_none());
    }

    #[test]
    fn test_signature_mismatch_skipped() {
        // same topic0 as the ERC-20 Transfer but with tokenId indexed
        let mut log = raw(
            Transfer {
                from: Address::ZERO,
                to: Address::ZERO,
                value: U256::from(1u64),
            }
            .encode_log_data(),
        );
        log.topics.push(B256::ZERO);
        log.data = Default::default();

        let decoder = token_decoder(&["Transfer"]);
        assert!(decoder.decode(&log).is_none());
    }

    #[test]
    fn test_invalid_abi_rejected() {
        let err = ContractDecoder::new(ContractName::Token, TOKEN, &["event Broken(uint256"], &[])
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidAbi { .. }));
    }
}
