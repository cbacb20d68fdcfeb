//! Event store data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::contracts::ContractName;
use crate::normalize_address;

/// Version stamped into every record written by this build.
pub const INDEXER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `(transaction hash, log index)` - globally unique identity of a log.
pub type NaturalKey = (String, u64);

/// Normalized subset of decoded event arguments.
///
/// Addresses are lowercase, large integers are base-10 strings. Fields are
/// only ever filled, never overwritten, see [`NormalizedArgs::enrich`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
}

// Raw argument names feeding each normalized field, first match wins.
const FROM_ALIASES: &[&str] = &["from", "seller", "owner"];
const TO_ALIASES: &[&str] = &["to", "buyer", "spender"];
const USER_ALIASES: &[&str] = &["user", "voter", "proposer", "author"];
const TOKEN_ID_ALIASES: &[&str] = &["tokenId"];
const AMOUNT_ALIASES: &[&str] = &["amount", "value", "price", "weight"];
const PROPOSAL_ID_ALIASES: &[&str] = &["proposalId"];
const POST_ID_ALIASES: &[&str] = &["postId"];

impl NormalizedArgs {
    /// Build normalized arguments from a raw decoded argument map.
    pub fn extract(args: &Map<String, Value>) -> Self {
        let mut normalized = Self::default();
        normalized.enrich(args);
        normalized
    }

    /// Fill every empty field from `args`. Populated fields are left alone.
    pub fn enrich(&mut self, args: &Map<String, Value>) {
        fill(&mut self.from, args, FROM_ALIASES);
        fill(&mut self.to, args, TO_ALIASES);
        fill(&mut self.user, args, USER_ALIASES);
        fill(&mut self.token_id, args, TOKEN_ID_ALIASES);
        fill(&mut self.amount, args, AMOUNT_ALIASES);
        fill(&mut self.proposal_id, args, PROPOSAL_ID_ALIASES);
        fill(&mut self.post_id, args, POST_ID_ALIASES);
    }

    /// Addresses touched by the event (user, from, to), deduplicated.
    pub fn involved_addresses(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(3);
        for addr in [&self.user, &self.from, &self.to].into_iter().flatten() {
            if !out.contains(&addr.as_str()) {
                out.push(addr);
            }
        }
        out
    }

    /// True if `address` (already lowercase) appears as user, from or to.
    pub fn involves(&self, address: &str) -> bool {
        [&self.user, &self.from, &self.to]
            .into_iter()
            .flatten()
            .any(|a| a == address)
    }
}

fn fill(slot: &mut Option<String>, args: &Map<String, Value>, aliases: &[&str]) {
    if slot.is_some() {
        return;
    }
    *slot = aliases
        .iter()
        .filter_map(|name| args.get(*name))
        .find_map(stringify_arg);
}

fn stringify_arg(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if is_address(s) => Some(normalize_address(s)),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// One decoded on-chain log of a mirrored contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedEvent {
    pub contract_name: ContractName,
    /// Lowercase contract address
    pub contract_address: String,
    pub event_name: String,
    /// Canonical signature, e.g. `Staked(address,uint256,uint256)`
    pub event_signature: String,
    /// Raw decoded arguments keyed by ABI parameter name
    pub args: Map<String, Value>,
    #[serde(flatten)]
    pub normalized: NormalizedArgs,

    pub block_number: u64,
    pub block_hash: String,
    pub block_timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub transaction_index: u64,
    pub log_index: u64,
    pub chain_id: u64,
    pub network: String,

    pub processed: bool,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processing_error: Option<String>,

    pub indexed_at: DateTime<Utc>,
    pub indexer_version: String,
}

impl IndexedEvent {
    pub fn natural_key(&self) -> NaturalKey {
        (self.transaction_hash.clone(), self.log_index)
    }

    /// Flip the processed flag. Returns false if it was already set.
    pub fn mark_processed(&mut self, error: Option<String>, at: DateTime<Utc>) -> bool {
        if self.processed {
            return false;
        }
        self.processed = true;
        self.processed_at = Some(at);
        self.processing_error = error;
        true
    }
}

/// Query options for reading events back out of the store.
///
/// Serialized as part of query cache keys, so field order matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    pub contract_name: Option<ContractName>,
    pub event_name: Option<String>,
    pub user_address: Option<String>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: usize,
    pub skip: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            contract_name: None,
            event_name: None,
            user_address: None,
            from_block: None,
            to_block: None,
            from_date: None,
            to_date: None,
            limit: 50,
            skip: 0,
        }
    }
}

impl EventFilter {
    pub fn matches(&self, event: &IndexedEvent) -> bool {
        if let Some(contract) = self.contract_name {
            if event.contract_name != contract {
                return false;
            }
        }
        if let Some(name) = &self.event_name {
            if &event.event_name != name {
                return false;
            }
        }
        if let Some(user) = &self.user_address {
            if !event.normalized.involves(&normalize_address(user)) {
                return false;
            }
        }
        if self.from_block.is_some_and(|b| event.block_number < b) {
            return false;
        }
        if self.to_block.is_some_and(|b| event.block_number > b) {
            return false;
        }
        if self.from_date.is_some_and(|d| event.block_timestamp < d) {
            return false;
        }
        if self.to_date.is_some_and(|d| event.block_timestamp > d) {
            return false;
        }
        true
    }
}

/// Per contract/event activity of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBucket {
    pub contract_name: ContractName,
    pub event_name: String,
    pub count: u64,
    pub first_block: u64,
    pub last_block: u64,
    pub last_activity: DateTime<Utc>,
}

/// Per contract/event totals across the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEventCount {
    pub contract_name: ContractName,
    pub event_name: String,
    pub count: u64,
    pub min_block: u64,
    pub max_block: u64,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn event(contract: ContractName, name: &str, tx: &str, log_index: u64, block: u64) -> IndexedEvent {
        IndexedEvent {
            contract_name: contract,
            contract_address: "0x00000000000000000000000000000000000000aa".into(),
            event_name: name.into(),
            event_signature: format!("{}()", name),
            args: Map::new(),
            normalized: NormalizedArgs::default(),
            block_number: block,
            block_hash: format!("0xblock{}", block),
            block_timestamp: DateTime::from_timestamp(1_700_000_000 + block as i64, 0).unwrap(),
            transaction_hash: tx.into(),
            transaction_index: 0,
            log_index,
            chain_id: 137,
            network: "polygon".into(),
            processed: false,
            processed_at: None,
            processing_error: None,
            indexed_at: Utc::now(),
            indexer_version: INDEXER_VERSION.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_extract_normalizes_addresses_and_amounts() {
        let raw = args(json!({
            "from": "0xAbCdEf0000000000000000000000000000000001",
            "to": "0x00000000000000000000000000000000000000B2",
            "value": "1000000000000000000000"
        }));

        let normalized = NormalizedArgs::extract(&raw);
        assert_eq!(normalized.from.as_deref(), Some("0xabcdef0000000000000000000000000000000001"));
        assert_eq!(normalized.to.as_deref(), Some("0x00000000000000000000000000000000000000b2"));
        assert_eq!(normalized.amount.as_deref(), Some("1000000000000000000000"));
        assert!(normalized.user.is_none());
    }

    #[test]
    fn test_enrich_does_not_overwrite() {
        let mut normalized = NormalizedArgs {
            user: Some("0x1111111111111111111111111111111111111111".into()),
            ..Default::default()
        };

        normalized.enrich(&args(json!({
            "voter": "0x2222222222222222222222222222222222222222",
            "proposalId": "7"
        })));

        assert_eq!(normalized.user.as_deref(), Some("0x1111111111111111111111111111111111111111"));
        assert_eq!(normalized.proposal_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_alias_priority() {
        let normalized = NormalizedArgs::extract(&args(json!({
            "seller": "0x3333333333333333333333333333333333333333",
            "buyer": "0x4444444444444444444444444444444444444444",
            "price": "500",
            "tokenId": "9"
        })));

        assert_eq!(normalized.from.as_deref(), Some("0x3333333333333333333333333333333333333333"));
        assert_eq!(normalized.to.as_deref(), Some("0x4444444444444444444444444444444444444444"));
        assert_eq!(normalized.amount.as_deref(), Some("500"));
        assert_eq!(normalized.token_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_involved_addresses_dedup() {
        let normalized = NormalizedArgs {
            user: Some("0xaa".into()),
            from: Some("0xaa".into()),
            to: Some("0xbb".into()),
            ..Default::default()
        };
        assert_eq!(normalized.involved_addresses(), vec!["0xaa", "0xbb"]);
    }

    #[test]
    fn test_mark_processed_once() {
        let mut event = fixtures::event(ContractName::Token, "Transfer", "0xa", 0, 10);
        let now = Utc::now();

        assert!(event.mark_processed(None, now));
        assert!(!event.mark_processed(Some("late".into()), now));
        assert!(event.processing_error.is_none());
    }

    #[test]
    fn test_filter_matches_user_case_insensitive() {
        let mut event = fixtures::event(ContractName::Staking, "Staked", "0xa", 0, 10);
        event.normalized.user = Some("0xabc0000000000000000000000000000000000001".into());

        let filter = EventFilter {
            user_address: Some("0xABC0000000000000000000000000000000000001".into()),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        let filter = EventFilter {
            user_address: Some("0xdef0000000000000000000000000000000000001".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&event));
    }

    #[test]
    fn test_filter_block_range() {
        let event = fixtures::event(ContractName::Token, "Transfer", "0xa", 0, 100);
        let in_range = EventFilter {
            from_block: Some(100),
            to_block: Some(100),
            ..Default::default()
        };
        let after = EventFilter {
            from_block: Some(101),
            ..Default::default()
        };
        assert!(in_range.matches(&event));
        assert!(!after.matches(&event));
    }

    #[test]
    fn test_event_serialization_flattens_normalized() {
        let mut event = fixtures::event(ContractName::Token, "Transfer", "0xa", 0, 10);
        event.normalized.amount = Some("5".into());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["amount"], "5");
        assert_eq!(json["contractName"], "Token");

        let back: IndexedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
