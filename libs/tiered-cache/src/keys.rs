//! Key builders and the per-category TTL table.
//!
//! Keys follow `category:identifier[:subkey]`. Address-bearing keys are
//! lowercased so invalidation by address substring always matches.

use std::time::Duration;

/// Freshness policy per data category.
pub struct Ttl;

impl Ttl {
    /// Blocks and other immutable chain data
    pub const BLOCKCHAIN_DATA: Duration = Duration::from_secs(24 * 60 * 60);
    pub const CONTRACT_ADDRESS: Duration = Duration::from_secs(30 * 24 * 60 * 60);
    pub const NFT_METADATA: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    pub const GAS_PRICE: Duration = Duration::from_secs(15);
    pub const TOKEN_BALANCE: Duration = Duration::from_secs(30);
    pub const USER_PROFILE: Duration = Duration::from_secs(5 * 60);
    pub const FEED: Duration = Duration::from_secs(60);
    /// Indexed event query results
    pub const EVENTS_QUERY: Duration = Duration::from_secs(30);
    /// Per-user activity aggregates
    pub const USER_ACTIVITY: Duration = Duration::from_secs(5 * 60);
}

/// Cache key builders.
pub struct CacheKey;

impl CacheKey {
    pub fn block(chain_id: u64, number: u64) -> String {
        format!("block:{}:{}", chain_id, number)
    }

    pub fn contract_address(name: &str) -> String {
        format!("contract:{}", name)
    }

    pub fn nft_metadata(token_id: &str) -> String {
        format!("nft:{}", token_id)
    }

    pub fn gas_price(chain_id: u64) -> String {
        format!("gas:{}", chain_id)
    }

    pub fn token_balance(address: &str) -> String {
        format!("balance:{}", address.to_ascii_lowercase())
    }

    pub fn user_profile(address: &str) -> String {
        format!("user:{}", address.to_ascii_lowercase())
    }

    pub fn feed(address: &str) -> String {
        format!("feed:{}", address.to_ascii_lowercase())
    }

    /// `scope` is the contract name (or `all`), `hash` identifies the full
    /// option set of the query.
    pub fn events_query(scope: &str, hash: &str) -> String {
        format!("events:{}:{}", scope, hash)
    }

    /// Substring shared by every events query key of `scope`.
    pub fn events_scope(scope: &str) -> String {
        format!("events:{}:", scope)
    }

    pub fn user_activity(address: &str) -> String {
        format!("activity:user:{}", address.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_keys_are_lowercase() {
        let addr = "0xABCdef0000000000000000000000000000000001";
        assert_eq!(
            CacheKey::user_profile(addr),
            "user:0xabcdef0000000000000000000000000000000001"
        );
        assert!(CacheKey::user_activity(addr).contains("0xabcdef"));
    }

    #[test]
    fn test_events_query_key_carries_scope() {
        let key = CacheKey::events_query("Token", "deadbeef");
        assert!(key.contains(&CacheKey::events_scope("Token")));
        assert!(!key.contains(&CacheKey::events_scope("all")));
    }

    #[test]
    fn test_ttl_table() {
        assert_eq!(Ttl::BLOCKCHAIN_DATA.as_secs(), 86_400);
        assert_eq!(Ttl::CONTRACT_ADDRESS.as_secs(), 2_592_000);
        assert_eq!(Ttl::NFT_METADATA.as_secs(), 604_800);
        assert_eq!(Ttl::GAS_PRICE.as_secs(), 15);
        assert_eq!(Ttl::TOKEN_BALANCE.as_secs(), 30);
        assert_eq!(Ttl::USER_PROFILE.as_secs(), 300);
        assert_eq!(Ttl::FEED.as_secs(), 60);
    }
}
