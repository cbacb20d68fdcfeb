//! Chain id to network name lookup.

/// Chain id used when none is configured (Polygon PoS).
pub const DEFAULT_CHAIN_ID: u64 = 137;

/// Resolve a human-readable network name for a chain id.
///
/// Only the networks this deployment talks to are named; everything else is
/// reported as `testnet`.
pub fn network_name(chain_id: u64) -> &'static str {
    match chain_id {
        1 => "ethereum",
        137 => "polygon",
        80002 => "polygon-amoy",
        1337 | 31337 => "localhost",
        _ => "testnet",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_networks() {
        assert_eq!(network_name(1), "ethereum");
        assert_eq!(network_name(DEFAULT_CHAIN_ID), "polygon");
        assert_eq!(network_name(31337), "localhost");
    }

    #[test]
    fn test_unknown_network_is_testnet() {
        assert_eq!(network_name(11155111), "testnet");
    }
}
