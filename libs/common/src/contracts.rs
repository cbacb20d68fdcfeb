//! Mirrored contracts and their event ABIs.
//!
//! Each contract is described by the human-readable Solidity signatures of
//! the events it emits. The indexer builds its decoders from these strings,
//! so adding an event here is enough to have it mirrored.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of contracts whose events are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContractName {
    ContentRegistry,
    Token,
    Staking,
    Governance,
    Nft,
    Marketplace,
}

impl ContractName {
    /// All contracts, in initialization order.
    pub const ALL: [ContractName; 6] = [
        ContractName::ContentRegistry,
        ContractName::Token,
        ContractName::Staking,
        ContractName::Governance,
        ContractName::Nft,
        ContractName::Marketplace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractName::ContentRegistry => "ContentRegistry",
            ContractName::Token => "Token",
            ContractName::Staking => "Staking",
            ContractName::Governance => "Governance",
            ContractName::Nft => "Nft",
            ContractName::Marketplace => "Marketplace",
        }
    }

    /// Environment variable holding the deployed address of this contract.
    pub fn address_env_var(&self) -> &'static str {
        match self {
            ContractName::ContentRegistry => "CONTENT_REGISTRY_ADDRESS",
            ContractName::Token => "TOKEN_ADDRESS",
            ContractName::Staking => "STAKING_ADDRESS",
            ContractName::Governance => "GOVERNANCE_ADDRESS",
            ContractName::Nft => "NFT_ADDRESS",
            ContractName::Marketplace => "MARKETPLACE_ADDRESS",
        }
    }

    /// Human-readable event signatures emitted by this contract.
    pub fn event_abi(&self) -> &'static [&'static str] {
        match self {
            ContractName::ContentRegistry => &[
                "event ContentSubmitted(uint256 indexed postId, address indexed user, string contentHash)",
                "event ContentValidated(uint256 indexed postId, bool approved, uint256 score)",
                "event ContentRewarded(uint256 indexed postId, address indexed user, uint256 amount)",
            ],
            ContractName::Token => &[
                "event Transfer(address indexed from, address indexed to, uint256 value)",
                "event Approval(address indexed owner, address indexed spender, uint256 value)",
            ],
            ContractName::Staking => &[
                "event Staked(address indexed user, uint256 indexed poolId, uint256 amount)",
                "event Unstaked(address indexed user, uint256 indexed poolId, uint256 amount)",
                "event RewardsClaimed(address indexed user, uint256 indexed poolId, uint256 amount)",
            ],
            ContractName::Governance => &[
                "event ProposalCreated(uint256 indexed proposalId, address indexed proposer, string description)",
                "event VoteCast(uint256 indexed proposalId, address indexed voter, bool support, uint256 weight)",
                "event ProposalExecuted(uint256 indexed proposalId)",
            ],
            ContractName::Nft => &[
                "event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)",
                "event Minted(address indexed to, uint256 indexed tokenId, string tokenURI)",
            ],
            ContractName::Marketplace => &[
                "event Listed(uint256 indexed tokenId, address indexed seller, uint256 price)",
                "event Sold(uint256 indexed tokenId, address indexed seller, address indexed buyer, uint256 price)",
                "event ListingCancelled(uint256 indexed tokenId, address indexed seller)",
            ],
        }
    }

    /// Event names tracked by default: every event in the ABI.
    pub fn default_tracked_events(&self) -> Vec<String> {
        self.event_abi()
            .iter()
            .filter_map(|sig| event_name_of(sig))
            .map(str::to_string)
            .collect()
    }
}

/// Extract `Name` from `event Name(...)`.
fn event_name_of(signature: &str) -> Option<&str> {
    let rest = signature.trim().strip_prefix("event ")?;
    let end = rest.find('(')?;
    Some(rest[..end].trim())
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a contract name that is not configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown contract: {0}")]
pub struct UnknownContract(pub String);

impl FromStr for ContractName {
    type Err = UnknownContract;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractName::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownContract(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tracked_events() {
        let events = ContractName::Staking.default_tracked_events();
        assert_eq!(events, vec!["Staked", "Unstaked", "RewardsClaimed"]);
    }

    #[test]
    fn test_every_contract_has_events() {
        for contract in ContractName::ALL {
            assert!(
                !contract.default_tracked_events().is_empty(),
                "{} has no events",
                contract
            );
        }
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("staking".parse::<ContractName>().unwrap(), ContractName::Staking);
        assert_eq!("NFT".parse::<ContractName>().unwrap(), ContractName::Nft);
        assert!("Vault".parse::<ContractName>().is_err());
    }

    #[test]
    fn test_serde_uses_variant_name() {
        let json = serde_json::to_string(&ContractName::ContentRegistry).unwrap();
        assert_eq!(json, "\"ContentRegistry\"");
    }
}
