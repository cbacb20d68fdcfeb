//! Call interfaces of the mirrored contracts, used to encode outgoing transactions.

pub mod content_registry;
pub mod governance;
pub mod marketplace;
pub mod nft;
pub mod staking;
pub mod token;

#[cfg(test)]
mod tests {
    use alloy_sol_types::SolCall;

    use super::*;

    #[test]
    fn test_call_signatures() {
        assert_eq!(staking::IStaking::stakeForCall::SIGNATURE, "stakeFor(address,uint256,uint256)");
        assert_eq!(governance::IGovernance::castVoteCall::SIGNATURE, "castVote(uint256,bool)");
        assert_eq!(nft::INft::mintCall::SIGNATURE, "mint(address,string)");
        assert_eq!(token::IToken::transferCall::SELECTOR, [0xa9, 0x05, 0x9c, 0xbb]);
    }
}
