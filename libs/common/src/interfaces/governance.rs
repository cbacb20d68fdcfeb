use alloy_sol_types::sol;

sol! {
    interface IGovernance {
        function castVote(uint256 proposalId, bool support) external;
    }
}
