use alloy_sol_types::sol;

sol! {
    interface IStaking {
        function stake(uint256 poolId, uint256 amount) external;

        function unstake(uint256 poolId, uint256 amount) external;

        // Relayed on behalf of a user
        function stakeFor(address user, uint256 poolId, uint256 amount) external;

        function unstakeFor(address user, uint256 poolId, uint256 amount) external;

        function claimRewards(uint256 poolId) external;
    }
}
