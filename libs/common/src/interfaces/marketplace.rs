use alloy_sol_types::sol;

sol! {
    interface IMarketplace {
        function list(uint256 tokenId, uint256 price) external;
    }
}
