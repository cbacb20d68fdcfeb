use alloy_sol_types::sol;

sol! {
    interface IContentRegistry {
        function submitContent(string memory contentHash, string memory metadataURI) external returns (uint256);
    }
}
