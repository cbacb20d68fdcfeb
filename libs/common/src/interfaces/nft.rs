use alloy_sol_types::sol;

sol! {
    interface INft {
        function mint(address to, string memory tokenURI) external returns (uint256);

        function transferFrom(address from, address to, uint256 tokenId) external;
    }
}
