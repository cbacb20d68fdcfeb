use alloy_sol_types::sol;

sol! {
    interface IToken {
        function transfer(address to, uint256 amount) external returns (bool);

        function balanceOf(address account) external view returns (uint256);
    }
}
