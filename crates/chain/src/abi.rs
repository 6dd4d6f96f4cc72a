use alloy::sol;

// ─── ERC20Votes Delegation Events ───────────────────────────────────────────
sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    contract ERC20Votes {
        event DelegateChanged(
            address indexed delegator,
            address indexed fromDelegate,
            address indexed toDelegate
        );
        event DelegateVotesChanged(
            address indexed delegate,
            uint256 previousBalance,
            uint256 newBalance
        );
    }
}
