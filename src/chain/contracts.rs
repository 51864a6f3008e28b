use ethers::contract::abigen;

abigen!(
    FeeToken,
    r#"[
        function approve(address spender, uint256 amount) returns (bool)
        function allowance(address owner, address spender) view returns (uint256)
        function balanceOf(address account) view returns (uint256)
    ]"#
);

abigen!(
    BattleArena,
    r#"[
        function settle(uint256 stakeId, uint256 hp, uint256 attack, bytes32[] proof)
        function isConsumed(uint256 stakeId) view returns (bool)
        event SettlementCompleted(address indexed player, uint256 indexed stakeId, bool won)
    ]"#
);

abigen!(
    AuxiliaryToken,
    r#"[
        function mint()
        function hasMinted(address account) view returns (bool)
    ]"#
);
