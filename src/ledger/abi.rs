//! Minimal ABI of the BangerArenas settlement contract.
//!
//! Only the calls the worker and the inspect binary make are declared.
//! Betting and claiming happen from user wallets and are not bound here.

use alloy::sol;

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    interface IBangerArenas {
        function getArena(uint256 arenaId)
            external
            view
            returns (
                uint256 totalYesStake,
                uint256 totalNoStake,
                bool resolved,
                bool outcomeYes,
                bool exists
            );

        function getUserStake(uint256 arenaId, address user)
            external
            view
            returns (uint256 yesStake, uint256 noStake, bool hasClaimed);

        function previewPayout(
            uint256 userStake,
            uint256 winnerTotal,
            uint256 totalYesStake,
            uint256 totalNoStake
        ) external pure returns (uint256);

        function oracle() external view returns (address);

        function resolveArena(uint256 arenaId, bool outcomeYes) external;
    }
}
