use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{SolCall, SolEvent, sol};

sol! {
    /// The slice of the Uniswap V2 pair interface the reserve store depends on.
    interface IUniswapV2Pair {
        event Sync(uint112 reserve0, uint112 reserve1);

        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }

    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Every reserve is kept at this many fractional digits.
pub const NORMALIZED_DECIMALS: u8 = 18;

/// Topic0 of `Sync(uint112,uint112)`, emitted by the pair on every reserve change.
pub const SYNC_TOPIC: B256 = IUniswapV2Pair::Sync::SIGNATURE_HASH;

/// Topic0 of ERC20 `Transfer(address,address,uint256)`; sender and recipient are topics 1 and 2.
pub const TRANSFER_TOPIC: B256 = IERC20::Transfer::SIGNATURE_HASH;

/// 0.1 token at 18 decimals, the trial amount for the cheap profitability pre-filter.
pub const DEFAULT_MIN_AMOUNT_IN: U256 = U256::from_limbs([100_000_000_000_000_000, 0, 0, 0]);

/// 0.001 token at 18 decimals.
pub const DEFAULT_MIN_PROFIT: U256 = U256::from_limbs([1_000_000_000_000_000, 0, 0, 0]);

/// Calldata of `getReserves()`.
pub fn get_reserves_calldata() -> Bytes {
    IUniswapV2Pair::getReservesCall {}.abi_encode().into()
}

pub fn balance_of_calldata(owner: Address) -> Bytes {
    IERC20::balanceOfCall { owner }.abi_encode().into()
}
