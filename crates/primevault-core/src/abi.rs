//! Contract bindings for the staking ledger, ERC-20 tokens and per-chain bridge executors,
//! plus builders turning them into [`Call`]s.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use chrono::{DateTime, Utc};

use crate::types::{is_native, Call, Receipt};

sol! {
    struct StakeInfo {
        address token;
        uint256 amount;
        uint256 stakedAt;
    }

    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    interface IStakingLedger {
        function stake(address token, uint256 amount) external payable;
        function withdraw(uint256 receiptId) external;
        function getStakes(address account) external view returns (StakeInfo[] memory);
    }

    interface IBridgeExecutor {
        function execute(bytes calldata data) external payable;
        function setLiFiDiamond(address diamond) external;
        function emergencyWithdraw(address token) external;
    }
}

impl From<StakeInfo> for Receipt {
    fn from(info: StakeInfo) -> Self {
        let secs = i64::try_from(info.stakedAt).unwrap_or(i64::MAX);
        Self {
            token: info.token,
            amount: info.amount,
            staked_at: DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default(),
        }
    }
}

pub fn approve_max(token: Address, spender: Address) -> Call {
    let data = IERC20::approveCall {
        spender,
        amount: U256::MAX,
    }
    .abi_encode();
    Call::new(token, data)
}

/// ERC-20 `transfer`, or a plain value transfer when `token` is native.
pub fn transfer(token: Address, to: Address, amount: U256) -> Call {
    if is_native(token) {
        return Call::native_transfer(to, amount);
    }
    Call::new(token, IERC20::transferCall { to, amount }.abi_encode())
}

/// `stake(token, amount)`; native stakes forward `amount` as value.
pub fn stake(ledger: Address, token: Address, amount: U256) -> Call {
    let call = Call::new(ledger, IStakingLedger::stakeCall { token, amount }.abi_encode());
    if is_native(token) {
        call.with_value(amount)
    } else {
        call
    }
}

pub fn withdraw(ledger: Address, receipt_id: u64) -> Call {
    let data = IStakingLedger::withdrawCall {
        receiptId: U256::from(receipt_id),
    }
    .abi_encode();
    Call::new(ledger, data)
}

pub fn bridge_execute(executor: Address, data: Bytes, value: U256) -> Call {
    Call::new(executor, IBridgeExecutor::executeCall { data }.abi_encode()).with_value(value)
}

pub fn set_lifi_diamond(executor: Address, diamond: Address) -> Call {
    Call::new(
        executor,
        IBridgeExecutor::setLiFiDiamondCall { diamond }.abi_encode(),
    )
}

pub fn emergency_withdraw(executor: Address, token: Address) -> Call {
    Call::new(
        executor,
        IBridgeExecutor::emergencyWithdrawCall { token }.abi_encode(),
    )
}
