// src/contracts.rs
use ethers::abi::AbiEncode;
use ethers::prelude::abigen;
use ethers::types::{Address, Bytes, U256};

abigen!(
    Erc20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
    ]"#,
);

abigen!(
    SimpleAccount,
    r#"[
        function execute(address dest, uint256 value, bytes func) external
    ]"#,
);

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
    ]"#,
);

/// SimpleAccount placeholder signature used while the bundler simulates the operation.
pub const DUMMY_SIGNATURE: &str = "0xfffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c";

/// Calldata for `transfer(address,uint256)` on an ERC-20 token.
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    TransferCall { to, amount }.encode().into()
}

/// Calldata for `SimpleAccount.execute`, wrapping the inner call.
pub fn encode_execute(dest: Address, value: U256, func: Bytes) -> Bytes {
    ExecuteCall { dest, value, func }.encode().into()
}
