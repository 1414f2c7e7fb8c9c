// src/config.rs
use std::fmt;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;

use crate::account::ARBITRUM_ONE_CHAIN_ID;
use crate::bundler::bundler_endpoint;
use crate::error::TransferError;

pub const BUNDLER_URL: &str = "BUNDLER_URL";
pub const PIMLICO_API_KEY: &str = "PIMLICO_API_KEY";
pub const ARBITRUM_RPC_URL: &str = "ARBITRUM_RPC_URL";
pub const OWNER_PRIVATE_KEY: &str = "OWNER_PRIVATE_KEY";
pub const ENTRYPOINT_ADDRESS: &str = "ENTRYPOINT_ADDRESS";
pub const SIMPLEACCOUNT_ADDRESS: &str = "SIMPLEACCOUNT_ADDRESS";
pub const RECIPIENT_ADDRESS: &str = "RECIPIENT_ADDRESS";
pub const TESTTOKEN_ADDRESS: &str = "TESTTOKEN_ADDRESS";

/// Everything the run needs from the environment. Nothing has a default.
pub struct Config {
    pub bundler_url: String,
    pub api_key: String,
    pub rpc_url: String,
    pub owner: LocalWallet,
    pub entry_point: Address,
    pub smart_account: Address,
    pub recipient: Address,
    pub token: Address,
}

impl Config {
    pub fn from_env() -> Result<Self, TransferError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads every variable before parsing any of them, so a missing one is
    /// reported before a malformed one.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TransferError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(TransferError::MissingEnv(name))
        };

        let bundler_url = require(BUNDLER_URL)?;
        let api_key = require(PIMLICO_API_KEY)?;
        let rpc_url = require(ARBITRUM_RPC_URL)?;
        let owner_key = require(OWNER_PRIVATE_KEY)?;
        let entry_point = require(ENTRYPOINT_ADDRESS)?;
        let smart_account = require(SIMPLEACCOUNT_ADDRESS)?;
        let recipient = require(RECIPIENT_ADDRESS)?;
        let token = require(TESTTOKEN_ADDRESS)?;

        let owner = owner_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| TransferError::InvalidConfig {
                var: OWNER_PRIVATE_KEY,
                reason: e.to_string(),
            })?
            .with_chain_id(ARBITRUM_ONE_CHAIN_ID);

        Ok(Self {
            bundler_url,
            api_key,
            rpc_url,
            owner,
            entry_point: parse_address(ENTRYPOINT_ADDRESS, &entry_point)?,
            smart_account: parse_address(SIMPLEACCOUNT_ADDRESS, &smart_account)?,
            recipient: parse_address(RECIPIENT_ADDRESS, &recipient)?,
            token: parse_address(TESTTOKEN_ADDRESS, &token)?,
        })
    }

    pub fn bundler_endpoint(&self) -> String {
        bundler_endpoint(&self.bundler_url, &self.api_key)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bundler_url", &self.bundler_url)
            .field("api_key", &"<redacted>")
            .field("rpc_url", &self.rpc_url)
            .field("owner", &self.owner.address())
            .field("entry_point", &self.entry_point)
            .field("smart_account", &self.smart_account)
            .field("recipient", &self.recipient)
            .field("token", &self.token)
            .finish()
    }
}

fn parse_address(var: &'static str, value: &str) -> Result<Address, TransferError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| TransferError::InvalidConfig { var, reason: e.to_string() })
}
