// src/runner.rs
use std::io::Write;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use ethers::utils::{parse_units, ParseUnits};
use tracing::info;

use crate::contracts::encode_transfer;
use crate::error::TransferError;
use crate::types::{Call, GasPriceQuote};

/// Source of current fee recommendations.
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn user_operation_gas_price(&self) -> Result<GasPriceQuote, TransferError>;
}

/// Submits a call on behalf of the smart account and returns the resulting hash.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send_transaction(&self, call: Call) -> Result<H256, TransferError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
}

/// Converts a decimal amount into token base units, rejecting negative values.
pub fn token_amount(amount: &str, decimals: u32) -> Result<U256, TransferError> {
    match parse_units(amount, decimals) {
        Ok(ParseUnits::U256(value)) => Ok(value),
        Ok(ParseUnits::I256(_)) => Err(TransferError::InvalidAmount(format!(
            "{} is negative",
            amount
        ))),
        Err(e) => Err(TransferError::InvalidAmount(format!("{}: {}", amount, e))),
    }
}

/// Fetches fees, dispatches the transfer and reports both on `out`.
pub async fn run<G, D, W>(
    transfer: &Transfer,
    oracle: &G,
    dispatcher: &D,
    out: &mut W,
) -> Result<H256, TransferError>
where
    G: GasOracle + ?Sized,
    D: Dispatcher + ?Sized,
    W: Write,
{
    let prices = oracle.user_operation_gas_price().await?;
    writeln!(out, "Gas prices: {}", prices)?;

    let call = Call {
        to: transfer.token,
        data: encode_transfer(transfer.recipient, transfer.amount),
        value: U256::zero(),
        max_fee_per_gas: prices.standard.max_fee_per_gas,
        max_priority_fee_per_gas: prices.standard.max_priority_fee_per_gas,
    };
    info!(
        "Transferring {} base units of token {:?} to {:?}",
        transfer.amount, transfer.token, transfer.recipient
    );

    let tx_hash = dispatcher.send_transaction(call).await?;
    writeln!(out, "UserOperation sent, transaction hash: {:?}", tx_hash)?;
    Ok(tx_hash)
}
