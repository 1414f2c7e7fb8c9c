// src/error.rs
use ethers::types::H256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    InvalidConfig { var: &'static str, reason: String },

    #[error("Invalid transfer amount: {0}")]
    InvalidAmount(String),

    #[error("Chain id mismatch: expected {expected}, RPC reports {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("No contract deployed at smart account address {0:?}")]
    AccountNotDeployed(ethers::types::Address),

    #[error("Chain RPC error: {0}")]
    Chain(String),

    #[error("Bundler error: {0}")]
    Bundler(String),

    #[error("Failed to sign user operation: {0}")]
    Signing(String),

    #[error("User operation {user_op_hash:?} reverted: {reason}")]
    OperationReverted { user_op_hash: H256, reason: String },

    #[error("Timed out waiting for receipt of user operation {0:?}")]
    ReceiptTimeout(H256),

    #[error("Failed to write report: {0}")]
    Output(#[from] std::io::Error),
}

impl TransferError {
    /// Process exit status for this failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            TransferError::MissingEnv(_)
            | TransferError::InvalidConfig { .. }
            | TransferError::InvalidAmount(_) => 2,
            TransferError::ChainMismatch { .. }
            | TransferError::AccountNotDeployed(_)
            | TransferError::Chain(_)
            | TransferError::Bundler(_) => 3,
            TransferError::Signing(_) => 4,
            TransferError::OperationReverted { .. } => 5,
            TransferError::ReceiptTimeout(_) => 6,
            TransferError::Output(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_failures_share_an_exit_code() {
        assert_eq!(TransferError::MissingEnv("BUNDLER_URL").exit_code(), 2);
        assert_eq!(
            TransferError::InvalidConfig { var: "RECIPIENT_ADDRESS", reason: "bad".into() }
                .exit_code(),
            2
        );
        assert_eq!(TransferError::InvalidAmount("-1".into()).exit_code(), 2);
    }

    #[test]
    fn operation_outcomes_are_distinguishable() {
        let reverted =
            TransferError::OperationReverted { user_op_hash: H256::zero(), reason: "AA21".into() };
        let timeout = TransferError::ReceiptTimeout(H256::zero());
        assert_ne!(reverted.exit_code(), timeout.exit_code());
        assert_ne!(reverted.exit_code(), TransferError::Bundler("rejected".into()).exit_code());
    }

    #[test]
    fn messages_name_the_variable() {
        let err = TransferError::MissingEnv("PIMLICO_API_KEY");
        assert_eq!(err.to_string(), "Missing environment variable: PIMLICO_API_KEY");
    }
}
