// src/account.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use tracing::{debug, info, warn};

use crate::bundler::BundlerClient;
use crate::contracts::{encode_execute, EntryPoint, DUMMY_SIGNATURE};
use crate::error::TransferError;
use crate::runner::Dispatcher;
use crate::types::{Call, UserOperation, UserOperationReceipt};

pub const ARBITRUM_ONE_CHAIN_ID: u64 = 42161;

/// A deployed SimpleAccount (entry point v0.6) controlled by a local owner key.
pub struct SimpleAccount<M> {
    client: Arc<M>,
    owner: LocalWallet,
    entry_point: Address,
    address: Address,
    chain_id: u64,
}

impl<M: Middleware + 'static> SimpleAccount<M> {
    /// Binds the owner key to an existing account after checking the chain and the deployment.
    pub async fn resolve(
        client: Arc<M>,
        owner: LocalWallet,
        entry_point: Address,
        address: Address,
    ) -> Result<Self, TransferError> {
        let chain_id = client.get_chainid().await.map_err(chain_error)?.as_u64();
        if chain_id != ARBITRUM_ONE_CHAIN_ID {
            return Err(TransferError::ChainMismatch {
                expected: ARBITRUM_ONE_CHAIN_ID,
                actual: chain_id,
            });
        }

        // Factory deployment is out of reach here, so init code is always empty.
        let code = client.get_code(address, None).await.map_err(chain_error)?;
        if code.is_empty() {
            return Err(TransferError::AccountNotDeployed(address));
        }

        info!(
            "Resolved smart account {:?} owned by {:?} on chain {}",
            address,
            owner.address(),
            chain_id
        );

        Ok(Self {
            client,
            owner: owner.with_chain_id(chain_id),
            entry_point,
            address,
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub fn owner(&self) -> Address {
        self.owner.address()
    }

    pub async fn nonce(&self) -> Result<U256, TransferError> {
        EntryPoint::new(self.entry_point, self.client.clone())
            .get_nonce(self.address, U256::zero())
            .call()
            .await
            .map_err(chain_error)
    }

    pub fn user_operation_hash(&self, user_op: &UserOperation) -> H256 {
        user_op.hash(self.entry_point, self.chain_id)
    }

    /// Personal-sign of the user operation hash, as SimpleAccount validates it.
    pub async fn sign(&self, user_op: &UserOperation) -> Result<Bytes, TransferError> {
        let hash = self.user_operation_hash(user_op);
        let signature = self
            .owner
            .sign_message(hash.as_bytes())
            .await
            .map_err(|e| TransferError::Signing(e.to_string()))?;
        Ok(Bytes::from(signature.to_vec()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Sends calls from a smart account by way of the bundler.
pub struct SmartAccountClient<M> {
    account: SimpleAccount<M>,
    bundler: Arc<BundlerClient>,
    sponsor: bool,
    polling: ReceiptPolling,
}

impl<M: Middleware + 'static> SmartAccountClient<M> {
    pub fn new(
        account: SimpleAccount<M>,
        bundler: Arc<BundlerClient>,
        sponsor: bool,
        polling: ReceiptPolling,
    ) -> Self {
        Self { account, bundler, sponsor, polling }
    }

    async fn build_user_operation(&self, call: Call) -> Result<UserOperation, TransferError> {
        let nonce = self.account.nonce().await?;
        let dummy_signature = DUMMY_SIGNATURE
            .parse::<Bytes>()
            .map_err(|e| TransferError::Signing(e.to_string()))?;

        let mut user_op = UserOperation {
            sender: self.account.address(),
            nonce,
            init_code: Bytes::default(),
            call_data: encode_execute(call.to, call.value, call.data),
            max_fee_per_gas: call.max_fee_per_gas,
            max_priority_fee_per_gas: call.max_priority_fee_per_gas,
            signature: dummy_signature,
            ..Default::default()
        };

        let entry_point = self.account.entry_point();
        if self.sponsor {
            let sponsorship = self.bundler.sponsor(&user_op, entry_point).await?;
            debug!("Paymaster sponsorship: {:?}", sponsorship);
            user_op.paymaster_and_data = sponsorship.paymaster_and_data;
            user_op.pre_verification_gas = sponsorship.pre_verification_gas;
            user_op.verification_gas_limit = sponsorship.verification_gas_limit;
            user_op.call_gas_limit = sponsorship.call_gas_limit;
        } else {
            let estimate = self.bundler.estimate_gas(&user_op, entry_point).await?;
            debug!("Gas estimate: {:?}", estimate);
            user_op.pre_verification_gas = estimate.pre_verification_gas;
            user_op.verification_gas_limit = estimate.verification_gas_limit;
            user_op.call_gas_limit = estimate.call_gas_limit;
        }

        user_op.signature = self.account.sign(&user_op).await?;
        debug!("Signed user operation: {}", serde_json::to_string(&user_op).unwrap_or_default());
        Ok(user_op)
    }

    async fn poll_receipt(&self, user_op_hash: H256) -> Result<UserOperationReceipt, TransferError> {
        loop {
            if let Some(receipt) = self.bundler.receipt(user_op_hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(self.polling.interval).await;
        }
    }

    async fn wait_for_receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<UserOperationReceipt, TransferError> {
        match tokio::time::timeout(self.polling.timeout, self.poll_receipt(user_op_hash)).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::ReceiptTimeout(user_op_hash)),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> Dispatcher for SmartAccountClient<M> {
    async fn send_transaction(&self, call: Call) -> Result<H256, TransferError> {
        let user_op = self.build_user_operation(call).await?;
        let expected_hash = self.account.user_operation_hash(&user_op);

        let user_op_hash = self.bundler.send(&user_op, self.account.entry_point()).await?;
        if user_op_hash != expected_hash {
            warn!(
                "Bundler returned user operation hash {:?}, computed {:?}",
                user_op_hash, expected_hash
            );
        }
        info!("Submitted user operation {:?}, waiting for inclusion", user_op_hash);

        let receipt = self.wait_for_receipt(user_op_hash).await?;
        if !receipt.success {
            return Err(TransferError::OperationReverted {
                user_op_hash,
                reason: receipt.reason.unwrap_or_else(|| "no revert reason".to_string()),
            });
        }

        info!(
            "User operation {:?} included in transaction {:?}",
            user_op_hash, receipt.receipt.transaction_hash
        );
        Ok(receipt.receipt.transaction_hash)
    }
}

fn chain_error(e: impl std::fmt::Display) -> TransferError {
    TransferError::Chain(e.to_string())
}
