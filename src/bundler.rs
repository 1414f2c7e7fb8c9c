// src/bundler.rs
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, H256};
use jsonrpsee::core::RpcResult;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use tracing::debug;

use crate::error::TransferError;
use crate::runner::GasOracle;
use crate::types::{
    GasPriceQuote, SponsorResult, UserOperation, UserOperationGasEstimate, UserOperationReceipt,
};

// Bundler and paymaster methods exposed by Pimlico for entry point v0.6
#[rpc(server, client)]
pub trait BundlerApi {
    #[method(name = "pimlico_getUserOperationGasPrice")]
    async fn user_operation_gas_price(&self) -> RpcResult<GasPriceQuote>;

    #[method(name = "eth_estimateUserOperationGas")]
    async fn estimate_user_operation_gas(
        &self,
        user_op: UserOperation,
        entry_point: Address,
    ) -> RpcResult<UserOperationGasEstimate>;

    #[method(name = "pm_sponsorUserOperation")]
    async fn sponsor_user_operation(
        &self,
        user_op: UserOperation,
        entry_point: Address,
    ) -> RpcResult<SponsorResult>;

    #[method(name = "eth_sendUserOperation")]
    async fn send_user_operation(
        &self,
        user_op: UserOperation,
        entry_point: Address,
    ) -> RpcResult<H256>;

    #[method(name = "eth_getUserOperationReceipt")]
    async fn user_operation_receipt(
        &self,
        user_op_hash: H256,
    ) -> RpcResult<Option<UserOperationReceipt>>;
}

/// Builds `{base}?apikey={key}` the way Pimlico authenticates requests.
pub fn bundler_endpoint(base: &str, api_key: &str) -> String {
    format!("{}?apikey={}", base, api_key)
}

pub struct BundlerClient {
    client: HttpClient,
}

impl BundlerClient {
    pub fn new(endpoint: &str) -> Result<Self, TransferError> {
        Self::with_timeout(endpoint, Duration::from_secs(60))
    }

    pub fn with_timeout(endpoint: &str, request_timeout: Duration) -> Result<Self, TransferError> {
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(endpoint)
            .map_err(|e| TransferError::InvalidConfig {
                var: "BUNDLER_URL",
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub async fn gas_price(&self) -> Result<GasPriceQuote, TransferError> {
        let quote = BundlerApiClient::user_operation_gas_price(&self.client)
            .await
            .map_err(bundler_error)?;
        debug!("Bundler gas price quote: {:?}", quote);
        Ok(quote)
    }

    pub async fn estimate_gas(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<UserOperationGasEstimate, TransferError> {
        BundlerApiClient::estimate_user_operation_gas(&self.client, user_op.clone(), entry_point)
            .await
            .map_err(bundler_error)
    }

    pub async fn sponsor(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<SponsorResult, TransferError> {
        BundlerApiClient::sponsor_user_operation(&self.client, user_op.clone(), entry_point)
            .await
            .map_err(bundler_error)
    }

    pub async fn send(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, TransferError> {
        BundlerApiClient::send_user_operation(&self.client, user_op.clone(), entry_point)
            .await
            .map_err(bundler_error)
    }

    pub async fn receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>, TransferError> {
        BundlerApiClient::user_operation_receipt(&self.client, user_op_hash)
            .await
            .map_err(bundler_error)
    }
}

#[async_trait]
impl GasOracle for BundlerClient {
    async fn user_operation_gas_price(&self) -> Result<GasPriceQuote, TransferError> {
        self.gas_price().await
    }
}

fn bundler_error(e: impl std::fmt::Display) -> TransferError {
    TransferError::Bundler(e.to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use jsonrpsee::core::async_trait;
    use jsonrpsee::server::{ServerBuilder, ServerHandle};
    use jsonrpsee::types::error::ErrorObject;

    use super::*;
    use crate::types::GasPrice;

    /// In-process bundler that records what it receives.
    #[derive(Clone, Default)]
    pub struct FakeBundler {
        pub gas_price: Option<GasPriceQuote>,
        pub estimate: Option<UserOperationGasEstimate>,
        pub sponsorship: Option<SponsorResult>,
        pub user_op_hash: H256,
        pub receipt: Option<UserOperationReceipt>,
        /// Number of receipt polls answered with `null` before the receipt is served.
        pub pending_polls: usize,
        pub reject_send: Option<String>,
        pub received: Arc<Mutex<Received>>,
    }

    #[derive(Default, Debug)]
    pub struct Received {
        pub estimated: Vec<UserOperation>,
        pub sponsored: Vec<UserOperation>,
        pub sent: Vec<(UserOperation, Address)>,
        pub receipt_polls: usize,
    }

    pub fn standard_quote(max_fee: u64, max_priority: u64) -> GasPriceQuote {
        let tier = GasPrice {
            max_fee_per_gas: max_fee.into(),
            max_priority_fee_per_gas: max_priority.into(),
        };
        GasPriceQuote { slow: tier, standard: tier, fast: tier }
    }

    fn missing(what: &str) -> jsonrpsee::types::ErrorObjectOwned {
        ErrorObject::owned(-32601, format!("{} not configured", what), None::<()>)
    }

    #[async_trait]
    impl BundlerApiServer for FakeBundler {
        async fn user_operation_gas_price(&self) -> RpcResult<GasPriceQuote> {
            self.gas_price.ok_or_else(|| missing("gas price"))
        }

        async fn estimate_user_operation_gas(
            &self,
            user_op: UserOperation,
            _entry_point: Address,
        ) -> RpcResult<UserOperationGasEstimate> {
            self.received.lock().unwrap().estimated.push(user_op);
            self.estimate.clone().ok_or_else(|| missing("estimate"))
        }

        async fn sponsor_user_operation(
            &self,
            user_op: UserOperation,
            _entry_point: Address,
        ) -> RpcResult<SponsorResult> {
            self.received.lock().unwrap().sponsored.push(user_op);
            self.sponsorship.clone().ok_or_else(|| missing("sponsorship"))
        }

        async fn send_user_operation(
            &self,
            user_op: UserOperation,
            entry_point: Address,
        ) -> RpcResult<H256> {
            if let Some(reason) = &self.reject_send {
                return Err(ErrorObject::owned(-32500, reason.clone(), None::<()>));
            }
            self.received.lock().unwrap().sent.push((user_op, entry_point));
            Ok(self.user_op_hash)
        }

        async fn user_operation_receipt(
            &self,
            _user_op_hash: H256,
        ) -> RpcResult<Option<UserOperationReceipt>> {
            let mut received = self.received.lock().unwrap();
            received.receipt_polls += 1;
            if received.receipt_polls <= self.pending_polls {
                return Ok(None);
            }
            Ok(self.receipt.clone())
        }
    }

    pub async fn serve(bundler: FakeBundler) -> (String, ServerHandle) {
        let server = ServerBuilder::default().build("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = server.local_addr().unwrap();
        let handle = server.start(bundler.into_rpc());
        (format!("http://{}", addr), handle)
    }
}
