//! Job handlers backed by the chain and the AI service.

use std::collections::BTreeMap;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use common::interfaces::content_registry::IContentRegistry;
use common::interfaces::governance::IGovernance;
use common::interfaces::marketplace::IMarketplace;
use common::interfaces::nft::INft;
use common::interfaces::staking::IStaking;
use common::interfaces::token::IToken;
use common::ContractName;
use job_queue::{
    AiHandler, AiRequest, BlockchainHandler, BlockchainTx, ContentValidation, JobContext,
    JobError, NftHandler, NftOperation, NotificationHandler, NotificationPayload,
    ValidationHandler,
};
use serde_json::{json, Value};

/// Target contract and calldata for a blockchain-tx job.
pub fn encode_tx(tx: &BlockchainTx) -> Result<(ContractName, Bytes), JobError> {
    let encoded = match tx {
        BlockchainTx::SubmitContent {
            content_hash,
            metadata_uri,
        } => (
            ContractName::ContentRegistry,
            IContentRegistry::submitContentCall {
                contentHash: content_hash.clone(),
                metadataURI: metadata_uri.clone().unwrap_or_default(),
            }
            .abi_encode(),
        ),
        BlockchainTx::Vote {
            proposal_id,
            support,
        } => (
            ContractName::Governance,
            IGovernance::castVoteCall {
                proposalId: U256::from(*proposal_id),
                support: *support,
            }
            .abi_encode(),
        ),
        BlockchainTx::TokenTransfer { to, amount } => (
            ContractName::Token,
            IToken::transferCall {
                to: parse_address("to", to)?,
                amount: parse_amount("amount", amount)?,
            }
            .abi_encode(),
        ),
        BlockchainTx::Stake {
            amount,
            pool_id,
            user,
        } => {
            let amount = parse_amount("amount", amount)?;
            let pool_id = U256::from(*pool_id);
            let calldata = match user {
                Some(user) => IStaking::stakeForCall {
                    user: parse_address("user", user)?,
                    poolId: pool_id,
                    amount,
                }
                .abi_encode(),
                None => IStaking::stakeCall {
                    poolId: pool_id,
                    amount,
                }
                .abi_encode(),
            };
            (ContractName::Staking, calldata)
        }
        BlockchainTx::Unstake {
            amount,
            pool_id,
            user,
        } => {
            let amount = parse_amount("amount", amount)?;
            let pool_id = U256::from(*pool_id);
            let calldata = match user {
                Some(user) => IStaking::unstakeForCall {
                    user: parse_address("user", user)?,
                    poolId: pool_id,
                    amount,
                }
                .abi_encode(),
                None => IStaking::unstakeCall {
                    poolId: pool_id,
                    amount,
                }
                .abi_encode(),
            };
            (ContractName::Staking, calldata)
        }
        BlockchainTx::ClaimRewards { pool_id } => (
            ContractName::Staking,
            IStaking::claimRewardsCall {
                poolId: U256::from(*pool_id),
            }
            .abi_encode(),
        ),
    };
    Ok((encoded.0, encoded.1.into()))
}

/// Target contract and calldata for an NFT job.
pub fn encode_nft(op: &NftOperation) -> Result<(ContractName, Bytes), JobError> {
    let (contract, calldata) = match op {
        NftOperation::Mint { to, token_uri } => (
            ContractName::Nft,
            INft::mintCall {
                to: parse_address("to", to)?,
                tokenURI: token_uri.clone(),
            }
            .abi_encode(),
        ),
        NftOperation::Transfer { from, to, token_id } => (
            ContractName::Nft,
            INft::transferFromCall {
                from: parse_address("from", from)?,
                to: parse_address("to", to)?,
                tokenId: parse_amount("tokenId", token_id)?,
            }
            .abi_encode(),
        ),
        NftOperation::List { token_id, price } => (
            ContractName::Marketplace,
            IMarketplace::listCall {
                tokenId: parse_amount("tokenId", token_id)?,
                price: parse_amount("price", price)?,
            }
            .abi_encode(),
        ),
    };
    Ok((contract, calldata.into()))
}

fn parse_address(field: &str, value: &str) -> Result<Address, JobError> {
    value
        .trim()
        .parse()
        .map_err(|_| JobError::Invalid(format!("{field}: invalid address '{value}'")))
}

fn parse_amount(field: &str, value: &str) -> Result<U256, JobError> {
    value
        .trim()
        .parse()
        .map_err(|_| JobError::Invalid(format!("{field}: invalid amount '{value}'")))
}

/// Scale a gas price by the job's multiplier at per-mille precision, rounding up.
pub fn scale_gas_price(gas_price: u128, multiplier: f64) -> u128 {
    if multiplier <= 1.0 {
        return gas_price;
    }
    let per_mille = (multiplier * 1000.0).round() as u128;
    gas_price.saturating_mul(per_mille).div_ceil(1000)
}

/// Signs and sends contract calls for the blockchain-tx and NFT classes.
pub struct TxHandler<P> {
    provider: P,
    addresses: BTreeMap<ContractName, Address>,
}

impl<P> TxHandler<P>
where
    P: Provider + Send + Sync,
{
    /// `provider` must carry the signing wallet.
    pub fn new(provider: P, addresses: BTreeMap<ContractName, Address>) -> Self {
        Self {
            provider,
            addresses,
        }
    }

    async fn send(
        &self,
        contract: ContractName,
        calldata: Bytes,
        ctx: &JobContext,
    ) -> Result<Value, JobError> {
        let to = *self
            .addresses
            .get(&contract)
            .ok_or_else(|| JobError::Invalid(format!("contract {contract} is not configured")))?;

        let base_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| JobError::failed(e.to_string()))?;
        let gas_price = scale_gas_price(base_price, ctx.gas_multiplier);

        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_gas_price(gas_price);

        tracing::info!(
            job_id = ctx.job_id,
            tracking_id = %ctx.tracking_id,
            %contract,
            attempt = ctx.attempt,
            gas_price,
            gas_multiplier = ctx.gas_multiplier,
            "🔗 Sending transaction"
        );

        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| JobError::failed(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        tracing::debug!("Transaction sent: {:?}", tx_hash);

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| JobError::failed(e.to_string()))?;
        if !receipt.status() {
            return Err(JobError::failed(format!("transaction {tx_hash:?} reverted")));
        }

        tracing::info!(
            "  ✓ {} confirmed: {:?} (block: {:?}, gas: {})",
            contract,
            tx_hash,
            receipt.block_number,
            receipt.gas_used
        );
        Ok(json!({
            "txHash": format!("{tx_hash:?}"),
            "blockNumber": receipt.block_number,
            "gasUsed": receipt.gas_used,
        }))
    }
}

#[async_trait]
impl<P> BlockchainHandler for TxHandler<P>
where
    P: Provider + Send + Sync,
{
    async fn execute(&self, tx: &BlockchainTx, ctx: &JobContext) -> Result<Value, JobError> {
        let (contract, calldata) = encode_tx(tx)?;
        self.send(contract, calldata, ctx).await
    }
}

#[async_trait]
impl<P> NftHandler for TxHandler<P>
where
    P: Provider + Send + Sync,
{
    async fn execute(&self, op: &NftOperation, ctx: &JobContext) -> Result<Value, JobError> {
        let (contract, calldata) = encode_nft(op)?;
        self.send(contract, calldata, ctx).await
    }
}

/// Delivers notifications to the log.
pub struct LoggingNotifier;

#[async_trait]
impl NotificationHandler for LoggingNotifier {
    async fn notify(
        &self,
        notification: &NotificationPayload,
        ctx: &JobContext,
    ) -> Result<Value, JobError> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = %notification.kind,
            tracking_id = %ctx.tracking_id,
            "🔔 Notification"
        );
        Ok(json!({ "delivered": true }))
    }
}

/// Client for the external AI service, serving the AI and validation classes.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalyzer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> eyre::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, body: Value, ctx: &JobContext) -> Result<Value, JobError> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(job_id = ctx.job_id, "POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-tracking-id", &ctx.tracking_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::failed(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(JobError::Invalid(format!("AI service rejected request: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(JobError::failed(format!("AI service error: HTTP {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| JobError::failed(e.to_string()))
    }
}

#[async_trait]
impl AiHandler for HttpAnalyzer {
    async fn analyze(&self, request: &AiRequest, ctx: &JobContext) -> Result<Value, JobError> {
        self.post(
            "analyze",
            json!({ "kind": request.kind, "input": request.input }),
            ctx,
        )
        .await
    }
}

#[async_trait]
impl ValidationHandler for HttpAnalyzer {
    async fn validate(
        &self,
        request: &ContentValidation,
        ctx: &JobContext,
    ) -> Result<Value, JobError> {
        self.post(
            "validate",
            json!({ "contentHash": request.content_hash, "content": request.content }),
            ctx,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stake_for_user_encoding() {
        let (contract, calldata) = encode_tx(&BlockchainTx::Stake {
            amount: "100".into(),
            pool_id: 0,
            user: Some("0x00000000000000000000000000000000000000ab".into()),
        })
        .unwrap();

        assert_eq!(contract, ContractName::Staking);
        assert_eq!(&calldata[..4], IStaking::stakeForCall::SELECTOR.as_slice());

        let decoded = IStaking::stakeForCall::abi_decode(&calldata).unwrap();
        assert_eq!(decoded.amount, U256::from(100));
        assert_eq!(decoded.poolId, U256::ZERO);
    }

    #[test]
    fn test_listing_targets_marketplace() {
        let (contract, calldata) = encode_nft(&NftOperation::List {
            token_id: "7".into(),
            price: "1000000000000000000".into(),
        })
        .unwrap();
        assert_eq!(contract, ContractName::Marketplace);
        assert_eq!(&calldata[..4], IMarketplace::listCall::SELECTOR.as_slice());
    }

    #[test]
    fn test_bad_input_is_permanent() {
        let err = encode_tx(&BlockchainTx::TokenTransfer {
            to: "not-an-address".into(),
            amount: "1".into(),
        })
        .unwrap_err();
        assert!(err.is_permanent());

        let err = encode_tx(&BlockchainTx::Stake {
            amount: "lots".into(),
            pool_id: 1,
            user: None,
        })
        .unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_gas_price_scaling() {
        assert_eq!(scale_gas_price(30_000_000_000, 1.0), 30_000_000_000);
        assert_eq!(scale_gas_price(30_000_000_000, 1.2), 36_000_000_000);
        assert_eq!(scale_gas_price(100, 1.2 * 1.2), 144);
        assert_eq!(scale_gas_price(1001, 1.2), 1202);
    }
}
