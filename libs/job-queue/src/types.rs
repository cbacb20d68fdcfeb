//! Job payloads, records and lifecycle types.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type JobId = u64;

/// Independently configured worker pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueClass {
    BlockchainTx,
    ContentValidation,
    AiProcessing,
    NftMinting,
    Notification,
}

impl QueueClass {
    pub const ALL: [QueueClass; 5] = [
        QueueClass::BlockchainTx,
        QueueClass::ContentValidation,
        QueueClass::AiProcessing,
        QueueClass::NftMinting,
        QueueClass::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::BlockchainTx => "blockchain-tx",
            QueueClass::ContentValidation => "content-validation",
            QueueClass::AiProcessing => "ai-processing",
            QueueClass::NftMinting => "nft-minting",
            QueueClass::Notification => "notification",
        }
    }

    /// Classes whose jobs send transactions and get gas-aware retries.
    pub fn is_onchain(&self) -> bool {
        matches!(self, QueueClass::BlockchainTx | QueueClass::NftMinting)
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    SubmitContent,
    Vote,
    TokenTransfer,
    Stake,
    Unstake,
    ClaimRewards,
    ValidateContent,
    AiAnalyze,
    MintNft,
    TransferNft,
    ListNft,
    SendNotification,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SubmitContent => "SUBMIT_CONTENT",
            JobType::Vote => "VOTE",
            JobType::TokenTransfer => "TOKEN_TRANSFER",
            JobType::Stake => "STAKE",
            JobType::Unstake => "UNSTAKE",
            JobType::ClaimRewards => "CLAIM_REWARDS",
            JobType::ValidateContent => "VALIDATE_CONTENT",
            JobType::AiAnalyze => "AI_ANALYZE",
            JobType::MintNft => "MINT_NFT",
            JobType::TransferNft => "TRANSFER_NFT",
            JobType::ListNft => "LIST_NFT",
            JobType::SendNotification => "SEND_NOTIFICATION",
        }
    }

    pub fn class(&self) -> QueueClass {
        match self {
            JobType::SubmitContent
            | JobType::Vote
            | JobType::TokenTransfer
            | JobType::Stake
            | JobType::Unstake
            | JobType::ClaimRewards => QueueClass::BlockchainTx,
            JobType::ValidateContent => QueueClass::ContentValidation,
            JobType::AiAnalyze => QueueClass::AiProcessing,
            JobType::MintNft | JobType::TransferNft | JobType::ListNft => QueueClass::NftMinting,
            JobType::SendNotification => QueueClass::Notification,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract calls submitted to the blockchain-tx class.
///
/// Token amounts are decimal strings in base units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum BlockchainTx {
    SubmitContent {
        content_hash: String,
        #[serde(default)]
        metadata_uri: Option<String>,
    },
    Vote {
        proposal_id: u64,
        support: bool,
    },
    TokenTransfer {
        to: String,
        amount: String,
    },
    Stake {
        amount: String,
        pool_id: u64,
        #[serde(default)]
        user: Option<String>,
    },
    Unstake {
        amount: String,
        pool_id: u64,
        #[serde(default)]
        user: Option<String>,
    },
    ClaimRewards {
        pool_id: u64,
    },
}

impl BlockchainTx {
    pub fn job_type(&self) -> JobType {
        match self {
            BlockchainTx::SubmitContent { .. } => JobType::SubmitContent,
            BlockchainTx::Vote { .. } => JobType::Vote,
            BlockchainTx::TokenTransfer { .. } => JobType::TokenTransfer,
            BlockchainTx::Stake { .. } => JobType::Stake,
            BlockchainTx::Unstake { .. } => JobType::Unstake,
            BlockchainTx::ClaimRewards { .. } => JobType::ClaimRewards,
        }
    }
}

/// NFT contract calls, run by the nft-minting class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum NftOperation {
    #[serde(rename = "MINT_NFT")]
    Mint { to: String, token_uri: String },
    #[serde(rename = "TRANSFER_NFT")]
    Transfer {
        from: String,
        to: String,
        token_id: String,
    },
    #[serde(rename = "LIST_NFT")]
    List { token_id: String, price: String },
}

impl NftOperation {
    pub fn job_type(&self) -> JobType {
        match self {
            NftOperation::Mint { .. } => JobType::MintNft,
            NftOperation::Transfer { .. } => JobType::TransferNft,
            NftOperation::List { .. } => JobType::ListNft,
        }
    }
}

/// Anything accepted by `add_blockchain_job`.
#[derive(Debug, Clone, PartialEq)]
pub enum OnChainOperation {
    Tx(BlockchainTx),
    Nft(NftOperation),
}

impl From<BlockchainTx> for OnChainOperation {
    fn from(tx: BlockchainTx) -> Self {
        OnChainOperation::Tx(tx)
    }
}

impl From<NftOperation> for OnChainOperation {
    fn from(op: NftOperation) -> Self {
        OnChainOperation::Nft(op)
    }
}

impl From<OnChainOperation> for JobPayload {
    fn from(op: OnChainOperation) -> Self {
        match op {
            OnChainOperation::Tx(tx) => JobPayload::Blockchain(tx),
            OnChainOperation::Nft(op) => JobPayload::Nft(op),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentValidation {
    pub content_hash: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRequest {
    /// Analysis kind, e.g. `moderation` or `summary`
    pub kind: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub user_id: String,
    pub kind: String,
    pub data: Value,
}

/// Typed payload of every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum JobPayload {
    Blockchain(BlockchainTx),
    Nft(NftOperation),
    ValidateContent(ContentValidation),
    AiAnalyze(AiRequest),
    Notification(NotificationPayload),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Blockchain(tx) => tx.job_type(),
            JobPayload::Nft(op) => op.job_type(),
            JobPayload::ValidateContent(_) => JobType::ValidateContent,
            JobPayload::AiAnalyze(_) => JobType::AiAnalyze,
            JobPayload::Notification(_) => JobType::SendNotification,
        }
    }

    pub fn class(&self) -> QueueClass {
        self.job_type().class()
    }
}

/// Submission options.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub user_address: Option<String>,
    /// Generated when absent
    pub tracking_id: Option<String>,
    /// Lower runs first. Defaults to 0.
    pub priority: Option<i32>,
    /// Hold the job in `Delayed` before it becomes eligible
    pub delay: Option<Duration>,
}

impl JobOptions {
    pub fn for_user(address: impl Into<String>) -> Self {
        Self {
            user_address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn with_tracking_id(mut self, tracking_id: impl Into<String>) -> Self {
        self.tracking_id = Some(tracking_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    /// Permanent error, never retried
    Failed,
    /// Every attempt consumed
    DeadLettered,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::DeadLettered
        )
    }
}

/// A job record and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub class: QueueClass,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub tracking_id: String,
    pub user_address: Option<String>,
    pub priority: i32,
    pub state: JobState,
    /// Attempts started so far
    pub attempts_made: u32,
    pub max_attempts: u32,
    /// Gas price scaling applied by on-chain handlers; only ever grows
    pub gas_multiplier: f64,
    pub created_at: DateTime<Utc>,
    /// When a delayed or retrying job becomes eligible
    pub run_at: Option<DateTime<Utc>>,
    pub processed_on: Option<DateTime<Utc>>,
    pub finished_on: Option<DateTime<Utc>>,
    pub return_value: Option<Value>,
    pub failed_reason: Option<String>,
    /// One entry per failed attempt, oldest first
    pub attempt_errors: Vec<String>,
}

/// Returned by every submission call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub class: QueueClass,
    pub id: JobId,
    pub tracking_id: String,
}

/// Passed to handlers on every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct JobContext {
    pub job_id: JobId,
    pub class: QueueClass,
    pub tracking_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub gas_multiplier: f64,
    pub user_address: Option<String>,
}

/// Tracking-id correlated lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum JobEvent {
    Completed {
        class: QueueClass,
        job_id: JobId,
        tracking_id: String,
        return_value: Value,
    },
    Retrying {
        class: QueueClass,
        job_id: JobId,
        tracking_id: String,
        attempt: u32,
        delay_ms: u64,
        gas_multiplier: f64,
        reason: String,
    },
    Failed {
        class: QueueClass,
        job_id: JobId,
        tracking_id: String,
        reason: String,
    },
    DeadLettered {
        class: QueueClass,
        job_id: JobId,
        tracking_id: String,
        attempts: u32,
        reason: String,
    },
}

impl JobEvent {
    pub fn tracking_id(&self) -> &str {
        match self {
            JobEvent::Completed { tracking_id, .. }
            | JobEvent::Retrying { tracking_id, .. }
            | JobEvent::Failed { tracking_id, .. }
            | JobEvent::DeadLettered { tracking_id, .. } => tracking_id,
        }
    }
}

/// Per-class job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    pub dead_lettered: usize,
}

pub type QueueStats = BTreeMap<QueueClass, ClassCounts>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub completed_removed: usize,
    pub failed_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_routing() {
        let stake = JobPayload::Blockchain(BlockchainTx::Stake {
            amount: "100".into(),
            pool_id: 0,
            user: Some("0xabc".into()),
        });
        assert_eq!(stake.job_type(), JobType::Stake);
        assert_eq!(stake.class(), QueueClass::BlockchainTx);

        let mint: JobPayload = OnChainOperation::from(NftOperation::Mint {
            to: "0xabc".into(),
            token_uri: "ipfs://x".into(),
        })
        .into();
        assert_eq!(mint.class(), QueueClass::NftMinting);
        assert!(mint.class().is_onchain());
        assert!(!QueueClass::AiProcessing.is_onchain());
    }

    #[test]
    fn test_stake_payload_wire_format() {
        let tx: BlockchainTx = serde_json::from_value(json!({
            "type": "STAKE",
            "amount": "100",
            "user": "0xabc",
            "poolId": 0
        }))
        .unwrap();
        assert_eq!(
            tx,
            BlockchainTx::Stake {
                amount: "100".into(),
                pool_id: 0,
                user: Some("0xabc".into()),
            }
        );
    }

    #[test]
    fn test_nft_wire_names() {
        let op = NftOperation::List {
            token_id: "7".into(),
            price: "10".into(),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "LIST_NFT");
        assert_eq!(value["tokenId"], "7");
    }
}
